//! Snapshot-based undo/redo
//!
//! History is linear: recording a new change drops everything that could
//! have been redone.

use std::collections::VecDeque;

use crate::annotations::{AnnotationStore, Snapshot};

#[derive(Debug, Clone, Default)]
pub struct History {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: Vec<Snapshot>,
    /// Maximum undo depth; `None` keeps everything.
    limit: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Save the current state before a mutation is applied.
    ///
    /// Must run before the store changes, otherwise undo would restore the
    /// post-change state.
    pub fn record_before_change(&mut self, current: &AnnotationStore) {
        self.push_undo(current.snapshot());
        self.redo_stack.clear();
    }

    /// Step back. Returns the snapshot the caller should install, or `None`
    /// when there is nothing to undo.
    pub fn undo(&mut self, current: &AnnotationStore) -> Option<Snapshot> {
        let previous = self.undo_stack.pop_back()?;
        self.redo_stack.push(current.snapshot());
        Some(previous)
    }

    pub fn redo(&mut self, current: &AnnotationStore) -> Option<Snapshot> {
        let next = self.redo_stack.pop()?;
        self.push_undo(current.snapshot());
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        self.undo_stack.push_back(snapshot);
        if let Some(limit) = self.limit {
            while self.undo_stack.len() > limit {
                self.undo_stack.pop_front();
            }
        }
    }
}
