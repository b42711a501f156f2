//! Placed stamps and the store that owns them
//!
//! The store keeps stamps in placement order. That order is the paint order:
//! a stamp placed later is drawn over earlier ones, both in the live overlay
//! and in the exported PDF.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::AnnotationKind;
use crate::coords::Point;

/// One placed stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// 1-indexed page number
    pub page: u32,
    /// Display-space center of the stamp
    pub position: Point,
    /// Display-space side length, fixed at placement time
    pub size: f64,
    pub kind: Arc<AnnotationKind>,
}

/// Serializable view of a placed stamp (no image bytes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationView {
    pub index: usize,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub kind_id: String,
}

/// Immutable copy of the store's contents, used by undo/redo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    annotations: Vec<Annotation>,
}

impl Snapshot {
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stamp. The kind handle is shared, the size is copied, so
    /// later changes to the working size never touch placed stamps.
    pub fn place(
        &mut self,
        kind: &Arc<AnnotationKind>,
        position: Point,
        size: f64,
        page: u32,
    ) -> &Annotation {
        self.annotations.push(Annotation {
            page,
            position,
            size,
            kind: Arc::clone(kind),
        });
        &self.annotations[self.annotations.len() - 1]
    }

    /// Remove every stamp on `page`. Returns how many were removed.
    pub fn remove_all_for_page(&mut self, page: u32) -> usize {
        let before = self.annotations.len();
        self.annotations.retain(|a| a.page != page);
        before - self.annotations.len()
    }

    /// Remove one stamp by its index in placement order.
    pub fn remove(&mut self, index: usize) -> Option<Annotation> {
        if index < self.annotations.len() {
            Some(self.annotations.remove(index))
        } else {
            None
        }
    }

    /// Stamps on `page`, in placement (paint) order.
    pub fn list(&self, page: u32) -> Vec<&Annotation> {
        self.annotations.iter().filter(|a| a.page == page).collect()
    }

    pub fn all(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, index: usize) -> Option<&Annotation> {
        self.annotations.get(index)
    }

    pub fn count_for_page(&self, page: u32) -> usize {
        self.annotations.iter().filter(|a| a.page == page).count()
    }

    /// Distinct page numbers that carry at least one stamp, ascending.
    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.annotations.iter().map(|a| a.page).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            annotations: self.annotations.clone(),
        }
    }

    /// Swap in a snapshot wholesale. Only undo/redo should call this.
    pub fn replace(&mut self, snapshot: Snapshot) {
        self.annotations = snapshot.annotations;
    }

    pub fn views(&self) -> Vec<AnnotationView> {
        self.annotations
            .iter()
            .enumerate()
            .map(|(index, a)| AnnotationView {
                index,
                page: a.page,
                x: a.position.x,
                y: a.position.y,
                size: a.size,
                kind_id: a.kind.id.clone(),
            })
            .collect()
    }
}
