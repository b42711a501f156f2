//! Stamp editing session
//!
//! A session binds one loaded document to its annotation store, history and
//! the working state of the stamp tool (selected kind, current size, page,
//! cursor preview). All mutation goes through plain synchronous methods;
//! presentation layers subscribe to [`SessionEvent`]s to learn when to
//! redraw.

use std::sync::Arc;

use image::RgbaImage;
use serde::Serialize;

use crate::annotations::{Annotation, AnnotationStore, AnnotationView};
use crate::catalog::{AnnotationKind, StampCatalog};
use crate::config::ViewerSettings;
use crate::coords::Point;
use crate::document::LoadedDocument;
use crate::error::{Result, StampError};
use crate::export::{export_stamped, CancelToken, SkippedAnnotation, WeakCancelToken};
use crate::history::History;
use crate::render::{
    render_page, OverlayRenderer, PageRasterizer, Preview, RenderScheduler, RenderTicket,
    RenderedPage,
};

/// Notification sent to subscribers after the session state changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The committed stamp set changed (place, clear, remove, undo, redo)
    AnnotationsChanged {
        total: usize,
        can_undo: bool,
        can_redo: bool,
    },
    PageChanged { page: u32 },
    SelectionChanged { kind_id: String, size: f64 },
    SizeChanged { size: f64 },
    /// The current page's overlay must be redrawn for the cursor preview
    PreviewChanged { page: u32 },
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&SessionEvent)>;

/// Keyboard shortcuts understood by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Undo,
    Redo,
}

impl Shortcut {
    /// Ctrl/Cmd+Z undoes; Ctrl/Cmd+Y and Ctrl/Cmd+Shift+Z redo.
    pub fn from_key(key: &str, ctrl_or_meta: bool, shift: bool) -> Option<Self> {
        if !ctrl_or_meta {
            return None;
        }
        match key.to_ascii_lowercase().as_str() {
            "z" if shift => Some(Shortcut::Redo),
            "z" => Some(Shortcut::Undo),
            "y" => Some(Shortcut::Redo),
            _ => None,
        }
    }
}

/// Result of a finished export.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    /// Suggested download name, `stamped_<original>`
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub stamped: usize,
    pub skipped: Vec<SkippedAnnotation>,
}

/// Everything an export needs, detached from the session.
///
/// The job owns its inputs, so it can run on another thread or after the
/// session is gone. Closing the session cancels it.
#[derive(Debug, Clone)]
pub struct ExportJob {
    source: Arc<[u8]>,
    annotations: Vec<Annotation>,
    scale: f64,
    file_name: String,
    cancel: CancelToken,
}

impl ExportJob {
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn run(self) -> Result<ExportedDocument> {
        let outcome = export_stamped(&self.source, &self.annotations, self.scale, &self.cancel)?;
        Ok(ExportedDocument {
            file_name: self.file_name,
            bytes: outcome.bytes,
            stamped: outcome.stamped,
            skipped: outcome.skipped,
        })
    }
}

pub struct StampSession {
    document: LoadedDocument,
    catalog: Arc<StampCatalog>,
    settings: ViewerSettings,
    store: AnnotationStore,
    history: History,
    current_page: u32,
    selected: Option<Arc<AnnotationKind>>,
    current_size: f64,
    preview: Option<Point>,
    overlay: OverlayRenderer,
    renders: RenderScheduler,
    exports: Vec<WeakCancelToken>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl StampSession {
    /// Open a session on `bytes`. Fails with `DocumentLoad` if the bytes are
    /// not a usable PDF; no session exists in that case.
    pub fn open(
        name: &str,
        bytes: &[u8],
        catalog: Arc<StampCatalog>,
        settings: ViewerSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let document = LoadedDocument::load(name, bytes)?;
        tracing::info!(
            name,
            pages = document.page_count(),
            stamps = catalog.len(),
            "opened stamp session"
        );

        let selected = catalog.first().cloned();
        let current_size = selected
            .as_ref()
            .map(|k| settings.clamp_size(k.default_size))
            .unwrap_or_else(|| settings.clamp_size(crate::catalog::DEFAULT_STAMP_SIZE));

        Ok(Self {
            document,
            catalog,
            history: History::with_limit(settings.history_limit),
            settings,
            store: AnnotationStore::new(),
            current_page: 1,
            selected,
            current_size,
            preview: None,
            overlay: OverlayRenderer::new(),
            renders: RenderScheduler::new(),
            exports: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
        })
    }

    pub fn document(&self) -> &LoadedDocument {
        &self.document
    }

    pub fn catalog(&self) -> &Arc<StampCatalog> {
        &self.catalog
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn scale(&self) -> f64 {
        self.settings.display_scale
    }

    pub fn page_count(&self) -> u32 {
        self.document.page_count()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.store.all()
    }

    pub fn list(&self, page: u32) -> Vec<&Annotation> {
        self.store.list(page)
    }

    pub fn views(&self) -> Vec<AnnotationView> {
        self.store.views()
    }

    /// Placed stamps as JSON, in placement order.
    pub fn annotations_json(&self) -> Result<String> {
        serde_json::to_string(&self.store.views())
            .map_err(|e| StampError::Serialization(e.to_string()))
    }

    pub fn selected_kind(&self) -> Option<&Arc<AnnotationKind>> {
        self.selected.as_ref()
    }

    pub fn current_size(&self) -> f64 {
        self.current_size
    }

    // ---- Observers ----

    pub fn subscribe(&mut self, listener: impl FnMut(&SessionEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, event: SessionEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    fn annotations_changed(&mut self) {
        let event = SessionEvent::AnnotationsChanged {
            total: self.store.len(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        };
        self.notify(event);
    }

    // ---- Mutations ----

    /// Place the selected stamp, at the current size, on the current page.
    /// Returns the new stamp's index.
    pub fn place_at(&mut self, position: Point) -> Result<usize> {
        let kind = self
            .selected
            .clone()
            .ok_or_else(|| StampError::Catalog("No stamp selected".to_string()))?;
        self.commit_place(&kind, position, self.current_size, self.current_page)
    }

    /// Place a specific kind anywhere in the document.
    pub fn place(&mut self, kind_id: &str, position: Point, size: f64, page: u32) -> Result<usize> {
        self.document.page(page)?;
        let kind = self
            .catalog
            .get(kind_id)
            .cloned()
            .ok_or_else(|| StampError::UnknownStamp(kind_id.to_string()))?;
        self.commit_place(&kind, position, size, page)
    }

    fn commit_place(
        &mut self,
        kind: &Arc<AnnotationKind>,
        position: Point,
        size: f64,
        page: u32,
    ) -> Result<usize> {
        if !(position.x.is_finite() && position.y.is_finite()) {
            return Err(StampError::InvalidPlacement(format!(
                "position ({}, {}) is not finite",
                position.x, position.y
            )));
        }
        if !(size.is_finite() && size > 0.0) {
            return Err(StampError::InvalidPlacement(format!("size {} is not positive", size)));
        }
        self.history.record_before_change(&self.store);
        self.store.place(kind, position, size, page);
        let index = self.store.len() - 1;
        tracing::debug!(index, page, kind = %kind.id, x = position.x, y = position.y, size, "placed stamp");
        self.annotations_changed();
        Ok(index)
    }

    pub fn clear_current_page(&mut self) -> usize {
        let page = self.current_page;
        self.clear_page_unchecked(page)
    }

    /// Remove every stamp on `page`. Clearing a page without stamps is not
    /// recorded in history.
    pub fn clear_page(&mut self, page: u32) -> Result<usize> {
        self.document.page(page)?;
        Ok(self.clear_page_unchecked(page))
    }

    fn clear_page_unchecked(&mut self, page: u32) -> usize {
        if self.store.count_for_page(page) == 0 {
            return 0;
        }
        self.history.record_before_change(&self.store);
        let removed = self.store.remove_all_for_page(page);
        tracing::debug!(page, removed, "cleared page");
        self.annotations_changed();
        removed
    }

    /// Remove one stamp by its index in placement order.
    pub fn remove(&mut self, index: usize) -> Result<Annotation> {
        if self.store.get(index).is_none() {
            return Err(StampError::InvalidAnnotation(index));
        }
        self.history.record_before_change(&self.store);
        let removed = self
            .store
            .remove(index)
            .ok_or(StampError::InvalidAnnotation(index))?;
        self.annotations_changed();
        Ok(removed)
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo(&self.store) {
            Some(snapshot) => {
                self.store.replace(snapshot);
                self.annotations_changed();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(&self.store) {
            Some(snapshot) => {
                self.store.replace(snapshot);
                self.annotations_changed();
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn handle_shortcut(&mut self, shortcut: Shortcut) -> bool {
        match shortcut {
            Shortcut::Undo => self.undo(),
            Shortcut::Redo => self.redo(),
        }
    }

    // ---- Stamp tool ----

    /// Select a catalog kind. The current size resets to its default.
    pub fn select_kind(&mut self, kind_id: &str) -> Result<()> {
        let kind = self
            .catalog
            .get(kind_id)
            .cloned()
            .ok_or_else(|| StampError::UnknownStamp(kind_id.to_string()))?;
        self.current_size = self.settings.clamp_size(kind.default_size);
        let event = SessionEvent::SelectionChanged {
            kind_id: kind.id.clone(),
            size: self.current_size,
        };
        self.selected = Some(kind);
        self.notify(event);
        self.preview_changed();
        Ok(())
    }

    /// Set the working size, clamped to the configured range. Placed stamps
    /// keep their own size. Non-finite sizes are ignored.
    pub fn set_current_size(&mut self, size: f64) -> f64 {
        if !size.is_finite() {
            tracing::warn!(size, "ignoring non-finite stamp size");
            return self.current_size;
        }
        let clamped = self.settings.clamp_size(size);
        if clamped != self.current_size {
            self.current_size = clamped;
            self.notify(SessionEvent::SizeChanged { size: clamped });
            self.preview_changed();
        }
        self.current_size
    }

    pub fn increase_size(&mut self) -> f64 {
        self.set_current_size(self.current_size + self.settings.size_step)
    }

    pub fn decrease_size(&mut self) -> f64 {
        self.set_current_size(self.current_size - self.settings.size_step)
    }

    pub fn preview_at(&mut self, position: Point) {
        self.preview = Some(position);
        self.preview_changed();
    }

    pub fn clear_preview(&mut self) {
        if self.preview.take().is_some() {
            self.preview_changed();
        }
    }

    fn preview_changed(&mut self) {
        if self.preview.is_some() {
            let page = self.current_page;
            self.notify(SessionEvent::PreviewChanged { page });
        }
    }

    // ---- Navigation ----

    pub fn next_page(&mut self) -> bool {
        if self.current_page < self.page_count() {
            self.set_page(self.current_page + 1);
            true
        } else {
            false
        }
    }

    pub fn previous_page(&mut self) -> bool {
        if self.current_page > 1 {
            self.set_page(self.current_page - 1);
            true
        } else {
            false
        }
    }

    pub fn go_to_page(&mut self, page: u32) -> Result<()> {
        self.document.page(page)?;
        if page != self.current_page {
            self.set_page(page);
        }
        Ok(())
    }

    fn set_page(&mut self, page: u32) {
        self.current_page = page;
        self.preview = None;
        self.notify(SessionEvent::PageChanged { page });
    }

    // ---- Rendering ----

    /// Redraw the current page's stamp overlay, including the cursor
    /// preview.
    pub fn render_overlay(&mut self) -> Result<RgbaImage> {
        let page = self.current_page;
        let geometry = self.document.page(page)?;
        let annotations = self.store.list(page);
        let preview = cursor_preview(&self.selected, self.preview, self.current_size);
        Ok(self
            .overlay
            .render(geometry, self.settings.display_scale, &annotations, preview.as_ref()))
    }

    /// Render the current page: base raster from `rasterizer` plus the
    /// stamp overlay.
    pub fn render_current_page(&mut self, rasterizer: &dyn PageRasterizer) -> Result<RenderedPage> {
        let page = self.current_page;
        let annotations = self.store.list(page);
        let preview = cursor_preview(&self.selected, self.preview, self.current_size);
        render_page(
            &self.document,
            page,
            self.settings.display_scale,
            rasterizer,
            &mut self.overlay,
            &annotations,
            preview.as_ref(),
        )
    }

    /// Start an asynchronous render of the current page. Any earlier
    /// ticket is superseded.
    pub fn begin_render(&mut self) -> RenderTicket {
        self.renders.request(self.current_page)
    }

    /// Finish a render started with [`begin_render`](Self::begin_render).
    /// Returns the overlay to present, or `None` when the ticket was
    /// superseded or the user has left that page.
    pub fn finish_render(&mut self, ticket: RenderTicket) -> Result<Option<RgbaImage>> {
        if !self.renders.complete(&ticket) || ticket.page != self.current_page {
            tracing::debug!(page = ticket.page, generation = ticket.generation, "discarding stale render");
            return Ok(None);
        }
        self.render_overlay().map(Some)
    }

    // ---- Export ----

    /// Snapshot everything an export needs. Refused upfront when there are
    /// no stamps.
    pub fn begin_export(&mut self) -> Result<ExportJob> {
        if self.store.is_empty() {
            return Err(StampError::NothingToExport);
        }
        self.exports.retain(|token| token.pending().is_some());
        let cancel = CancelToken::new();
        self.exports.push(cancel.downgrade());

        Ok(ExportJob {
            source: self.document.shared_bytes(),
            annotations: self.store.all().to_vec(),
            scale: self.settings.display_scale,
            file_name: self.document.export_file_name(),
            cancel,
        })
    }

    pub fn export(&mut self) -> Result<ExportedDocument> {
        self.begin_export()?.run()
    }

    /// Cancel in-flight work and tell subscribers the session is gone.
    pub fn close(mut self) {
        self.shutdown();
        self.notify(SessionEvent::Closed);
        tracing::info!(name = self.document.name(), "closed stamp session");
    }

    fn shutdown(&mut self) {
        for token in self.exports.drain(..).filter_map(|t| t.pending()) {
            token.cancel();
        }
        self.renders.cancel();
    }
}

fn cursor_preview(
    selected: &Option<Arc<AnnotationKind>>,
    position: Option<Point>,
    size: f64,
) -> Option<Preview<'_>> {
    match (selected, position) {
        (Some(kind), Some(position)) => Some(Preview {
            kind: kind.as_ref(),
            position,
            size,
        }),
        _ => None,
    }
}

impl Drop for StampSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ImageFormat, ImagePayload};
    use crate::document::test_support::create_test_pdf;
    use crate::pdf_image::test_support::png;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn catalog() -> Arc<StampCatalog> {
        Arc::new(
            StampCatalog::builder()
                .builtin("approved", "Approved", 150.0, ImagePayload::new(png(4, 4, [0, 128, 0], false), ImageFormat::Png))
                .builtin("rejected", "Rejected", 100.0, ImagePayload::new(png(4, 4, [200, 0, 0], true), ImageFormat::Png))
                .build()
                .unwrap(),
        )
    }

    fn session(pages: usize) -> StampSession {
        let pdf = create_test_pdf(&vec![(612, 792); pages]);
        StampSession::open("contract.pdf", &pdf, catalog(), ViewerSettings::default()).unwrap()
    }

    fn kinds(session: &StampSession) -> Vec<String> {
        session.annotations().iter().map(|a| a.kind.id.clone()).collect()
    }

    #[test]
    fn test_open_selects_first_kind() {
        let session = session(2);
        assert_eq!(session.selected_kind().unwrap().id, "approved");
        assert_eq!(session.current_size(), 150.0);
        assert_eq!(session.current_page(), 1);
        assert!(!session.can_undo());
    }

    #[test]
    fn test_open_rejects_bad_document() {
        let result = StampSession::open("x.pdf", b"hello", catalog(), ViewerSettings::default());
        assert!(matches!(result, Err(StampError::DocumentLoad(_))));
    }

    #[test]
    fn test_place_undo_redo() {
        let mut session = session(1);
        session.place_at(Point::new(100.0, 100.0)).unwrap();
        session.select_kind("rejected").unwrap();
        session.place_at(Point::new(120.0, 120.0)).unwrap();

        assert!(session.undo());
        assert_eq!(kinds(&session), vec!["approved"]);
        assert!(session.undo());
        assert!(session.annotations().is_empty());
        assert!(!session.undo());

        assert!(session.redo());
        assert!(session.redo());
        assert_eq!(kinds(&session), vec!["approved", "rejected"]);
        assert!(!session.can_redo());
    }

    #[test]
    fn test_new_placement_clears_redo() {
        let mut session = session(1);
        session.place_at(Point::new(1.0, 1.0)).unwrap();
        session.undo();
        assert!(session.can_redo());
        session.place_at(Point::new(2.0, 2.0)).unwrap();
        assert!(!session.can_redo());
    }

    #[test]
    fn test_clear_page_isolation() {
        let mut session = session(3);
        for page in 1..=3 {
            session.go_to_page(page).unwrap();
            session.place_at(Point::new(50.0, 50.0)).unwrap();
        }
        session.go_to_page(2).unwrap();
        assert_eq!(session.clear_current_page(), 1);

        assert_eq!(session.list(1).len(), 1);
        assert_eq!(session.list(2).len(), 0);
        assert_eq!(session.list(3).len(), 1);

        assert!(session.undo());
        assert_eq!(session.list(2).len(), 1);
    }

    #[test]
    fn test_clearing_empty_page_records_nothing() {
        let mut session = session(2);
        assert_eq!(session.clear_page(2).unwrap(), 0);
        assert!(!session.can_undo());
        assert!(matches!(
            session.clear_page(5),
            Err(StampError::InvalidPage { page: 5, page_count: 2 })
        ));
    }

    #[test]
    fn test_remove_single_stamp() {
        let mut session = session(1);
        session.place_at(Point::new(1.0, 1.0)).unwrap();
        session.place_at(Point::new(2.0, 2.0)).unwrap();

        let removed = session.remove(0).unwrap();
        assert_eq!(removed.position, Point::new(1.0, 1.0));
        assert_eq!(session.annotations().len(), 1);

        let depth = session.history.undo_depth();
        assert!(matches!(session.remove(7), Err(StampError::InvalidAnnotation(7))));
        assert_eq!(session.history.undo_depth(), depth);
    }

    #[test]
    fn test_place_validates_page_and_kind() {
        let mut session = session(2);
        assert!(matches!(
            session.place("approved", Point::new(0.0, 0.0), 100.0, 3),
            Err(StampError::InvalidPage { .. })
        ));
        assert!(matches!(
            session.place("nope", Point::new(0.0, 0.0), 100.0, 1),
            Err(StampError::UnknownStamp(_))
        ));
        assert!(!session.can_undo());
        assert_eq!(session.place("rejected", Point::new(0.0, 0.0), 80.0, 2).unwrap(), 0);
    }

    #[test]
    fn test_size_controls() {
        let mut session = session(1);
        assert_eq!(session.increase_size(), 160.0);
        assert_eq!(session.set_current_size(1000.0), 300.0);
        assert_eq!(session.increase_size(), 300.0);
        assert_eq!(session.set_current_size(55.0), 55.0);
        assert_eq!(session.decrease_size(), 50.0);

        session.place_at(Point::new(10.0, 10.0)).unwrap();
        session.increase_size();
        // Placed stamps keep the size they were created with
        assert_eq!(session.annotations()[0].size, 50.0);

        session.select_kind("rejected").unwrap();
        assert_eq!(session.current_size(), 100.0);
    }

    #[test]
    fn test_non_finite_size_is_ignored() {
        let mut session = session(1);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        session.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        assert_eq!(session.set_current_size(f64::NAN), 150.0);
        assert_eq!(session.set_current_size(f64::INFINITY), 150.0);
        assert!(events.borrow().is_empty());

        session.place_at(Point::new(300.0, 300.0)).unwrap();
        assert_eq!(session.annotations()[0].size, 150.0);
    }

    #[test]
    fn test_place_rejects_non_finite_geometry() {
        let mut session = session(1);
        assert!(matches!(
            session.place_at(Point::new(f64::NAN, 10.0)),
            Err(StampError::InvalidPlacement(_))
        ));
        assert!(matches!(
            session.place("approved", Point::new(10.0, 10.0), f64::NAN, 1),
            Err(StampError::InvalidPlacement(_))
        ));
        assert!(matches!(
            session.place("approved", Point::new(10.0, 10.0), 0.0, 1),
            Err(StampError::InvalidPlacement(_))
        ));
        assert!(session.annotations().is_empty());
        assert!(!session.can_undo());
    }

    #[test]
    fn test_navigation_bounds() {
        let mut session = session(2);
        assert!(!session.previous_page());
        assert!(session.next_page());
        assert_eq!(session.current_page(), 2);
        assert!(!session.next_page());
        assert!(session.go_to_page(0).is_err());
        assert!(!session.can_undo());
    }

    #[test]
    fn test_preview_never_enters_store() {
        let mut session = session(1);
        session.preview_at(Point::new(300.0, 300.0));
        let overlay = session.render_overlay().unwrap();
        assert!(overlay.get_pixel(300, 300).0[3] > 0);
        assert!(session.annotations().is_empty());
        assert!(!session.can_undo());

        session.clear_preview();
        let overlay = session.render_overlay().unwrap();
        assert_eq!(overlay.get_pixel(300, 300).0[3], 0);
    }

    #[test]
    fn test_render_current_page_dimensions() {
        let mut session = session(1);
        let rendered = session
            .render_current_page(&crate::render::PaperRasterizer)
            .unwrap();
        assert_eq!(rendered.base.dimensions(), (918, 1188));
        assert_eq!(rendered.overlay.dimensions(), (918, 1188));
    }

    #[test]
    fn test_superseded_render_is_discarded() {
        let mut session = session(2);
        let first = session.begin_render();
        session.next_page();
        let second = session.begin_render();

        assert_eq!(session.finish_render(first).unwrap(), None);
        assert!(session.finish_render(second).unwrap().is_some());
    }

    #[test]
    fn test_shortcuts() {
        assert_eq!(Shortcut::from_key("z", true, false), Some(Shortcut::Undo));
        assert_eq!(Shortcut::from_key("Z", true, true), Some(Shortcut::Redo));
        assert_eq!(Shortcut::from_key("y", true, false), Some(Shortcut::Redo));
        assert_eq!(Shortcut::from_key("z", false, false), None);
        assert_eq!(Shortcut::from_key("x", true, false), None);

        let mut session = session(1);
        session.place_at(Point::new(1.0, 1.0)).unwrap();
        assert!(session.handle_shortcut(Shortcut::Undo));
        assert!(session.handle_shortcut(Shortcut::Redo));
        assert_eq!(session.annotations().len(), 1);
    }

    #[test]
    fn test_events_are_delivered() {
        let mut session = session(2);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let id = session.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        session.place_at(Point::new(1.0, 1.0)).unwrap();
        session.next_page();
        session.undo();

        assert_eq!(
            *events.borrow(),
            vec![
                SessionEvent::AnnotationsChanged { total: 1, can_undo: true, can_redo: false },
                SessionEvent::PageChanged { page: 2 },
                SessionEvent::AnnotationsChanged { total: 0, can_undo: false, can_redo: true },
            ]
        );

        assert!(session.unsubscribe(id));
        session.redo();
        assert_eq!(events.borrow().len(), 3);
    }

    #[test]
    fn test_annotations_json() {
        let mut session = session(1);
        session.place_at(Point::new(10.0, 20.0)).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&session.annotations_json().unwrap()).unwrap();
        assert_eq!(value[0]["kind_id"], "approved");
        assert_eq!(value[0]["page"], 1);
        assert_eq!(value[0]["x"], 10.0);
    }

    #[test]
    fn test_export_empty_is_refused() {
        let mut session = session(1);
        assert!(matches!(session.export(), Err(StampError::NothingToExport)));
    }

    #[test]
    fn test_export_names_output() {
        let mut session = session(1);
        session.place_at(Point::new(100.0, 100.0)).unwrap();
        let exported = session.export().unwrap();
        assert_eq!(exported.file_name, "stamped_contract.pdf");
        assert_eq!(exported.stamped, 1);
        assert!(exported.bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_closing_cancels_pending_export() {
        let mut session = session(1);
        session.place_at(Point::new(100.0, 100.0)).unwrap();
        let job = session.begin_export().unwrap();
        session.close();

        assert!(job.cancel_token().is_cancelled());
        assert!(matches!(job.run(), Err(StampError::Cancelled)));
    }

    #[test]
    fn test_finished_exports_are_not_tracked() {
        let mut session = session(1);
        session.place_at(Point::new(100.0, 100.0)).unwrap();
        for _ in 0..3 {
            session.export().unwrap();
        }
        let pending = session.begin_export().unwrap();
        assert_eq!(session.exports.len(), 1);

        drop(pending);
        session.export().unwrap();
        assert_eq!(session.exports.len(), 1);
    }

    #[test]
    fn test_export_job_runs_after_later_edits() {
        let mut session = session(1);
        session.place_at(Point::new(100.0, 100.0)).unwrap();
        let job = session.begin_export().unwrap();
        session.clear_current_page();

        let exported = job.run().unwrap();
        assert_eq!(exported.stamped, 1);
    }
}
