//! Browser-facing stamp editor
//!
//! Wraps a `StampSession` for JavaScript. Methods exposed to JS convert
//! errors to strings; the `_internal` variants return plain Rust types so
//! they can be tested natively.

use std::sync::Arc;

use serde::Serialize;
use stamp_core::{
    ListenerId, Point, RenderTicket, SessionEvent, Shortcut, StampCatalog, StampError,
    StampSession, ViewerSettings,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::catalog::CatalogLoader;

/// Ticket for an asynchronous page render, see `StampEditor::beginRender`
#[wasm_bindgen]
#[derive(Debug, Clone, Copy)]
pub struct RenderHandle {
    ticket: RenderTicket,
}

#[wasm_bindgen]
impl RenderHandle {
    #[wasm_bindgen(getter)]
    pub fn page(&self) -> u32 {
        self.ticket.page
    }
}

/// Page and canvas dimensions for JS serialization
#[derive(Serialize)]
struct PageDimensionsJs {
    page: u32,
    width: f64,
    height: f64,
    surface_width: u32,
    surface_height: u32,
    scale: f64,
}

#[wasm_bindgen]
pub struct StampEditor {
    catalog: Arc<StampCatalog>,
    settings: ViewerSettings,
    session: Option<StampSession>,
    change_callback: Option<js_sys::Function>,
    listener: Option<ListenerId>,
}

#[wasm_bindgen]
impl StampEditor {
    /// Freeze the catalog and create an editor with no document loaded
    #[wasm_bindgen(constructor)]
    pub fn new(catalog: CatalogLoader, display_scale: Option<f64>) -> Result<StampEditor, JsValue> {
        Self::new_internal(catalog, display_scale).map_err(|e| JsValue::from_str(&e))
    }

    #[wasm_bindgen(getter, js_name = isLoaded)]
    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.session.as_ref().map(|s| s.page_count()).unwrap_or(0)
    }

    #[wasm_bindgen(getter, js_name = currentPage)]
    pub fn current_page(&self) -> u32 {
        self.session.as_ref().map(|s| s.current_page()).unwrap_or(0)
    }

    #[wasm_bindgen(getter, js_name = documentName)]
    pub fn document_name(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.document().name().to_string())
    }

    /// Get document bytes for PDF.js rendering
    #[wasm_bindgen(js_name = getDocumentBytes)]
    pub fn get_document_bytes(&self) -> Result<js_sys::Uint8Array, JsValue> {
        let session = self.session.as_ref().ok_or_else(no_document)?;
        Ok(js_sys::Uint8Array::from(session.document().bytes()))
    }

    /// Catalog entries as JSON: `[{id, label, default_size, format, builtin}]`
    #[wasm_bindgen(js_name = stampsJson)]
    pub fn stamps_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.catalog.summaries())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Open a document, replacing any previous one. On failure the editor
    /// is left with no document.
    #[wasm_bindgen(js_name = loadDocument)]
    pub fn load_document(&mut self, name: &str, bytes: &[u8]) -> Result<u32, JsValue> {
        self.load_document_internal(name, bytes)
            .map_err(|e| JsValue::from_str(&e))
    }

    /// Drop the document and cancel any export still running for it
    #[wasm_bindgen(js_name = closeDocument)]
    pub fn close_document(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.listener = None;
    }

    /// Callback signature: (event: {type: string, ...}) => void
    #[wasm_bindgen(js_name = setChangeCallback)]
    pub fn set_change_callback(&mut self, callback: js_sys::Function) {
        self.change_callback = Some(callback);
        self.attach_listener();
    }

    // ---- Stamp tool ----

    #[wasm_bindgen(getter, js_name = selectedStamp)]
    pub fn selected_stamp(&self) -> Option<String> {
        self.session
            .as_ref()
            .and_then(|s| s.selected_kind())
            .map(|k| k.id.clone())
    }

    #[wasm_bindgen(js_name = selectStamp)]
    pub fn select_stamp(&mut self, id: &str) -> Result<(), JsValue> {
        self.with_session(|s| s.select_kind(id))
    }

    #[wasm_bindgen(getter, js_name = currentSize)]
    pub fn current_size(&self) -> f64 {
        self.session.as_ref().map(|s| s.current_size()).unwrap_or(0.0)
    }

    /// Set the stamp size; returns the clamped value
    #[wasm_bindgen(js_name = setSize)]
    pub fn set_size(&mut self, size: f64) -> Result<f64, JsValue> {
        self.with_session(|s| Ok(s.set_current_size(size)))
    }

    #[wasm_bindgen(js_name = increaseSize)]
    pub fn increase_size(&mut self) -> Result<f64, JsValue> {
        self.with_session(|s| Ok(s.increase_size()))
    }

    #[wasm_bindgen(js_name = decreaseSize)]
    pub fn decrease_size(&mut self) -> Result<f64, JsValue> {
        self.with_session(|s| Ok(s.decrease_size()))
    }

    /// Place the selected stamp at a canvas point; returns its index
    #[wasm_bindgen(js_name = placeAt)]
    pub fn place_at(&mut self, x: f64, y: f64) -> Result<usize, JsValue> {
        self.with_session(|s| s.place_at(Point::new(x, y)))
    }

    #[wasm_bindgen(js_name = removeStamp)]
    pub fn remove_stamp(&mut self, index: usize) -> Result<(), JsValue> {
        self.with_session(|s| s.remove(index).map(|_| ()))
    }

    /// Remove every stamp on the current page; returns how many
    #[wasm_bindgen(js_name = clearPage)]
    pub fn clear_page(&mut self) -> Result<usize, JsValue> {
        self.with_session(|s| Ok(s.clear_current_page()))
    }

    pub fn undo(&mut self) -> bool {
        self.session.as_mut().map(|s| s.undo()).unwrap_or(false)
    }

    pub fn redo(&mut self) -> bool {
        self.session.as_mut().map(|s| s.redo()).unwrap_or(false)
    }

    #[wasm_bindgen(getter, js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.session.as_ref().map(|s| s.can_undo()).unwrap_or(false)
    }

    #[wasm_bindgen(getter, js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.session.as_ref().map(|s| s.can_redo()).unwrap_or(false)
    }

    /// Handle a keydown event. Returns true if it was an editor shortcut,
    /// in which case JS should call `preventDefault`.
    #[wasm_bindgen(js_name = handleKey)]
    pub fn handle_key(&mut self, key: &str, ctrl: bool, meta: bool, shift: bool) -> bool {
        let Some(shortcut) = Shortcut::from_key(key, ctrl || meta, shift) else {
            return false;
        };
        if let Some(session) = self.session.as_mut() {
            session.handle_shortcut(shortcut);
        }
        true
    }

    #[wasm_bindgen(js_name = annotationsJson)]
    pub fn annotations_json(&self) -> Result<String, JsValue> {
        let session = self.session.as_ref().ok_or_else(no_document)?;
        session
            .annotations_json()
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    // ---- Navigation ----

    #[wasm_bindgen(js_name = nextPage)]
    pub fn next_page(&mut self) -> bool {
        self.session.as_mut().map(|s| s.next_page()).unwrap_or(false)
    }

    #[wasm_bindgen(js_name = previousPage)]
    pub fn previous_page(&mut self) -> bool {
        self.session.as_mut().map(|s| s.previous_page()).unwrap_or(false)
    }

    #[wasm_bindgen(js_name = goToPage)]
    pub fn go_to_page(&mut self, page: u32) -> Result<(), JsValue> {
        self.with_session(|s| s.go_to_page(page))
    }

    /// Current page size and the canvas size to render it at
    #[wasm_bindgen(js_name = pageDimensions)]
    pub fn page_dimensions(&self) -> Result<JsValue, JsValue> {
        let dims = self.page_dimensions_internal().map_err(|e| JsValue::from_str(&e))?;
        serde_wasm_bindgen::to_value(&dims)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    // ---- Rendering ----

    #[wasm_bindgen(js_name = previewAt)]
    pub fn preview_at(&mut self, x: f64, y: f64) {
        if let Some(session) = self.session.as_mut() {
            session.preview_at(Point::new(x, y));
        }
    }

    #[wasm_bindgen(js_name = clearPreview)]
    pub fn clear_preview(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.clear_preview();
        }
    }

    /// Start rendering the current page. Render the page with PDF.js, then
    /// pass the handle to `finishRender`.
    #[wasm_bindgen(js_name = beginRender)]
    pub fn begin_render(&mut self) -> Result<RenderHandle, JsValue> {
        let session = self.session.as_mut().ok_or_else(no_document)?;
        Ok(RenderHandle {
            ticket: session.begin_render(),
        })
    }

    /// RGBA overlay bytes for `putImageData`, or `undefined` when the render
    /// was superseded and must not be shown.
    #[wasm_bindgen(js_name = finishRender)]
    pub fn finish_render(&mut self, handle: &RenderHandle) -> Result<Option<js_sys::Uint8ClampedArray>, JsValue> {
        let overlay = self
            .finish_render_internal(handle)
            .map_err(|e| JsValue::from_str(&e))?;
        Ok(overlay.map(|bytes| js_sys::Uint8ClampedArray::from(bytes.as_slice())))
    }

    /// Redraw the overlay for the current page (pointer moves, edits)
    #[wasm_bindgen(js_name = renderOverlay)]
    pub fn render_overlay(&mut self) -> Result<js_sys::Uint8ClampedArray, JsValue> {
        let bytes = self
            .render_overlay_internal()
            .map_err(|e| JsValue::from_str(&e))?;
        Ok(js_sys::Uint8ClampedArray::from(bytes.as_slice()))
    }

    // ---- Export ----

    #[wasm_bindgen(js_name = exportFileName)]
    pub fn export_file_name(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|s| s.document().export_file_name())
    }

    /// Export the stamped PDF synchronously
    #[wasm_bindgen(js_name = exportPdf)]
    pub fn export_pdf(&mut self) -> Result<js_sys::Uint8Array, JsValue> {
        let bytes = self.export_internal().map_err(|e| JsValue::from_str(&e))?;
        Ok(js_sys::Uint8Array::from(bytes.as_slice()))
    }

    /// Export on a later tick. Resolves to the PDF bytes, or to `null` if
    /// the document was closed before the export ran.
    #[wasm_bindgen(js_name = exportAsync)]
    pub fn export_async(&mut self) -> Result<js_sys::Promise, JsValue> {
        let session = self.session.as_mut().ok_or_else(no_document)?;
        let job = session
            .begin_export()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;

        Ok(wasm_bindgen_futures::future_to_promise(async move {
            // Yield so a close issued right after this call wins the race
            JsFuture::from(js_sys::Promise::resolve(&JsValue::NULL)).await?;
            match job.run() {
                Ok(exported) => {
                    report_skipped(exported.skipped.len());
                    Ok(js_sys::Uint8Array::from(exported.bytes.as_slice()).into())
                }
                Err(StampError::Cancelled) => Ok(JsValue::NULL),
                Err(e) => Err(JsValue::from_str(&e.to_string())),
            }
        }))
    }
}

impl StampEditor {
    pub(crate) fn new_internal(
        catalog: CatalogLoader,
        display_scale: Option<f64>,
    ) -> Result<Self, String> {
        let mut settings = ViewerSettings::default();
        if let Some(scale) = display_scale {
            settings.display_scale = scale;
        }
        settings.validate().map_err(|e| e.to_string())?;

        Ok(Self {
            catalog: Arc::new(catalog.build()?),
            settings,
            session: None,
            change_callback: None,
            listener: None,
        })
    }

    pub(crate) fn load_document_internal(&mut self, name: &str, bytes: &[u8]) -> Result<u32, String> {
        self.close_document();
        let session = StampSession::open(
            name,
            bytes,
            Arc::clone(&self.catalog),
            self.settings.clone(),
        )
        .map_err(|e| e.to_string())?;
        let pages = session.page_count();
        self.session = Some(session);
        self.attach_listener();
        Ok(pages)
    }

    fn attach_listener(&mut self) {
        let (Some(session), Some(callback)) = (self.session.as_mut(), self.change_callback.clone())
        else {
            return;
        };
        if let Some(previous) = self.listener.take() {
            session.unsubscribe(previous);
        }
        let id = session.subscribe(move |event: &SessionEvent| {
            if let Ok(value) = serde_wasm_bindgen::to_value(event) {
                let _ = callback.call1(&JsValue::null(), &value);
            }
        });
        self.listener = Some(id);
    }

    fn with_session<T>(
        &mut self,
        f: impl FnOnce(&mut StampSession) -> stamp_core::Result<T>,
    ) -> Result<T, JsValue> {
        let session = self.session.as_mut().ok_or_else(no_document)?;
        f(session).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    fn page_dimensions_internal(&self) -> Result<PageDimensionsJs, String> {
        let session = self.session.as_ref().ok_or("No document loaded")?;
        let page = session
            .document()
            .page(session.current_page())
            .map_err(|e| e.to_string())?;
        let surface = page.surface_size(session.scale());
        Ok(PageDimensionsJs {
            page: page.page_num,
            width: page.width,
            height: page.height,
            surface_width: surface.width,
            surface_height: surface.height,
            scale: session.scale(),
        })
    }

    pub(crate) fn render_overlay_internal(&mut self) -> Result<Vec<u8>, String> {
        let session = self.session.as_mut().ok_or("No document loaded")?;
        session
            .render_overlay()
            .map(|image| image.into_raw())
            .map_err(|e| e.to_string())
    }

    pub(crate) fn finish_render_internal(&mut self, handle: &RenderHandle) -> Result<Option<Vec<u8>>, String> {
        let session = self.session.as_mut().ok_or("No document loaded")?;
        session
            .finish_render(handle.ticket)
            .map(|overlay| overlay.map(|image| image.into_raw()))
            .map_err(|e| e.to_string())
    }

    pub(crate) fn export_internal(&mut self) -> Result<Vec<u8>, String> {
        let session = self.session.as_mut().ok_or("No document loaded")?;
        let exported = session.export().map_err(|e| e.to_string())?;
        report_skipped(exported.skipped.len());
        Ok(exported.bytes)
    }
}

fn no_document() -> JsValue {
    JsValue::from_str("No document loaded")
}

fn report_skipped(count: usize) {
    #[cfg(target_arch = "wasm32")]
    if count > 0 {
        web_sys::console::warn_1(&format!("{} stamp(s) could not be exported", count).into());
    }
    #[cfg(not(target_arch = "wasm32"))]
    let _ = count;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use lopdf::{dictionary, Dictionary, Document, Object, Stream};
    use pretty_assertions::assert_eq;
    use stamp_core::{ImageFormat, ImagePayload};
    use std::io::Cursor;

    fn create_test_pdf(num_pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for i in 0..num_pages {
            let content = format!("BT /F1 12 Tf 100 700 Td (Page {}) Tj ET", i + 1);
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => num_pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn png() -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 200, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn editor() -> StampEditor {
        let mut loader = CatalogLoader::new();
        loader.add_internal(
            "approved",
            "Approved",
            150.0,
            ImagePayload::new(png(), ImageFormat::Png),
            false,
        );
        StampEditor::new_internal(loader, Some(1.0)).unwrap()
    }

    #[test]
    fn test_new_editor_has_no_document() {
        let mut editor = editor();
        assert!(!editor.is_loaded());
        assert_eq!(editor.page_count(), 0);
        assert!(!editor.undo());
        assert!(editor.export_internal().is_err());
    }

    #[test]
    fn test_rejects_invalid_scale() {
        assert!(StampEditor::new_internal(CatalogLoader::new(), Some(0.0)).is_err());
    }

    #[test]
    fn test_failed_load_leaves_editor_unloaded() {
        let mut editor = editor();
        editor.load_document_internal("a.pdf", &create_test_pdf(2)).unwrap();
        assert!(editor.load_document_internal("b.pdf", b"garbage").is_err());
        assert!(!editor.is_loaded());
    }

    #[test]
    fn test_place_and_export() {
        let mut editor = editor();
        assert_eq!(editor.load_document_internal("lease.pdf", &create_test_pdf(2)).unwrap(), 2);
        assert_eq!(editor.selected_stamp(), Some("approved".to_string()));

        assert!(editor.next_page());
        editor.session.as_mut().unwrap().place_at(Point::new(100.0, 100.0)).unwrap();
        assert!(editor.can_undo());

        let bytes = editor.export_internal().unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        assert_eq!(editor.export_file_name(), Some("stamped_lease.pdf".to_string()));
    }

    #[test]
    fn test_overlay_matches_canvas_size() {
        let mut editor = editor();
        editor.load_document_internal("a.pdf", &create_test_pdf(1)).unwrap();
        let dims = editor.page_dimensions_internal().unwrap();
        assert_eq!((dims.surface_width, dims.surface_height), (612, 792));

        let overlay = editor.render_overlay_internal().unwrap();
        assert_eq!(overlay.len(), 612 * 792 * 4);
    }

    #[test]
    fn test_superseded_render_returns_nothing() {
        let mut editor = editor();
        editor.load_document_internal("a.pdf", &create_test_pdf(2)).unwrap();
        let first = editor.session.as_mut().unwrap().begin_render();
        let second = editor.session.as_mut().unwrap().begin_render();

        let stale = editor
            .finish_render_internal(&RenderHandle { ticket: first })
            .unwrap();
        assert!(stale.is_none());
        let fresh = editor
            .finish_render_internal(&RenderHandle { ticket: second })
            .unwrap();
        assert!(fresh.is_some());
    }

    #[test]
    fn test_keyboard_shortcuts() {
        let mut editor = editor();
        editor.load_document_internal("a.pdf", &create_test_pdf(1)).unwrap();
        editor.session.as_mut().unwrap().place_at(Point::new(5.0, 5.0)).unwrap();

        assert!(editor.handle_key("z", false, true, false));
        assert!(!editor.can_undo());
        assert!(editor.handle_key("Z", true, false, true));
        assert!(editor.can_undo());
        assert!(!editor.handle_key("z", false, false, false));
    }
}
