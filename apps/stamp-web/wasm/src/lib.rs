//! WASM bindings for the stamp tool
//!
//! All stamp state lives in Rust. JavaScript renders page content with
//! PDF.js, forwards pointer and keyboard events, and paints the RGBA
//! overlay this crate produces on top of the page canvas.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { CatalogLoader, StampEditor } from './pkg/stamp_wasm.js';
//!
//! await init();
//!
//! const catalog = new CatalogLoader();
//! catalog.addBuiltin("approved", "Approved", 150, approvedDataUrl);
//! const editor = new StampEditor(catalog, 1.5);
//! editor.setChangeCallback((event) => redraw(event));
//! editor.loadDocument("lease.pdf", bytes);
//!
//! canvas.onclick = (e) => editor.placeAt(e.offsetX, e.offsetY);
//! const pdf = await editor.exportAsync();
//! if (pdf) downloadBlob(pdf, editor.exportFileName());
//! ```

pub mod catalog;
pub mod editor;

use wasm_bindgen::prelude::*;

pub use catalog::CatalogLoader;
pub use editor::{RenderHandle, StampEditor};

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
