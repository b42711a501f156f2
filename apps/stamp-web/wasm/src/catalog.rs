//! Stamp catalog construction from JavaScript
//!
//! The page loads the preloaded stamp images (and any image the user picks)
//! as data URLs, hands them to a `CatalogLoader`, and then passes the
//! loader to `StampEditor`, which freezes it.

use stamp_core::{CatalogBuilder, ImageFormat, ImagePayload, StampCatalog};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
#[derive(Debug, Default)]
pub struct CatalogLoader {
    builder: CatalogBuilder,
}

#[wasm_bindgen]
impl CatalogLoader {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stamps added so far
    #[wasm_bindgen(getter)]
    pub fn count(&self) -> usize {
        self.builder.len()
    }

    /// Add a preloaded stamp from a `data:image/...;base64,` URL
    #[wasm_bindgen(js_name = addBuiltin)]
    pub fn add_builtin(
        &mut self,
        id: &str,
        label: &str,
        size: f64,
        data_url: &str,
    ) -> Result<(), JsValue> {
        let payload = ImagePayload::from_data_url(data_url)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.add_internal(id, label, size, payload, false);
        Ok(())
    }

    /// Add a user-supplied stamp from a `data:image/...;base64,` URL
    #[wasm_bindgen(js_name = addCustom)]
    pub fn add_custom(
        &mut self,
        id: &str,
        label: &str,
        size: f64,
        data_url: &str,
    ) -> Result<(), JsValue> {
        let payload = ImagePayload::from_data_url(data_url)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.add_internal(id, label, size, payload, true);
        Ok(())
    }

    /// Add a user-supplied stamp from raw file bytes (e.g. a file input)
    #[wasm_bindgen(js_name = addCustomBytes)]
    pub fn add_custom_bytes(&mut self, id: &str, label: &str, size: f64, bytes: &[u8], mime: &str) {
        let payload = ImagePayload::new(bytes.to_vec(), ImageFormat::from_mime(mime));
        self.add_internal(id, label, size, payload, true);
    }
}

impl CatalogLoader {
    pub(crate) fn add_internal(
        &mut self,
        id: &str,
        label: &str,
        size: f64,
        payload: ImagePayload,
        custom: bool,
    ) {
        let builder = std::mem::take(&mut self.builder);
        self.builder = if custom {
            builder.custom(id, label, size, payload)
        } else {
            builder.builtin(id, label, size, payload)
        };
    }

    pub(crate) fn build(self) -> Result<StampCatalog, String> {
        self.builder.build().map_err(|e| e.to_string())
    }
}
