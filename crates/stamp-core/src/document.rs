//! Loaded source documents and page geometry

use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use crate::coords::{self, PdfRect, Point};
use crate::error::{Result, StampError};

/// Parent chain depth limit when looking up inherited page attributes.
const MAX_INHERITANCE_DEPTH: usize = 16;

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Page box in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Page number (1-indexed)
    pub page_num: u32,
    /// Lower-left corner of the MediaBox (usually 0, 0)
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Raster dimensions of a page at a display scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl PageGeometry {
    /// Canvas size for this page at `scale`, truncated like a canvas
    /// dimension assignment.
    pub fn surface_size(&self, scale: f64) -> SurfaceSize {
        SurfaceSize {
            width: ((self.width * scale).floor() as u32).max(1),
            height: ((self.height * scale).floor() as u32).max(1),
        }
    }

    /// PDF-space rectangle of a stamp centered at a display point. The
    /// MediaBox origin offset is added so the rectangle lands in page user
    /// space.
    pub fn stamp_rect(&self, center: Point, display_size: f64, scale: f64) -> PdfRect {
        let rect = coords::stamp_rect(center, display_size, self.height, scale);
        PdfRect {
            x: rect.x + self.x,
            y: rect.y + self.y,
            ..rect
        }
    }
}

/// A parsed source document plus the bytes it came from.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    name: String,
    bytes: Arc<[u8]>,
    pages: Vec<PageGeometry>,
}

impl LoadedDocument {
    pub fn load(name: &str, bytes: &[u8]) -> Result<Self> {
        if !bytes.starts_with(b"%PDF-") {
            return Err(StampError::DocumentLoad("Not a PDF file".to_string()));
        }

        let doc = Document::load_mem(bytes).map_err(|e| StampError::DocumentLoad(e.to_string()))?;
        let page_ids = doc.get_pages();
        if page_ids.is_empty() {
            return Err(StampError::DocumentLoad("PDF has no pages".to_string()));
        }

        let pages: Vec<PageGeometry> = page_ids
            .iter()
            .map(|(&page_num, &page_id)| page_geometry_or_default(&doc, page_num, page_id))
            .collect();

        tracing::debug!(name, pages = pages.len(), "loaded document");

        Ok(Self {
            name: name.to_string(),
            bytes: Arc::from(bytes),
            pages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page(&self, page_num: u32) -> Result<&PageGeometry> {
        page_num
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .ok_or(StampError::InvalidPage {
                page: page_num,
                page_count: self.page_count(),
            })
    }

    pub fn pages(&self) -> &[PageGeometry] {
        &self.pages
    }

    /// Suggested download name for the stamped copy.
    pub fn export_file_name(&self) -> String {
        export_file_name(&self.name)
    }
}

pub fn export_file_name(original: &str) -> String {
    format!("stamped_{}", original)
}

/// Like [`page_geometry`], but a malformed page box falls back to US Letter
/// so the failure stays confined to that page.
pub fn page_geometry_or_default(doc: &Document, page_num: u32, page_id: ObjectId) -> PageGeometry {
    page_geometry(doc, page_num, page_id).unwrap_or_else(|err| {
        tracing::warn!(page = page_num, "{}; using US Letter", err);
        let [x, y, width, height] = DEFAULT_MEDIA_BOX;
        PageGeometry {
            page_num,
            x,
            y,
            width,
            height,
        }
    })
}

/// Read the MediaBox of a page, following `/Parent` when it is inherited.
pub fn page_geometry(doc: &Document, page_num: u32, page_id: ObjectId) -> Result<PageGeometry> {
    let [x, y, width, height] = media_box(doc, page_id)
        .map_err(|reason| StampError::PageRender {
            page: page_num,
            reason,
        })?
        .unwrap_or(DEFAULT_MEDIA_BOX);

    Ok(PageGeometry {
        page_num,
        x,
        y,
        width,
        height,
    })
}

fn media_box(doc: &Document, page_id: ObjectId) -> std::result::Result<Option<[f64; 4]>, String> {
    let mut current = page_id;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        let dict = dictionary(doc, current)?;
        if let Ok(obj) = dict.get(b"MediaBox") {
            return parse_rect(doc, obj).map(Some);
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}

fn dictionary(doc: &Document, id: ObjectId) -> std::result::Result<&Dictionary, String> {
    doc.get_object(id)
        .map_err(|e| format!("Failed to get object {:?}: {}", id, e))?
        .as_dict()
        .map_err(|_| format!("Object {:?} is not a dictionary", id))
}

/// Parse a PDF rectangle array into [x, y, width, height]
fn parse_rect(doc: &Document, obj: &Object) -> std::result::Result<[f64; 4], String> {
    let arr = match obj {
        Object::Array(a) => a,
        Object::Reference(id) => doc
            .get_object(*id)
            .map_err(|e| format!("Failed to resolve reference: {}", e))?
            .as_array()
            .map_err(|_| "MediaBox reference is not an array".to_string())?,
        _ => return Err("MediaBox is not an array".to_string()),
    };

    if arr.len() != 4 {
        return Err(format!("MediaBox has {} elements, expected 4", arr.len()));
    }

    let mut values = [0.0f64; 4];
    for (i, obj) in arr.iter().enumerate() {
        values[i] = extract_number(doc, obj)?;
    }

    // Corners may be given in any order
    let (x1, x2) = (values[0].min(values[2]), values[0].max(values[2]));
    let (y1, y2) = (values[1].min(values[3]), values[1].max(values[3]));
    if x2 - x1 <= 0.0 || y2 - y1 <= 0.0 {
        return Err(format!("MediaBox {:?} is empty", values));
    }

    Ok([x1, y1, x2 - x1, y2 - y1])
}

fn extract_number(doc: &Document, obj: &Object) -> std::result::Result<f64, String> {
    match obj {
        Object::Integer(i) => Ok(*i as f64),
        Object::Real(r) => Ok(*r as f64),
        Object::Reference(id) => {
            let resolved = doc
                .get_object(*id)
                .map_err(|e| format!("Failed to resolve: {}", e))?;
            match resolved {
                Object::Integer(i) => Ok(*i as f64),
                Object::Real(r) => Ok(*r as f64),
                _ => Err("Expected number in rectangle".to_string()),
            }
        }
        _ => Err("Expected number in rectangle".to_string()),
    }
}
