//! Coordinate transformation between display and PDF coordinate systems
//!
//! Display space is the rendered canvas: top-left origin, y grows downward,
//! units are canvas pixels at the session's display scale.
//! PDF space is the page's user space: bottom-left origin, y grows upward,
//! units are points and do not depend on the display scale.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in PDF space, anchored at its bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    /// Finite coordinates and a positive size.
    pub fn is_drawable(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Convert a display point to PDF coordinates (flip Y axis, undo scale)
pub fn to_native(point: Point, page_height: f64, scale: f64) -> Point {
    Point {
        x: point.x / scale,
        y: page_height - point.y / scale,
    }
}

/// Convert a PDF point back to display coordinates
pub fn to_display(point: Point, page_height: f64, scale: f64) -> Point {
    Point {
        x: point.x * scale,
        y: (page_height - point.y) * scale,
    }
}

pub fn size_to_native(display_size: f64, scale: f64) -> f64 {
    display_size / scale
}

pub fn size_to_display(native_size: f64, scale: f64) -> f64 {
    native_size * scale
}

/// Rectangle a stamp occupies in PDF space.
///
/// `center` is the stamp's display-space position; the stamp is square with
/// side `display_size`. The returned rectangle starts half a (native) side
/// left of and below the mapped center.
pub fn stamp_rect(center: Point, display_size: f64, page_height: f64, scale: f64) -> PdfRect {
    let native_center = to_native(center, page_height, scale);
    let side = size_to_native(display_size, scale);
    PdfRect {
        x: native_center.x - side / 2.0,
        y: native_center.y - side / 2.0,
        width: side,
        height: side,
    }
}
