//! Page and overlay rendering
//!
//! Rendering uses a hybrid approach: the page content itself is rasterized
//! by a [`PageRasterizer`] (PDF.js on the web, a plain paper backdrop
//! elsewhere), while the stamp overlay is composited here so the live view
//! and the export agree on paint order.

use std::collections::HashMap;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::annotations::Annotation;
use crate::catalog::AnnotationKind;
use crate::coords::Point;
use crate::document::{LoadedDocument, PageGeometry};
use crate::error::{Result, StampError};
use crate::pdf_image;

/// Opacity of the cursor preview stamp.
pub const PREVIEW_OPACITY: f32 = 0.5;

/// Produces the base raster of a page at a display scale.
pub trait PageRasterizer {
    fn rasterize(&self, document: &LoadedDocument, page: &PageGeometry, scale: f64)
        -> Result<RgbaImage>;
}

/// Rasterizer that paints an empty sheet of the right size.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperRasterizer;

impl PageRasterizer for PaperRasterizer {
    fn rasterize(
        &self,
        _document: &LoadedDocument,
        page: &PageGeometry,
        scale: f64,
    ) -> Result<RgbaImage> {
        let size = page.surface_size(scale);
        Ok(RgbaImage::from_pixel(
            size.width,
            size.height,
            Rgba([255, 255, 255, 255]),
        ))
    }
}

/// A stamp following the pointer before it is placed.
#[derive(Debug, Clone)]
pub struct Preview<'a> {
    pub kind: &'a AnnotationKind,
    pub position: Point,
    pub size: f64,
}

/// A rendered page: base raster plus the stamp overlay on top.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page: u32,
    pub base: RgbaImage,
    pub overlay: RgbaImage,
}

impl RenderedPage {
    /// Base and overlay flattened into one image.
    pub fn composite(&self) -> RgbaImage {
        let mut out = self.base.clone();
        imageops::overlay(&mut out, &self.overlay, 0, 0);
        out
    }
}

/// Draws stamps onto transparent overlay surfaces.
///
/// Decoded stamp images are cached per kind id; the cache never outlives the
/// catalog it was filled from because it is owned by a session.
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    decoded: HashMap<String, RgbaImage>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redraw the whole overlay for a page from scratch.
    ///
    /// Stamps are painted in the given order, then the preview (if any) at
    /// reduced opacity. A stamp whose image fails to decode is skipped.
    pub fn render(
        &mut self,
        page: &PageGeometry,
        scale: f64,
        annotations: &[&Annotation],
        preview: Option<&Preview<'_>>,
    ) -> RgbaImage {
        let size = page.surface_size(scale);
        let mut surface = RgbaImage::new(size.width, size.height);

        for annotation in annotations {
            if let Err(reason) =
                self.draw(&mut surface, &annotation.kind, annotation.position, annotation.size, 1.0)
            {
                tracing::warn!(
                    page = page.page_num,
                    kind = %annotation.kind.id,
                    %reason,
                    "skipping stamp in overlay"
                );
            }
        }

        if let Some(preview) = preview {
            if let Err(reason) = self.draw(
                &mut surface,
                preview.kind,
                preview.position,
                preview.size,
                PREVIEW_OPACITY,
            ) {
                tracing::debug!(kind = %preview.kind.id, %reason, "preview not drawn");
            }
        }

        surface
    }

    fn draw(
        &mut self,
        surface: &mut RgbaImage,
        kind: &AnnotationKind,
        center: Point,
        size: f64,
        opacity: f32,
    ) -> std::result::Result<(), String> {
        let side = size.round();
        if side.is_nan() || side < 1.0 {
            return Err(format!("invalid stamp size {}", size));
        }
        let side = side as u32;

        let source = self.decoded_image(kind)?;
        let mut stamp = imageops::resize(source, side, side, FilterType::Triangle);
        if opacity < 1.0 {
            for pixel in stamp.pixels_mut() {
                pixel.0[3] = (pixel.0[3] as f32 * opacity).round() as u8;
            }
        }

        let left = (center.x - size / 2.0).round() as i64;
        let top = (center.y - size / 2.0).round() as i64;
        imageops::overlay(surface, &stamp, left, top);
        Ok(())
    }

    fn decoded_image(&mut self, kind: &AnnotationKind) -> std::result::Result<&RgbaImage, String> {
        if !self.decoded.contains_key(&kind.id) {
            let rgba = pdf_image::decode(&kind.image)?.to_rgba8();
            self.decoded.insert(kind.id.clone(), rgba);
        }
        self.decoded
            .get(&kind.id)
            .ok_or_else(|| format!("stamp {} not cached", kind.id))
    }
}

/// Render one page: base raster from `rasterizer`, overlay from the stamps.
///
/// The result depends only on the document, page, scale and the stamps
/// passed in, so re-rendering with an unchanged store is idempotent.
pub fn render_page(
    document: &LoadedDocument,
    page: u32,
    scale: f64,
    rasterizer: &dyn PageRasterizer,
    overlay: &mut OverlayRenderer,
    annotations: &[&Annotation],
    preview: Option<&Preview<'_>>,
) -> Result<RenderedPage> {
    let geometry = document.page(page).map_err(|e| StampError::PageRender {
        page,
        reason: e.to_string(),
    })?;

    let base = rasterizer
        .rasterize(document, geometry, scale)
        .map_err(|e| match e {
            StampError::PageRender { .. } => e,
            other => StampError::PageRender {
                page,
                reason: other.to_string(),
            },
        })?;

    let overlay = overlay.render(geometry, scale, annotations, preview);

    Ok(RenderedPage {
        page,
        base,
        overlay,
    })
}

/// Token for an in-flight render of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket {
    pub page: u32,
    pub generation: u64,
}

/// Serializes page renders within a session.
///
/// Every request supersedes the previous one. A host that renders
/// asynchronously asks for a ticket before starting and checks it before
/// presenting, so a render that finishes after the user moved on is dropped
/// instead of overwriting the newer page.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    generation: u64,
    pending: Option<RenderTicket>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, page: u32) -> RenderTicket {
        self.generation += 1;
        let ticket = RenderTicket {
            page,
            generation: self.generation,
        };
        if let Some(previous) = self.pending.replace(ticket) {
            tracing::debug!(
                superseded = previous.generation,
                page = previous.page,
                "render request superseded"
            );
        }
        ticket
    }

    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        self.pending.as_ref() == Some(ticket)
    }

    /// Mark a render as finished. Returns false if the ticket was superseded
    /// and its output should be discarded.
    pub fn complete(&mut self, ticket: &RenderTicket) -> bool {
        if self.is_current(ticket) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn pending(&self) -> Option<RenderTicket> {
        self.pending
    }

    /// Drop any pending render, e.g. when the session closes.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
