//! PDF stamp overlay and export
//!
//! This crate owns the state behind a stamp tool: a read-only catalog of
//! stamp images, the stamps placed on each page, snapshot-based undo/redo,
//! the mapping between display pixels and PDF points, the overlay raster
//! shown on top of a rendered page, and the export that bakes the stamps
//! into a copy of the document using lopdf.
//!
//! Page content itself is rasterized by the host (PDF.js in the browser)
//! through the [`PageRasterizer`] trait.

pub mod annotations;
pub mod catalog;
pub mod config;
pub mod coords;
pub mod document;
pub mod error;
pub mod export;
pub mod history;
pub mod pdf_image;
pub mod render;
pub mod session;

pub use annotations::{Annotation, AnnotationStore, AnnotationView, Snapshot};
pub use catalog::{
    AnnotationKind, CatalogBuilder, ImageFormat, ImagePayload, KindOrigin, KindSummary,
    StampCatalog, DEFAULT_STAMP_SIZE,
};
pub use config::{PlacementEntry, StampConfig, StampEntry, ViewerSettings};
pub use coords::{PdfRect, Point};
pub use document::{export_file_name, LoadedDocument, PageGeometry, SurfaceSize};
pub use error::{Result, StampError};
pub use export::{export_stamped, CancelToken, ExportOutcome, SkipReason, SkippedAnnotation};
pub use history::History;
pub use render::{
    OverlayRenderer, PageRasterizer, PaperRasterizer, RenderScheduler, RenderTicket,
    RenderedPage, PREVIEW_OPACITY,
};
pub use session::{
    ExportJob, ExportedDocument, ListenerId, SessionEvent, Shortcut, StampSession,
};
