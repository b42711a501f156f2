use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StampError {
    /// The uploaded document could not be opened. The session stays unloaded.
    #[error("Failed to load PDF: {0}")]
    DocumentLoad(String),

    #[error("Failed to render page {page}: {reason}")]
    PageRender { page: u32, reason: String },

    /// Export-time re-parse of the source bytes failed.
    #[error("Failed to parse source PDF for export: {0}")]
    SourceParse(String),

    #[error("Failed to embed stamp #{index}: {reason}")]
    AnnotationEmbed { index: usize, reason: String },

    #[error("No stamps to export")]
    NothingToExport,

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    InvalidPage { page: u32, page_count: u32 },

    #[error("No stamp found at index {0}")]
    InvalidAnnotation(usize),

    #[error("Invalid stamp placement: {0}")]
    InvalidPlacement(String),

    #[error("Unknown stamp: {0}")]
    UnknownStamp(String),

    #[error("Stamp catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export was cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StampError {
    /// Errors after which the session has no usable document.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, StampError::DocumentLoad(_))
    }

    /// Errors that only affect one page or one stamp; the surrounding
    /// render or export carries on without the failed piece.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            StampError::PageRender { .. } | StampError::AnnotationEmbed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StampError>;
