//! Stamp catalog
//!
//! The catalog is built once (from the preloaded stamp images plus any
//! user-supplied ones) and is read-only afterwards. Sessions hold it behind
//! an `Arc` and placed annotations keep their own handle to the kind they
//! were created from.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::config::StampConfig;
use crate::error::{Result, StampError};

/// Default on-screen side length of a catalog stamp, in display pixels.
pub const DEFAULT_STAMP_SIZE: f64 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Map a MIME type to a format. Unknown types fall back to PNG.
    pub fn from_mime(mime: &str) -> Self {
        match mime.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => ImageFormat::Jpeg,
            _ => ImageFormat::Png,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Raw image bytes plus the format they claim to be in.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    bytes: Arc<[u8]>,
    format: ImageFormat,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Vec<u8>>, format: ImageFormat) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            format,
        }
    }

    /// Parse a `data:<mime>;base64,<data>` URL, as produced by a browser
    /// `FileReader.readAsDataURL`.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| StampError::Catalog("Image is not a data URL".to_string()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| StampError::Catalog("Data URL has no payload".to_string()))?;

        let mut parts = header.split(';');
        let mime = parts.next().unwrap_or_default();
        if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(StampError::Catalog(
                "Only base64 data URLs are supported".to_string(),
            ));
        }

        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| StampError::Catalog(format!("Invalid base64 image data: {}", e)))?;

        Ok(Self::new(bytes, ImageFormat::from_mime(mime)))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindOrigin {
    /// Shipped with the application and preloaded at startup
    Builtin,
    /// Supplied by the user for this session
    Custom,
}

/// A reusable stamp template.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationKind {
    pub id: String,
    pub label: String,
    pub default_size: f64,
    pub image: ImagePayload,
    pub origin: KindOrigin,
}

impl AnnotationKind {
    pub fn is_builtin(&self) -> bool {
        self.origin == KindOrigin::Builtin
    }
}

/// Lightweight description of a catalog entry for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    pub id: String,
    pub label: String,
    pub default_size: f64,
    pub format: ImageFormat,
    pub builtin: bool,
}

impl From<&AnnotationKind> for KindSummary {
    fn from(kind: &AnnotationKind) -> Self {
        Self {
            id: kind.id.clone(),
            label: kind.label.clone(),
            default_size: kind.default_size,
            format: kind.image.format(),
            builtin: kind.is_builtin(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StampCatalog {
    kinds: Vec<Arc<AnnotationKind>>,
}

impl StampCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Load every `[[stamps]]` entry of the config, reading image files
    /// relative to `base_dir`.
    pub fn from_config(config: &StampConfig, base_dir: &Path) -> Result<Self> {
        let mut builder = CatalogBuilder::default();
        for entry in &config.stamps {
            let path = base_dir.join(&entry.file);
            let bytes = std::fs::read(&path).map_err(|e| {
                StampError::Catalog(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let format = entry
                .format
                .or_else(|| ImageFormat::from_extension(&path))
                .unwrap_or(ImageFormat::Png);
            builder = builder.builtin(
                &entry.id,
                &entry.label,
                entry.size,
                ImagePayload::new(bytes, format),
            );
        }
        builder.build()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AnnotationKind>> {
        self.kinds.iter().find(|k| k.id == id)
    }

    pub fn first(&self) -> Option<&Arc<AnnotationKind>> {
        self.kinds.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AnnotationKind>> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn summaries(&self) -> Vec<KindSummary> {
        self.kinds.iter().map(|k| KindSummary::from(k.as_ref())).collect()
    }
}

/// Collects catalog entries before the catalog is frozen.
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    kinds: Vec<AnnotationKind>,
}

impl CatalogBuilder {
    pub fn builtin(self, id: &str, label: &str, size: f64, image: ImagePayload) -> Self {
        self.push(id, label, size, image, KindOrigin::Builtin)
    }

    pub fn custom(self, id: &str, label: &str, size: f64, image: ImagePayload) -> Self {
        self.push(id, label, size, image, KindOrigin::Custom)
    }

    fn push(
        mut self,
        id: &str,
        label: &str,
        size: f64,
        image: ImagePayload,
        origin: KindOrigin,
    ) -> Self {
        self.kinds.push(AnnotationKind {
            id: id.to_string(),
            label: label.to_string(),
            default_size: size,
            image,
            origin,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn build(self) -> Result<StampCatalog> {
        let mut seen = HashSet::new();
        for kind in &self.kinds {
            if kind.id.trim().is_empty() {
                return Err(StampError::Catalog("Stamp id must not be empty".to_string()));
            }
            if !seen.insert(kind.id.as_str()) {
                return Err(StampError::Catalog(format!(
                    "Duplicate stamp id: {}",
                    kind.id
                )));
            }
            if !(kind.default_size.is_finite() && kind.default_size > 0.0) {
                return Err(StampError::Catalog(format!(
                    "Stamp {} has invalid size {}",
                    kind.id, kind.default_size
                )));
            }
        }

        Ok(StampCatalog {
            kinds: self.kinds.into_iter().map(Arc::new).collect(),
        })
    }
}
