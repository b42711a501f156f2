//! Bake placed stamps into a copy of the source PDF
//!
//! Each stamp becomes an image XObject painted by a content stream appended
//! to its page. The page's original content is wrapped in `q`/`Q` first so
//! a graphics state it leaves behind cannot shift the stamps. Pages without
//! stamps are not touched.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::annotations::Annotation;
use crate::coords::PdfRect;
use crate::document::page_geometry_or_default;
use crate::error::{Result, StampError};
use crate::pdf_image;

/// Prefix of the resource names given to stamp images.
const XOBJECT_PREFIX: &str = "StampIm";

/// Cooperative cancellation flag shared between a session and its exports.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn downgrade(&self) -> WeakCancelToken {
        WeakCancelToken(Arc::downgrade(&self.0))
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StampError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Handle that does not keep a finished export's token alive.
#[derive(Debug, Clone)]
pub(crate) struct WeakCancelToken(Weak<AtomicBool>);

impl WeakCancelToken {
    /// The token, while some job still holds it and it was not cancelled.
    pub(crate) fn pending(&self) -> Option<CancelToken> {
        self.0
            .upgrade()
            .map(CancelToken)
            .filter(|token| !token.is_cancelled())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The stamp's page does not exist in the source document
    MissingPage,
    /// The image could not be embedded
    EmbedFailed(String),
    /// Position or size is not a finite, positive number
    InvalidGeometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAnnotation {
    /// Index in store (placement) order
    pub index: usize,
    pub page: u32,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub bytes: Vec<u8>,
    pub stamped: usize,
    pub skipped: Vec<SkippedAnnotation>,
}

/// Write every stamp into a new copy of `source`.
///
/// `annotations` is the whole store in placement order; `scale` is the
/// display scale the positions were recorded at.
pub fn export_stamped(
    source: &[u8],
    annotations: &[Annotation],
    scale: f64,
    cancel: &CancelToken,
) -> Result<ExportOutcome> {
    if annotations.is_empty() {
        return Err(StampError::NothingToExport);
    }
    cancel.check()?;

    let mut doc =
        Document::load_mem(source).map_err(|e| StampError::SourceParse(e.to_string()))?;
    let pages: BTreeMap<u32, ObjectId> = doc.get_pages();

    let mut by_page: BTreeMap<u32, Vec<(usize, &Annotation)>> = BTreeMap::new();
    let mut skipped = Vec::new();
    for (index, annotation) in annotations.iter().enumerate() {
        if pages.contains_key(&annotation.page) {
            by_page.entry(annotation.page).or_default().push((index, annotation));
        } else {
            tracing::debug!(index, page = annotation.page, "stamp page not in document");
            skipped.push(SkippedAnnotation {
                index,
                page: annotation.page,
                reason: SkipReason::MissingPage,
            });
        }
    }

    let mut images = ImageCache::default();
    let mut stamped = 0;
    for (page_num, stamps) in &by_page {
        cancel.check()?;
        let page_id = pages[page_num];
        stamped += stamp_page(&mut doc, *page_num, page_id, stamps, scale, &mut images, &mut skipped)?;
    }

    cancel.check()?;
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| StampError::Serialization(e.to_string()))?;

    skipped.sort_by_key(|s| s.index);
    tracing::info!(stamped, skipped = skipped.len(), bytes = output.len(), "export finished");

    Ok(ExportOutcome {
        bytes: output,
        stamped,
        skipped,
    })
}

/// Image XObjects already added to the output, keyed by stamp kind.
#[derive(Default)]
struct ImageCache {
    embedded: HashMap<String, ObjectId>,
}

impl ImageCache {
    fn get_or_embed(&mut self, doc: &mut Document, annotation: &Annotation) -> std::result::Result<ObjectId, String> {
        if let Some(id) = self.embedded.get(&annotation.kind.id) {
            return Ok(*id);
        }
        let id = pdf_image::embed(doc, &annotation.kind.image)?;
        self.embedded.insert(annotation.kind.id.clone(), id);
        Ok(id)
    }
}

fn stamp_page(
    doc: &mut Document,
    page_num: u32,
    page_id: ObjectId,
    stamps: &[(usize, &Annotation)],
    scale: f64,
    images: &mut ImageCache,
    skipped: &mut Vec<SkippedAnnotation>,
) -> Result<usize> {
    let geometry = page_geometry_or_default(doc, page_num, page_id);

    let mut resources = resolve_resources(doc, page_id)?;
    let mut xobjects = resolve_xobjects(doc, &resources)?;

    let mut content = String::new();
    let mut placed = 0;
    for (index, annotation) in stamps {
        let rect = geometry.stamp_rect(annotation.position, annotation.size, scale);
        if !rect.is_drawable() {
            tracing::warn!(index = *index, page = page_num, ?rect, "stamp has invalid geometry");
            skipped.push(SkippedAnnotation {
                index: *index,
                page: page_num,
                reason: SkipReason::InvalidGeometry,
            });
            continue;
        }

        let image_id = match images.get_or_embed(doc, annotation) {
            Ok(id) => id,
            Err(reason) => {
                let err = StampError::AnnotationEmbed {
                    index: *index,
                    reason: reason.clone(),
                };
                tracing::warn!(page = page_num, kind = %annotation.kind.id, "{}", err);
                skipped.push(SkippedAnnotation {
                    index: *index,
                    page: page_num,
                    reason: SkipReason::EmbedFailed(reason),
                });
                continue;
            }
        };

        let name = unused_name(&xobjects, image_id);
        xobjects.set(name.as_str(), Object::Reference(image_id));
        content.push_str(&draw_image_ops(&name, &rect));
        placed += 1;
    }

    if placed == 0 {
        return Ok(0);
    }

    resources.set("XObject", Object::Dictionary(xobjects));
    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| StampError::SourceParse(format!("Page {} is not a dictionary: {}", page_num, e)))?;
    page.set("Resources", Object::Dictionary(resources));

    wrap_page_content(doc, page_id, content)?;
    tracing::debug!(page = page_num, placed, "stamped page");
    Ok(placed)
}

/// `q w 0 0 h x y cm /Name Do Q` paints the unit-square image into `rect`.
fn draw_image_ops(name: &str, rect: &PdfRect) -> String {
    format!(
        "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
        fmt_num(rect.width),
        fmt_num(rect.height),
        fmt_num(rect.x),
        fmt_num(rect.y),
        name
    )
}

fn fmt_num(v: f64) -> String {
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Pick a resource name not yet used in the page's XObject dictionary.
/// Stamps of the same kind reuse the name already pointing at their image.
fn unused_name(xobjects: &Dictionary, image_id: ObjectId) -> String {
    for (key, value) in xobjects.iter() {
        if let Object::Reference(id) = value {
            if *id == image_id && key.starts_with(XOBJECT_PREFIX.as_bytes()) {
                return String::from_utf8_lossy(key).into_owned();
            }
        }
    }
    let mut n = 1;
    loop {
        let name = format!("{}{}", XOBJECT_PREFIX, n);
        if !xobjects.has(name.as_bytes()) {
            return name;
        }
        n += 1;
    }
}

/// The page's effective resources as an owned dictionary.
///
/// Resources may live inline, behind a reference shared with other pages,
/// or on an ancestor in the page tree. A copy is returned in every case and
/// later written inline on this page, so other pages keep theirs untouched.
fn resolve_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut current = page_id;
    for _ in 0..16 {
        let dict = doc
            .get_object(current)
            .and_then(Object::as_dict)
            .map_err(|e| StampError::SourceParse(e.to_string()))?;
        if let Ok(resources) = dict.get(b"Resources") {
            return match resources {
                Object::Dictionary(d) => Ok(d.clone()),
                Object::Reference(id) => doc
                    .get_object(*id)
                    .and_then(Object::as_dict)
                    .cloned()
                    .map_err(|e| StampError::SourceParse(format!("Bad /Resources: {}", e))),
                _ => Err(StampError::SourceParse("Bad /Resources entry".to_string())),
            };
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => break,
        }
    }
    Ok(Dictionary::new())
}

fn resolve_xobjects(doc: &Document, resources: &Dictionary) -> Result<Dictionary> {
    match resources.get(b"XObject") {
        Ok(Object::Dictionary(d)) => Ok(d.clone()),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_dict)
            .cloned()
            .map_err(|e| StampError::SourceParse(format!("Bad /XObject: {}", e))),
        Ok(_) => Err(StampError::SourceParse("Bad /XObject entry".to_string())),
        Err(_) => Ok(Dictionary::new()),
    }
}

/// Save the graphics state before the original content, restore it after,
/// then append the stamp content.
fn wrap_page_content(doc: &mut Document, page_id: ObjectId, stamps: String) -> Result<()> {
    let existing = {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| StampError::SourceParse(e.to_string()))?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                // An indirect array of content streams
                Ok(Object::Array(arr)) => arr.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        }
    };

    let mut contents = Vec::with_capacity(existing.len() + 3);
    if !existing.is_empty() {
        let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        contents.push(Object::Reference(save_id));
        contents.extend(existing);
        contents.push(Object::Reference(restore_id));
    }
    let stamps_id = doc.add_object(Stream::new(Dictionary::new(), stamps.into_bytes()));
    contents.push(Object::Reference(stamps_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| StampError::SourceParse(e.to_string()))?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}
