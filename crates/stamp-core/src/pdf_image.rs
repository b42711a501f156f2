//! Conversion of stamp images into PDF image XObjects
//!
//! PNG stamps are decoded and re-encoded as Flate-compressed RGB samples with
//! a separate DeviceGray soft mask for transparency. Grayscale and RGB JPEG
//! stamps are validated and embedded as-is with `DCTDecode`, so no
//! recompression loss is introduced; other JPEGs (CMYK) take the PNG path.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, RgbaImage};
use lopdf::{dictionary, Document, ObjectId, Stream};

use crate::catalog::{ImageFormat, ImagePayload};

/// Decode a payload according to its declared format.
pub fn decode(payload: &ImagePayload) -> Result<DynamicImage, String> {
    let format = match payload.format() {
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
    };
    image::load_from_memory_with_format(payload.bytes(), format)
        .map_err(|e| format!("Failed to decode {}: {}", payload.format().mime(), e))
}

/// Add the payload to `doc` as an image XObject and return its id.
pub fn embed(doc: &mut Document, payload: &ImagePayload) -> Result<ObjectId, String> {
    let decoded = decode(payload)?;

    if payload.format() == ImageFormat::Jpeg {
        if let Some(color_space) = dct_color_space(payload.bytes()) {
            let (width, height) = (decoded.width(), decoded.height());
            let stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                payload.bytes().to_vec(),
            );
            return Ok(doc.add_object(stream));
        }
    }

    embed_rgba(doc, &decoded.to_rgba8())
}

/// Color space for JPEGs whose samples PDF can consume unchanged: 8-bit
/// grayscale or 3-component. CMYK and anything else is re-encoded.
fn dct_color_space(jpeg: &[u8]) -> Option<&'static str> {
    match jpeg_frame(jpeg)? {
        JpegFrame { precision: 8, components: 1 } => Some("DeviceGray"),
        JpegFrame { precision: 8, components: 3 } => Some("DeviceRGB"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegFrame {
    precision: u8,
    components: u8,
}

/// Read the start-of-frame header of a JPEG.
fn jpeg_frame(bytes: &[u8]) -> Option<JpegFrame> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        match marker {
            // Fill byte
            0xFF => {
                i += 1;
                continue;
            }
            // Markers without a length field
            0x01 | 0xD0..=0xD7 => {
                i += 2;
                continue;
            }
            // End of image or start of scan before any frame header
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let length = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            // length(2) precision(1) height(2) width(2) components(1)
            return Some(JpegFrame {
                precision: *bytes.get(i + 4)?,
                components: *bytes.get(i + 9)?,
            });
        }
        i += 2 + length;
    }
    None
}

fn embed_rgba(doc: &mut Document, rgba: &RgbaImage) -> Result<ObjectId, String> {
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err("Image has no pixels".to_string());
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    // Fully opaque images need no soft mask
    if alpha.iter().any(|&a| a != u8::MAX) {
        let smask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        );
        let smask_id = doc.add_object(smask);
        image_dict.set("SMask", smask_id);
    }

    let image = Stream::new(image_dict, deflate(&rgb)?);
    Ok(doc.add_object(image))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| format!("Compression failed: {}", e))?;
    encoder
        .finish()
        .map_err(|e| format!("Compression failed: {}", e))
}
