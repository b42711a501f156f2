//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use stamp_core::{ImageFormat, ImagePayload, StampCatalog};

/// Build a PDF with one page per MediaBox. Pages inherit their font
/// resources from the page tree root.
pub fn create_pdf(media_boxes: &[[i64; 4]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for (i, media_box) in media_boxes.iter().enumerate() {
        let content_id = add_text_content(&mut doc, &format!("Page {}", i + 1));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => media_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    finish(doc, pages_id, kids, dictionary! { "Font" => dictionary! { "F1" => font_id } })
}

pub fn create_letter_pdf(pages: usize) -> Vec<u8> {
    create_pdf(&vec![[0, 0, 612, 792]; pages])
}

/// Two pages pointing at one shared, indirect Resources dictionary that
/// already has an XObject subdictionary.
pub fn create_shared_resources_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let logo_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        },
        b"0 0 10 10 re f".to_vec(),
    ));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
        "XObject" => dictionary! { "Logo" => logo_id },
    });

    let mut kids = Vec::new();
    for i in 0..2 {
        let content_id = add_text_content(&mut doc, &format!("Shared {}", i + 1));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    finish(doc, pages_id, kids, Dictionary::new())
}

fn add_text_content(doc: &mut Document, text: &str) -> ObjectId {
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
            Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
            Operation::new(
                "Tj",
                vec![Object::String(
                    text.as_bytes().to_vec(),
                    lopdf::StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()))
}

fn finish(mut doc: Document, pages_id: ObjectId, kids: Vec<Object>, resources: Dictionary) -> Vec<u8> {
    let count = kids.len() as i64;
    let mut pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
    };
    if !resources.is_empty() {
        pages.set("Resources", resources);
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([20, 20, 160]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

/// "approved" is a 3px wide opaque PNG, "void" a 5px wide translucent PNG,
/// "seal" an 8px JPEG. Widths tell the embedded images apart.
pub fn catalog() -> Arc<StampCatalog> {
    Arc::new(
        StampCatalog::builder()
            .builtin(
                "approved",
                "Approved",
                150.0,
                ImagePayload::new(png(3, 3, [0, 160, 0, 255]), ImageFormat::Png),
            )
            .builtin(
                "void",
                "Void",
                120.0,
                ImagePayload::new(png(5, 5, [200, 0, 0, 128]), ImageFormat::Png),
            )
            .builtin(
                "seal",
                "Seal",
                100.0,
                ImagePayload::new(jpeg(8, 8), ImageFormat::Jpeg),
            )
            .build()
            .unwrap(),
    )
}

pub fn page_dict(doc: &Document, page: u32) -> &Dictionary {
    let id = doc.get_pages()[&page];
    doc.get_object(id).unwrap().as_dict().unwrap()
}

pub fn page_content(doc: &Document, page: u32) -> Vec<u8> {
    let id = doc.get_pages()[&page];
    doc.get_page_content(id).unwrap()
}

/// Page XObject resources as (name, image width) pairs.
pub fn page_images(doc: &Document, page: u32) -> Vec<(String, i64)> {
    let resources = match page_dict(doc, page).get(b"Resources").unwrap() {
        Object::Dictionary(d) => d,
        Object::Reference(id) => doc.get_object(*id).unwrap().as_dict().unwrap(),
        other => panic!("unexpected resources {:?}", other),
    };
    let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
    let mut images = Vec::new();
    for (name, value) in xobjects.iter() {
        let id = value.as_reference().unwrap();
        if let Object::Stream(stream) = doc.get_object(id).unwrap() {
            if stream.dict.get(b"Subtype").unwrap().as_name().unwrap() == b"Image" {
                let width = stream.dict.get(b"Width").unwrap().as_i64().unwrap();
                images.push((String::from_utf8_lossy(name).into_owned(), width));
            }
        }
    }
    images
}

/// Operands of every `cm` and the name of every `Do`, in content order.
pub fn draw_ops(doc: &Document, page: u32) -> Vec<String> {
    let content = Content::decode(&page_content(doc, page)).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "cm" || op.operator == "Do")
        .map(|op| {
            let operands: Vec<String> = op
                .operands
                .iter()
                .map(|o| match o {
                    Object::Integer(i) => i.to_string(),
                    Object::Real(r) => format!("{}", r),
                    Object::Name(n) => format!("/{}", String::from_utf8_lossy(n)),
                    other => format!("{:?}", other),
                })
                .collect();
            format!("{} {}", operands.join(" "), op.operator)
        })
        .collect()
}
