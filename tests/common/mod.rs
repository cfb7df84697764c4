#![allow(dead_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use lopdf::content::{Content, Operation};
use lopdf::dictionary;
use lopdf::{Document, Object, Stream};

use pdf_coords::ocr::{OcrBlock, OcrEngine};
use pdf_coords::{PageDimensions, TextRecord};

pub const PAGE_WIDTH: f64 = 595.0;
pub const PAGE_HEIGHT: f64 = 842.0;

pub fn record(text: &str, x0: f64, y0: f64, x1: f64, y1: f64, page_num: u32) -> TextRecord {
    TextRecord::new(text, (x0, y0, x1, y1), page_num)
}

pub fn sized(text: &str, bbox: (f64, f64, f64, f64), page_num: u32, font_size: f64) -> TextRecord {
    TextRecord::new(text, bbox, page_num).with_font(Some(font_size), Some("Helvetica".to_string()))
}

pub fn dims(pages: &[(u32, f64, f64)]) -> PageDimensions {
    pages.iter().map(|&(p, w, h)| (p, (w, h))).collect()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// One string drawn with `Td` at a baseline position.
pub struct TextRun {
    pub x: i64,
    pub y: i64,
    pub font_size: f32,
    pub text: String,
}

impl TextRun {
    pub fn new(x: i64, y: i64, font_size: f32, text: &str) -> Self {
        TextRun {
            x,
            y,
            font_size,
            text: text.to_string(),
        }
    }
}

/// What goes on one page of a generated PDF.
pub enum PageContent {
    Text(Vec<TextRun>),
    /// A full-page DCT image of the given pixel size and no text.
    Scan { width: i64, height: i64 },
}

/// Build an A4 (595x842) Courier PDF, MediaBox inherited from the page tree.
pub fn build_pdf(pages: Vec<PageContent>) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let (operations, resources) = match page {
            PageContent::Text(runs) => {
                let mut operations = Vec::new();
                for run in runs {
                    operations.extend(vec![
                        Operation::new("BT", vec![]),
                        Operation::new("Tf", vec!["F1".into(), run.font_size.into()]),
                        Operation::new("Td", vec![run.x.into(), run.y.into()]),
                        Operation::new("Tj", vec![Object::string_literal(run.text)]),
                        Operation::new("ET", vec![]),
                    ]);
                }
                (
                    operations,
                    dictionary! { "Font" => dictionary! { "F1" => font_id } },
                )
            }
            PageContent::Scan { width, height } => {
                let image_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width,
                        "Height" => height,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    vec![0xFF, 0xD8, 0xFF, 0xD9],
                ));
                let operations = vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![595.into(), 0.into(), 0.into(), 842.into(), 0.into(), 0.into()],
                    ),
                    Operation::new("Do", vec!["Im1".into()]),
                    Operation::new("Q", vec![]),
                ];
                (
                    operations,
                    dictionary! {
                        "Font" => dictionary! { "F1" => font_id },
                        "XObject" => dictionary! { "Im1" => image_id },
                    },
                )
            }
        };

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Two lines of text on page 1 and a single word on page 2.
pub fn sample_pdf() -> Document {
    build_pdf(vec![
        PageContent::Text(vec![
            TextRun::new(100, 700, 12.0, "Hello World"),
            TextRun::new(100, 680, 12.0, "Second line"),
        ]),
        PageContent::Text(vec![TextRun::new(72, 400, 10.0, "Appendix")]),
    ])
}

pub fn save_pdf(doc: &mut Document, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    doc.save(&path).unwrap();
    path
}

pub fn pdf_bytes(doc: &mut Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Returns fixed blocks regardless of the image.
pub struct MockOcrEngine {
    pub blocks: Vec<OcrBlock>,
}

impl OcrEngine for MockOcrEngine {
    fn detect(&self, _image_path: &Path) -> Result<Vec<OcrBlock>> {
        Ok(self.blocks.clone())
    }
}

pub fn ocr_block(text: &str, x: f64, y: f64, width: f64, height: f64, confidence: f64) -> OcrBlock {
    OcrBlock {
        text: text.to_string(),
        x,
        y,
        width,
        height,
        confidence,
    }
}
