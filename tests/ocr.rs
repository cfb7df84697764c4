mod common;

use common::{assert_close, build_pdf, ocr_block, save_pdf, MockOcrEngine, PageContent, TextRun};
use pdf_coords::config::ExtractionConfig;
use pdf_coords::ocr::{image_page_dimensions, parse_tesseract_tsv, records_from_ocr_blocks, TesseractEngine};
use pdf_coords::{extract_document, extract_image, is_image_path};
use pretty_assertions::assert_eq;
use pdf_coords::ocr::{OcrBlock, OcrEngine};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Records the image paths it is handed and whether they existed then.
#[derive(Default)]
struct PathRecordingEngine {
    seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl OcrEngine for PathRecordingEngine {
    fn detect(&self, image_path: &Path) -> anyhow::Result<Vec<OcrBlock>> {
        self.seen
            .lock()
            .unwrap()
            .push((image_path.to_path_buf(), image_path.exists()));
        Ok(vec![ocr_block("Scanned", 1.0, 1.0, 5.0, 5.0, 95.0)])
    }
}

const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
5\t1\t1\t1\t1\t1\t36\t92\t120\t24\t96.5\tInvoice
5\t1\t1\t1\t1\t2\t170\t92\t60\t24\t91\t2024
5\t1\t1\t1\t2\t1\t36\t130\t10\t24\t12.25\t ~
";

fn ocr_config(min_confidence: f64) -> ExtractionConfig {
    ExtractionConfig {
        use_ocr: true,
        min_ocr_confidence: min_confidence,
        tesseract_cmd: None,
    }
}

#[test]
fn test_parse_tesseract_tsv() {
    let blocks = parse_tesseract_tsv(TSV.as_bytes()).unwrap();

    assert_eq!(blocks.len(), 4);
    assert_eq!(blocks[0].text, "");
    assert_close(blocks[0].confidence, 0.0);
    assert_eq!(blocks[1], ocr_block("Invoice", 36.0, 92.0, 120.0, 24.0, 96.5));
    assert_close(blocks[2].confidence, 91.0);
}

#[test]
fn test_parse_tesseract_tsv_rejects_bad_numbers() {
    let bad = "left\ttop\twidth\theight\tconf\ttext\nx\t0\t1\t1\t90\tword\n";
    assert!(parse_tesseract_tsv(bad.as_bytes()).is_err());
}

#[test]
fn test_records_from_ocr_blocks_filters_confidence_and_blanks() {
    let blocks = parse_tesseract_tsv(TSV.as_bytes()).unwrap();

    let records = records_from_ocr_blocks(&blocks, 1, 50.0);

    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["Invoice", "2024"]);
    let invoice = &records[0];
    assert_eq!((invoice.x0, invoice.y0, invoice.x1, invoice.y1), (36.0, 92.0, 156.0, 116.0));
    assert_eq!(invoice.font_size, None);
    assert_eq!(invoice.font_name, None);
}

#[test]
fn test_min_confidence_is_exclusive() {
    let blocks = vec![
        ocr_block("at", 0.0, 0.0, 5.0, 5.0, 60.0),
        ocr_block("above", 0.0, 0.0, 5.0, 5.0, 60.5),
    ];

    let records = records_from_ocr_blocks(&blocks, 3, 60.0);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "above");
    assert_eq!(records[0].page_num, 3);
}

#[test]
fn test_zero_confidence_blocks_dropped_at_default_threshold() {
    let blocks = vec![ocr_block("layout", 0.0, 0.0, 5.0, 5.0, 0.0)];
    assert!(records_from_ocr_blocks(&blocks, 1, 0.0).is_empty());
}

#[test]
fn test_tesseract_engine_with_explicit_command() {
    assert!(TesseractEngine::new(Some(Path::new("/opt/tesseract/bin/tesseract"))).is_ok());
}

#[test]
fn test_is_image_path() {
    assert!(is_image_path(Path::new("scan.PNG")));
    assert!(is_image_path(Path::new("dir/photo.jpeg")));
    assert!(!is_image_path(Path::new("report.pdf")));
    assert!(!is_image_path(Path::new("no_extension")));
}

#[test]
fn test_extract_image_with_mock_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    image::GrayImage::new(640, 480).save(&path).unwrap();

    let engine = MockOcrEngine {
        blocks: vec![
            ocr_block("Total", 10.0, 20.0, 50.0, 12.0, 88.0),
            ocr_block("  ", 10.0, 40.0, 50.0, 12.0, 99.0),
        ],
    };

    let extracted = extract_image(&path, &engine, 0.0).unwrap();

    assert!(extracted.ocr_used);
    assert_eq!(extracted.page_dimensions[&1], (640.0, 480.0));
    assert_eq!(extracted.records.len(), 1);
    assert_eq!(extracted.records[0].text, "Total");
    assert_eq!(image_page_dimensions(&path).unwrap(), extracted.page_dimensions);
}

#[test]
fn test_image_input_requires_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    image::GrayImage::new(8, 8).save(&path).unwrap();
    let engine = MockOcrEngine { blocks: vec![] };

    let disabled = ExtractionConfig::default();
    assert!(extract_document(&path, &disabled, Some(&engine)).is_err());
    assert!(extract_document(&path, &ocr_config(0.0), None).is_err());
    assert!(extract_document(&path, &ocr_config(0.0), Some(&engine)).is_ok());
}

#[test]
fn test_scanned_pdf_pages_fall_back_to_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = build_pdf(vec![
        PageContent::Scan {
            width: 1190,
            height: 1684,
        },
        PageContent::Text(vec![TextRun::new(72, 720, 12.0, "Typed")]),
    ]);
    let path = save_pdf(&mut doc, dir.path(), "scanned.pdf");
    let engine = MockOcrEngine {
        blocks: vec![ocr_block("Scanned", 100.0, 200.0, 50.0, 20.0, 95.0)],
    };

    let extracted = extract_document(&path, &ocr_config(0.0), Some(&engine)).unwrap();

    assert!(extracted.ocr_used);
    let texts: Vec<&str> = extracted.records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["Scanned", "Typed"]);

    // The 1190x1684 scan covers a 595x842 page, so pixels halve.
    let scanned = &extracted.records[0];
    assert_eq!(scanned.page_num, 1);
    assert_close(scanned.x0, 50.0);
    assert_close(scanned.y0, 100.0);
    assert_close(scanned.x1, 75.0);
    assert_close(scanned.y1, 110.0);
}

#[test]
fn test_pdf_without_ocr_ignores_scanned_pages() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = build_pdf(vec![PageContent::Scan {
        width: 100,
        height: 100,
    }]);
    let path = save_pdf(&mut doc, dir.path(), "scanned.pdf");
    let engine = MockOcrEngine {
        blocks: vec![ocr_block("Scanned", 1.0, 1.0, 5.0, 5.0, 95.0)],
    };

    let extracted = extract_document(&path, &ExtractionConfig::default(), Some(&engine)).unwrap();

    assert!(extracted.records.is_empty());
    assert!(!extracted.ocr_used);
}

#[test]
fn test_scanned_page_image_is_removed_after_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = build_pdf(vec![PageContent::Scan {
        width: 100,
        height: 100,
    }]);
    let path = save_pdf(&mut doc, dir.path(), "scanned.pdf");
    let engine = PathRecordingEngine::default();

    let extracted = extract_document(&path, &ocr_config(0.0), Some(&engine)).unwrap();

    assert_eq!(extracted.records.len(), 1);
    let seen = engine.seen.into_inner().unwrap();
    assert_eq!(seen.len(), 1);
    let (image_path, existed) = &seen[0];
    assert!(*existed);
    assert_eq!(image_path.extension().unwrap(), "jpg");
    assert!(!image_path.exists());
}
