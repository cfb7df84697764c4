use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lopdf::Document;
use uuid::Uuid;

use crate::logging::OCR;
use crate::model::{page_size, PageDimensions, TextRecord};
use crate::parse::page_jpeg_images;

/// One text region reported by an OCR engine, in image pixels with a
/// top-left origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrBlock {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// 0-100; engines that report "no confidence" use 0.
    pub confidence: f64,
}

/// Anything that can find text regions in a raster image.
pub trait OcrEngine: Send + Sync {
    fn detect(&self, image_path: &Path) -> Result<Vec<OcrBlock>>;
}

/// Runs the `tesseract` command-line tool and reads its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    cmd: PathBuf,
    page_segmentation_mode: u8,
}

impl TesseractEngine {
    /// Use `cmd` if given, otherwise look `tesseract` up on `PATH`.
    pub fn new(cmd: Option<&Path>) -> Result<Self> {
        let cmd = match cmd {
            Some(cmd) => cmd.to_path_buf(),
            None => which::which("tesseract").context("tesseract not found on PATH")?,
        };
        debug!(target: OCR, cmd = %cmd.display(), "Using tesseract");
        Ok(TesseractEngine {
            cmd,
            page_segmentation_mode: 6,
        })
    }

    pub fn with_page_segmentation_mode(mut self, psm: u8) -> Self {
        self.page_segmentation_mode = psm;
        self
    }
}

impl OcrEngine for TesseractEngine {
    fn detect(&self, image_path: &Path) -> Result<Vec<OcrBlock>> {
        info!(target: OCR, image = %image_path.display(), "Running OCR");
        let output = Command::new(&self.cmd)
            .arg(image_path)
            .arg("stdout")
            .arg("--psm")
            .arg(self.page_segmentation_mode.to_string())
            .arg("-c")
            .arg("preserve_interword_spaces=1")
            .arg("tsv")
            .output()
            .with_context(|| format!("Failed to run {}", self.cmd.display()))?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let blocks = parse_tesseract_tsv(output.stdout.as_slice())?;
        debug!(target: OCR, count = blocks.len(), "Parsed OCR blocks");
        Ok(blocks)
    }
}

#[derive(Debug, Deserialize)]
struct TsvRow {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    conf: f64,
    #[serde(default)]
    text: Option<String>,
}

/// Parse tesseract's TSV format. Every row becomes a block; rows carrying
/// `conf = -1` (layout rows without text) get confidence 0.
pub fn parse_tesseract_tsv<R: Read>(reader: R) -> Result<Vec<OcrBlock>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut blocks = Vec::new();
    for row in rdr.deserialize::<TsvRow>() {
        let row = row.context("Malformed tesseract TSV row")?;
        blocks.push(OcrBlock {
            text: row.text.unwrap_or_default(),
            x: row.left,
            y: row.top,
            width: row.width,
            height: row.height,
            confidence: if row.conf < 0.0 { 0.0 } else { row.conf },
        });
    }
    Ok(blocks)
}

/// Turn OCR blocks into records on `page_num`.
///
/// Blocks whose trimmed text is empty, or whose confidence is not strictly
/// above `min_confidence`, are dropped. OCR carries no font metadata.
pub fn records_from_ocr_blocks(blocks: &[OcrBlock], page_num: u32, min_confidence: f64) -> Vec<TextRecord> {
    blocks
        .iter()
        .filter(|b| b.confidence > min_confidence)
        .filter_map(|b| {
            let text = b.text.trim();
            if text.is_empty() {
                return None;
            }
            let record = TextRecord::new(text, (b.x, b.y, b.x + b.width, b.y + b.height), page_num);
            record.is_well_formed().then_some(record)
        })
        .collect()
}

/// Dimensions of a raster image as a single-page map.
pub fn image_page_dimensions(image_path: &Path) -> Result<PageDimensions> {
    let (width, height) = image::image_dimensions(image_path)
        .with_context(|| format!("Failed to read image header of {}", image_path.display()))?;
    Ok(PageDimensions::from([(1, (f64::from(width), f64::from(height)))]))
}

/// OCR the largest embedded JPEG of each listed page and map the result
/// into page coordinates, assuming the image covers the whole page.
///
/// Pages without an embedded JPEG or known dimensions are skipped. A
/// failing engine run is logged and skips only that page.
pub fn ocr_scanned_pages(
    doc: &Document,
    page_dimensions: &PageDimensions,
    pages: &[u32],
    engine: &dyn OcrEngine,
    min_confidence: f64,
) -> Result<Vec<TextRecord>> {
    let mut records = Vec::new();

    for &page_num in pages {
        let Some((page_width, page_height)) = page_size(page_dimensions, page_num) else {
            continue;
        };
        let Some(image) = page_jpeg_images(doc, page_num)
            .into_iter()
            .max_by(|a, b| (a.width * a.height).total_cmp(&(b.width * b.height)))
        else {
            debug!(target: OCR, page_num, "No scanned image on page");
            continue;
        };

        let image_path = std::env::temp_dir().join(format!("pdf-coords-{}.jpg", Uuid::new_v4()));
        std::fs::write(&image_path, &image.data)
            .with_context(|| format!("Failed to write {}", image_path.display()))?;
        let detected = engine.detect(&image_path);
        if let Err(e) = std::fs::remove_file(&image_path) {
            warn!(
                target: OCR,
                path = %image_path.display(),
                "Failed to remove temporary scan image: {e}"
            );
        }

        let blocks = match detected {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(target: OCR, "OCR failed on page {page_num}: {e:#}");
                continue;
            }
        };

        let sx = page_width / image.width;
        let sy = page_height / image.height;
        let page_records = records_from_ocr_blocks(&blocks, page_num, min_confidence)
            .into_iter()
            .map(|r| TextRecord {
                x0: r.x0 * sx,
                y0: r.y0 * sy,
                x1: r.x1 * sx,
                y1: r.y1 * sy,
                ..r
            });
        records.extend(page_records);
    }

    info!(target: OCR, count = records.len(), "OCR fallback finished");
    Ok(records)
}
