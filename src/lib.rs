pub mod config;
pub mod export;
pub mod features;
pub mod fonts;
pub mod layout;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod ocr;
pub mod parse;

pub use crate::config::PipelineConfig;
pub use crate::features::{
    calculate_text_features, create_feature_matrix, create_spatial_grid_features, extract_text_patterns,
};
pub use crate::layout::{group_into_blocks, group_into_lines, TextBlock, TextLine};
pub use crate::model::{PageDimensions, TextRecord};
pub use crate::normalize::normalize_coordinates;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use lopdf::Document;
use tracing::{info, warn};

use crate::config::ExtractionConfig;
use crate::export::{DataExporter, ExportMetadata};
use crate::logging::{OCR, PDF_PARSING};
use crate::ocr::{image_page_dimensions, ocr_scanned_pages, records_from_ocr_blocks, OcrEngine};
use crate::parse::{get_page_dimensions, get_pdf_text, load_pdf, load_pdf_mem};

/// Raster formats routed through OCR instead of the PDF parser.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif"];

/// Records and page sizes pulled out of one source document.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub source: PathBuf,
    pub records: Vec<TextRecord>,
    pub page_dimensions: PageDimensions,
    pub ocr_used: bool,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> usize {
        self.page_dimensions.len()
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn extract_pdf(path: &Path) -> Result<ExtractedDocument> {
    let doc = load_pdf(path)?;
    Ok(extract_from_document(&doc, path))
}

pub fn extract_pdf_bytes(bytes: &[u8], source: &Path) -> Result<ExtractedDocument> {
    let doc = load_pdf_mem(bytes)?;
    Ok(extract_from_document(&doc, source))
}

fn extract_from_document(doc: &Document, source: &Path) -> ExtractedDocument {
    let page_dimensions = get_page_dimensions(doc);
    let records = get_pdf_text(doc);
    info!(
        target: PDF_PARSING,
        source = %source.display(),
        pages = page_dimensions.len(),
        records = records.len(),
        "Extracted PDF text"
    );
    ExtractedDocument {
        source: source.to_path_buf(),
        records,
        page_dimensions,
        ocr_used: false,
    }
}

/// OCR a raster image as a single page in pixel coordinates.
pub fn extract_image(path: &Path, engine: &dyn OcrEngine, min_confidence: f64) -> Result<ExtractedDocument> {
    let page_dimensions = image_page_dimensions(path)?;
    let blocks = engine
        .detect(path)
        .with_context(|| format!("OCR failed on {}", path.display()))?;
    let records = records_from_ocr_blocks(&blocks, 1, min_confidence);
    info!(
        target: OCR,
        source = %path.display(),
        blocks = blocks.len(),
        records = records.len(),
        "Extracted image text"
    );
    Ok(ExtractedDocument {
        source: path.to_path_buf(),
        records,
        page_dimensions,
        ocr_used: true,
    })
}

/// Extract any supported input.
///
/// Images require OCR to be enabled. For PDFs with OCR enabled, pages
/// that yield no text are OCR'd from their embedded scan.
pub fn extract_document(
    path: &Path,
    config: &ExtractionConfig,
    engine: Option<&dyn OcrEngine>,
) -> Result<ExtractedDocument> {
    if is_image_path(path) {
        let Some(engine) = engine.filter(|_| config.use_ocr) else {
            bail!("{} is an image; OCR must be enabled to extract it", path.display());
        };
        return extract_image(path, engine, config.min_ocr_confidence);
    }

    let doc = load_pdf(path)?;
    let mut extracted = extract_from_document(&doc, path);

    if let Some(engine) = engine.filter(|_| config.use_ocr) {
        let pages_with_text: BTreeSet<u32> = extracted.records.iter().map(|r| r.page_num).collect();
        let empty_pages: Vec<u32> = extracted
            .page_dimensions
            .keys()
            .copied()
            .filter(|p| !pages_with_text.contains(p))
            .collect();
        if !empty_pages.is_empty() {
            info!(target: OCR, pages = ?empty_pages, "Running OCR on pages without text");
            let ocr_records = ocr_scanned_pages(
                &doc,
                &extracted.page_dimensions,
                &empty_pages,
                engine,
                config.min_ocr_confidence,
            )?;
            if !ocr_records.is_empty() {
                extracted.ocr_used = true;
                extracted.records.extend(ocr_records);
                extracted.records.sort_by_key(|r| r.page_num);
            }
        }
    }

    Ok(extracted)
}

/// What one run of [`process_file`] produced.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub element_count: usize,
    pub files: Vec<PathBuf>,
}

/// Extract, optionally normalize, and export one document.
///
/// The original is always copied into the output directory. With zero
/// records nothing else is written and `element_count` is 0.
pub fn process_file(
    path: &Path,
    config: &PipelineConfig,
    engine: Option<&dyn OcrEngine>,
) -> Result<ProcessOutcome> {
    let extracted = extract_document(path, &config.extraction, engine)?;

    let exporter = DataExporter::new(&config.export.output_dir, Some(path))?;
    let mut files: Vec<PathBuf> = exporter.copy_original_file()?.into_iter().collect();

    if extracted.records.is_empty() {
        warn!(target: PDF_PARSING, source = %path.display(), "No text extracted");
        return Ok(ProcessOutcome {
            source: path.to_path_buf(),
            output_dir: exporter.output_dir().to_path_buf(),
            element_count: 0,
            files,
        });
    }

    // Normalized records live in the unit square, so the grid must too.
    let (records, page_dimensions) = if config.export.normalize {
        let unit_pages: PageDimensions = extracted
            .page_dimensions
            .keys()
            .filter(|&&page| model::page_size(&extracted.page_dimensions, page).is_some())
            .map(|&page| (page, (1.0, 1.0)))
            .collect();
        (
            normalize_coordinates(&extracted.records, &extracted.page_dimensions),
            unit_pages,
        )
    } else {
        (extracted.records.clone(), extracted.page_dimensions.clone())
    };

    let output_name = config.export.output_name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });

    let metadata = ExportMetadata {
        source_file: path.display().to_string(),
        ocr_used: extracted.ocr_used,
        normalized: config.export.normalize,
        page_count: extracted.page_count(),
        config: config.clone(),
    };

    files.extend(exporter.export_all(
        &records,
        &page_dimensions,
        &metadata,
        config,
        &output_name,
    )?);

    Ok(ProcessOutcome {
        source: path.to_path_buf(),
        output_dir: exporter.output_dir().to_path_buf(),
        element_count: records.len(),
        files,
    })
}
