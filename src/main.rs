use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use rayon::prelude::*;
use tracing::{error, info, warn};

use pdf_coords::config::{
    ExportConfig, ExportFormats, ExtractionConfig, GridConfig, GroupBy, GroupingConfig, PipelineConfig,
};
use pdf_coords::ocr::{OcrEngine, TesseractEngine};
use pdf_coords::process_file;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "Extract text with vector coordinates from PDFs and images.",
    arg_required_else_help = true
)]
pub struct Args {
    /// PDF or image files to process
    #[clap(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Export JSON (the default when no format is chosen)
    #[clap(long)]
    pub json: bool,

    /// Export CSV
    #[clap(long)]
    pub csv: bool,

    /// Export feature vectors and clustering data
    #[clap(long)]
    pub features: bool,

    /// Export plain text
    #[clap(long)]
    pub text: bool,

    /// Export every format
    #[clap(long)]
    pub all: bool,

    /// Enable OCR for images and scanned PDF pages
    #[clap(long)]
    pub ocr: bool,

    /// Divide coordinates by page width and height
    #[clap(long)]
    pub normalize: bool,

    /// Grouping for the plain-text export: line, block or page
    #[clap(long, default_value_t = GroupBy::Line)]
    pub group: GroupBy,

    /// Base output directory; `~` and `$VARS` are expanded
    #[clap(short, long, default_value = "output_data")]
    pub output_dir: String,

    /// Base name for output files (defaults to the input file stem)
    #[clap(long)]
    pub output_name: Option<String>,

    #[clap(long, default_value_t = 10)]
    pub grid_rows: usize,

    #[clap(long, default_value_t = 10)]
    pub grid_cols: usize,

    /// Debug-level logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Also write a log file into this directory
    #[clap(long)]
    pub log_dir: Option<PathBuf>,

    /// Path to the tesseract binary
    #[clap(long)]
    pub tesseract_cmd: Option<PathBuf>,

    /// OCR blocks at or below this confidence (0-100) are dropped
    #[clap(long, default_value_t = 0.0)]
    pub min_confidence: f64,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    fn formats(&self) -> ExportFormats {
        if self.all {
            return ExportFormats::all();
        }
        let formats = ExportFormats {
            json: self.json,
            csv: self.csv,
            features: self.features,
            text: self.text,
        };
        if formats.none_selected() {
            ExportFormats::default()
        } else {
            formats
        }
    }

    fn to_config(&self) -> PipelineConfig {
        let output_dir = shellexpand::full(&self.output_dir)
            .map(|expanded| PathBuf::from(expanded.as_ref()))
            .unwrap_or_else(|_| PathBuf::from(&self.output_dir));

        PipelineConfig {
            grouping: GroupingConfig::default(),
            grid: GridConfig {
                rows: self.grid_rows,
                cols: self.grid_cols,
            },
            extraction: ExtractionConfig {
                use_ocr: self.ocr,
                min_ocr_confidence: self.min_confidence,
                tesseract_cmd: self.tesseract_cmd.clone(),
            },
            export: ExportConfig {
                output_dir,
                output_name: self.output_name.clone(),
                formats: self.formats(),
                normalize: self.normalize,
                group_by: self.group,
            },
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse_args();

    // Keep the guards alive until exit so buffered logs are flushed
    let _guards = match &args.log_dir {
        Some(log_dir) => {
            let (stdout_guard, file_guard) = pdf_coords::logging::init_logging_with_dir(args.verbose, log_dir)?;
            vec![stdout_guard, file_guard]
        }
        None => vec![pdf_coords::logging::init_logging(args.verbose)],
    };

    let config = args.to_config();

    let engine: Option<Box<dyn OcrEngine>> = if config.extraction.use_ocr {
        let engine = TesseractEngine::new(config.extraction.tesseract_cmd.as_deref())?;
        Some(Box::new(engine))
    } else {
        None
    };

    let results: Vec<_> = args
        .inputs
        .par_iter()
        .map(|input| (input, process_file(input, &config, engine.as_deref())))
        .collect();

    let mut failed = false;
    for (input, result) in results {
        match result {
            Ok(outcome) if outcome.element_count == 0 => {
                failed = true;
                warn!(
                    "No text elements found in {}; original copied to {}",
                    input.display(),
                    outcome.output_dir.display()
                );
                if !config.extraction.use_ocr {
                    warn!("Try --ocr for scanned documents");
                }
            }
            Ok(outcome) => {
                info!(
                    elements = outcome.element_count,
                    files = outcome.files.len(),
                    "Processed {} into {}",
                    input.display(),
                    outcome.output_dir.display()
                );
                for file in &outcome.files {
                    info!("  - {}", file.display());
                }
            }
            Err(e) => {
                failed = true;
                error!("Failed to process {}: {e:#}", input.display());
            }
        }
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
