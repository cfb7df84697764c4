use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub line_y_tolerance: f64,
    pub block_x_tolerance: f64,
    pub block_y_tolerance: f64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        GroupingConfig {
            line_y_tolerance: 5.0,
            block_x_tolerance: 50.0,
            block_y_tolerance: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
}

impl GridConfig {
    pub fn size(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig { rows: 10, cols: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Allow OCR for raster inputs.
    pub use_ocr: bool,
    /// OCR blocks at or below this confidence are dropped.
    pub min_ocr_confidence: f64,
    /// Explicit tesseract binary; looked up on `PATH` when unset.
    pub tesseract_cmd: Option<PathBuf>,
}

/// Text grouping used by the plain-text export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Line,
    Block,
    Page,
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupBy::Line => "line",
            GroupBy::Block => "block",
            GroupBy::Page => "page",
        };
        f.write_str(name)
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "line" => Ok(GroupBy::Line),
            "block" => Ok(GroupBy::Block),
            "page" => Ok(GroupBy::Page),
            other => Err(format!("unknown grouping '{other}', expected line, block or page")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportFormats {
    pub json: bool,
    pub csv: bool,
    pub features: bool,
    pub text: bool,
}

impl ExportFormats {
    pub fn all() -> Self {
        ExportFormats {
            json: true,
            csv: true,
            features: true,
            text: true,
        }
    }

    pub fn none_selected(&self) -> bool {
        !(self.json || self.csv || self.features || self.text)
    }
}

impl Default for ExportFormats {
    /// JSON only.
    fn default() -> Self {
        ExportFormats {
            json: true,
            csv: false,
            features: false,
            text: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    /// Base name for output files; the input file stem when unset.
    pub output_name: Option<String>,
    pub formats: ExportFormats,
    pub normalize: bool,
    pub group_by: GroupBy,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            output_dir: PathBuf::from("output_data"),
            output_name: None,
            formats: ExportFormats::default(),
            normalize: false,
            group_by: GroupBy::default(),
        }
    }
}

/// Everything one pipeline run needs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grouping: GroupingConfig,
    pub grid: GridConfig,
    pub extraction: ExtractionConfig,
    pub export: ExportConfig,
}
