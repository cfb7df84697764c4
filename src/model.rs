use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Page number -> (width, height), in the same units as record coordinates.
pub type PageDimensions = BTreeMap<u32, (f64, f64)>;

/// Number of columns produced by [`TextRecord::to_feature_vector`].
pub const FEATURE_VECTOR_LEN: usize = 11;

/// Column names of the per-record feature row, in order.
pub const FEATURE_COLUMNS: [&str; FEATURE_VECTOR_LEN] = [
    "x0",
    "y0",
    "x1",
    "y1",
    "center_x",
    "center_y",
    "width",
    "height",
    "area",
    "font_size",
    "page_num",
];

/// A single positioned text fragment.
///
/// Coordinates use a top-left origin: `y0` is the top of the box and `y1`
/// the bottom. Records are never mutated once built; normalization and
/// other transforms produce new records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    pub text: String,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    /// 1-based page number.
    pub page_num: u32,
    pub font_size: Option<f64>,
    pub font_name: Option<String>,
}

impl TextRecord {
    pub fn new(text: impl Into<String>, bbox: (f64, f64, f64, f64), page_num: u32) -> Self {
        Self {
            text: text.into(),
            x0: bbox.0,
            y0: bbox.1,
            x1: bbox.2,
            y1: bbox.3,
            page_num,
            font_size: None,
            font_name: None,
        }
    }

    pub fn with_font(mut self, font_size: Option<f64>, font_name: Option<String>) -> Self {
        self.font_size = font_size;
        self.font_name = font_name;
        self
    }

    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        (self.x0, self.y0, self.x1, self.y1)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center_x(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Text length in characters (not bytes).
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Geometry and text checks a collaborator applies before handing
    /// records to grouping or feature code.
    pub fn is_well_formed(&self) -> bool {
        let coords = [self.x0, self.y0, self.x1, self.y1];
        !self.text.trim().is_empty()
            && coords.iter().all(|c| c.is_finite())
            && self.x1 >= self.x0
            && self.y1 >= self.y0
            && self.page_num >= 1
            && self.font_size.map_or(true, |s| s.is_finite() && s > 0.0)
    }

    /// `[x0, y0, x1, y1, center_x, center_y, width, height, area, font_size_or_0, page_num]`
    pub fn to_feature_vector(&self) -> [f64; FEATURE_VECTOR_LEN] {
        [
            self.x0,
            self.y0,
            self.x1,
            self.y1,
            self.center_x(),
            self.center_y(),
            self.width(),
            self.height(),
            self.area(),
            self.font_size.unwrap_or(0.0),
            f64::from(self.page_num),
        ]
    }
}

impl fmt::Display for TextRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" p{} ({:.1}, {:.1}, {:.1}, {:.1})",
            self.text, self.page_num, self.x0, self.y0, self.x1, self.y1
        )?;
        if let Some(size) = self.font_size {
            write!(f, " {:.1}pt", size)?;
        }
        if let Some(name) = &self.font_name {
            write!(f, " {}", name)?;
        }
        Ok(())
    }
}

/// Flattened record plus its derived geometry, used by the JSON and CSV
/// exports.
#[derive(Debug, Clone, Serialize)]
pub struct RecordRow<'a> {
    pub text: &'a str,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub width: f64,
    pub height: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub area: f64,
    pub page_num: u32,
    pub font_size: Option<f64>,
    pub font_name: Option<&'a str>,
}

impl<'a> From<&'a TextRecord> for RecordRow<'a> {
    fn from(record: &'a TextRecord) -> Self {
        RecordRow {
            text: &record.text,
            x0: record.x0,
            y0: record.y0,
            x1: record.x1,
            y1: record.y1,
            width: record.width(),
            height: record.height(),
            center_x: record.center_x(),
            center_y: record.center_y(),
            area: record.area(),
            page_num: record.page_num,
            font_size: record.font_size,
            font_name: record.font_name.as_deref(),
        }
    }
}

/// Look up usable dimensions for a page. Entries with a non-positive or
/// non-finite side are treated as unknown.
pub fn page_size(page_dimensions: &PageDimensions, page_num: u32) -> Option<(f64, f64)> {
    page_dimensions
        .get(&page_num)
        .copied()
        .filter(|&(w, h)| w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0)
}
