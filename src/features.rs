use ndarray::{Array1, Array2, Axis};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::layout::group_into_pages;
use crate::logging::FEATURES;
use crate::model::{page_size, PageDimensions, TextRecord, FEATURE_VECTOR_LEN};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").expect("valid email regex")
});
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("valid phone regex"));
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("valid url regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").expect("valid date regex"));
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\b").expect("valid number regex"));
static UPPERCASE_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2,}\b").expect("valid uppercase regex"));

/// Aggregate statistics over a record set. Field order is the order of
/// [`TextFeatures::to_vector`] and of the serialized JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFeatures {
    pub num_elements: usize,
    pub total_area: f64,
    pub avg_area: f64,
    /// Mean over records that carry a font size; records without one are
    /// left out entirely.
    pub avg_font_size: f64,
    pub text_density: f64,
    pub spatial_spread_x: f64,
    pub spatial_spread_y: f64,
    pub coverage_ratio: f64,
    pub total_chars: usize,
}

impl TextFeatures {
    pub const NAMES: [&'static str; 9] = [
        "num_elements",
        "total_area",
        "avg_area",
        "avg_font_size",
        "text_density",
        "spatial_spread_x",
        "spatial_spread_y",
        "coverage_ratio",
        "total_chars",
    ];

    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.num_elements as f64,
            self.total_area,
            self.avg_area,
            self.avg_font_size,
            self.text_density,
            self.spatial_spread_x,
            self.spatial_spread_y,
            self.coverage_ratio,
            self.total_chars as f64,
        ]
    }
}

/// Regex-level heuristics over the concatenated text. False positives and
/// negatives are expected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPatterns {
    pub has_email: bool,
    pub has_phone: bool,
    pub has_url: bool,
    pub has_date: bool,
    pub num_numbers: usize,
    pub num_uppercase_words: usize,
    pub avg_word_length: f64,
}

impl TextPatterns {
    pub const NAMES: [&'static str; 7] = [
        "has_email",
        "has_phone",
        "has_url",
        "has_date",
        "num_numbers",
        "num_uppercase_words",
        "avg_word_length",
    ];

    /// Booleans become 1.0 / 0.0.
    pub fn to_vector(&self) -> Vec<f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        vec![
            flag(self.has_email),
            flag(self.has_phone),
            flag(self.has_url),
            flag(self.has_date),
            self.num_numbers as f64,
            self.num_uppercase_words as f64,
            self.avg_word_length,
        ]
    }
}

/// Per-record matrix plus the aggregate and pattern vectors for the same
/// record set.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// One row per record, columns as in [`crate::model::FEATURE_COLUMNS`].
    /// Zero rows for empty input.
    pub elements: Array2<f64>,
    pub aggregate: Vec<f64>,
    pub patterns: Vec<f64>,
}

impl FeatureMatrix {
    pub fn is_empty(&self) -> bool {
        self.elements.nrows() == 0
    }
}

/// Per-record flags carried in the full-data export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordFlags {
    pub text_length: usize,
    pub is_numeric: bool,
    pub is_uppercase: bool,
}

pub fn record_flags(record: &TextRecord) -> RecordFlags {
    let stripped: String = record
        .text
        .chars()
        .filter(|c| *c != '.' && *c != ',')
        .collect();
    let stripped = stripped.trim();
    let is_numeric = !stripped.is_empty() && stripped.chars().all(char::is_numeric);
    let is_uppercase = record.text.chars().any(char::is_uppercase)
        && !record.text.chars().any(char::is_lowercase);

    RecordFlags {
        text_length: record.char_count(),
        is_numeric,
        is_uppercase,
    }
}

pub fn calculate_text_features(records: &[TextRecord]) -> TextFeatures {
    if records.is_empty() {
        return TextFeatures::default();
    }

    let n = records.len() as f64;
    let total_area: f64 = records.iter().map(TextRecord::area).sum();

    let font_sizes: Vec<f64> = records.iter().filter_map(|r| r.font_size).collect();
    let avg_font_size = mean(&font_sizes);

    let (spatial_spread_x, spatial_spread_y) = if records.len() > 1 {
        let xs: Vec<f64> = records.iter().map(TextRecord::center_x).collect();
        let ys: Vec<f64> = records.iter().map(TextRecord::center_y).collect();
        (population_std(&xs), population_std(&ys))
    } else {
        (0.0, 0.0)
    };

    let total_chars: usize = records.iter().map(TextRecord::char_count).sum();
    let text_density = if total_area > 0.0 {
        total_chars as f64 / total_area
    } else {
        0.0
    };

    let (min_x, min_y, max_x, max_y) = records.iter().fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(min_x, min_y, max_x, max_y), r| {
            (
                min_x.min(r.x0),
                min_y.min(r.y0),
                max_x.max(r.x1),
                max_y.max(r.y1),
            )
        },
    );
    let bbox_area = (max_x - min_x) * (max_y - min_y);
    let coverage_ratio = if bbox_area > 0.0 {
        total_area / bbox_area
    } else {
        0.0
    };

    let features = TextFeatures {
        num_elements: records.len(),
        total_area,
        avg_area: total_area / n,
        avg_font_size,
        text_density,
        spatial_spread_x,
        spatial_spread_y,
        coverage_ratio,
        total_chars,
    };

    tracing::debug!(target: FEATURES, ?features, "Calculated aggregate text features");
    features
}

/// Character counts binned into a `rows x cols` grid per page, averaged
/// over every page with known dimensions.
///
/// A record adds its full character count to every cell its bounding box
/// overlaps; there is no area weighting. Cell indices are clipped into
/// the grid so boxes hanging off the page land in the border cells.
pub fn create_spatial_grid_features(
    records: &[TextRecord],
    page_dimensions: &PageDimensions,
    grid_size: (usize, usize),
) -> Array2<f64> {
    let (rows, cols) = grid_size;
    if rows == 0 || cols == 0 {
        return Array2::zeros((rows, cols));
    }

    let mut sum = Array2::<f64>::zeros((rows, cols));
    let mut page_count = 0usize;

    for (page_num, page_records) in group_into_pages(records) {
        let Some((width, height)) = page_size(page_dimensions, page_num) else {
            tracing::debug!(target: FEATURES, page_num, "Skipping page without dimensions");
            continue;
        };

        let cell_width = width / cols as f64;
        let cell_height = height / rows as f64;

        for record in page_records {
            let start_col = cell_index(record.x0, cell_width, cols);
            let end_col = cell_index(record.x1, cell_width, cols);
            let start_row = cell_index(record.y0, cell_height, rows);
            let end_row = cell_index(record.y1, cell_height, rows);
            let text_len = record.char_count() as f64;

            for r in start_row..=end_row {
                for c in start_col..=end_col {
                    sum[[r, c]] += text_len;
                }
            }
        }
        page_count += 1;
    }

    if page_count > 0 {
        sum /= page_count as f64;
    }

    tracing::debug!(target: FEATURES, page_count, rows, cols, "Built spatial grid");
    sum
}

fn cell_index(coord: f64, cell_size: f64, cells: usize) -> usize {
    let idx = (coord / cell_size).floor();
    if idx.is_nan() || idx < 0.0 {
        0
    } else {
        (idx as usize).min(cells - 1)
    }
}

pub fn extract_text_patterns(records: &[TextRecord]) -> TextPatterns {
    let all_text = records
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let word_lengths: Vec<f64> = all_text
        .split_whitespace()
        .map(|w| w.chars().count() as f64)
        .collect();

    TextPatterns {
        has_email: EMAIL_RE.is_match(&all_text),
        has_phone: PHONE_RE.is_match(&all_text),
        has_url: URL_RE.is_match(&all_text),
        has_date: DATE_RE.is_match(&all_text),
        num_numbers: NUMBER_RE.find_iter(&all_text).count(),
        num_uppercase_words: UPPERCASE_WORD_RE.find_iter(&all_text).count(),
        avg_word_length: mean(&word_lengths),
    }
}

pub fn create_feature_matrix(records: &[TextRecord], page_dimensions: &PageDimensions) -> FeatureMatrix {
    let aggregate = calculate_text_features(records).to_vector();
    let patterns = extract_text_patterns(records).to_vector();

    if records.is_empty() {
        return FeatureMatrix {
            elements: Array2::zeros((0, FEATURE_VECTOR_LEN)),
            aggregate,
            patterns,
        };
    }

    let mut elements = Array2::<f64>::zeros((records.len(), FEATURE_VECTOR_LEN));
    for (mut row, record) in elements.axis_iter_mut(Axis(0)).zip(records) {
        row.assign(&Array1::from(record.to_feature_vector().to_vec()));
    }

    tracing::debug!(
        target: FEATURES,
        rows = records.len(),
        known_pages = page_dimensions.len(),
        "Built feature matrix"
    );

    FeatureMatrix {
        elements,
        aggregate,
        patterns,
    }
}

pub const CLUSTERING_COLUMNS: [&str; 7] = [
    "center_x",
    "center_y",
    "width",
    "height",
    "area",
    "text_length",
    "font_size",
];

/// Column means and scales used to standardize clustering features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ClusteringFeatures {
    pub features: Array2<f64>,
    pub labels: Vec<String>,
    /// Present when the features were standardized.
    pub scaler: Option<ScalerParams>,
}

/// Seven spatial columns per record for clustering, optionally z-scored
/// per column. Zero-variance columns keep a scale of 1.0.
pub fn clustering_features(records: &[TextRecord], standardize: bool) -> ClusteringFeatures {
    let mut features = Array2::<f64>::zeros((records.len(), CLUSTERING_COLUMNS.len()));
    for (mut row, record) in features.axis_iter_mut(Axis(0)).zip(records) {
        row.assign(&Array1::from(vec![
            record.center_x(),
            record.center_y(),
            record.width(),
            record.height(),
            record.area(),
            record.char_count() as f64,
            record.font_size.unwrap_or(0.0),
        ]));
    }
    let labels = records.iter().map(|r| r.text.clone()).collect();

    let scaler = if standardize && !records.is_empty() {
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(CLUSTERING_COLUMNS.len()));
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 { s } else { 1.0 });
        features -= &mean;
        features /= &scale;
        Some(ScalerParams {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
        })
    } else {
        None
    };

    ClusteringFeatures {
        features,
        labels,
        scaler,
    }
}

/// Overview of one feature export.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSummary {
    pub total_elements: usize,
    pub total_pages: usize,
    pub aggregate_features: TextFeatures,
    pub pattern_features: TextPatterns,
    pub spatial_grid_shape: [usize; 2],
    pub feature_matrix_shape: [usize; 2],
}

impl FeatureSummary {
    pub fn new(records: &[TextRecord], grid: &Array2<f64>, matrix: &FeatureMatrix) -> Self {
        let total_pages = records
            .iter()
            .map(|r| r.page_num)
            .collect::<BTreeSet<_>>()
            .len();
        let feature_matrix_shape = if matrix.is_empty() {
            [0, 0]
        } else {
            [matrix.elements.nrows(), matrix.elements.ncols()]
        };

        FeatureSummary {
            total_elements: records.len(),
            total_pages,
            aggregate_features: calculate_text_features(records),
            pattern_features: extract_text_patterns(records),
            spatial_grid_shape: [grid.nrows(), grid.ncols()],
            feature_matrix_shape,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
