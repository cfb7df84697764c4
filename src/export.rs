use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use ndarray::Array2;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::{GroupBy, GroupingConfig, PipelineConfig};
use crate::features::{
    calculate_text_features, clustering_features, create_feature_matrix, create_spatial_grid_features,
    record_flags, FeatureSummary,
};
use crate::layout::{group_into_blocks, group_into_lines, group_into_pages};
use crate::logging::EXPORT;
use crate::model::{PageDimensions, RecordRow, TextRecord};

/// Number of trailing hash characters in the per-document directory name.
const DIR_HASH_LEN: usize = 8;

const RECORD_CSV_HEADER: [&str; 13] = [
    "text", "x0", "y0", "x1", "y1", "width", "height", "center_x", "center_y", "area", "page_num", "font_size",
    "font_name",
];
const FLAG_CSV_HEADER: [&str; 3] = ["text_length", "is_numeric", "is_uppercase"];

/// Named output files, in the order they were written.
pub type ExportPaths = IndexMap<String, PathBuf>;

/// Writes one document's exports into `<base>/<stem>_<hash suffix>/`.
#[derive(Debug, Clone)]
pub struct DataExporter {
    output_dir: PathBuf,
    source_file: Option<PathBuf>,
    file_hash: Option<String>,
}

impl DataExporter {
    /// Without a source file, exports go straight into `base_dir`.
    pub fn new(base_dir: &Path, source_file: Option<&Path>) -> Result<Self> {
        let (output_dir, file_hash) = match source_file {
            Some(source) => {
                let hash = file_sha256(source)?;
                let stem = source
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string());
                let suffix = &hash[hash.len() - DIR_HASH_LEN..];
                (base_dir.join(format!("{stem}_{suffix}")), Some(hash))
            }
            None => (base_dir.to_path_buf(), None),
        };

        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

        Ok(DataExporter {
            output_dir,
            source_file: source_file.map(Path::to_path_buf),
            file_hash,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn file_hash(&self) -> Option<&str> {
        self.file_hash.as_deref()
    }

    /// Copy the source document in as `<sha256>.<ext>`.
    pub fn copy_original_file(&self) -> Result<Option<PathBuf>> {
        let (Some(source), Some(hash)) = (&self.source_file, &self.file_hash) else {
            return Ok(None);
        };
        let file_name = match source.extension() {
            Some(ext) => format!("{hash}.{}", ext.to_string_lossy()),
            None => hash.clone(),
        };
        let dest = self.output_dir.join(file_name);
        fs::copy(source, &dest)
            .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
        Ok(Some(dest))
    }

    /// `<dir>/<base_name>_<YYYYmmdd_HHMMSS>.<extension>`
    pub fn output_path(&self, base_name: &str, extension: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.output_dir
            .join(format!("{base_name}_{timestamp}.{extension}"))
    }

    pub fn export_to_json(
        &self,
        records: &[TextRecord],
        metadata: &ExportMetadata,
        output_name: &str,
    ) -> Result<PathBuf> {
        #[derive(Serialize)]
        struct JsonExport<'a> {
            metadata: &'a ExportMetadata,
            extraction_timestamp: String,
            total_elements: usize,
            elements: Vec<RecordRow<'a>>,
        }

        let path = self.output_path(output_name, "json");
        let data = JsonExport {
            metadata,
            extraction_timestamp: chrono::Local::now().to_rfc3339(),
            total_elements: records.len(),
            elements: records.iter().map(RecordRow::from).collect(),
        };
        write_json(&path, &data)?;
        info!(target: EXPORT, path = %path.display(), "Exported JSON");
        Ok(path)
    }

    pub fn export_to_csv(&self, records: &[TextRecord], output_name: &str) -> Result<PathBuf> {
        let path = self.output_path(output_name, "csv");
        write_csv(&path, &RECORD_CSV_HEADER, records.iter().map(RecordRow::from))?;
        info!(target: EXPORT, path = %path.display(), "Exported CSV");
        Ok(path)
    }

    /// Feature matrix, aggregate features, spatial grid, full per-record
    /// table and a summary. The matrix file is skipped for empty input.
    pub fn export_feature_vectors(
        &self,
        records: &[TextRecord],
        page_dimensions: &PageDimensions,
        grid_size: (usize, usize),
        output_name: &str,
    ) -> Result<ExportPaths> {
        let mut paths = ExportPaths::new();

        let matrix = create_feature_matrix(records, page_dimensions);
        if !matrix.is_empty() {
            let path = self.output_path(&format!("{output_name}_matrix"), "npy");
            write_npy(&path, &matrix.elements)?;
            paths.insert("feature_matrix".to_string(), path);
        }

        let agg_path = self.output_path(&format!("{output_name}_aggregate"), "json");
        write_json(&agg_path, &calculate_text_features(records))?;
        paths.insert("aggregate_features".to_string(), agg_path);

        let grid = create_spatial_grid_features(records, page_dimensions, grid_size);
        let grid_path = self.output_path(&format!("{output_name}_spatial_grid"), "npy");
        write_npy(&grid_path, &grid)?;
        paths.insert("spatial_grid".to_string(), grid_path);

        let full_path = self.output_path(&format!("{output_name}_full"), "csv");
        let header: Vec<&str> = RECORD_CSV_HEADER.iter().chain(&FLAG_CSV_HEADER).copied().collect();
        write_csv(&full_path, &header, records.iter().map(FullDataRow::from))?;
        paths.insert("full_data".to_string(), full_path);

        let summary_path = self.output_path(&format!("{output_name}_summary"), "json");
        write_json(&summary_path, &FeatureSummary::new(records, &grid, &matrix))?;
        paths.insert("summary".to_string(), summary_path);

        for (name, path) in &paths {
            info!(target: EXPORT, kind = %name, path = %path.display(), "Exported features");
        }
        Ok(paths)
    }

    pub fn export_for_clustering(
        &self,
        records: &[TextRecord],
        standardize: bool,
        output_name: &str,
    ) -> Result<ExportPaths> {
        let mut paths = ExportPaths::new();
        let clustering = clustering_features(records, standardize);

        let features_path = self.output_path(&format!("{output_name}_features"), "npy");
        write_npy(&features_path, &clustering.features)?;
        paths.insert("features".to_string(), features_path);

        let labels_path = self.output_path(&format!("{output_name}_labels"), "json");
        write_json(&labels_path, &clustering.labels)?;
        paths.insert("labels".to_string(), labels_path);

        if let Some(scaler) = &clustering.scaler {
            let scaler_path = self.output_path(&format!("{output_name}_scaler"), "json");
            write_json(&scaler_path, scaler)?;
            paths.insert("scaler".to_string(), scaler_path);
        }

        info!(target: EXPORT, dir = %self.output_dir.display(), "Exported clustering data");
        Ok(paths)
    }

    pub fn export_text_only(
        &self,
        records: &[TextRecord],
        group_by: GroupBy,
        grouping: &GroupingConfig,
        output_name: &str,
    ) -> Result<PathBuf> {
        let path = self.output_path(output_name, "txt");
        fs::write(&path, render_text(records, group_by, grouping))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(target: EXPORT, path = %path.display(), %group_by, "Exported text");
        Ok(path)
    }

    pub fn create_visualization_data(&self, records: &[TextRecord], output_name: &str) -> Result<PathBuf> {
        #[derive(Serialize)]
        struct VizElement<'a> {
            text: &'a str,
            bbox: [f64; 4],
            center: [f64; 2],
            size: Option<f64>,
            area: f64,
        }

        #[derive(Serialize)]
        struct VizData<'a> {
            pages: BTreeMap<u32, Vec<VizElement<'a>>>,
            total_pages: usize,
            total_elements: usize,
        }

        let pages: BTreeMap<u32, Vec<VizElement<'_>>> = group_into_pages(records)
            .into_iter()
            .map(|(page_num, page_records)| {
                let elements = page_records
                    .into_iter()
                    .map(|r| VizElement {
                        text: &r.text,
                        bbox: [r.x0, r.y0, r.x1, r.y1],
                        center: [r.center_x(), r.center_y()],
                        size: r.font_size,
                        area: r.area(),
                    })
                    .collect();
                (page_num, elements)
            })
            .collect();

        let path = self.output_path(output_name, "json");
        let data = VizData {
            total_pages: pages.len(),
            total_elements: records.len(),
            pages,
        };
        write_json(&path, &data)?;
        info!(target: EXPORT, path = %path.display(), "Exported visualization data");
        Ok(path)
    }

    pub fn export_text_with_coordinates(&self, records: &[TextRecord], output_name: &str) -> Result<PathBuf> {
        let path = self.output_path(output_name, "txt");
        fs::write(&path, render_coordinate_report(records))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(target: EXPORT, path = %path.display(), "Exported text with coordinates");
        Ok(path)
    }

    /// Run every export `config` asks for. Visualization data and the
    /// coordinate report are always written.
    pub fn export_all(
        &self,
        records: &[TextRecord],
        page_dimensions: &PageDimensions,
        metadata: &ExportMetadata,
        config: &PipelineConfig,
        output_name: &str,
    ) -> Result<Vec<PathBuf>> {
        let formats = &config.export.formats;
        let mut files = Vec::new();

        if formats.json {
            files.push(self.export_to_json(records, metadata, output_name)?);
        }
        if formats.csv {
            files.push(self.export_to_csv(records, output_name)?);
        }
        if formats.features {
            let feature_paths =
                self.export_feature_vectors(records, page_dimensions, config.grid.size(), output_name)?;
            files.extend(feature_paths.into_values());
            let cluster_paths =
                self.export_for_clustering(records, true, &format!("{output_name}_clustering"))?;
            files.extend(cluster_paths.into_values());
        }
        if formats.text {
            files.push(self.export_text_only(
                records,
                config.export.group_by,
                &config.grouping,
                output_name,
            )?);
        }

        files.push(self.create_visualization_data(records, &format!("{output_name}_viz"))?);
        files.push(self.export_text_with_coordinates(records, &format!("{output_name}_coordinates"))?);

        Ok(files)
    }
}

/// Provenance written alongside the JSON export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub source_file: String,
    pub ocr_used: bool,
    pub normalized: bool,
    pub page_count: usize,
    pub config: PipelineConfig,
}

/// Record row plus the per-record flags of the full-data table.
#[derive(Debug, Serialize)]
struct FullDataRow<'a> {
    text: &'a str,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    width: f64,
    height: f64,
    center_x: f64,
    center_y: f64,
    area: f64,
    page_num: u32,
    font_size: Option<f64>,
    font_name: Option<&'a str>,
    text_length: usize,
    is_numeric: bool,
    is_uppercase: bool,
}

impl<'a> From<&'a TextRecord> for FullDataRow<'a> {
    fn from(record: &'a TextRecord) -> Self {
        let row = RecordRow::from(record);
        let flags = record_flags(record);
        FullDataRow {
            text: row.text,
            x0: row.x0,
            y0: row.y0,
            x1: row.x1,
            y1: row.y1,
            width: row.width,
            height: row.height,
            center_x: row.center_x,
            center_y: row.center_y,
            area: row.area,
            page_num: row.page_num,
            font_size: row.font_size,
            font_name: row.font_name,
            text_length: flags.text_length,
            is_numeric: flags.is_numeric,
            is_uppercase: flags.is_uppercase,
        }
    }
}

/// Text grouped by line (one per row), block (blank line between) or page
/// (with a page header).
pub fn render_text(records: &[TextRecord], group_by: GroupBy, grouping: &GroupingConfig) -> String {
    let mut out = String::new();
    match group_by {
        GroupBy::Line => {
            for line in group_into_lines(records, grouping.line_y_tolerance) {
                out.push_str(&line.text());
                out.push('\n');
            }
        }
        GroupBy::Block => {
            for block in group_into_blocks(records, grouping.block_x_tolerance, grouping.block_y_tolerance) {
                out.push_str(&block.text());
                out.push_str("\n\n");
            }
        }
        GroupBy::Page => {
            for (page_num, page_records) in group_into_pages(records) {
                let text = page_records
                    .iter()
                    .map(|r| r.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str(&format!("--- Page {page_num} ---\n{text}\n\n"));
            }
        }
    }
    out
}

/// Human-readable listing of every record with its coordinates, followed
/// by summary statistics and font usage.
pub fn render_coordinate_report(records: &[TextRecord]) -> String {
    CoordinateReport(records).to_string()
}

struct CoordinateReport<'a>(&'a [TextRecord]);

impl fmt::Display for CoordinateReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records = self.0;
        writeln!(f, "Extracted Text with Vector Coordinates")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Total elements: {}", records.len())?;
        writeln!(
            f,
            "Extraction date: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        for (page_num, mut page_records) in group_into_pages(records) {
            writeln!(f, "PAGE {page_num}")?;
            writeln!(f, "{}", "-".repeat(20))?;

            page_records.sort_by(|a, b| a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0)));
            for (i, r) in page_records.iter().enumerate() {
                write!(
                    f,
                    "[{:3}] \"{}\" -> ({:.1}, {:.1}, {:.1}, {:.1}) [center: ({:.1}, {:.1})] [size: {:.1}x{:.1}]",
                    i + 1,
                    r.text,
                    r.x0,
                    r.y0,
                    r.x1,
                    r.y1,
                    r.center_x(),
                    r.center_y(),
                    r.width(),
                    r.height()
                )?;
                if let Some(size) = r.font_size {
                    write!(f, " [font: {size:.1}pt]")?;
                }
                if let Some(name) = &r.font_name {
                    write!(f, " [{name}]")?;
                }
                writeln!(f)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "SUMMARY STATISTICS")?;
        writeln!(f, "{}", "=".repeat(20))?;

        if !records.is_empty() {
            let features = calculate_text_features(records);
            let (min_x, min_y, max_x, max_y) = records.iter().fold(
                (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
                |(a, b, c, d), r| (a.min(r.x0), b.min(r.y0), c.max(r.x1), d.max(r.y1)),
            );

            writeln!(f, "Total characters: {}", features.total_chars)?;
            if records.iter().any(|r| r.font_size.is_some()) {
                writeln!(f, "Average font size: {:.1}pt", features.avg_font_size)?;
            } else {
                writeln!(f, "Average font size: n/a")?;
            }
            writeln!(f, "Text bounding box: ({min_x:.1}, {min_y:.1}) to ({max_x:.1}, {max_y:.1})")?;
            writeln!(f, "Document area covered: {:.1} x {:.1}", max_x - min_x, max_y - min_y)?;
        }

        let mut font_counts: IndexMap<&str, usize> = IndexMap::new();
        for name in records.iter().filter_map(|r| r.font_name.as_deref()) {
            *font_counts.entry(name).or_default() += 1;
        }
        if !font_counts.is_empty() {
            font_counts.sort_by(|_, a, _, b| b.cmp(a));
            writeln!(f, "\nFonts used:")?;
            for (font, count) in &font_counts {
                writeln!(f, "  {font}: {count} elements")?;
            }
        }
        Ok(())
    }
}

/// Hex SHA-256 of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).with_context(|| format!("Failed to hash {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// The header is written up front so that an empty table still has one.
fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn write_npy(path: &Path, array: &Array2<f64>) -> Result<()> {
    ndarray_npy::write_npy(path, array).with_context(|| format!("Failed to write {}", path.display()))
}
