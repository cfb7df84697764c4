use crate::logging::FEATURES;
use crate::model::{page_size, PageDimensions, TextRecord};

/// Rescale coordinates into page-relative `[0, 1]` space.
///
/// Returns a new sequence in input order. x-values are divided by the page
/// width and y-values by the page height; text, page number and font
/// metadata are copied unchanged. Records whose page has no usable
/// dimensions are copied through as-is.
pub fn normalize_coordinates(records: &[TextRecord], page_dimensions: &PageDimensions) -> Vec<TextRecord> {
    let mut passed_through = 0usize;

    let normalized: Vec<TextRecord> = records
        .iter()
        .map(|record| match page_size(page_dimensions, record.page_num) {
            Some((width, height)) => TextRecord {
                x0: record.x0 / width,
                y0: record.y0 / height,
                x1: record.x1 / width,
                y1: record.y1 / height,
                ..record.clone()
            },
            None => {
                passed_through += 1;
                record.clone()
            }
        })
        .collect();

    if passed_through > 0 {
        tracing::debug!(
            target: FEATURES,
            passed_through,
            "Records without page dimensions were left unnormalized"
        );
    }

    normalized
}
