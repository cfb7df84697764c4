mod common;

use common::{assert_close, dims, record, sized};
use ndarray::Array2;
use pdf_coords::features::{
    calculate_text_features, clustering_features, create_feature_matrix, create_spatial_grid_features,
    extract_text_patterns, record_flags, FeatureSummary, TextFeatures, TextPatterns,
};
use pdf_coords::model::{FEATURE_COLUMNS, FEATURE_VECTOR_LEN};
use pretty_assertions::assert_eq;

#[test]
fn test_aggregate_features_of_empty_input_are_zero() {
    let features = calculate_text_features(&[]);
    assert_eq!(features, TextFeatures::default());
    assert_eq!(features.to_vector(), vec![0.0; TextFeatures::NAMES.len()]);
}

#[test]
fn test_aggregate_features_two_records() {
    let records = vec![
        sized("ab", (0.0, 0.0, 10.0, 10.0), 1, 10.0),
        sized("cdef", (20.0, 0.0, 30.0, 10.0), 1, 14.0),
    ];

    let features = calculate_text_features(&records);

    assert_eq!(features.num_elements, 2);
    assert_close(features.total_area, 200.0);
    assert_close(features.avg_area, 100.0);
    assert_close(features.avg_font_size, 12.0);
    assert_eq!(features.total_chars, 6);
    assert_close(features.text_density, 6.0 / 200.0);
    // Centers at x = 5 and 25: population std is 10.
    assert_close(features.spatial_spread_x, 10.0);
    assert_close(features.spatial_spread_y, 0.0);
    // Union bbox is 30 x 10.
    assert_close(features.coverage_ratio, 200.0 / 300.0);
}

#[test]
fn test_avg_font_size_ignores_records_without_size() {
    let records = vec![
        sized("a", (0.0, 0.0, 1.0, 1.0), 1, 12.0),
        record("b", 2.0, 0.0, 3.0, 1.0, 1),
    ];
    assert_close(calculate_text_features(&records).avg_font_size, 12.0);

    let r#unsized = vec![record("b", 2.0, 0.0, 3.0, 1.0, 1)];
    assert_close(calculate_text_features(&r#unsized).avg_font_size, 0.0);
}

#[test]
fn test_single_record_has_no_spread() {
    let records = vec![record("solo", 100.0, 100.0, 140.0, 110.0, 1)];
    let features = calculate_text_features(&records);
    assert_close(features.spatial_spread_x, 0.0);
    assert_close(features.spatial_spread_y, 0.0);
    assert_close(features.coverage_ratio, 1.0);
}

#[test]
fn test_degenerate_boxes_do_not_divide_by_zero() {
    let records = vec![record("|", 5.0, 5.0, 5.0, 5.0, 1)];
    let features = calculate_text_features(&records);
    assert_close(features.text_density, 0.0);
    assert_close(features.coverage_ratio, 0.0);
}

#[test]
fn test_text_length_counts_characters_not_bytes() {
    let records = vec![record("héllo", 0.0, 0.0, 10.0, 10.0, 1)];
    assert_eq!(calculate_text_features(&records).total_chars, 5);
    assert_eq!(record_flags(&records[0]).text_length, 5);
}

#[test]
fn test_grid_single_cell() {
    let records = vec![record("Hello", 10.0, 10.0, 20.0, 20.0, 1)];
    let page_dims = dims(&[(1, 100.0, 100.0)]);

    let grid = create_spatial_grid_features(&records, &page_dims, (10, 10));

    let mut expected = Array2::<f64>::zeros((10, 10));
    expected[[1, 1]] = 5.0;
    assert_eq!(grid, expected);
}

#[test]
fn test_grid_counts_every_overlapped_cell() {
    let records = vec![record("abc", 5.0, 5.0, 15.0, 5.0, 1)];
    let page_dims = dims(&[(1, 100.0, 100.0)]);

    let grid = create_spatial_grid_features(&records, &page_dims, (10, 10));

    assert_close(grid[[0, 0]], 3.0);
    assert_close(grid[[0, 1]], 3.0);
    assert_close(grid.sum(), 6.0);
}

#[test]
fn test_grid_clips_out_of_page_boxes() {
    let records = vec![record("edge", 95.0, 95.0, 150.0, 150.0, 1)];
    let page_dims = dims(&[(1, 100.0, 100.0)]);

    let grid = create_spatial_grid_features(&records, &page_dims, (10, 10));

    assert_close(grid[[9, 9]], 4.0);
    assert_close(grid.sum(), 4.0);
}

#[test]
fn test_grid_averages_pages_and_skips_unknown_ones() {
    let records = vec![
        record("aaaa", 0.0, 0.0, 1.0, 1.0, 1),
        record("bb", 0.0, 0.0, 1.0, 1.0, 2),
        record("ignored", 0.0, 0.0, 1.0, 1.0, 3),
    ];
    let page_dims = dims(&[(1, 100.0, 100.0), (2, 100.0, 100.0), (3, 0.0, 100.0)]);

    let grid = create_spatial_grid_features(&records, &page_dims, (2, 2));

    assert_close(grid[[0, 0]], 3.0);
    assert_close(grid.sum(), 3.0);
}

#[test]
fn test_grid_without_known_pages_is_zero() {
    let records = vec![record("x", 0.0, 0.0, 1.0, 1.0, 1)];
    let grid = create_spatial_grid_features(&records, &dims(&[]), (4, 3));
    assert_eq!(grid, Array2::<f64>::zeros((4, 3)));
}

#[test]
fn test_text_patterns() {
    let records = vec![
        record("Contact", 0.0, 0.0, 1.0, 1.0, 1),
        record("jane.doe@example.com", 0.0, 0.0, 1.0, 1.0, 1),
        record("555-123-4567", 0.0, 0.0, 1.0, 1.0, 1),
        record("on", 0.0, 0.0, 1.0, 1.0, 1),
        record("12/31/2024", 0.0, 0.0, 1.0, 1.0, 1),
        record("NASA", 0.0, 0.0, 1.0, 1.0, 1),
    ];

    let patterns = extract_text_patterns(&records);

    assert!(patterns.has_email);
    assert!(patterns.has_phone);
    assert!(!patterns.has_url);
    assert!(patterns.has_date);
    assert_eq!(patterns.num_uppercase_words, 1);
    // 555, 123, 4567, 12, 31, 2024
    assert_eq!(patterns.num_numbers, 6);
}

#[test]
fn test_text_patterns_of_empty_input() {
    let patterns = extract_text_patterns(&[]);
    assert_eq!(patterns, TextPatterns::default());
    assert_close(patterns.avg_word_length, 0.0);
    assert_eq!(patterns.to_vector().len(), TextPatterns::NAMES.len());
}

#[test]
fn test_url_pattern_and_word_length() {
    let records = vec![
        record("see", 0.0, 0.0, 1.0, 1.0, 1),
        record("https://example.org/a", 0.0, 0.0, 1.0, 1.0, 1),
    ];
    let patterns = extract_text_patterns(&records);
    assert!(patterns.has_url);
    assert_close(patterns.avg_word_length, (3.0 + 21.0) / 2.0);
}

#[test]
fn test_feature_matrix_rows() {
    let records = vec![
        sized("a", (0.0, 0.0, 10.0, 20.0), 2, 9.0),
        record("b", 10.0, 10.0, 30.0, 20.0, 1),
    ];

    let matrix = create_feature_matrix(&records, &dims(&[(1, 100.0, 100.0)]));

    assert_eq!(matrix.elements.dim(), (2, FEATURE_VECTOR_LEN));
    assert_eq!(FEATURE_COLUMNS.len(), FEATURE_VECTOR_LEN);
    assert_eq!(
        matrix.elements.row(0).to_vec(),
        vec![0.0, 0.0, 10.0, 20.0, 5.0, 10.0, 10.0, 20.0, 200.0, 9.0, 2.0]
    );
    // Missing font size becomes 0.
    assert_close(matrix.elements[[1, 9]], 0.0);
    assert_eq!(matrix.aggregate.len(), TextFeatures::NAMES.len());
    assert_eq!(matrix.patterns.len(), TextPatterns::NAMES.len());
}

#[test]
fn test_feature_matrix_of_empty_input() {
    let matrix = create_feature_matrix(&[], &dims(&[]));
    assert!(matrix.is_empty());
    assert_eq!(matrix.elements.dim(), (0, FEATURE_VECTOR_LEN));
    assert!(matrix.aggregate.iter().all(|v| *v == 0.0));
    assert!(matrix.patterns.iter().all(|v| *v == 0.0));
}

#[test]
fn test_record_flags() {
    let flags = record_flags(&record("1,234.50", 0.0, 0.0, 1.0, 1.0, 1));
    assert!(flags.is_numeric);
    assert!(!flags.is_uppercase);

    let flags = record_flags(&record("ABC-1", 0.0, 0.0, 1.0, 1.0, 1));
    assert!(!flags.is_numeric);
    assert!(flags.is_uppercase);

    let flags = record_flags(&record("Mixed", 0.0, 0.0, 1.0, 1.0, 1));
    assert!(!flags.is_uppercase);
}

#[test]
fn test_clustering_features_standardized() {
    let records = vec![
        sized("a", (0.0, 0.0, 10.0, 10.0), 1, 12.0),
        sized("bb", (20.0, 0.0, 30.0, 10.0), 1, 12.0),
    ];

    let clustering = clustering_features(&records, true);

    assert_eq!(clustering.features.dim(), (2, 7));
    assert_eq!(clustering.labels, vec!["a".to_string(), "bb".to_string()]);
    let scaler = clustering.scaler.expect("scaler present when standardized");
    assert_close(scaler.mean[0], 15.0);
    assert_close(scaler.scale[0], 10.0);
    // Constant font size column scales by 1.0 and centers to 0.
    assert_close(scaler.scale[6], 1.0);
    assert_close(clustering.features[[0, 0]], -1.0);
    assert_close(clustering.features[[1, 0]], 1.0);
    assert_close(clustering.features[[0, 6]], 0.0);
}

#[test]
fn test_clustering_features_raw() {
    let records = vec![record("abc", 0.0, 0.0, 4.0, 2.0, 1)];
    let clustering = clustering_features(&records, false);
    assert!(clustering.scaler.is_none());
    assert_eq!(
        clustering.features.row(0).to_vec(),
        vec![2.0, 1.0, 4.0, 2.0, 8.0, 3.0, 0.0]
    );
}

#[test]
fn test_feature_summary() {
    let records = vec![
        record("a", 0.0, 0.0, 1.0, 1.0, 1),
        record("b", 0.0, 0.0, 1.0, 1.0, 3),
    ];
    let page_dims = dims(&[(1, 10.0, 10.0), (3, 10.0, 10.0)]);
    let grid = create_spatial_grid_features(&records, &page_dims, (5, 4));
    let matrix = create_feature_matrix(&records, &page_dims);

    let summary = FeatureSummary::new(&records, &grid, &matrix);

    assert_eq!(summary.total_elements, 2);
    assert_eq!(summary.total_pages, 2);
    assert_eq!(summary.spatial_grid_shape, [5, 4]);
    assert_eq!(summary.feature_matrix_shape, [2, FEATURE_VECTOR_LEN]);
}
