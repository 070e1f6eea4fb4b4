//! Table extraction against a copy of the source page

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use test_log::test;

use bank_etl::api::RawDocument;
use bank_etl::extract::{MarkerTableExtractor, TableExtractor};
use bank_etl::models::{ColumnKind, Value};
use bank_etl::EtlError;

use crate::common::{logging, test_data};

#[test]
fn test_extracts_market_cap_table() {
    logging::log_test_step("Extracting the market capitalization table");

    let document = RawDocument::from(test_data::BANKS_PAGE);
    let table = MarkerTableExtractor
        .extract(&document, test_data::MARKER)
        .expect("Failed to extract table");
    logging::log_test_data("Extracted columns", &table.columns());

    assert_eq!(table.columns(), &["Rank", "Bank name", test_data::BASE_COLUMN]);
    assert_eq!(table.row_count(), 6);
    assert_eq!(table.column_kind(0), ColumnKind::Integer);
    assert_eq!(table.column_kind(2), ColumnKind::Real);

    let names: Vec<&str> = table
        .column_values("Bank name")
        .unwrap()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(
        names,
        vec![
            "JPMorgan Chase",
            "Bank of America",
            "Industrial and Commercial Bank of China",
            "Agricultural Bank of China",
            "HDFC Bank",
            "Wells Fargo",
        ]
    );
    assert_eq!(table.get(5, test_data::BASE_COLUMN), Some(&Value::Real(155.87)));
}

#[test]
fn test_first_marker_wins_over_other_tables() {
    let document = RawDocument::from(test_data::BANKS_PAGE);
    let table = MarkerTableExtractor
        .extract(&document, "By total assets")
        .expect("Failed to extract table");

    assert_eq!(table.row_count(), 1);
    assert_eq!(table.get(0, "Total assets (US$ billion)"), Some(&Value::Real(5742.86)));
}

#[test]
fn test_tied_rank_rowspan() {
    let page = r#"<h2>By market capitalization</h2>
        <table class="wikitable">
          <tr><th>Rank</th><th>Bank name</th><th>Market cap<br>(US$ billion)</th></tr>
          <tr><td rowspan="2">5</td><td>HDFC Bank</td><td>157.91</td></tr>
          <tr><td>Wells Fargo</td><td>157.91</td></tr>
        </table>"#;

    let table = MarkerTableExtractor
        .extract(&RawDocument::from(page), test_data::MARKER)
        .expect("Failed to extract table");

    assert_eq!(table.columns(), &["Rank", "Bank name", test_data::BASE_COLUMN]);
    assert_eq!(
        table.rows(),
        &[
            vec![Value::Integer(5), Value::from("HDFC Bank"), Value::Real(157.91)],
            vec![Value::Integer(5), Value::from("Wells Fargo"), Value::Real(157.91)],
        ]
    );
}

#[test]
fn test_nonexistent_marker_fails() {
    let document = RawDocument::from(test_data::BANKS_PAGE);
    let result = MarkerTableExtractor.extract(&document, "Nonexistent Marker");
    assert_matches!(result, Err(EtlError::Extraction(_)));
}

#[test]
fn test_marker_must_match_whole_text_node() {
    let document = RawDocument::from(test_data::BANKS_PAGE);
    let result = MarkerTableExtractor.extract(&document, "By market");
    assert_matches!(result, Err(EtlError::Extraction(_)));
}
