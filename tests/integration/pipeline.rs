//! End-to-end runs: mock HTTP server, real extractor, files in a temp dir

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bank_etl::api::HttpFetcher;
use bank_etl::csv_io::read_csv;
use bank_etl::extract::MarkerTableExtractor;
use bank_etl::models::{Config, Value};
use bank_etl::progress_log::ProgressLog;
use bank_etl::{EtlError, EtlPipeline};

use crate::common::{logging, test_data, TestWorkspace};

const PAGE_PATH: &str = "/wiki/List_of_largest_banks";

async fn serve(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PAGE_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn pipeline_for(config: Config) -> EtlPipeline {
    let fetcher = HttpFetcher::new(Duration::from_secs(5)).expect("Failed to build fetcher");
    let log = ProgressLog::open(&config.log_path);
    EtlPipeline::new(config, Box::new(fetcher), Box::new(MarkerTableExtractor), log)
}

/// Message part of each progress log line
fn messages(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(|line| line.split_once(": ").map_or(line.as_str(), |(_, message)| message))
        .collect()
}

#[tokio::test]
async fn test_full_run_against_mock_server() {
    logging::init_test_logging();
    logging::log_test_step("Running the whole pipeline against a mock page");

    let server = serve(200, test_data::BANKS_PAGE).await;
    let workspace = TestWorkspace::new();
    let config = workspace.config(&format!("{}{}", server.uri(), PAGE_PATH));

    let report = pipeline_for(config).run().await.expect("Pipeline failed");
    logging::log_test_data("Query results", &report.queries);

    // CSV sink
    let saved = read_csv(&workspace.csv_path).expect("Failed to read CSV");
    assert_eq!(saved.row_count(), 6);
    assert_eq!(
        saved.columns(),
        &[
            "Rank",
            "Bank name",
            test_data::BASE_COLUMN,
            "MC_GBP_Billion",
            "MC_EUR_Billion",
            "MC_INR_Billion",
        ]
    );
    assert_eq!(saved.get(0, "MC_GBP_Billion"), Some(&Value::Real(346.34)));
    assert_eq!(saved.get(0, "MC_EUR_Billion"), Some(&Value::Real(402.62)));
    assert_eq!(saved.get(0, "MC_INR_Billion"), Some(&Value::Real(35499.44)));

    // Queries
    assert_eq!(report.queries.len(), 3);
    assert_eq!(report.queries[0].1.len(), 6);
    assert_eq!(report.queries[2].1.len(), 5);
    assert_eq!(
        report.queries[2].1.rows()[0],
        vec![Value::from("JPMorgan Chase")]
    );

    // Progress log
    let lines = workspace.log_lines();
    assert_eq!(
        messages(&lines),
        vec![
            "Preliminaries complete. Initiating ETL process",
            "Data extraction complete. Initiating Transformation process",
            "Data transformation complete. Initiating Loading process",
            "Data saved to CSV file",
            "Data loaded to Database as a table, Executing queries",
            "Process Complete",
            "Process Complete",
            "Process Complete",
        ]
    );
}

#[tokio::test]
async fn test_second_run_appends_log_and_replaces_table() {
    let server = serve(200, test_data::BANKS_PAGE).await;
    let workspace = TestWorkspace::new();
    let url = format!("{}{}", server.uri(), PAGE_PATH);

    pipeline_for(workspace.config(&url)).run().await.unwrap();
    let report = pipeline_for(workspace.config(&url)).run().await.unwrap();

    // Same row count, not doubled
    assert_eq!(report.queries[0].1.len(), 6);
    assert_eq!(workspace.log_lines().len(), 16);
}

#[tokio::test]
async fn test_log_line_format() {
    let server = serve(200, test_data::BANKS_PAGE).await;
    let workspace = TestWorkspace::new();
    pipeline_for(workspace.config(&format!("{}{}", server.uri(), PAGE_PATH)))
        .run()
        .await
        .unwrap();

    for line in workspace.log_lines() {
        let (timestamp, _) = line.split_once(": ").expect("line has a timestamp");
        assert!(
            chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S%.6f").is_ok(),
            "bad timestamp in {:?}",
            line
        );
    }
}

#[tokio::test]
async fn test_missing_marker_writes_nothing() {
    let server = serve(200, "<html><body><p>Page moved</p></body></html>").await;
    let workspace = TestWorkspace::new();
    let config = workspace.config(&format!("{}{}", server.uri(), PAGE_PATH));

    let result = pipeline_for(config).run().await;

    assert_matches!(result, Err(EtlError::Extraction(_)));
    assert!(!workspace.csv_path.exists());
    assert!(!workspace.database_path.exists());
    assert_eq!(
        messages(&workspace.log_lines()),
        vec!["Preliminaries complete. Initiating ETL process"]
    );
}

#[tokio::test]
async fn test_server_error_aborts_run() {
    let server = serve(500, "boom").await;
    let workspace = TestWorkspace::new();
    let config = workspace.config(&format!("{}{}", server.uri(), PAGE_PATH));

    let result = pipeline_for(config).run().await;

    assert_matches!(result, Err(EtlError::Network { .. }));
    assert!(!workspace.csv_path.exists());
}

#[tokio::test]
async fn test_bad_query_fails_after_load() {
    let server = serve(200, test_data::BANKS_PAGE).await;
    let workspace = TestWorkspace::new();
    let config = workspace.config(&format!("{}{}", server.uri(), PAGE_PATH));

    let queries = vec![
        "SELECT COUNT(*) FROM Largest_banks".to_string(),
        "SELECT * FROM Smallest_banks".to_string(),
    ];
    let result = pipeline_for(config).run_with_queries(&queries).await;

    assert_matches!(result, Err(EtlError::Query { sql, .. }) if sql == queries[1]);
    // Loading finished before the failing query
    assert!(workspace.csv_path.exists());
    assert_eq!(
        messages(&workspace.log_lines()).last(),
        Some(&"Process Complete")
    );
}
