//! Scratch directories and databases for tests

use std::path::PathBuf;

use bank_etl::database::DatabaseManager;
use bank_etl::models::Config;
use tempfile::TempDir;

use super::test_data;

/// A temporary directory laid out like a pipeline run
pub struct TestWorkspace {
    pub dir: TempDir,
    pub rates_path: PathBuf,
    pub csv_path: PathBuf,
    pub database_path: PathBuf,
    pub log_path: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let rates_path = dir.path().join("exchange_rate.csv");
        std::fs::write(&rates_path, test_data::rates_csv()).expect("Failed to write rates");

        Self {
            rates_path,
            csv_path: dir.path().join("Largest_banks_data.csv"),
            database_path: dir.path().join("Banks.db"),
            log_path: dir.path().join("code_log.txt"),
            dir,
        }
    }

    /// Pipeline configuration pointing every output into the workspace
    pub fn config(&self, source_url: &str) -> Config {
        Config {
            source_url: source_url.to_string(),
            rates_path: self.rates_path.clone(),
            csv_path: self.csv_path.clone(),
            database_path: self.database_path.clone(),
            log_path: self.log_path.clone(),
            ..Config::default()
        }
    }

    pub fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log_path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Initialize a completely fresh file-backed test database
pub async fn init_fresh_test_database() -> (TestWorkspace, DatabaseManager) {
    let workspace = TestWorkspace::new();
    let database = DatabaseManager::open(&workspace.database_path)
        .await
        .expect("Failed to open test database");
    (workspace, database)
}
