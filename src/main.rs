use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bank_etl::api::HttpFetcher;
use bank_etl::extract::MarkerTableExtractor;
use bank_etl::models::Config;
use bank_etl::progress_log::ProgressLog;
use bank_etl::EtlPipeline;

/// Largest-banks ETL: scrape, convert currencies, load to CSV and SQLite
#[derive(Parser)]
#[command(name = "bank-etl")]
#[command(version)]
#[command(about = "Fetch the largest-banks table, add GBP/EUR/INR market caps, save it to CSV and SQLite and run the report queries")]
struct Args {
    /// Page holding the table
    #[arg(long)]
    url: Option<String>,

    /// Text label that precedes the table
    #[arg(long)]
    marker: Option<String>,

    /// Exchange rate CSV (Currency,Rate)
    #[arg(long)]
    rates: Option<PathBuf>,

    /// Output CSV path
    #[arg(long)]
    csv: Option<PathBuf>,

    /// SQLite database file
    #[arg(long)]
    database: Option<PathBuf>,

    /// Table to replace in the database
    #[arg(long)]
    table: Option<String>,

    /// Progress log file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print query results as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.url {
            config.source_url = url;
        }
        if let Some(marker) = self.marker {
            config.marker_text = marker;
        }
        if let Some(rates) = self.rates {
            config.rates_path = rates;
        }
        if let Some(csv) = self.csv {
            config.csv_path = csv;
        }
        if let Some(database) = self.database {
            config.database_path = database;
        }
        if let Some(table) = self.table {
            config.table_name = table;
        }
        if let Some(log_file) = self.log_file {
            config.log_path = log_file;
        }
        if let Some(secs) = self.timeout_secs {
            config.http_timeout = Duration::from_secs(secs);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bank_etl=info"));
    tracing_subscriber::fmt().with_env_filter(env).init();

    let args = Args::parse();
    let json = args.json;

    let mut config = Config::from_env().context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate()?;

    info!("🚀 Starting ETL run for {}", config.source_url);

    let fetcher = HttpFetcher::new(config.http_timeout)?;
    let log = ProgressLog::open(&config.log_path);
    let mut pipeline = EtlPipeline::new(config, Box::new(fetcher), Box::new(MarkerTableExtractor), log);

    let report = pipeline.run().await.context("ETL run failed")?;

    for (sql, result) in &report.queries {
        println!("{}", sql);
        if json {
            println!("{}", serde_json::to_string_pretty(result)?);
        } else {
            println!("{}\n", result);
        }
    }

    Ok(())
}
