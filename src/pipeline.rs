//! Runs the stages in order: fetch, extract, transform, then the CSV sink
//! and the database sink followed by the queries.

use tracing::{error, info};

use crate::api::DocumentSource;
use crate::csv_io::save_csv;
use crate::database::DatabaseManager;
use crate::error::Result;
use crate::extract::TableExtractor;
use crate::models::{Config, EnrichedTable, QueryResult};
use crate::progress_log::ProgressLog;
use crate::transform::{load_rates, transform};

/// Outcome of a successful run
#[derive(Debug)]
pub struct PipelineReport {
    pub enriched: EnrichedTable,
    pub queries: Vec<(String, QueryResult)>,
}

pub struct EtlPipeline {
    config: Config,
    source: Box<dyn DocumentSource>,
    extractor: Box<dyn TableExtractor>,
    log: ProgressLog,
}

impl EtlPipeline {
    pub fn new(
        config: Config,
        source: Box<dyn DocumentSource>,
        extractor: Box<dyn TableExtractor>,
        log: ProgressLog,
    ) -> Self {
        Self {
            config,
            source,
            extractor,
            log,
        }
    }

    /// Run every stage with the default queries.
    pub async fn run(&mut self) -> Result<PipelineReport> {
        let queries = self.config.default_queries();
        self.run_with_queries(&queries).await
    }

    /// Run every stage; the first failure aborts the rest.
    pub async fn run_with_queries(&mut self, queries: &[String]) -> Result<PipelineReport> {
        self.log.log("Preliminaries complete. Initiating ETL process");

        let document = self.source.fetch(&self.config.source_url).await?;
        let table = self.extractor.extract(&document, &self.config.marker_text)?;
        drop(document);
        self.log.log("Data extraction complete. Initiating Transformation process");

        let rates = load_rates(&self.config.rates_path)?;
        let enriched = transform(table, &rates, &self.config.base_column)?;
        self.log.log("Data transformation complete. Initiating Loading process");

        save_csv(&enriched, &self.config.csv_path)?;
        self.log.log("Data saved to CSV file");

        let database = DatabaseManager::open(&self.config.database_path).await?;
        let outcome = self.load_and_query(&database, &enriched, queries).await;
        database.close().await;

        match outcome {
            Ok(results) => {
                info!("🎉 Pipeline finished: {} rows, {} queries", enriched.row_count(), results.len());
                Ok(PipelineReport {
                    enriched,
                    queries: results,
                })
            }
            Err(e) => {
                error!("❌ Database stage failed: {}", e);
                Err(e)
            }
        }
    }

    async fn load_and_query(
        &mut self,
        database: &DatabaseManager,
        enriched: &EnrichedTable,
        queries: &[String],
    ) -> Result<Vec<(String, QueryResult)>> {
        database.save_table(enriched, &self.config.table_name).await?;
        self.log.log("Data loaded to Database as a table, Executing queries");

        let mut results = Vec::with_capacity(queries.len());
        for sql in queries {
            let result = database.run_query(sql).await?;
            self.log.log("Process Complete");
            results.push((sql.clone(), result));
        }
        Ok(results)
    }
}
