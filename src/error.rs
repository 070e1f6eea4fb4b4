//! Error type shared by every pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::TableError;

pub type Result<T, E = EtlError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("failed to fetch {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("table extraction failed: {0}")]
    Extraction(String),
    #[error("currency transform failed: {0}")]
    Transform(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage error on `{target}`: {source}")]
    Storage {
        target: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("query `{sql}` failed: {source}")]
    Query {
        sql: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("configuration error: {0}")]
    Config(String),
}

impl EtlError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn extraction(err: TableError) -> Self {
        Self::Extraction(err.to_string())
    }

    pub(crate) fn transform(err: TableError) -> Self {
        Self::Transform(err.to_string())
    }
}
