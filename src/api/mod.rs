use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{EtlError, Result};

/// HTML text of a fetched page, consumed once by the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument(String);

impl RawDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RawDocument {
    fn from(html: String) -> Self {
        Self(html)
    }
}

impl From<&str> for RawDocument {
    fn from(html: &str) -> Self {
        Self(html.to_string())
    }
}

/// Where the pipeline gets its source page from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawDocument>;
}

/// Fetches pages with one GET per call; every request carries the configured timeout
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bank-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(client_error)?;

        Ok(Self { client })
    }
}

fn client_error(source: reqwest::Error) -> EtlError {
    EtlError::Config(format!("failed to build HTTP client: {}", source))
}

#[async_trait]
impl DocumentSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RawDocument> {
        let network = |source| EtlError::Network {
            url: url.to_string(),
            source,
        };

        info!("🌐 Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(network)?
            .error_for_status()
            .map_err(network)?;

        let html = response.text().await.map_err(network)?;
        debug!("Fetched {} bytes from {}", html.len(), url);

        Ok(RawDocument(html))
    }
}
