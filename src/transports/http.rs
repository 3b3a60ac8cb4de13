//! HTTP table listing for the polling fallback, using `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::trace;
use url::Url;

use crate::config::LobbyConfig;
use crate::error::{LobbyError, Result};
use crate::poller::TableFetcher;
use crate::protocol::TableSummary;

/// Response bodies the lobby has used for its table listing.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TablesBody {
    Bare(Vec<TableSummary>),
    Wrapped { tables: Vec<TableSummary> },
}

impl From<TablesBody> for Vec<TableSummary> {
    fn from(body: TablesBody) -> Self {
        match body {
            TablesBody::Bare(tables) | TablesBody::Wrapped { tables } => tables,
        }
    }
}

/// [`TableFetcher`] that issues `GET <tables endpoint>`.
#[derive(Debug, Clone)]
pub struct HttpTableFetcher {
    client: Client,
    url: Url,
}

impl HttpTableFetcher {
    /// Create a fetcher for an absolute table listing URL.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Config`] if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| LobbyError::Config(format!("invalid tables URL {url:?}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LobbyError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    /// Create a fetcher for `config.tables_endpoint`, resolved against the
    /// realtime endpoint when it is relative.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Config`] if either address is not a valid URL.
    pub fn from_config(config: &LobbyConfig) -> Result<Self> {
        let url = tables_url(config)?;
        Self::new(url.as_str(), config.request_timeout)
    }

    /// The URL this fetcher polls.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

fn tables_url(config: &LobbyConfig) -> Result<Url> {
    let base = config.resolved_endpoint();
    let base = Url::parse(base)
        .map_err(|e| LobbyError::Config(format!("invalid lobby endpoint {base:?}: {e}")))?;
    base.join(&config.tables_endpoint).map_err(|e| {
        LobbyError::Config(format!(
            "invalid tables endpoint {:?}: {e}",
            config.tables_endpoint
        ))
    })
}

#[async_trait]
impl TableFetcher for HttpTableFetcher {
    async fn fetch_tables(&self) -> Result<Vec<TableSummary>> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LobbyError::Fetch("request timed out".into())
                } else if e.is_connect() {
                    LobbyError::Fetch(format!("failed to connect to {}", self.url))
                } else {
                    LobbyError::Fetch(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LobbyError::Fetch(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(LobbyError::Fetch(format!(
                "table listing returned {status}: {body}"
            )));
        }

        let tables: Vec<TableSummary> = serde_json::from_str::<TablesBody>(&body)?.into();
        trace!(tables = tables.len(), "fetched lobby tables");
        Ok(tables)
    }
}
