//! Scroll cursor over a remote cluster reached by HTTP.
//!
//! Opens a scroll with a match-all query, advances it until the remote
//! reports zero remaining hits, and clears the server-side scroll on close.
//! Remote failures surface as [`Error::RemoteUnreachable`]; end-of-data is a
//! clean `Ok(None)`, never an error.

use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::cluster::http::{SearchHit, SearchResponse};
use crate::common::DocumentBatch;
use crate::error::{Error, Result};
use crate::sources::Cursor;

/// Where and how to reach the remote source cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSourceConfig {
    /// Base URL of the remote cluster (host:port with scheme).
    pub url: String,
    /// Scroll keep-alive window, sent on open and on every advance.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_keep_alive() -> String {
    "5m".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl RemoteSourceConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            keep_alive: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug)]
pub struct RemoteCursor {
    client: reqwest::Client,
    base_url: String,
    keep_alive: String,
    scroll_id: Option<String>,
    /// First page, fetched at open time and handed out on the first pull.
    pending: Option<DocumentBatch>,
    exhausted: bool,
}

fn unreachable_err(what: &str, err: impl std::fmt::Display) -> Error {
    Error::RemoteUnreachable(format!("{what}: {err}"))
}

impl RemoteCursor {
    /// Opens the scroll and fetches the first page. A 404 on open means the
    /// source index/type does not exist on the remote; any other failure is
    /// [`Error::RemoteUnreachable`].
    pub async fn open(
        config: &RemoteSourceConfig,
        index: &str,
        doc_type: Option<&str>,
        batch_size: usize,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| unreachable_err("building http client", err))?;

        let base_url = config.url.trim_end_matches('/').to_string();
        let search_url = match doc_type {
            Some(doc_type) => format!("{base_url}/{index}/{doc_type}/_search"),
            None => format!("{base_url}/{index}/_search"),
        };
        let body = json!({
            "size": batch_size,
            "query": { "match_all": {} },
        });
        let response = client
            .post(&search_url)
            .query(&[("scroll", config.keep_alive.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| unreachable_err("opening remote scroll", err))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::SourceNotFound(format!("{index} on {base_url}")));
        }
        let page = Self::parse_page(response, "opening remote scroll").await?;
        debug!(index, ?doc_type, hits = page.hits.hits.len(), "remote scroll open");

        let mut cursor = Self {
            client,
            base_url,
            keep_alive: config.keep_alive.clone(),
            scroll_id: page.scroll_id,
            pending: None,
            exhausted: false,
        };
        cursor.accept_page(page.hits.hits);
        Ok(cursor)
    }

    async fn parse_page(response: reqwest::Response, what: &str) -> Result<SearchResponse> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteUnreachable(format!(
                "{what} returned {status}: {body}"
            )));
        }
        response
            .json::<SearchResponse>()
            .await
            .map_err(|err| unreachable_err(what, err))
    }

    fn accept_page(&mut self, hits: Vec<SearchHit>) {
        if hits.is_empty() {
            self.exhausted = true;
        } else {
            self.pending = Some(DocumentBatch::new(
                hits.into_iter().map(SearchHit::into_document).collect(),
            ));
        }
    }

    async fn advance(&mut self) -> Result<()> {
        let Some(scroll_id) = self.scroll_id.clone() else {
            self.exhausted = true;
            return Ok(());
        };
        let body = json!({
            "scroll": self.keep_alive,
            "scroll_id": scroll_id,
        });
        let response = self
            .client
            .post(format!("{}/_search/scroll", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| unreachable_err("advancing remote scroll", err))?;
        let page = Self::parse_page(response, "advancing remote scroll").await?;
        if page.scroll_id.is_some() {
            self.scroll_id = page.scroll_id;
        }
        self.accept_page(page.hits.hits);
        Ok(())
    }
}

#[async_trait]
impl Cursor for RemoteCursor {
    async fn next_batch(&mut self) -> Result<Option<DocumentBatch>> {
        if let Some(batch) = self.pending.take() {
            return Ok(Some(batch));
        }
        if self.exhausted {
            return Ok(None);
        }
        self.advance().await?;
        Ok(self.pending.take())
    }

    async fn close(&mut self) -> AnyResult<()> {
        self.exhausted = true;
        let Some(scroll_id) = self.scroll_id.take() else {
            return Ok(());
        };
        let result = self
            .client
            .delete(format!("{}/_search/scroll", self.base_url))
            .json(&json!({ "scroll_id": [scroll_id] }))
            .send()
            .await
            .context("clearing remote scroll");
        if let Err(err) = result {
            // Server-side scroll state expires on its own keep-alive; a failed
            // clear is worth a warning, not a failed request.
            warn!("failed to clear remote scroll: {err:#}");
        }
        Ok(())
    }
}
