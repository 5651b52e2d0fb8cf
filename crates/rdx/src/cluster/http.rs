//! Document store over HTTP.
//!
//! Speaks the cluster's REST surface: index create/exists, `_mapping` get/put,
//! `_bulk` NDJSON writes, `_count`, scroll-backed `_search` scans, and
//! `_refresh`. Scans run as server-side scrolls, never from/size pagination,
//! so deep pages stay inside the cluster's result window. Every request
//! carries the configured connect/read timeouts; nothing here retries, the
//! bulk writer owns the retry budget.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json, value::RawValue};
use tracing::debug;

use crate::bulk::render_bulk_payload;
use crate::cluster::{BulkOp, DocumentStore, ItemOutcome, ScanPage, ScanToken, TypeMapping};
use crate::common::{Document, ParentLink};
use crate::error::{Error, Result};

/// Connection settings for one cluster. API key wins over basic auth when
/// both are configured.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpClusterConfig {
    /// Base URL of the cluster, scheme and port included.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Keep-alive window for the server-side scrolls backing scans.
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_scroll_keep_alive() -> String {
    "5m".to_string()
}

impl HttpClusterConfig {
    pub fn for_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            scroll_keep_alive: default_scroll_keep_alive(),
        }
    }
}

/// One hit from a `_search` or scroll response. `_source` stays raw.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source")]
    pub source: Box<RawValue>,
    #[serde(rename = "_parent", default)]
    pub parent: Option<String>,
    #[serde(rename = "_routing", default)]
    pub routing: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHits {
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    pub hits: SearchHits,
}

impl SearchHit {
    /// A remote hit carries the parent id but not the mapping's declared
    /// parent type, so the link's type stays unknown.
    pub(crate) fn into_document(self) -> Document {
        Document {
            id: self.id,
            doc_type: self.doc_type,
            index: self.index,
            source: self.source.get().to_string(),
            parent: self.parent.map(|parent_id| ParentLink {
                parent_id,
                parent_type: None,
            }),
            routing: self.routing,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkItemBody {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, BulkItemBody>>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

/// A cluster reached over HTTP. Clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpCluster {
    client: reqwest::Client,
    config: HttpClusterConfig,
}

impl HttpCluster {
    pub fn new(config: HttpClusterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {api_key}"))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Store(format!("{what} returned {status}: {body}")))
        }
    }
}

#[async_trait]
impl DocumentStore for HttpCluster {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .authed(self.client.head(format!("{}/{index}", self.base())))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        let response = self
            .authed(self.client.put(format!("{}/{index}", self.base())))
            .send()
            .await?;
        Self::expect_success(response, "index creation").await?;
        Ok(())
    }

    async fn create_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: TypeMapping,
    ) -> Result<()> {
        let body = match mapping.parent_type {
            Some(parent_type) => json!({ "_parent": { "type": parent_type } }),
            None => json!({}),
        };
        let response = self
            .authed(
                self.client
                    .put(format!("{}/{index}/_mapping/{doc_type}", self.base()))
                    .json(&body),
            )
            .send()
            .await?;
        Self::expect_success(response, "mapping creation").await?;
        Ok(())
    }

    async fn list_types(&self, index: &str) -> Result<Vec<String>> {
        let response = self
            .authed(self.client.get(format!("{}/{index}/_mapping", self.base())))
            .send()
            .await?;
        let response = Self::expect_success(response, "mapping fetch").await?;
        let body: Value = response.json().await?;
        let mut types: Vec<String> = body
            .get(index)
            .and_then(|per_index| per_index.get("mappings"))
            .and_then(Value::as_object)
            .map(|mappings| mappings.keys().cloned().collect())
            .unwrap_or_default();
        types.sort();
        Ok(types)
    }

    async fn mapping(&self, index: &str, doc_type: &str) -> Result<Option<TypeMapping>> {
        let response = self
            .authed(
                self.client
                    .get(format!("{}/{index}/_mapping/{doc_type}", self.base())),
            )
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "mapping fetch").await?;
        let body: Value = response.json().await?;
        let declared = body
            .get(index)
            .and_then(|per_index| per_index.get("mappings"))
            .and_then(|mappings| mappings.get(doc_type));
        Ok(declared.map(|mapping| TypeMapping {
            parent_type: mapping
                .get("_parent")
                .and_then(|parent| parent.get("type"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }

    async fn insert(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &str,
        parent: Option<&str>,
    ) -> Result<()> {
        let mut url = format!("{}/{index}/{doc_type}/{id}", self.base());
        if let Some(parent) = parent {
            url.push_str(&format!("?parent={parent}"));
        }
        let response = self
            .authed(
                self.client
                    .put(url)
                    .header("Content-Type", "application/json")
                    .body(source.to_string()),
            )
            .send()
            .await?;
        Self::expect_success(response, "document insert").await?;
        Ok(())
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<Vec<ItemOutcome>> {
        let payload = render_bulk_payload(ops)?;
        debug!(bytes = payload.len(), ops = ops.len(), "posting _bulk");
        let response = self
            .authed(
                self.client
                    .post(format!("{}/_bulk", self.base()))
                    // _bulk refuses plain application/json
                    .header("Content-Type", "application/x-ndjson")
                    .body(payload),
            )
            .send()
            .await?;
        let response = Self::expect_success(response, "bulk write").await?;
        let body: BulkResponse = response.json().await?;
        let outcomes = body
            .items
            .into_iter()
            .map(|mut item| {
                // Each item is keyed by the action name ("index").
                let body = item
                    .remove("index")
                    .or_else(|| item.into_values().next())
                    .unwrap_or(BulkItemBody {
                        id: String::new(),
                        error: None,
                    });
                ItemOutcome {
                    id: body.id,
                    error: body.error.map(|error| error.to_string()),
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn scan_open(
        &self,
        index: &str,
        doc_type: Option<&str>,
        size: usize,
    ) -> Result<ScanPage> {
        let url = match doc_type {
            Some(doc_type) => format!("{}/{index}/{doc_type}/_search", self.base()),
            None => format!("{}/{index}/_search", self.base()),
        };
        let body = json!({
            "size": size,
            "query": { "match_all": {} },
        });
        let response = self
            .authed(
                self.client
                    .post(url)
                    .query(&[("scroll", self.config.scroll_keep_alive.as_str())])
                    .json(&body),
            )
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::SourceNotFound(index.to_string()));
        }
        let response = Self::expect_success(response, "scan open").await?;
        let page: SearchResponse = response.json().await?;
        Ok(ScanPage {
            docs: page.hits.hits.into_iter().map(SearchHit::into_document).collect(),
            token: page.scroll_id.map(|scroll_id| ScanToken::Scroll {
                scroll_id,
                keep_alive: self.config.scroll_keep_alive.clone(),
            }),
        })
    }

    async fn scan_next(&self, token: ScanToken) -> Result<ScanPage> {
        match token {
            ScanToken::Scroll {
                scroll_id,
                keep_alive,
            } => {
                let body = json!({ "scroll": &keep_alive, "scroll_id": scroll_id });
                let response = self
                    .authed(
                        self.client
                            .post(format!("{}/_search/scroll", self.base()))
                            .json(&body),
                    )
                    .send()
                    .await?;
                let response = Self::expect_success(response, "scan advance").await?;
                let page: SearchResponse = response.json().await?;
                Ok(ScanPage {
                    docs: page.hits.hits.into_iter().map(SearchHit::into_document).collect(),
                    token: page.scroll_id.map(|scroll_id| ScanToken::Scroll {
                        scroll_id,
                        keep_alive,
                    }),
                })
            }
            ScanToken::Offset { .. } => Err(Error::Internal(
                "offset token handed to an http store".to_string(),
            )),
        }
    }

    async fn scan_close(&self, token: ScanToken) -> Result<()> {
        let ScanToken::Scroll { scroll_id, .. } = token else {
            return Ok(());
        };
        let response = self
            .authed(
                self.client
                    .delete(format!("{}/_search/scroll", self.base()))
                    .json(&json!({ "scroll_id": [scroll_id] })),
            )
            .send()
            .await?;
        Self::expect_success(response, "scan close").await?;
        Ok(())
    }

    async fn count(&self, index: &str, doc_type: Option<&str>) -> Result<u64> {
        let url = match doc_type {
            Some(doc_type) => format!("{}/{index}/{doc_type}/_count", self.base()),
            None => format!("{}/{index}/_count", self.base()),
        };
        let response = self.authed(self.client.get(url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::SourceNotFound(index.to_string()));
        }
        let response = Self::expect_success(response, "count").await?;
        let body: CountResponse = response.json().await?;
        Ok(body.count)
    }

    async fn refresh(&self) -> Result<()> {
        let response = self
            .authed(self.client.post(format!("{}/_refresh", self.base())))
            .send()
            .await?;
        Self::expect_success(response, "refresh").await?;
        Ok(())
    }
}
