//! Application configuration: `RDX_*` environment variables merged with an
//! optional TOML file, TOML winning on conflicts. No file, no assumptions;
//! the environment alone must be able to describe a whole job.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::cluster::HttpClusterConfig;

/// Everything one `rdx` run needs to know: the job to execute and the
/// runtime knobs around it.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub job: JobConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// One reindex job as described by the operator.
#[derive(Debug, Deserialize, Clone)]
pub struct JobConfig {
    /// The destination cluster the documents are copied into.
    pub destination: HttpClusterConfig,
    pub source_indices: Vec<String>,
    /// Absent means "all types of each source index".
    #[serde(default)]
    pub source_types: Option<Vec<String>>,
    pub dest_index: String,
    /// Absent keeps each document's source type.
    #[serde(default)]
    pub dest_type: Option<String>,
    /// Present means "scroll the sources out of this remote cluster" instead
    /// of scanning the destination cluster itself.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub wait_for_completion: bool,
}

/// Batching, retry, and timeout knobs, all defaultable.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batches in flight between the scan half and the write half.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
    /// When set, per-document failures flip the final state to `Failed`
    /// instead of completing with failure counts.
    #[serde(default)]
    pub strict_item_failures: bool,
}

fn default_batch_size() -> usize {
    500
}

fn default_queue_capacity() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
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

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            scroll_keep_alive: default_scroll_keep_alive(),
            strict_item_failures: false,
        }
    }
}

/// Loads configuration from `RDX_*` env vars plus, when given, a TOML file.
pub fn load_config(config_file: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(file = ?config_file, "loading configuration");

    let figment = Figment::new().merge(Env::prefixed("RDX_").split("__"));
    let figment = match config_file {
        Some(path) => figment.merge(Toml::file(path)),
        None => figment,
    };

    let context_msg = match config_file {
        Some(path) => format!(
            "failed to parse configuration from '{}' and RDX_* environment variables",
            path.display()
        ),
        None => "failed to parse configuration from RDX_* environment variables".to_string(),
    };
    figment.extract().context(context_msg)
}
