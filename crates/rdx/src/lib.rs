//! rdx moves documents between search indices: scan a source index (in the
//! destination cluster or scrolled out of a remote one), rewrite each
//! document for the destination with parent links and routing intact, and
//! land it through bulk writes. Requests run synchronously or detached with
//! a pollable completion handle.

pub mod app_config;
pub mod bulk;
pub mod cluster;
pub mod common;
pub mod coordinator;
pub mod error;
pub mod handle;
pub mod parents;
pub mod progress;
pub mod reporter;
pub mod sources;

use std::time::Duration;

use anyhow::Context;

pub use app_config::{AppConfig, JobConfig, RuntimeConfig, load_config};
pub use cluster::{ClusterBackend, DocumentStore, HttpCluster, HttpClusterConfig, MemoryCluster};
pub use coordinator::{ReindexCoordinator, ReindexRequest};
pub use error::{Error, Result};
pub use handle::{Counts, ReindexHandle, ReindexState};
pub use reporter::{Acknowledgement, CompletionReporter};
pub use sources::RemoteSourceConfig;

use progress::ProgressMetrics;

/// Runs one configured reindex job end to end.
///
/// With `wait_for_completion` the call polls the handle, draws progress, and
/// returns the terminal acknowledgement. Without it the job keeps running
/// detached in the background and the acknowledgement covers acceptance only,
/// so callers of this one-shot entry point almost always want to wait.
pub async fn run(config: AppConfig) -> anyhow::Result<Acknowledgement> {
    let mut destination = config.job.destination.clone();
    destination.scroll_keep_alive = config.runtime.scroll_keep_alive.clone();
    let store = ClusterBackend::Http(
        HttpCluster::new(destination).context("failed to build the destination cluster client")?,
    );
    let coordinator = ReindexCoordinator::new(store.clone(), config.runtime.clone());
    let reporter = coordinator.reporter();

    let mut request = ReindexRequest::new("", &config.job.dest_index);
    request.source_indices = config.job.source_indices.clone();
    request.source_types = config.job.source_types.clone();
    request.dest_type = config.job.dest_type.clone();
    if let Some(ref url) = config.job.remote_url {
        let mut remote = RemoteSourceConfig::new(url);
        remote.keep_alive = config.runtime.scroll_keep_alive.clone();
        remote.connect_timeout_secs = config.runtime.connect_timeout_secs;
        remote.request_timeout_secs = config.runtime.request_timeout_secs;
        request.remote = Some(remote);
    }

    // Submit detached either way; waiting happens here so the progress
    // display can poll the handle while the worker runs.
    let handle = coordinator
        .submit(request)
        .await
        .context("reindex request was rejected")?;

    if !config.job.wait_for_completion {
        return Ok(Acknowledgement::of(&handle, false));
    }

    let job_name = format!(
        "{} -> {}",
        config.job.source_indices.join(","),
        config.job.dest_index
    );
    let expected = expected_docs(&store, &config.job).await;
    let mut metrics = ProgressMetrics::new(job_name, expected);
    loop {
        let snapshot = reporter
            .status(handle.id)
            .context("reindex request vanished from the registry")?;
        metrics.update(
            snapshot.counts.read,
            snapshot.counts.written,
            snapshot.counts.failed,
        );
        if snapshot.is_terminal() {
            metrics.finish();
            return Ok(Acknowledgement::of(&snapshot, true));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Best-effort expected document total for the progress bar. Remote sources
/// and count failures yield 0, which the display treats as "unknown".
async fn expected_docs(store: &ClusterBackend, job: &JobConfig) -> u64 {
    if job.remote_url.is_some() {
        return 0;
    }
    let mut total = 0u64;
    for index in &job.source_indices {
        match &job.source_types {
            Some(types) => {
                for doc_type in types {
                    total += store.count(index, Some(doc_type)).await.unwrap_or(0);
                }
            }
            None => total += store.count(index, None).await.unwrap_or(0),
        }
    }
    total
}
