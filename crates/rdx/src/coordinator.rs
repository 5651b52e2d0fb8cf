//! The reindex coordinator: accepts requests, runs one worker per request,
//! and drives Document Source -> Parent-Child Resolver -> Bulk Writer across
//! every requested (index, type) pair.
//!
//! Batches inside one request flow strictly sequentially against that
//! request's cursor; independent requests run concurrently and share nothing
//! but the destination store. Within one pair the scan half and the write
//! half overlap over a bounded channel, which keeps scan order and bounds
//! memory to the channel capacity.

use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app_config::RuntimeConfig;
use crate::bulk::BulkWriter;
use crate::cluster::{ClusterBackend, DocumentStore};
use crate::common::DocumentBatch;
use crate::error::{Error, Result};
use crate::handle::ReindexHandle;
use crate::parents::ParentResolver;
use crate::reporter::{CompletionReporter, Registry, RequestSlot};
use crate::sources::{Cursor, LocalCursor, RemoteCursor, RemoteSourceConfig, ScrollCursor};

/// One reindex request as accepted at the boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct ReindexRequest {
    pub source_indices: Vec<String>,
    /// Absent means "all types of each source index".
    #[serde(default)]
    pub source_types: Option<Vec<String>>,
    pub dest_index: String,
    /// Absent keeps each document's source type.
    #[serde(default)]
    pub dest_type: Option<String>,
    /// Present selects the remote scroll source over the local scan.
    #[serde(default)]
    pub remote: Option<RemoteSourceConfig>,
    /// Overrides the runtime default when set.
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub wait_for_completion: bool,
}

impl ReindexRequest {
    pub fn new(source_index: &str, dest_index: &str) -> Self {
        Self {
            source_indices: vec![source_index.to_string()],
            source_types: None,
            dest_index: dest_index.to_string(),
            dest_type: None,
            remote: None,
            batch_size: None,
            wait_for_completion: false,
        }
    }

    pub fn source_indices(mut self, indices: &[&str]) -> Self {
        self.source_indices = indices.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn source_types(mut self, types: &[&str]) -> Self {
        self.source_types = Some(types.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn dest_type(mut self, doc_type: &str) -> Self {
        self.dest_type = Some(doc_type.to_string());
        self
    }

    pub fn remote(mut self, remote: RemoteSourceConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn wait_for_completion(mut self, wait: bool) -> Self {
        self.wait_for_completion = wait;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.source_indices.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one source index is required".to_string(),
            ));
        }
        if self.dest_index.is_empty() {
            return Err(Error::InvalidRequest(
                "a destination index is required".to_string(),
            ));
        }
        // Copying an index into itself without a type override is undefined:
        // the scan would observe its own writes.
        if self.dest_type.is_none()
            && self
                .source_indices
                .iter()
                .any(|index| *index == self.dest_index)
        {
            return Err(Error::InvalidRequest(format!(
                "destination index '{}' must differ from every source index when no \
                 destination type is given",
                self.dest_index
            )));
        }
        Ok(())
    }

    /// The (index, type) pairs to copy: the cartesian product when types are
    /// given, one all-types pass per index otherwise.
    fn pairs(&self) -> Vec<(String, Option<String>)> {
        match &self.source_types {
            Some(types) => self
                .source_indices
                .iter()
                .flat_map(|index| {
                    types
                        .iter()
                        .map(move |doc_type| (index.clone(), Some(doc_type.clone())))
                })
                .collect(),
            None => self
                .source_indices
                .iter()
                .map(|index| (index.clone(), None))
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct ReindexCoordinator {
    store: ClusterBackend,
    registry: Registry,
    runtime: RuntimeConfig,
}

impl ReindexCoordinator {
    pub fn new(store: ClusterBackend, runtime: RuntimeConfig) -> Self {
        Self {
            store,
            registry: Arc::new(DashMap::new()),
            runtime,
        }
    }

    pub fn reporter(&self) -> CompletionReporter {
        CompletionReporter::new(self.registry.clone())
    }

    /// Accepts a request. Synchronous mode (`wait_for_completion`) blocks the
    /// caller until the handle is terminal and returns the final snapshot;
    /// asynchronous mode returns a `Running` snapshot immediately and the
    /// caller polls the reporter.
    pub async fn submit(&self, request: ReindexRequest) -> Result<ReindexHandle> {
        request.validate()?;
        let id = Uuid::new_v4();
        let slot = Arc::new(RequestSlot::new(id));
        self.registry.insert(id, slot.clone());
        info!(
            request = %id,
            sources = ?request.source_indices,
            dest = %request.dest_index,
            remote = request.remote.is_some(),
            wait = request.wait_for_completion,
            "reindex request accepted"
        );

        let wait = request.wait_for_completion;
        let worker = tokio::spawn(run_request(
            self.store.clone(),
            slot.clone(),
            request,
            self.runtime.clone(),
        ));
        if wait {
            worker
                .await
                .map_err(|err| Error::Internal(format!("reindex worker panicked: {err}")))?;
        }
        Ok(slot.snapshot())
    }
}

/// The whole life of one request: drive every pair, then settle the terminal
/// state on the slot. Never returns an error; failures land on the handle.
async fn run_request(
    store: ClusterBackend,
    slot: Arc<RequestSlot>,
    request: ReindexRequest,
    runtime: RuntimeConfig,
) {
    let id = slot.snapshot().id;
    match drive(&store, &slot, &request, &runtime).await {
        Ok(()) => {
            let failed = slot.snapshot().counts.failed;
            if runtime.strict_item_failures && failed > 0 {
                slot.update(|handle| {
                    handle.fail(format!("{failed} documents failed under strict policy"))
                });
            } else {
                slot.update(|handle| handle.complete());
            }
            let counts = slot.snapshot().counts;
            info!(request = %id, ?counts, "reindex finished");
        }
        Err(err) => {
            error!(request = %id, "reindex failed: {err}");
            slot.update(|handle| handle.fail(err.to_string()));
        }
    }
}

async fn drive(
    store: &ClusterBackend,
    slot: &Arc<RequestSlot>,
    request: &ReindexRequest,
    runtime: &RuntimeConfig,
) -> Result<()> {
    // The first write would create the destination anyway per cluster
    // defaults; creating it up front keeps empty sources searchable too.
    if !store.index_exists(&request.dest_index).await? {
        store.create_index(&request.dest_index).await?;
    }

    for (index, doc_type) in request.pairs() {
        if slot.is_cancelled() {
            return Err(Error::Cancelled);
        }
        copy_pair(store, slot, request, runtime, &index, doc_type.as_deref()).await?;
    }

    // Visibility barrier: a synchronous caller may search right away.
    store.refresh().await?;
    Ok(())
}

/// Copies one (index, type) pair: scan half and write half joined over a
/// bounded channel. The write half's error wins when both halves stop, since
/// a dead writer also shuts the scan down through the closed channel.
async fn copy_pair(
    store: &ClusterBackend,
    slot: &Arc<RequestSlot>,
    request: &ReindexRequest,
    runtime: &RuntimeConfig,
    index: &str,
    doc_type: Option<&str>,
) -> Result<()> {
    let batch_size = request.batch_size.unwrap_or(runtime.batch_size).max(1);
    let cursor = match &request.remote {
        Some(remote) => {
            ScrollCursor::Remote(RemoteCursor::open(remote, index, doc_type, batch_size).await?)
        }
        None => ScrollCursor::Local(
            LocalCursor::open(store.clone(), index, doc_type, batch_size).await?,
        ),
    };
    debug!(index, ?doc_type, batch_size, "copying pair");

    let (tx, rx) = async_channel::bounded(runtime.queue_capacity.max(1));
    let resolver = ParentResolver::new(
        store.clone(),
        &request.dest_index,
        request.dest_type.as_deref(),
    );
    let writer = BulkWriter::new(
        store.clone(),
        runtime.max_retries,
        Duration::from_millis(runtime.retry_backoff_ms),
    );

    let scan = tokio::spawn(scan_half(cursor, tx, slot.clone()));
    let write = tokio::spawn(write_half(rx, slot.clone(), resolver, writer));

    let (scan_result, write_result) = futures::future::join(scan, write).await;
    let write_result =
        write_result.map_err(|err| Error::Internal(format!("write half panicked: {err}")))?;
    let scan_result =
        scan_result.map_err(|err| Error::Internal(format!("scan half panicked: {err}")))?;
    write_result?;
    scan_result
}

/// Pulls the cursor dry and feeds the channel. The cursor is closed on every
/// exit path, including cancellation and scan failure.
async fn scan_half(
    mut cursor: ScrollCursor,
    tx: Sender<DocumentBatch>,
    slot: Arc<RequestSlot>,
) -> Result<()> {
    let result = pump(&mut cursor, &tx, &slot).await;
    drop(tx);
    if let Err(err) = cursor.close().await {
        warn!("cursor close failed: {err:#}");
    }
    result
}

async fn pump(
    cursor: &mut ScrollCursor,
    tx: &Sender<DocumentBatch>,
    slot: &Arc<RequestSlot>,
) -> Result<()> {
    loop {
        if slot.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match cursor.next_batch().await? {
            None => return Ok(()),
            Some(batch) => {
                let docs = batch.len() as u64;
                // A closed channel means the write half stopped first; its
                // error is the one to report, so stop cleanly here.
                if tx.send(batch).await.is_err() {
                    return Ok(());
                }
                // Counted only once offered, so a dead write half never
                // inflates the read count.
                slot.update(|handle| handle.add_read(docs));
            }
        }
    }
}

async fn write_half(
    rx: Receiver<DocumentBatch>,
    slot: Arc<RequestSlot>,
    mut resolver: ParentResolver,
    writer: BulkWriter,
) -> Result<()> {
    while let Ok(batch) = rx.recv().await {
        // Batches already queued at cancel time are dropped, not written;
        // cancellation stops new bulk operations on both halves.
        if slot.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let ops = resolver.transform(batch).await?;
        let outcome = writer.write(ops).await?;
        slot.update(|handle| {
            handle.add_written(outcome.written);
            for failure in &outcome.failures {
                handle.record_failure(format!("{}: {}", failure.id, failure.reason));
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_copy_without_type_override_is_rejected() {
        let request = ReindexRequest::new("dataset", "dataset");
        assert!(matches!(
            request.validate(),
            Err(Error::InvalidRequest(_))
        ));

        // A new destination type makes the in-place copy well defined.
        let request = ReindexRequest::new("dataset", "dataset").dest_type("item2");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn empty_source_set_is_rejected() {
        let request = ReindexRequest::new("dataset", "dataset2").source_indices(&[]);
        assert!(matches!(request.validate(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn pairs_expand_the_cartesian_product() {
        let request = ReindexRequest::new("a", "dest")
            .source_indices(&["a", "b"])
            .source_types(&["x", "y"]);
        let pairs = request.pairs();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0], ("a".to_string(), Some("x".to_string())));
        assert_eq!(pairs[3], ("b".to_string(), Some("y".to_string())));
    }

    #[test]
    fn omitted_types_become_one_all_types_pass_per_index() {
        let request = ReindexRequest::new("a", "dest").source_indices(&["a", "b"]);
        assert_eq!(
            request.pairs(),
            [("a".to_string(), None), ("b".to_string(), None)]
        );
    }
}
