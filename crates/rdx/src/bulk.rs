//! Bulk writer: renders batches into bulk-write requests and submits them.
//!
//! Ops are upsert-by-id, so re-submitting a batch after a transient failure
//! is idempotent. Per-item rejections are reported without aborting the rest
//! of the batch; a whole-batch failure retries with backoff until the budget
//! runs out and then escalates as [`Error::BulkWriteFailure`]. Documents
//! written by earlier batches are never rolled back.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::cluster::{BulkOp, ClusterBackend, DocumentStore};
use crate::error::{Error, Result};

/// What happened to one batch: how many items landed, and which were rejected.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub written: u64,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub id: String,
    pub reason: String,
}

/// Renders ops into the bulk wire format: two newline-separated lines per op,
/// action metadata then the raw document body, trailing newline on the whole
/// payload. Absent metadata fields are omitted, not set to null.
pub fn render_bulk_payload(ops: &[BulkOp]) -> Result<String> {
    let mut payload = String::with_capacity(ops.iter().map(|op| op.source.len() + 96).sum());
    for op in ops {
        let mut action = serde_json::Map::new();
        action.insert("_index".to_string(), op.index.clone().into());
        action.insert("_type".to_string(), op.doc_type.clone().into());
        action.insert("_id".to_string(), op.id.clone().into());
        if let Some(ref parent) = op.parent {
            action.insert("parent".to_string(), parent.clone().into());
        }
        if let Some(ref routing) = op.routing {
            action.insert("routing".to_string(), routing.clone().into());
        }
        let action_line = serde_json::to_string(&json!({ "index": action }))?;
        payload.push_str(&action_line);
        payload.push('\n');
        payload.push_str(&op.source);
        payload.push('\n');
    }
    Ok(payload)
}

#[derive(Debug)]
pub struct BulkWriter {
    store: ClusterBackend,
    max_retries: u32,
    backoff: Duration,
}

impl BulkWriter {
    pub fn new(store: ClusterBackend, max_retries: u32, backoff: Duration) -> Self {
        Self {
            store,
            max_retries,
            backoff,
        }
    }

    /// Submits one batch of ops, retrying whole-batch failures.
    pub async fn write(&self, ops: Vec<BulkOp>) -> Result<BatchOutcome> {
        if ops.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let mut attempt = 0u32;
        let outcomes = loop {
            attempt += 1;
            match self.store.bulk(&ops).await {
                Ok(outcomes) => break outcomes,
                Err(err) if attempt <= self.max_retries => {
                    let backoff = self.backoff * attempt;
                    warn!(attempt, ?backoff, "bulk write failed, retrying: {err}");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return Err(Error::BulkWriteFailure {
                        attempts: attempt,
                        reason: err.to_string(),
                    });
                }
            }
        };

        let mut outcome = BatchOutcome::default();
        for item in outcomes {
            match item.error {
                None => outcome.written += 1,
                Some(reason) => outcome.failures.push(ItemFailure {
                    id: item.id,
                    reason,
                }),
            }
        }
        debug!(
            written = outcome.written,
            failed = outcome.failures.len(),
            attempt,
            "bulk batch submitted"
        );
        Ok(outcome)
    }
}
