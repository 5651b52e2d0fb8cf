//! Error taxonomy for the reindexing engine.
//!
//! Per-document failures (mapping conflicts) are recorded on the request
//! handle and never abort a request. Per-batch transport failures retry
//! inside the bulk writer and escalate to [`Error::BulkWriteFailure`] only
//! after the retry budget runs out. A missing source fails fast.

/// Everything the engine can report. The variants mirror what callers are
/// expected to branch on at the boundary; transport and serde details are
/// wrapped rather than re-modelled.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The named source index (or index/type pair) does not exist. Fatal
    /// immediately; a missing index will not appear mid-request.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// The destination mapping rejected a single document. Recorded, not fatal.
    #[error("destination mapping rejected document '{id}': {reason}")]
    MappingConflict { id: String, reason: String },

    /// A remote cluster call failed at the transport or HTTP-status level.
    /// Distinct from end-of-data, which is a clean `Ok(None)` from the cursor.
    #[error("remote cluster unreachable: {0}")]
    RemoteUnreachable(String),

    /// A whole bulk batch kept failing until the retry budget was spent.
    #[error("bulk write failed after {attempts} attempts: {reason}")]
    BulkWriteFailure { attempts: u32, reason: String },

    /// The request was cancelled via the reporter. Asynchronous mode only.
    #[error("reindex request cancelled")]
    Cancelled,

    #[error("invalid reindex request: {0}")]
    InvalidRequest(String),

    /// A document-store operation failed for a reason that is not one of the
    /// taxonomy cases above (e.g. a destination-side refresh error).
    #[error("document store error: {0}")]
    Store(String),

    #[error("internal failure during copy: {0}")]
    Internal(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
