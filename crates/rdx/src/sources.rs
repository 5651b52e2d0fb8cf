//! Document sources and the scroll cursor over them.
//!
//! A cursor is a pull-based, finite, non-restartable sequence of batches:
//! once a batch has been handed out it cannot be re-read, and a failed batch
//! is the bulk writer's problem, never re-scrolled. `close` releases any
//! server-side scroll state and must run on every exit path.

use anyhow::Result as AnyResult;
use async_trait::async_trait;

use crate::common::DocumentBatch;
use crate::error::Result;

pub(crate) mod local;
pub(crate) mod remote;

pub use local::LocalCursor;
pub use remote::{RemoteCursor, RemoteSourceConfig};

/// One pass over one (index, type) pair, a batch at a time.
///
/// # Contract
/// - `next_batch` returns `Ok(Some(batch))` while data remains and `Ok(None)`
///   exactly once at end-of-data. Errors are never "no more data".
/// - Memory stays O(batch size) regardless of source cardinality.
/// - `close` is idempotent and best-effort; a failed close is loggable, not fatal.
#[async_trait]
pub trait Cursor: Send + std::fmt::Debug {
    async fn next_batch(&mut self) -> Result<Option<DocumentBatch>>;

    async fn close(&mut self) -> AnyResult<()>;
}

/// The two cursor variants, picked once per request from the presence of a
/// remote URL.
#[derive(Debug)]
pub enum ScrollCursor {
    Local(LocalCursor),
    Remote(RemoteCursor),
}

#[async_trait]
impl Cursor for ScrollCursor {
    async fn next_batch(&mut self) -> Result<Option<DocumentBatch>> {
        match self {
            ScrollCursor::Local(cursor) => cursor.next_batch().await,
            ScrollCursor::Remote(cursor) => cursor.next_batch().await,
        }
    }

    async fn close(&mut self) -> AnyResult<()> {
        match self {
            ScrollCursor::Local(cursor) => cursor.close().await,
            ScrollCursor::Remote(cursor) => cursor.close().await,
        }
    }
}
