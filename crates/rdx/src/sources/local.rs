//! Scan cursor over the engine's own store handle. The store pages documents
//! in a stable order behind an opaque token: an offset in process, a
//! server-side scroll over HTTP. Either way a page is the only thing held in
//! memory, and the token is released on close.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cluster::{ClusterBackend, DocumentStore, ScanToken};
use crate::common::{Document, DocumentBatch};
use crate::error::{Error, Result};
use crate::sources::Cursor;

#[derive(Debug)]
pub struct LocalCursor {
    store: ClusterBackend,
    token: Option<ScanToken>,
    /// First page, fetched at open time and handed out on the first pull.
    pending: Option<DocumentBatch>,
    exhausted: bool,
}

impl LocalCursor {
    /// Fails fast with [`Error::SourceNotFound`] when the index is missing;
    /// an index that exists but holds no matching documents opens fine and
    /// yields zero batches.
    pub async fn open(
        store: ClusterBackend,
        index: &str,
        doc_type: Option<&str>,
        batch_size: usize,
    ) -> Result<Self> {
        if !store.index_exists(index).await? {
            return Err(Error::SourceNotFound(index.to_string()));
        }
        let page = store.scan_open(index, doc_type, batch_size).await?;
        debug!(index, ?doc_type, batch_size, hits = page.docs.len(), "opened local scan");

        let mut cursor = Self {
            store,
            token: page.token,
            pending: None,
            exhausted: false,
        };
        cursor.accept(page.docs);
        Ok(cursor)
    }

    fn accept(&mut self, docs: Vec<Document>) {
        if docs.is_empty() {
            self.exhausted = true;
        } else {
            self.pending = Some(DocumentBatch::new(docs));
        }
    }
}

#[async_trait]
impl Cursor for LocalCursor {
    async fn next_batch(&mut self) -> Result<Option<DocumentBatch>> {
        if let Some(batch) = self.pending.take() {
            return Ok(Some(batch));
        }
        if self.exhausted {
            return Ok(None);
        }
        let Some(token) = self.token.take() else {
            self.exhausted = true;
            return Ok(None);
        };
        let page = self.store.scan_next(token).await?;
        self.token = page.token;
        self.accept(page.docs);
        Ok(self.pending.take())
    }

    async fn close(&mut self) -> AnyResult<()> {
        self.exhausted = true;
        self.pending = None;
        if let Some(token) = self.token.take() {
            // Scan state expires on its own; a failed release is loggable.
            if let Err(err) = self.store.scan_close(token).await {
                warn!("failed to release scan state: {err}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;

    async fn seeded(count: usize) -> ClusterBackend {
        let store = MemoryCluster::new();
        store.create_index("dataset").await.unwrap();
        for i in 1..=count {
            store
                .insert("dataset", "item", &i.to_string(), r#"{"msg":"test"}"#, None)
                .await
                .unwrap();
        }
        ClusterBackend::Memory(store)
    }

    #[tokio::test]
    async fn drains_in_batches_then_signals_end_once() {
        let store = seeded(7).await;
        let mut cursor = LocalCursor::open(store, "dataset", Some("item"), 3)
            .await
            .unwrap();
        let mut total = 0;
        let mut batches = 0;
        while let Some(batch) = cursor.next_batch().await.unwrap() {
            assert!(batch.len() <= 3);
            total += batch.len();
            batches += 1;
        }
        assert_eq!(total, 7);
        assert_eq!(batches, 3);
        assert!(cursor.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_source_yields_zero_batches() {
        let store = seeded(0).await;
        let mut cursor = LocalCursor::open(store, "dataset", None, 100).await.unwrap();
        assert!(cursor.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_index_fails_fast() {
        let store = ClusterBackend::Memory(MemoryCluster::new());
        let err = LocalCursor::open(store, "missing", None, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = seeded(1).await;
        let mut cursor = LocalCursor::open(store, "dataset", None, 10).await.unwrap();
        cursor.close().await.unwrap();
        cursor.close().await.unwrap();
        assert!(cursor.next_batch().await.unwrap().is_none());
    }
}
