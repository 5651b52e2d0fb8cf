//! The document store collaborator: everything the engine asks of a cluster.
//!
//! Two implementations share one contract. [`MemoryCluster`] is an in-process
//! store used by tests and embedders; [`HttpCluster`] speaks to a real cluster
//! over HTTP. The engine itself never cares which one it holds.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::Document;
use crate::error::Result;

pub(crate) mod http;
pub(crate) mod memory;

pub use http::{HttpCluster, HttpClusterConfig};
pub use memory::MemoryCluster;

/// The one mapping detail the engine reads: whether a type declares a parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMapping {
    pub parent_type: Option<String>,
}

impl TypeMapping {
    pub fn with_parent(parent_type: &str) -> Self {
        Self {
            parent_type: Some(parent_type.to_string()),
        }
    }
}

/// One upsert-by-id operation inside a bulk request. Re-submitting the same
/// op is idempotent: the destination keeps exactly one document per (type, id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOp {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub source: String,
    pub parent: Option<String>,
    pub routing: Option<String>,
}

/// Per-item result of a bulk request. `error` is `None` on success.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub id: String,
    pub error: Option<String>,
}

/// Opaque continuation of a paged scan. An offset token pages the in-process
/// store; a scroll token resumes a server-side scroll, so page cost and
/// memory stay bounded no matter how deep the scan goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanToken {
    Offset {
        index: String,
        doc_type: Option<String>,
        from: usize,
        size: usize,
    },
    Scroll {
        scroll_id: String,
        keep_alive: String,
    },
}

/// One page of a scan. Empty `docs` means the scan is exhausted; the token,
/// when present, still needs closing.
#[derive(Debug)]
pub struct ScanPage {
    pub docs: Vec<Document>,
    pub token: Option<ScanToken>,
}

/// The store contract consumed by the engine.
///
/// `refresh` is the visibility barrier: after it returns, previously written
/// documents are searchable/countable. Scans page documents in a stable
/// order; `doc_type: None` means all types of the index.
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn create_index(&self, index: &str) -> Result<()>;

    async fn create_mapping(&self, index: &str, doc_type: &str, mapping: TypeMapping)
    -> Result<()>;

    async fn list_types(&self, index: &str) -> Result<Vec<String>>;

    async fn mapping(&self, index: &str, doc_type: &str) -> Result<Option<TypeMapping>>;

    async fn insert(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &str,
        parent: Option<&str>,
    ) -> Result<()>;

    async fn bulk(&self, ops: &[BulkOp]) -> Result<Vec<ItemOutcome>>;

    /// Opens a paged scan and returns its first page.
    async fn scan_open(&self, index: &str, doc_type: Option<&str>, size: usize)
    -> Result<ScanPage>;

    async fn scan_next(&self, token: ScanToken) -> Result<ScanPage>;

    /// Releases any server-side state held by the token.
    async fn scan_close(&self, token: ScanToken) -> Result<()>;

    async fn count(&self, index: &str, doc_type: Option<&str>) -> Result<u64>;

    async fn refresh(&self) -> Result<()>;
}

/// The concrete store variants, dispatched as one value chosen at startup.
#[derive(Debug, Clone)]
pub enum ClusterBackend {
    Memory(MemoryCluster),
    Http(HttpCluster),
}

#[async_trait]
impl DocumentStore for ClusterBackend {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        match self {
            ClusterBackend::Memory(store) => store.index_exists(index).await,
            ClusterBackend::Http(store) => store.index_exists(index).await,
        }
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        match self {
            ClusterBackend::Memory(store) => store.create_index(index).await,
            ClusterBackend::Http(store) => store.create_index(index).await,
        }
    }

    async fn create_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: TypeMapping,
    ) -> Result<()> {
        match self {
            ClusterBackend::Memory(store) => store.create_mapping(index, doc_type, mapping).await,
            ClusterBackend::Http(store) => store.create_mapping(index, doc_type, mapping).await,
        }
    }

    async fn list_types(&self, index: &str) -> Result<Vec<String>> {
        match self {
            ClusterBackend::Memory(store) => store.list_types(index).await,
            ClusterBackend::Http(store) => store.list_types(index).await,
        }
    }

    async fn mapping(&self, index: &str, doc_type: &str) -> Result<Option<TypeMapping>> {
        match self {
            ClusterBackend::Memory(store) => store.mapping(index, doc_type).await,
            ClusterBackend::Http(store) => store.mapping(index, doc_type).await,
        }
    }

    async fn insert(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &str,
        parent: Option<&str>,
    ) -> Result<()> {
        match self {
            ClusterBackend::Memory(store) => store.insert(index, doc_type, id, source, parent).await,
            ClusterBackend::Http(store) => store.insert(index, doc_type, id, source, parent).await,
        }
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<Vec<ItemOutcome>> {
        match self {
            ClusterBackend::Memory(store) => store.bulk(ops).await,
            ClusterBackend::Http(store) => store.bulk(ops).await,
        }
    }

    async fn scan_open(
        &self,
        index: &str,
        doc_type: Option<&str>,
        size: usize,
    ) -> Result<ScanPage> {
        match self {
            ClusterBackend::Memory(store) => store.scan_open(index, doc_type, size).await,
            ClusterBackend::Http(store) => store.scan_open(index, doc_type, size).await,
        }
    }

    async fn scan_next(&self, token: ScanToken) -> Result<ScanPage> {
        match self {
            ClusterBackend::Memory(store) => store.scan_next(token).await,
            ClusterBackend::Http(store) => store.scan_next(token).await,
        }
    }

    async fn scan_close(&self, token: ScanToken) -> Result<()> {
        match self {
            ClusterBackend::Memory(store) => store.scan_close(token).await,
            ClusterBackend::Http(store) => store.scan_close(token).await,
        }
    }

    async fn count(&self, index: &str, doc_type: Option<&str>) -> Result<u64> {
        match self {
            ClusterBackend::Memory(store) => store.count(index, doc_type).await,
            ClusterBackend::Http(store) => store.count(index, doc_type).await,
        }
    }

    async fn refresh(&self) -> Result<()> {
        match self {
            ClusterBackend::Memory(store) => store.refresh().await,
            ClusterBackend::Http(store) => store.refresh().await,
        }
    }
}
