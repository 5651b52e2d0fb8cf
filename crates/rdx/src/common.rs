//! The data that moves: documents and the batches that carry them.
//!
//! A [`DocumentBatch`] is the unit of flow through the pipeline. Batch
//! boundaries bound memory use and failure granularity; order inside a batch
//! carries no meaning.

use serde::Serialize;

/// A declared parent relationship carried alongside a child document.
///
/// `parent_type` is the parent type the source mapping declares, when known.
/// Local scans know it; a remote hit only carries the parent id, so the type
/// stays `None` and matches any destination parent declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentLink {
    pub parent_id: String,
    pub parent_type: Option<String>,
}

/// One document pulled from a source, still addressed by where it came from.
/// The destination index/type get stamped on during transformation, not here.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub doc_type: String,
    /// Source index the document was scanned out of.
    pub index: String,
    /// Raw `_source` body, passed through the pipeline without re-parsing.
    pub source: String,
    pub parent: Option<ParentLink>,
    pub routing: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentBatch {
    pub docs: Vec<Document>,
}

impl DocumentBatch {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Total `_source` bytes in the batch.
    pub fn total_bytes(&self) -> usize {
        self.docs.iter().map(|doc| doc.source.len()).sum()
    }
}
