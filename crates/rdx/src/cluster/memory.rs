//! In-process document store.
//!
//! Backs the local-source path in tests and embedders. Documents live in
//! insertion order per index, keyed by (type, id) for upsert semantics.
//! A couple of failure hooks let tests exercise the writer's retry and
//! per-item error paths without a real cluster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::cluster::{BulkOp, DocumentStore, ItemOutcome, ScanPage, ScanToken, TypeMapping};
use crate::common::{Document, ParentLink};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct StoredDoc {
    id: String,
    doc_type: String,
    source: String,
    parent: Option<String>,
    routing: Option<String>,
}

#[derive(Debug, Default)]
struct IndexData {
    mappings: HashMap<String, TypeMapping>,
    docs: Vec<StoredDoc>,
    // (type, id) -> position in `docs`, so upserts replace in place and
    // scans stay in insertion order.
    by_key: HashMap<(String, String), usize>,
}

impl IndexData {
    fn upsert(&mut self, doc: StoredDoc) {
        let key = (doc.doc_type.clone(), doc.id.clone());
        match self.by_key.get(&key) {
            Some(&pos) => self.docs[pos] = doc,
            None => {
                self.by_key.insert(key, self.docs.len());
                self.docs.push(doc);
            }
        }
    }
}

#[derive(Debug, Default)]
struct FailureHooks {
    /// Bulk items of this type are rejected one by one (mapping conflict).
    reject_type: Option<String>,
    /// The next N whole bulk calls fail before touching any document.
    fail_bulk_remaining: u32,
    /// Every bulk call observed, failed attempts included.
    bulk_calls: u64,
}

/// One page of documents in insertion order, offset and filter applied.
fn page(data: &IndexData, index: &str, doc_type: Option<&str>, from: usize, size: usize) -> Vec<Document> {
    data.docs
        .iter()
        .filter(|doc| doc_type.is_none_or(|wanted| doc.doc_type == wanted))
        .skip(from)
        .take(size)
        .map(|doc| Document {
            id: doc.id.clone(),
            doc_type: doc.doc_type.clone(),
            index: index.to_string(),
            source: doc.source.clone(),
            parent: doc.parent.as_ref().map(|parent_id| ParentLink {
                parent_id: parent_id.clone(),
                // The declared parent type comes from the source mapping.
                parent_type: data
                    .mappings
                    .get(&doc.doc_type)
                    .and_then(|mapping| mapping.parent_type.clone()),
            }),
            routing: doc.routing.clone(),
        })
        .collect()
}

/// An in-memory cluster. Cheap to clone; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    indices: Arc<RwLock<HashMap<String, IndexData>>>,
    hooks: Arc<Mutex<FailureHooks>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every bulk item of `doc_type` with a mapping-conflict error.
    pub fn reject_type(&self, doc_type: &str) {
        self.hooks.lock().expect("hooks lock").reject_type = Some(doc_type.to_string());
    }

    /// Fail the next `n` whole bulk calls, as an unreachable store would.
    pub fn fail_next_bulks(&self, n: u32) {
        self.hooks.lock().expect("hooks lock").fail_bulk_remaining = n;
    }

    /// Bulk calls observed so far, failed attempts included.
    pub fn bulk_calls(&self) -> u64 {
        self.hooks.lock().expect("hooks lock").bulk_calls
    }

    /// Stand-in for the external query engine: how many distinct parents have
    /// at least one `child_type` child whose source `field` equals `value`.
    pub fn has_child_count(&self, index: &str, child_type: &str, field: &str, value: &str) -> u64 {
        let indices = self.indices.read().expect("indices lock");
        let Some(data) = indices.get(index) else {
            return 0;
        };
        let mut parents = std::collections::HashSet::new();
        for doc in &data.docs {
            if doc.doc_type != child_type {
                continue;
            }
            let Some(parent) = &doc.parent else { continue };
            let matched = serde_json::from_str::<Value>(&doc.source)
                .ok()
                .and_then(|body| body.get(field).cloned())
                .is_some_and(|found| found == Value::String(value.to_string()));
            if matched {
                parents.insert(parent.clone());
            }
        }
        parents.len() as u64
    }

    /// The stored parent id of one document, for assertions.
    pub fn parent_of(&self, index: &str, doc_type: &str, id: &str) -> Option<String> {
        let indices = self.indices.read().expect("indices lock");
        let data = indices.get(index)?;
        let pos = *data.by_key.get(&(doc_type.to_string(), id.to_string()))?;
        data.docs[pos].parent.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryCluster {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.read().expect("indices lock").contains_key(index))
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        self.indices
            .write()
            .expect("indices lock")
            .entry(index.to_string())
            .or_default();
        Ok(())
    }

    async fn create_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: TypeMapping,
    ) -> Result<()> {
        let mut indices = self.indices.write().expect("indices lock");
        indices
            .entry(index.to_string())
            .or_default()
            .mappings
            .insert(doc_type.to_string(), mapping);
        Ok(())
    }

    async fn list_types(&self, index: &str) -> Result<Vec<String>> {
        let indices = self.indices.read().expect("indices lock");
        let data = indices
            .get(index)
            .ok_or_else(|| Error::SourceNotFound(index.to_string()))?;
        let mut types: Vec<String> = data.mappings.keys().cloned().collect();
        for doc in &data.docs {
            if !types.contains(&doc.doc_type) {
                types.push(doc.doc_type.clone());
            }
        }
        types.sort();
        Ok(types)
    }

    async fn mapping(&self, index: &str, doc_type: &str) -> Result<Option<TypeMapping>> {
        let indices = self.indices.read().expect("indices lock");
        Ok(indices
            .get(index)
            .and_then(|data| data.mappings.get(doc_type))
            .cloned())
    }

    async fn insert(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &str,
        parent: Option<&str>,
    ) -> Result<()> {
        let mut indices = self.indices.write().expect("indices lock");
        indices.entry(index.to_string()).or_default().upsert(StoredDoc {
            id: id.to_string(),
            doc_type: doc_type.to_string(),
            source: source.to_string(),
            parent: parent.map(str::to_string),
            routing: parent.map(str::to_string),
        });
        Ok(())
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<Vec<ItemOutcome>> {
        {
            let mut hooks = self.hooks.lock().expect("hooks lock");
            hooks.bulk_calls += 1;
            if hooks.fail_bulk_remaining > 0 {
                hooks.fail_bulk_remaining -= 1;
                return Err(Error::Store("bulk endpoint unavailable".to_string()));
            }
        }
        let reject_type = self.hooks.lock().expect("hooks lock").reject_type.clone();

        let mut indices = self.indices.write().expect("indices lock");
        let mut outcomes = Vec::with_capacity(ops.len());
        for op in ops {
            if reject_type.as_deref() == Some(op.doc_type.as_str()) {
                outcomes.push(ItemOutcome {
                    id: op.id.clone(),
                    error: Some(format!("mapping conflict for type '{}'", op.doc_type)),
                });
                continue;
            }
            // A write implicitly creates the index, matching cluster defaults.
            indices.entry(op.index.clone()).or_default().upsert(StoredDoc {
                id: op.id.clone(),
                doc_type: op.doc_type.clone(),
                source: op.source.clone(),
                parent: op.parent.clone(),
                routing: op.routing.clone(),
            });
            outcomes.push(ItemOutcome {
                id: op.id.clone(),
                error: None,
            });
        }
        Ok(outcomes)
    }

    async fn scan_open(
        &self,
        index: &str,
        doc_type: Option<&str>,
        size: usize,
    ) -> Result<ScanPage> {
        let indices = self.indices.read().expect("indices lock");
        let data = indices
            .get(index)
            .ok_or_else(|| Error::SourceNotFound(index.to_string()))?;
        let docs = page(data, index, doc_type, 0, size);
        let token = Some(ScanToken::Offset {
            index: index.to_string(),
            doc_type: doc_type.map(str::to_string),
            from: docs.len(),
            size,
        });
        Ok(ScanPage { docs, token })
    }

    async fn scan_next(&self, token: ScanToken) -> Result<ScanPage> {
        match token {
            ScanToken::Offset {
                index,
                doc_type,
                from,
                size,
            } => {
                let indices = self.indices.read().expect("indices lock");
                let data = indices
                    .get(&index)
                    .ok_or_else(|| Error::SourceNotFound(index.clone()))?;
                let docs = page(data, &index, doc_type.as_deref(), from, size);
                let from = from + docs.len();
                Ok(ScanPage {
                    docs,
                    token: Some(ScanToken::Offset {
                        index,
                        doc_type,
                        from,
                        size,
                    }),
                })
            }
            ScanToken::Scroll { .. } => Err(Error::Internal(
                "scroll token handed to an in-memory store".to_string(),
            )),
        }
    }

    async fn scan_close(&self, _token: ScanToken) -> Result<()> {
        // No server-side scan state in process.
        Ok(())
    }

    async fn count(&self, index: &str, doc_type: Option<&str>) -> Result<u64> {
        let indices = self.indices.read().expect("indices lock");
        let data = indices
            .get(index)
            .ok_or_else(|| Error::SourceNotFound(index.to_string()))?;
        Ok(data
            .docs
            .iter()
            .filter(|doc| doc_type.is_none_or(|wanted| doc.doc_type == wanted))
            .count() as u64)
    }

    async fn refresh(&self) -> Result<()> {
        // Writes are visible immediately; the barrier is a no-op here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(index: &str, doc_type: &str, id: &str, source: &str) -> BulkOp {
        BulkOp {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            source: source.to_string(),
            parent: None,
            routing: None,
        }
    }

    #[tokio::test]
    async fn bulk_upserts_by_id_instead_of_duplicating() {
        let store = MemoryCluster::new();
        store
            .bulk(&[op("idx", "item", "1", r#"{"v":1}"#)])
            .await
            .unwrap();
        store
            .bulk(&[op("idx", "item", "1", r#"{"v":2}"#)])
            .await
            .unwrap();
        assert_eq!(store.count("idx", Some("item")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scan_pages_in_insertion_order_until_empty() {
        let store = MemoryCluster::new();
        store.create_index("idx").await.unwrap();
        for i in 1..=5 {
            store
                .insert("idx", "item", &i.to_string(), r#"{"v":0}"#, None)
                .await
                .unwrap();
        }
        let first = store.scan_open("idx", Some("item"), 2).await.unwrap();
        let ids: Vec<&str> = first.docs.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);

        let second = store.scan_next(first.token.unwrap()).await.unwrap();
        let ids: Vec<&str> = second.docs.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, ["3", "4"]);

        let third = store.scan_next(second.token.unwrap()).await.unwrap();
        assert_eq!(third.docs.len(), 1);
        let done = store.scan_next(third.token.unwrap()).await.unwrap();
        assert!(done.docs.is_empty());
        store.scan_close(done.token.unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn scan_attaches_declared_parent_type_from_mapping() {
        let store = MemoryCluster::new();
        store.create_index("company").await.unwrap();
        store
            .create_mapping("company", "employee", TypeMapping::with_parent("branch"))
            .await
            .unwrap();
        store
            .insert("company", "employee", "1_1", r#"{"name":"Taro"}"#, Some("1"))
            .await
            .unwrap();
        let page = store.scan_open("company", Some("employee"), 10).await.unwrap();
        let link = page.docs[0].parent.as_ref().unwrap();
        assert_eq!(link.parent_id, "1");
        assert_eq!(link.parent_type.as_deref(), Some("branch"));
    }

    #[tokio::test]
    async fn missing_index_scan_is_source_not_found() {
        let store = MemoryCluster::new();
        let err = store.scan_open("nope", None, 10).await.unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn list_types_covers_mappings_and_documents() {
        let store = MemoryCluster::new();
        store.create_index("idx").await.unwrap();
        store
            .create_mapping("idx", "mapped", TypeMapping::default())
            .await
            .unwrap();
        store
            .insert("idx", "stored", "1", r#"{}"#, None)
            .await
            .unwrap();
        assert_eq!(store.list_types("idx").await.unwrap(), ["mapped", "stored"]);
    }

    #[tokio::test]
    async fn reject_hook_fails_items_not_the_call() {
        let store = MemoryCluster::new();
        store.reject_type("bad");
        let outcomes = store
            .bulk(&[op("idx", "bad", "1", "{}"), op("idx", "good", "2", "{}")])
            .await
            .unwrap();
        assert!(outcomes[0].error.is_some());
        assert!(outcomes[1].error.is_none());
        assert_eq!(store.count("idx", None).await.unwrap(), 1);
    }
}
