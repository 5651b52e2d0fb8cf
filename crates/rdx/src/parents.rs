//! Parent-child resolution against the destination mapping.
//!
//! A child keeps its parent only when the destination type also declares a
//! parent relationship of a matching parent type; the child is then routed
//! with its parent, same shard-affinity rule as ordinary parent-child
//! indexing. A destination without a parent declaration silently drops the
//! link, so partial mapping copies degrade to parentless documents instead
//! of failing the request. Callers needing strict enforcement pre-create
//! matching mappings on the destination.

use std::collections::HashMap;

use tracing::trace;

use crate::cluster::{BulkOp, ClusterBackend, DocumentStore, TypeMapping};
use crate::common::{DocumentBatch, ParentLink};
use crate::error::Result;

/// Stamps destination addressing onto scanned documents and resolves their
/// parent links. Destination mappings are fetched once per type and cached
/// for the life of the request.
#[derive(Debug)]
pub struct ParentResolver {
    store: ClusterBackend,
    dest_index: String,
    /// Destination type override; `None` keeps each document's source type.
    dest_type: Option<String>,
    cache: HashMap<String, Option<TypeMapping>>,
}

impl ParentResolver {
    pub fn new(store: ClusterBackend, dest_index: &str, dest_type: Option<&str>) -> Self {
        Self {
            store,
            dest_index: dest_index.to_string(),
            dest_type: dest_type.map(str::to_string),
            cache: HashMap::new(),
        }
    }

    async fn dest_mapping(&mut self, doc_type: &str) -> Result<Option<TypeMapping>> {
        if let Some(cached) = self.cache.get(doc_type) {
            return Ok(cached.clone());
        }
        let mapping = self.store.mapping(&self.dest_index, doc_type).await?;
        self.cache.insert(doc_type.to_string(), mapping.clone());
        Ok(mapping)
    }

    /// `(parent id, routing)` to apply in the destination, or `(None, None)`
    /// when the link is dropped.
    pub async fn resolve(
        &mut self,
        target_type: &str,
        link: &ParentLink,
    ) -> Result<(Option<String>, Option<String>)> {
        let declared = self
            .dest_mapping(target_type)
            .await?
            .and_then(|mapping| mapping.parent_type);
        match declared {
            // An unknown source-declared type (remote hits) matches any
            // destination parent declaration.
            Some(dest_parent)
                if link
                    .parent_type
                    .as_deref()
                    .is_none_or(|source_parent| source_parent == dest_parent) =>
            {
                Ok((Some(link.parent_id.clone()), Some(link.parent_id.clone())))
            }
            _ => {
                trace!(target_type, parent = %link.parent_id, "dropping parent link");
                Ok((None, None))
            }
        }
    }

    /// Turns a scanned batch into destination-addressed bulk ops.
    pub async fn transform(&mut self, batch: DocumentBatch) -> Result<Vec<BulkOp>> {
        let mut ops = Vec::with_capacity(batch.len());
        for doc in batch.docs {
            let target_type = self
                .dest_type
                .clone()
                .unwrap_or_else(|| doc.doc_type.clone());
            let (parent, routing) = match &doc.parent {
                Some(link) => self.resolve(&target_type, link).await?,
                // No link involved: carry any explicit routing unchanged.
                None => (None, doc.routing.clone()),
            };
            ops.push(BulkOp {
                index: self.dest_index.clone(),
                doc_type: target_type,
                id: doc.id,
                source: doc.source,
                parent,
                routing,
            });
        }
        Ok(ops)
    }
}
