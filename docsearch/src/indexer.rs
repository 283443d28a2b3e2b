//! Write-side document operations
//!
//! Every write goes through [`IndexManager::ensure_index`] first, so a
//! document never lands in an index that was created without its settings
//! and mapping.

use crate::backends::{BulkAction, BulkSummary, SearchBackend};
use crate::index::IndexManager;
use crate::query::types::EsQuery;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A document that can be written to an index
pub trait Indexable: Serialize + Send + Sync {
    fn id(&self) -> String;
}

impl Indexable for Value {
    /// The `id` member, or empty when absent
    fn id(&self) -> String {
        match self.get(crate::filter::ID_FIELD) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }
}

pub struct Indexer {
    backend: Arc<dyn SearchBackend>,
    index_manager: Arc<IndexManager>,
    reindex_lock: tokio::sync::Mutex<()>,
}

impl Indexer {
    pub fn new(index_manager: Arc<IndexManager>) -> Self {
        Self {
            backend: index_manager.backend().clone(),
            index_manager,
            reindex_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index_manager
    }

    /// Write one document, routed to `parent_id` when given
    pub async fn index<T: Indexable + ?Sized>(
        &self,
        index: &str,
        document: &T,
        parent_id: Option<&str>,
    ) -> Result<()> {
        let id = document.id();
        if id.is_empty() {
            return Err(Error::Configuration(format!(
                "Cannot index a document without id into {index}"
            )));
        }
        let body = serde_json::to_value(document)?;

        self.index_manager.ensure_index(index).await?;
        debug!("Indexing document {} into {}", id, index);
        self.backend
            .index_document(index, &id, &body, parent_id)
            .await
            .inspect_err(|e| error!("Failed to index document {} into {} - {}", id, index, e))
    }

    /// Write a batch in one bulk request. The index is created even for an
    /// empty batch; only the bulk call is skipped. Any document without id
    /// rejects the whole batch before anything is written.
    pub async fn index_all<T: Indexable>(
        &self,
        index: &str,
        documents: &[T],
        parent_id: Option<&str>,
    ) -> Result<BulkSummary> {
        let actions = documents
            .iter()
            .map(|doc| {
                let id = doc.id();
                if id.is_empty() {
                    return Err(Error::Configuration(format!(
                        "Cannot index a document without id into {index}"
                    )));
                }
                Ok(BulkAction::Index {
                    id,
                    routing: parent_id.map(str::to_string),
                    document: serde_json::to_value(doc)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.index_manager.ensure_index(index).await?;
        if actions.is_empty() {
            debug!("Nothing to index into {}", index);
            return Ok(BulkSummary::default());
        }

        let response = self
            .backend
            .bulk(index, &actions)
            .await
            .inspect_err(|e| error!("Failed to bulk index {} - {}", index, e))?;

        let summary = BulkSummary::from_response(&response);
        for failure in &summary.failures {
            error!(
                "Failed to index document {} into {} ({}) - {}",
                failure.id, index, failure.status, failure.reason
            );
        }
        info!(
            "Indexed {}/{} document(s) into {}",
            summary.succeeded, summary.total, index
        );
        summary.into_result(index)
    }

    /// Drop `index` and rebuild it from `documents`. Concurrent reindexing
    /// calls run one after the other.
    pub async fn reindex_all<T: Indexable>(
        &self,
        index: &str,
        documents: &[T],
        parent_id: Option<&str>,
    ) -> Result<BulkSummary> {
        let _guard = self.reindex_lock.lock().await;

        if self.index_manager.has_index(index).await? {
            info!("Reindexing {}: dropping existing index", index);
            self.index_manager.drop_index(index).await?;
        }
        if documents.is_empty() {
            // Leave an empty, properly configured index behind
            self.index_manager.ensure_index(index).await?;
            return Ok(BulkSummary::default());
        }
        self.index_all(index, documents, parent_id).await
    }

    pub async fn delete(&self, index: &str, id: &str) -> Result<()> {
        self.index_manager.ensure_index(index).await?;
        debug!("Deleting document {} from {}", id, index);
        self.backend
            .delete_document(index, id)
            .await
            .inspect_err(|e| error!("Failed to delete document {} from {} - {}", id, index, e))
    }

    pub async fn delete_all<T: Indexable>(&self, index: &str, documents: &[T]) -> Result<BulkSummary> {
        if documents.is_empty() {
            return Ok(BulkSummary::default());
        }
        let actions: Vec<BulkAction> = documents
            .iter()
            .map(|doc| BulkAction::Delete {
                id: doc.id(),
                routing: None,
            })
            .collect();

        self.index_manager.ensure_index(index).await?;
        let response = self
            .backend
            .bulk(index, &actions)
            .await
            .inspect_err(|e| error!("Failed to bulk delete from {} - {}", index, e))?;
        BulkSummary::from_response(&response).into_result(index)
    }

    /// Delete every document whose `field` equals `value`. Returns the
    /// number deleted; a missing index deletes nothing.
    pub async fn delete_by_term(&self, index: &str, field: &str, value: &str) -> Result<u64> {
        if !self.index_manager.has_index(index).await? {
            debug!("Index {} absent, nothing to delete", index);
            return Ok(0);
        }

        let query = EsQuery::term(field, value);
        let deleted = self
            .backend
            .delete_by_query(index, &query)
            .await
            .inspect_err(|e| error!("Failed to delete by {} from {} - {}", field, index, e))?;
        info!("Deleted {} document(s) from {}", deleted, index);
        Ok(deleted)
    }
}
