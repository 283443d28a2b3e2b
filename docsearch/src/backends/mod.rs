//! Search engine backends
//!
//! [`SearchBackend`] is the one seam between this crate and the engine. The
//! bundled implementation talks to Elasticsearch over HTTP; tests plug in an
//! in-memory recorder.

pub mod elasticsearch;

pub use elasticsearch::ElasticsearchBackend;

use crate::query::types::{EsQuery, EsSearchRequest};
use crate::response::{EsBulkResponse, EsSearchResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Not-found is `Ok(false)`
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create an index with the given `settings` body
    async fn create_index(&self, index: &str, settings: &Value) -> Result<()>;

    /// Fails with [`Error::IndexNotFound`] when absent
    async fn delete_index(&self, index: &str) -> Result<()>;

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()>;

    /// Mapping body of `index`, without the index-name wrapper
    async fn get_mapping(&self, index: &str) -> Result<Value>;

    async fn search(&self, index: &str, request: &EsSearchRequest) -> Result<EsSearchResponse>;

    async fn count(&self, index: &str, query: &EsQuery) -> Result<u64>;

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
        routing: Option<&str>,
    ) -> Result<()>;

    async fn bulk(&self, index: &str, actions: &[BulkAction]) -> Result<EsBulkResponse>;

    /// A missing document is not an error
    async fn delete_document(&self, index: &str, id: &str) -> Result<()>;

    /// Returns the number of deleted documents
    async fn delete_by_query(&self, index: &str, query: &EsQuery) -> Result<u64>;
}

/// One action of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    Index {
        id: String,
        routing: Option<String>,
        document: Value,
    },
    Delete {
        id: String,
        routing: Option<String>,
    },
}

#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    routing: Option<&'a str>,
}

impl BulkAction {
    pub fn id(&self) -> &str {
        match self {
            BulkAction::Index { id, .. } | BulkAction::Delete { id, .. } => id,
        }
    }

    /// Append this action's NDJSON lines for `index` to `out`
    pub fn write_ndjson(&self, index: &str, out: &mut String) -> Result<()> {
        let (verb, id, routing, document) = match self {
            BulkAction::Index {
                id,
                routing,
                document,
            } => ("index", id, routing, Some(document)),
            BulkAction::Delete { id, routing } => ("delete", id, routing, None),
        };

        let mut meta = serde_json::Map::new();
        meta.insert(
            verb.to_string(),
            serde_json::to_value(ActionMeta {
                index,
                id,
                routing: routing.as_deref(),
            })?,
        );
        out.push_str(&serde_json::to_string(&meta)?);
        out.push('\n');
        if let Some(document) = document {
            out.push_str(&serde_json::to_string(document)?);
            out.push('\n');
        }
        Ok(())
    }
}

/// NDJSON body for a bulk request
pub fn bulk_body(index: &str, actions: &[BulkAction]) -> Result<String> {
    let mut body = String::new();
    for action in actions {
        action.write_ndjson(index, &mut body)?;
    }
    Ok(body)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

/// Outcome of one bulk request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkSummary {
    pub fn from_response(response: &EsBulkResponse) -> Self {
        let mut summary = BulkSummary {
            total: response.items.len(),
            ..Default::default()
        };

        for item in &response.items {
            let Some(result) = item.result() else {
                continue;
            };
            // 404 on delete means already gone
            let failed = result.error.is_some() || (result.status >= 300 && result.status != 404);
            if failed {
                summary.failures.push(BulkFailure {
                    id: result.id.clone().unwrap_or_default(),
                    status: result.status,
                    reason: result
                        .error
                        .as_ref()
                        .map(|e| e.reason.clone().unwrap_or_else(|| e.error_type.clone()))
                        .unwrap_or_else(|| format!("status {}", result.status)),
                });
            } else {
                summary.succeeded += 1;
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// `Err(Error::Bulk)` when any item failed
    pub fn into_result(self, index: &str) -> Result<Self> {
        if self.has_failures() {
            Err(Error::Bulk {
                index: index.to_string(),
                failed: self.failures.len(),
                total: self.total,
            })
        } else {
            Ok(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bulk_body_ndjson() {
        let actions = vec![
            BulkAction::Index {
                id: "1".into(),
                routing: Some("p1".into()),
                document: json!({"name": "A"}),
            },
            BulkAction::Delete {
                id: "2".into(),
                routing: None,
            },
        ];
        let body = bulk_body("studies", &actions).unwrap();
        let lines: Vec<Value> = body
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            json!({"index": {"_index": "studies", "_id": "1", "routing": "p1"}})
        );
        assert_eq!(lines[1], json!({"name": "A"}));
        assert_eq!(lines[2], json!({"delete": {"_index": "studies", "_id": "2"}}));
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_bulk_summary_counts_failures() {
        let response: EsBulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                {"index": {"_id": "1", "status": 201}},
                {"index": {"_id": "2", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "bad field"}}},
                {"delete": {"_id": "3", "status": 404}}
            ]
        }))
        .unwrap();
        let summary = BulkSummary::from_response(&response);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(
            summary.failures,
            vec![BulkFailure {
                id: "2".into(),
                status: 400,
                reason: "bad field".into()
            }]
        );

        let err = summary.into_result("studies").unwrap_err();
        assert!(matches!(err, Error::Bulk { failed: 1, total: 3, .. }));
    }

    #[test]
    fn test_bulk_summary_clean() {
        let response: EsBulkResponse = serde_json::from_value(json!({
            "errors": false,
            "items": [{"index": {"_id": "1", "status": 200}}]
        }))
        .unwrap();
        let summary = BulkSummary::from_response(&response).into_result("i").unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(!summary.has_failures());
    }
}
