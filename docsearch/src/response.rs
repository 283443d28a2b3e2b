//! Elasticsearch response wire types
//!
//! Only the parts this layer reads are modeled. Aggregations stay as raw
//! JSON keyed by `kind#name` (requests are sent with `typed_keys=true`) and
//! are interpreted by [`crate::results`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Search response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EsSearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub hits: HitsResponse,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregations: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitsResponse {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    /// `eq` when exact, `gte` when tracking stopped early
    #[serde(default = "default_relation")]
    pub relation: String,
}

fn default_relation() -> String {
    "eq".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_routing", default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Map<String, Value>>,
}

/// Bucket of a terms or range aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsBucket {
    pub key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,
    pub doc_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<f64>,
    /// Nested aggregations plus any fields not modeled above
    #[serde(flatten)]
    pub sub_aggs: BTreeMap<String, Value>,
}

impl EsBucket {
    /// Bucket key as text. Numeric keys keep their JSON rendering.
    pub fn key_string(&self) -> String {
        if let Some(s) = &self.key_as_string {
            return s.clone();
        }
        match &self.key {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsBucketsResult {
    #[serde(default)]
    pub buckets: Vec<EsBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsStatsResult {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub sum: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsGlobalResult {
    pub doc_count: u64,
}

/// `_count` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsCountResponse {
    pub count: u64,
}

/// Bulk response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EsBulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItemResponse>,
}

/// One bulk item, keyed by the action that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<BulkItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<BulkItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<BulkItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<BulkItemResult>,
}

impl BulkItemResponse {
    pub fn result(&self) -> Option<&BulkItemResult> {
        self.index
            .as_ref()
            .or(self.create.as_ref())
            .or(self.update.as_ref())
            .or(self.delete.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EsError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsErrorResponse {
    pub error: Value,
    #[serde(default)]
    pub status: Option<u16>,
}

impl EsErrorResponse {
    /// Human-readable reason, falling back to the error type
    pub fn reason(&self) -> String {
        match &self.error {
            Value::String(s) => s.clone(),
            Value::Object(obj) => obj
                .get("reason")
                .or_else(|| obj.get("type"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.error.to_string()),
            other => other.to_string(),
        }
    }

    /// Error type as reported by the engine
    pub fn error_type(&self) -> Option<&str> {
        self.error.get("type").and_then(Value::as_str)
    }
}

/// `_delete_by_query` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EsDeleteByQueryResponse {
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub failures: Vec<Value>,
}
