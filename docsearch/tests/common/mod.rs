//! In-memory backend shared by the integration tests
//!
//! Records every call, keeps documents per index and returns canned search
//! responses. Failures can be injected per operation.

#![allow(dead_code)]

use async_trait::async_trait;
use docsearch::backends::{BulkAction, SearchBackend};
use docsearch::query::types::{EsQuery, EsSearchRequest};
use docsearch::response::{EsBulkResponse, EsSearchResponse};
use docsearch::{Error, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryBackend {
    indices: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    mappings: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<String>>,
    searches: Mutex<Vec<(String, EsSearchRequest)>>,
    counts: Mutex<Vec<(String, EsQuery)>>,
    bulks: Mutex<Vec<(String, Vec<BulkAction>)>>,
    search_response: Mutex<Option<Value>>,
    failing_ids: Mutex<HashSet<String>>,
    fail_create: Mutex<bool>,
    create_delay: Mutex<Option<Duration>>,
    create_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with `index` already present
    pub fn with_index(index: &str) -> Self {
        let backend = Self::new();
        backend.add_index(index);
        backend
    }

    pub fn add_index(&self, index: &str) {
        self.indices.lock().entry(index.to_string()).or_default();
    }

    pub fn has(&self, index: &str) -> bool {
        self.indices.lock().contains_key(index)
    }

    pub fn documents(&self, index: &str) -> BTreeMap<String, Value> {
        self.indices.lock().get(index).cloned().unwrap_or_default()
    }

    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.mappings.lock().get(index).cloned()
    }

    pub fn set_mapping(&self, index: &str, mapping: Value) {
        self.mappings.lock().insert(index.to_string(), mapping);
    }

    /// Canned body returned by every subsequent search
    pub fn respond_with(&self, body: Value) {
        *self.search_response.lock() = Some(body);
    }

    /// Bulk items with these ids fail with status 400
    pub fn fail_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_ids
            .lock()
            .extend(ids.into_iter().map(Into::into));
    }

    pub fn fail_create(&self) {
        *self.fail_create.lock() = true;
    }

    /// Sleep inside `create_index` to widen race windows
    pub fn delay_create(&self, delay: Duration) {
        *self.create_delay.lock() = Some(delay);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .count()
    }

    pub fn searches(&self) -> Vec<(String, EsSearchRequest)> {
        self.searches.lock().clone()
    }

    /// Serialized body of the most recent search
    pub fn last_search(&self) -> Value {
        self.searches
            .lock()
            .last()
            .map(|(_, r)| serde_json::to_value(r).unwrap())
            .expect("no search recorded")
    }

    pub fn counts(&self) -> Vec<(String, EsQuery)> {
        self.counts.lock().clone()
    }

    pub fn bulks(&self) -> Vec<(String, Vec<BulkAction>)> {
        self.bulks.lock().clone()
    }

    fn record(&self, operation: &str, index: &str) {
        self.calls.lock().push(format!("{operation} {index}"));
    }

    fn require(&self, index: &str) -> Result<()> {
        if self.has(index) {
            Ok(())
        } else {
            Err(Error::IndexNotFound(index.to_string()))
        }
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.record("exists", index);
        Ok(self.has(index))
    }

    async fn create_index(&self, index: &str, _settings: &Value) -> Result<()> {
        self.record("create", index);
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_create.lock() {
            return Err(Error::Backend {
                index: index.to_string(),
                status: 500,
                reason: "injected create failure".to_string(),
            });
        }
        if self.has(index) {
            return Err(Error::Backend {
                index: index.to_string(),
                status: 400,
                reason: "resource_already_exists_exception".to_string(),
            });
        }
        self.add_index(index);
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.record("delete_index", index);
        self.indices
            .lock()
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        self.mappings.lock().remove(index);
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        self.record("put_mapping", index);
        self.require(index)?;
        self.set_mapping(index, mapping.clone());
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value> {
        self.record("get_mapping", index);
        self.require(index)?;
        Ok(self.mapping(index).unwrap_or_else(|| json!({})))
    }

    async fn search(&self, index: &str, request: &EsSearchRequest) -> Result<EsSearchResponse> {
        self.record("search", index);
        self.searches
            .lock()
            .push((index.to_string(), request.clone()));
        self.require(index)?;
        let body = self.search_response.lock().clone();
        match body {
            Some(body) => Ok(serde_json::from_value(body)?),
            None => Ok(EsSearchResponse::default()),
        }
    }

    async fn count(&self, index: &str, query: &EsQuery) -> Result<u64> {
        self.record("count", index);
        self.counts.lock().push((index.to_string(), query.clone()));
        self.require(index)?;
        Ok(self.documents(index).len() as u64)
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
        _routing: Option<&str>,
    ) -> Result<()> {
        self.record("index", index);
        self.require(index)?;
        self.indices
            .lock()
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn bulk(&self, index: &str, actions: &[BulkAction]) -> Result<EsBulkResponse> {
        self.record("bulk", index);
        self.bulks.lock().push((index.to_string(), actions.to_vec()));
        self.require(index)?;

        let failing = self.failing_ids.lock().clone();
        let mut indices = self.indices.lock();
        let docs = indices.entry(index.to_string()).or_default();
        let mut items = Vec::with_capacity(actions.len());
        for action in actions {
            let id = action.id().to_string();
            let verb = match action {
                BulkAction::Index { .. } => "index",
                BulkAction::Delete { .. } => "delete",
            };
            if failing.contains(&id) {
                items.push(bulk_item(
                    verb,
                    json!({
                        "_id": id,
                        "status": 400,
                        "error": {"type": "mapper_parsing_exception", "reason": "injected"}
                    }),
                ));
                continue;
            }
            let status = match action {
                BulkAction::Index { document, .. } => {
                    docs.insert(id.clone(), document.clone());
                    201
                }
                BulkAction::Delete { .. } => {
                    if docs.remove(&id).is_some() {
                        200
                    } else {
                        404
                    }
                }
            };
            items.push(bulk_item(verb, json!({"_id": id, "status": status})));
        }

        let errors = items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|item| item.values())
            .any(|result| result.get("error").is_some());
        Ok(serde_json::from_value(json!({
            "took": 1,
            "errors": errors,
            "items": items
        }))?)
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<()> {
        self.record("delete", index);
        self.require(index)?;
        if let Some(docs) = self.indices.lock().get_mut(index) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn delete_by_query(&self, index: &str, query: &EsQuery) -> Result<u64> {
        self.record("delete_by_query", index);
        self.require(index)?;
        let EsQuery::Term(terms) = query else {
            return Ok(0);
        };
        let mut indices = self.indices.lock();
        let Some(docs) = indices.get_mut(index) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|_, doc| !terms.iter().all(|(field, value)| doc.get(field) == Some(value)));
        Ok((before - docs.len()) as u64)
    }
}

fn bulk_item(verb: &str, result: Value) -> Value {
    let mut item = serde_json::Map::new();
    item.insert(verb.to_string(), result);
    Value::Object(item)
}
