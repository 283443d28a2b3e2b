//! Index lifecycle
//!
//! [`IndexManager`] creates indices on demand. The check-then-create sequence
//! is serialized per index name, so concurrent callers see exactly one
//! creation and listeners run once per created index.

use crate::backends::SearchBackend;
use crate::config::IndexSettings;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Callback run once, right after an index is created
#[async_trait]
pub trait IndexConfigurationListener: Send + Sync {
    async fn on_index_created(&self, backend: &dyn SearchBackend, index: &str) -> Result<()>;
}

pub struct IndexManager {
    backend: Arc<dyn SearchBackend>,
    settings: IndexSettings,
    listeners: Vec<Arc<dyn IndexConfigurationListener>>,
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndexManager {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        settings: IndexSettings,
        listeners: Vec<Arc<dyn IndexConfigurationListener>>,
    ) -> Self {
        Self {
            backend,
            settings,
            listeners,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    fn lock_for(&self, index: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(index.to_string())
            .or_default()
            .clone()
    }

    /// Create `index` if absent. Returns true when this call created it.
    ///
    /// A failing listener aborts the creation: the half-configured index is
    /// dropped again and the failure surfaces as [`Error::Configuration`].
    pub async fn ensure_index(&self, index: &str) -> Result<bool> {
        let lock = self.lock_for(index);
        let _guard = lock.lock().await;

        trace!("Ensuring index existence for index {}", index);
        if self.has_index(index).await? {
            return Ok(false);
        }

        let body = self.settings.create_body()?;
        info!("Creating index {}", index);
        self.backend
            .create_index(index, &body)
            .await
            .inspect_err(|e| error!("Failed to create index {} - {}", index, e))?;

        for listener in &self.listeners {
            if let Err(e) = listener.on_index_created(self.backend.as_ref(), index).await {
                error!("Index configuration listener failed on {} - {}", index, e);
                if let Err(drop_err) = self.backend.delete_index(index).await {
                    warn!(
                        "Failed to drop half-configured index {} - {}",
                        index, drop_err
                    );
                }
                return Err(Error::Configuration(format!(
                    "Index configuration failed for {index}: {e}"
                )));
            }
        }
        Ok(true)
    }

    /// Not-found is `Ok(false)`
    pub async fn has_index(&self, index: &str) -> Result<bool> {
        self.backend
            .index_exists(index)
            .await
            .inspect_err(|e| error!("Failed to find index {} - {}", index, e))
    }

    /// Delete `index`; an absent index is a no-op
    pub async fn drop_index(&self, index: &str) -> Result<()> {
        let lock = self.lock_for(index);
        let _guard = lock.lock().await;

        match self.backend.delete_index(index).await {
            Ok(()) => {
                info!("Dropped index {}", index);
                Ok(())
            }
            Err(Error::IndexNotFound(_)) => {
                debug!("Index {} absent, nothing to drop", index);
                Ok(())
            }
            Err(e) => {
                error!("Failed to drop index {} - {}", index, e);
                Err(e)
            }
        }
    }

    /// Field mapping of `index`; empty when the index does not exist
    pub async fn field_mapping(&self, index: &str) -> Result<IndexFieldMapping> {
        if !self.has_index(index).await? {
            return Ok(IndexFieldMapping::empty());
        }
        let mapping = self
            .backend
            .get_mapping(index)
            .await
            .inspect_err(|e| error!("Failed to read mapping of index {} - {}", index, e))?;
        Ok(IndexFieldMapping::new(mapping))
    }
}

/// Read-only view over an index mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexFieldMapping {
    mapping: Value,
}

impl IndexFieldMapping {
    pub fn new(mapping: Value) -> Self {
        Self { mapping }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_value(&self) -> &Value {
        &self.mapping
    }

    /// True when the dotted `field` has an `analyzed` sub-field somewhere
    /// beneath it. Each path segment may sit at any depth below the
    /// previous one, so `name.en` matches
    /// `properties.name.properties.en.fields.analyzed`.
    pub fn is_analyzed(&self, field: &str) -> bool {
        let path: Vec<&str> = field
            .split('.')
            .filter(|s| !s.is_empty())
            .chain(std::iter::once("analyzed"))
            .collect();
        deep_match(&self.mapping, &path)
    }
}

fn deep_match(node: &Value, path: &[&str]) -> bool {
    let Some((head, rest)) = path.split_first() else {
        return true;
    };
    match node {
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| (k == head && deep_match(v, rest)) || deep_match(v, path)),
        Value::Array(items) => items.iter().any(|v| deep_match(v, path)),
        _ => false,
    }
}

/// Applies `<dir>/<index>.json` as the mapping of each new index
#[derive(Debug, Clone)]
pub struct MappingDirListener {
    dir: PathBuf,
}

impl MappingDirListener {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn mapping_path(&self, index: &str) -> PathBuf {
        self.dir.join(format!("{index}.json"))
    }
}

#[async_trait]
impl IndexConfigurationListener for MappingDirListener {
    async fn on_index_created(&self, backend: &dyn SearchBackend, index: &str) -> Result<()> {
        let path = self.mapping_path(index);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No mapping file for index {} at {}", index, path.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut mapping: Value = serde_json::from_str(&content)?;
        // Accept both the bare mapping and the `{"mappings": ...}` wrapper
        if let Some(inner) = mapping.get_mut("mappings").map(Value::take) {
            mapping = inner;
        }

        info!("Applying mapping {} to index {}", path.display(), index);
        backend.put_mapping(index, &mapping).await
    }
}
