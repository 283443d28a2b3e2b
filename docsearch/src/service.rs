//! One-stop wiring of backend, index manager, searcher and indexer

use crate::aggregations::AggregationParser;
use crate::backends::{ElasticsearchBackend, SearchBackend};
use crate::config::Config;
use crate::index::{IndexConfigurationListener, IndexManager, MappingDirListener};
use crate::indexer::Indexer;
use crate::searcher::Searcher;
use crate::Result;
use std::sync::Arc;
use tracing::info;

pub struct SearchEngineService {
    config: Config,
    index_manager: Arc<IndexManager>,
    searcher: Searcher,
    indexer: Indexer,
}

impl SearchEngineService {
    /// Connect to the configured Elasticsearch cluster
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = Arc::new(ElasticsearchBackend::new(&config.elasticsearch)?);
        info!("Using Elasticsearch at {}", backend.base_url());
        Ok(Self::new(config, backend))
    }

    pub fn new(config: Config, backend: Arc<dyn SearchBackend>) -> Self {
        Self::with_listeners(config, backend, Vec::new())
    }

    /// `listeners` run after the mapping directory listener, in order
    pub fn with_listeners(
        config: Config,
        backend: Arc<dyn SearchBackend>,
        listeners: Vec<Arc<dyn IndexConfigurationListener>>,
    ) -> Self {
        let mut all: Vec<Arc<dyn IndexConfigurationListener>> = Vec::new();
        if let Some(dir) = &config.index.mapping_dir {
            all.push(Arc::new(MappingDirListener::new(dir)));
        }
        all.extend(listeners);

        let index_manager = Arc::new(IndexManager::new(
            backend.clone(),
            config.index.clone(),
            all,
        ));
        let parser = AggregationParser::new(
            config.aggregations.locales.clone(),
            config.aggregations.min_doc_count,
        );

        Self {
            searcher: Searcher::new(backend, parser),
            indexer: Indexer::new(index_manager.clone()),
            index_manager,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index_manager
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }
}
