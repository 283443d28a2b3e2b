//! Locale-aware query, aggregation and result-normalization layer over
//! Elasticsearch.
//!
//! Applications describe what they want with a [`query::CompiledQuery`], a
//! flat [`aggregations::AggregationProperties`] map and optional
//! [`filter::IdFilter`] / [`filter::TermFilter`] values. The [`Searcher`]
//! turns those into one engine request and returns engine-independent
//! [`results::DocumentResults`]. Writes go through the [`Indexer`], which
//! creates and configures indices on first use.

pub mod aggregations;
pub mod backends;
pub mod config;
pub mod error;
pub mod filter;
pub mod index;
pub mod indexer;
pub mod query;
pub mod response;
pub mod results;
pub mod searcher;
pub mod service;
pub mod support;

pub use config::Config;
pub use error::{Error, Result};
pub use indexer::{Indexable, Indexer};
pub use searcher::{DocumentsRequest, Searcher};
pub use service::SearchEngineService;
