//! Engine-independent result model
//!
//! [`DocumentResults::from_response`] normalizes a raw search response. The
//! aggregation kind is read from the `kind#name` keys produced by
//! `typed_keys=true`:
//!
//! | engine kind                                         | result                    |
//! |-----------------------------------------------------|---------------------------|
//! | `global`                                            | [`AggregationValue::Global`] |
//! | `sterms`, `lterms`, `dterms`, `umterms`, `multi_terms` | [`AggregationValue::Terms`]  |
//! | `stats`                                             | [`AggregationValue::Stats`]  |
//! | `range`, `date_range`                               | [`AggregationValue::Range`]  |
//!
//! Anything else is skipped.

use crate::response::{
    EsBucket, EsBucketsResult, EsGlobalResult, EsSearchResponse, EsStatsResult, Hit,
};
use crate::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Name of the global aggregation added to every aggregation-bearing search
pub const AGG_TOTAL_COUNT: &str = "_all";

/// Source field carrying the document type discriminator
pub const CLASS_NAME_FIELD: &str = "className";

const TYPED_KEY_SEPARATOR: char = '#';

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentResults {
    pub total: u64,
    pub documents: Vec<DocumentResult>,
    pub aggregations: Vec<DocumentAggregation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentResult {
    pub id: String,
    pub index: Option<String>,
    pub score: Option<f64>,
    pub source: Option<Map<String, Value>>,
    /// Serialized `source`, as returned by the engine
    #[serde(skip)]
    pub source_bytes: Option<Vec<u8>>,
    pub class_name: Option<String>,
}

impl DocumentResult {
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source_str(&self) -> Option<&str> {
        self.source_bytes
            .as_deref()
            .and_then(|b| std::str::from_utf8(b).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentAggregation {
    pub name: String,
    pub value: AggregationValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationValue {
    Global { doc_count: u64 },
    Terms { buckets: Vec<TermsBucket> },
    Stats(StatsValue),
    Range { buckets: Vec<RangeBucketValue> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermsBucket {
    pub key: String,
    pub doc_count: u64,
    pub aggregations: Vec<DocumentAggregation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsValue {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub sum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeBucketValue {
    pub key: String,
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub doc_count: u64,
    pub aggregations: Vec<DocumentAggregation>,
}

impl DocumentResults {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result of a `_count` call: a total and nothing else
    pub fn from_count(count: u64) -> Self {
        Self {
            total: count,
            ..Default::default()
        }
    }

    pub fn from_response(response: EsSearchResponse) -> Result<Self> {
        let total = response
            .hits
            .total
            .as_ref()
            .map(|t| t.value)
            .unwrap_or(response.hits.hits.len() as u64);

        let documents = response
            .hits
            .hits
            .into_iter()
            .map(normalize_hit)
            .collect::<Result<Vec<_>>>()?;

        let aggregations = normalize_aggregations(&response.aggregations)?;

        Ok(Self {
            total,
            documents,
            aggregations,
        })
    }

    pub fn find_aggregation(&self, name: &str) -> Option<&DocumentAggregation> {
        self.aggregations.iter().find(|a| a.name == name)
    }

    /// Flat `bucket key -> doc count` for a terms or range aggregation.
    /// Empty when the aggregation is missing or has no buckets.
    pub fn aggregation(&self, name: &str) -> HashMap<String, u64> {
        match self.find_aggregation(name).map(|a| &a.value) {
            Some(AggregationValue::Terms { buckets }) => buckets
                .iter()
                .map(|b| (b.key.clone(), b.doc_count))
                .collect(),
            Some(AggregationValue::Range { buckets }) => buckets
                .iter()
                .map(|b| (b.key.clone(), b.doc_count))
                .collect(),
            _ => HashMap::new(),
        }
    }

    /// Doc count of the well-known global aggregation
    pub fn global_count(&self) -> Option<u64> {
        match self.find_aggregation(AGG_TOTAL_COUNT).map(|a| &a.value) {
            Some(AggregationValue::Global { doc_count }) => Some(*doc_count),
            _ => None,
        }
    }

    pub fn stats(&self, name: &str) -> Option<&StatsValue> {
        match self.find_aggregation(name).map(|a| &a.value) {
            Some(AggregationValue::Stats(stats)) => Some(stats),
            _ => None,
        }
    }
}

fn normalize_hit(hit: Hit) -> Result<DocumentResult> {
    let source_bytes = hit.source.as_ref().map(serde_json::to_vec).transpose()?;
    let class_name = hit
        .source
        .as_ref()
        .and_then(|s| s.get(CLASS_NAME_FIELD))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(DocumentResult {
        id: hit.id,
        index: hit.index,
        score: hit.score,
        source: hit.source,
        source_bytes,
        class_name,
    })
}

fn normalize_aggregations(raw: &BTreeMap<String, Value>) -> Result<Vec<DocumentAggregation>> {
    let mut aggregations = Vec::new();
    for (typed_key, value) in raw {
        let Some((kind, name)) = typed_key.split_once(TYPED_KEY_SEPARATOR) else {
            continue;
        };

        let value = match kind {
            "global" => {
                let global: EsGlobalResult = serde_json::from_value(value.clone())?;
                AggregationValue::Global {
                    doc_count: global.doc_count,
                }
            }
            "sterms" | "lterms" | "dterms" | "umterms" | "multi_terms" => {
                let result: EsBucketsResult = serde_json::from_value(value.clone())?;
                AggregationValue::Terms {
                    buckets: result
                        .buckets
                        .iter()
                        .map(terms_bucket)
                        .collect::<Result<Vec<_>>>()?,
                }
            }
            "stats" => {
                let stats: EsStatsResult = serde_json::from_value(value.clone())?;
                AggregationValue::Stats(StatsValue {
                    count: stats.count,
                    min: stats.min,
                    max: stats.max,
                    avg: stats.avg,
                    sum: stats.sum,
                })
            }
            "range" | "date_range" => {
                let result: EsBucketsResult = serde_json::from_value(value.clone())?;
                AggregationValue::Range {
                    buckets: result
                        .buckets
                        .iter()
                        .map(range_bucket)
                        .collect::<Result<Vec<_>>>()?,
                }
            }
            other => {
                debug!("Skipping aggregation '{}' of unsupported kind '{}'", name, other);
                continue;
            }
        };

        aggregations.push(DocumentAggregation {
            name: name.to_string(),
            value,
        });
    }
    Ok(aggregations)
}

fn terms_bucket(bucket: &EsBucket) -> Result<TermsBucket> {
    Ok(TermsBucket {
        key: bucket.key_string(),
        doc_count: bucket.doc_count,
        aggregations: normalize_aggregations(&bucket.sub_aggs)?,
    })
}

fn range_bucket(bucket: &EsBucket) -> Result<RangeBucketValue> {
    Ok(RangeBucketValue {
        key: bucket.key_string(),
        from: bucket.from,
        to: bucket.to,
        doc_count: bucket.doc_count,
        aggregations: normalize_aggregations(&bucket.sub_aggs)?,
    })
}
