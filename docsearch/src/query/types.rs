//! Elasticsearch Query DSL types
//!
//! The subset of the engine's request body this layer emits. Maps are
//! `BTreeMap` so that serialized requests are stable across runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Root search request body
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EsSearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<EsQuery>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    #[serde(default, rename = "_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceFilter>,

    #[serde(default, alias = "aggregations", skip_serializing_if = "BTreeMap::is_empty")]
    pub aggs: BTreeMap<String, EsAggregation>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortClause>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<TrackTotalHits>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TrackTotalHits {
    Bool(bool),
    Count(usize),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceFilter {
    Bool(bool),
    Fields(Vec<String>),
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        includes: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        excludes: Option<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SortClause {
    Field(String),
    Object(BTreeMap<String, SortSpec>),
}

impl SortClause {
    pub fn field(name: impl Into<String>, order: SortDirection) -> Self {
        SortClause::Object(BTreeMap::from([(name.into(), SortSpec { order })]))
    }

    /// Relevance score, best first
    pub fn score_desc() -> Self {
        Self::field("_score", SortDirection::Desc)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SortSpec {
    pub order: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Lenient parse of a caller-supplied order, defaulting to ascending
    pub fn parse_or_asc(order: Option<&str>) -> Self {
        match order {
            Some(o) if o.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }
}

/// Query clauses
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EsQuery {
    MatchAll(MatchAllQuery),

    /// Exact match, not analyzed
    Term(BTreeMap<String, Value>),

    /// Prefix match on a keyword field
    Prefix(BTreeMap<String, String>),

    Bool(BoolQuery),

    Exists(ExistsQuery),

    /// Lucene-syntax query string
    QueryString(QueryStringQuery),

    /// Native document id lookup
    Ids(IdsQuery),
}

impl EsQuery {
    pub fn match_all() -> Self {
        EsQuery::MatchAll(MatchAllQuery::default())
    }

    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        EsQuery::Term(BTreeMap::from([(field.into(), value.into())]))
    }

    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        EsQuery::Prefix(BTreeMap::from([(field.into(), value.into())]))
    }

    pub fn exists(field: impl Into<String>) -> Self {
        EsQuery::Exists(ExistsQuery {
            field: field.into(),
        })
    }

    pub fn ids<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EsQuery::Ids(IdsQuery {
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn query_string(query: impl Into<String>) -> Self {
        EsQuery::QueryString(QueryStringQuery {
            query: query.into(),
            default_field: None,
            fields: None,
            default_operator: None,
        })
    }

    /// Both clauses must match
    pub fn and(self, other: EsQuery) -> Self {
        EsQuery::Bool(BoolQuery::default().must(self).must(other))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MatchAllQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BoolQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<EsQuery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<EsQuery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<EsQuery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<EsQuery>,
}

impl BoolQuery {
    pub fn must(mut self, query: EsQuery) -> Self {
        self.must.push(query);
        self
    }

    pub fn should(mut self, query: EsQuery) -> Self {
        self.should.push(query);
        self
    }

    pub fn must_not(mut self, query: EsQuery) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn filter(mut self, query: EsQuery) -> Self {
        self.filter.push(query);
        self
    }

    pub fn into_query(self) -> EsQuery {
        EsQuery::Bool(self)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExistsQuery {
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryStringQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_operator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IdsQuery {
    pub values: Vec<String>,
}

/// Aggregation definition. Exactly one of the kind fields is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EsAggregation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<TermsAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<FieldAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalAgg>,

    #[serde(
        default,
        alias = "aggregations",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub aggs: BTreeMap<String, EsAggregation>,
}

impl EsAggregation {
    pub fn global() -> Self {
        Self {
            global: Some(GlobalAgg {}),
            ..Default::default()
        }
    }

    pub fn terms(terms: TermsAgg) -> Self {
        Self {
            terms: Some(terms),
            ..Default::default()
        }
    }

    pub fn stats(field: impl Into<String>) -> Self {
        Self {
            stats: Some(FieldAgg {
                field: field.into(),
            }),
            ..Default::default()
        }
    }

    pub fn range(range: RangeAgg) -> Self {
        Self {
            range: Some(range),
            ..Default::default()
        }
    }

    pub fn with_sub_aggregation(mut self, name: impl Into<String>, agg: EsAggregation) -> Self {
        self.aggs.insert(name.into(), agg);
        self
    }

    /// Field the aggregation reads, if any
    pub fn field(&self) -> Option<&str> {
        if let Some(t) = &self.terms {
            Some(&t.field)
        } else if let Some(s) = &self.stats {
            Some(&s.field)
        } else if let Some(r) = &self.range {
            Some(&r.field)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldAgg {
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TermsAgg {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<BTreeMap<String, SortDirection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<u64>,
}

impl TermsAgg {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            size: None,
            order: None,
            min_doc_count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RangeAgg {
    pub field: String,
    pub ranges: Vec<RangeBucket>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RangeBucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GlobalAgg {}
