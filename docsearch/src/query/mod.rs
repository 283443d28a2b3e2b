//! Compiled queries
//!
//! The query language itself lives outside this crate. Callers hand over a
//! [`CompiledQuery`], usually produced by a [`QueryCompiler`].

pub mod types;

use crate::Result;
use types::{EsQuery, SortClause};

/// Default page size when a query does not set one
pub const DEFAULT_SIZE: usize = 10;

/// Whether a request needs document hits or only aggregation counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    Detail,
    Aggregation,
}

/// Opaque, immutable search intent
pub trait CompiledQuery: Send + Sync {
    /// Offset of the first hit
    fn from(&self) -> usize;

    /// Maximum number of hits
    fn size(&self) -> usize;

    /// True when no filtering or sorting is specified
    fn is_empty(&self) -> bool;

    /// Boolean query fragment, if any
    fn query(&self) -> Option<&EsQuery>;

    fn sort(&self) -> &[SortClause];

    /// Fields whose buckets get the requested aggregations as sub-aggregations
    fn aggregation_buckets(&self) -> &[String];

    /// Source projection; `None` fetches the full document
    fn source_fields(&self) -> Option<&[String]>;

    /// Fields to count distinct values of
    fn aggregations(&self) -> &[String];
}

/// Turns raw query text into a [`CompiledQuery`]
pub trait QueryCompiler: Send + Sync {
    fn compile(&self, text: &str) -> Result<Box<dyn CompiledQuery>>;
}

/// Plain [`CompiledQuery`] value
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    from: usize,
    size: usize,
    query: Option<EsQuery>,
    sort: Vec<SortClause>,
    aggregation_buckets: Vec<String>,
    source_fields: Option<Vec<String>>,
    aggregations: Vec<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            from: 0,
            size: DEFAULT_SIZE,
            query: None,
            sort: Vec::new(),
            aggregation_buckets: Vec::new(),
            source_fields: None,
            aggregations: Vec::new(),
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: EsQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_sort(mut self, sort: SortClause) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_aggregation_buckets<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregation_buckets = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_aggregations<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregations = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl CompiledQuery for SearchQuery {
    fn from(&self) -> usize {
        self.from
    }

    fn size(&self) -> usize {
        self.size
    }

    fn is_empty(&self) -> bool {
        self.query.is_none() && self.sort.is_empty()
    }

    fn query(&self) -> Option<&EsQuery> {
        self.query.as_ref()
    }

    fn sort(&self) -> &[SortClause] {
        &self.sort
    }

    fn aggregation_buckets(&self) -> &[String] {
        &self.aggregation_buckets
    }

    fn source_fields(&self) -> Option<&[String]> {
        self.source_fields.as_deref()
    }

    fn aggregations(&self) -> &[String] {
        &self.aggregations
    }
}

/// Maps text to an engine `query_string` query; blank text is an empty query
#[derive(Debug, Clone)]
pub struct QueryStringCompiler {
    size: usize,
    default_operator: Option<String>,
}

impl Default for QueryStringCompiler {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            default_operator: None,
        }
    }
}

impl QueryStringCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// `AND` or `OR`
    pub fn with_default_operator(mut self, operator: impl Into<String>) -> Self {
        self.default_operator = Some(operator.into());
        self
    }
}

impl QueryCompiler for QueryStringCompiler {
    fn compile(&self, text: &str) -> Result<Box<dyn CompiledQuery>> {
        let text = text.trim();
        let mut compiled = SearchQuery::new().with_size(self.size);
        if !text.is_empty() {
            compiled = compiled.with_query(EsQuery::QueryString(types::QueryStringQuery {
                query: text.to_string(),
                default_field: None,
                fields: None,
                default_operator: self.default_operator.clone(),
            }));
        }
        Ok(Box::new(compiled))
    }
}

#[cfg(test)]
mod tests {
    use super::types::SortDirection;
    use super::*;

    #[test]
    fn test_search_query_defaults() {
        let q = SearchQuery::new();
        assert_eq!(q.from(), 0);
        assert_eq!(q.size(), DEFAULT_SIZE);
        assert!(q.is_empty());
        assert!(q.query().is_none());
        assert!(q.source_fields().is_none());
    }

    #[test]
    fn test_sort_only_query_is_not_empty() {
        let q = SearchQuery::new().with_sort(SortClause::field("name", SortDirection::Asc));
        assert!(!q.is_empty());
        assert_eq!(q.sort().len(), 1);
    }

    #[test]
    fn test_builder() {
        let q = SearchQuery::new()
            .with_from(20)
            .with_size(5)
            .with_query(EsQuery::match_all())
            .with_aggregation_buckets(["studyId"])
            .with_source_fields(["name", "acronym"])
            .with_aggregations(["populationId"]);
        assert_eq!(q.from(), 20);
        assert_eq!(q.size(), 5);
        assert!(!q.is_empty());
        assert_eq!(q.aggregation_buckets(), ["studyId".to_string()]);
        assert_eq!(q.source_fields().unwrap().len(), 2);
        assert_eq!(q.aggregations(), ["populationId".to_string()]);
    }

    #[test]
    fn test_query_string_compiler_blank_is_empty() {
        let compiled = QueryStringCompiler::new().compile("   ").unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.query().is_none());
    }

    #[test]
    fn test_query_string_compiler_text() {
        let compiled = QueryStringCompiler::new()
            .with_size(3)
            .with_default_operator("AND")
            .compile(" name:cancer ")
            .unwrap();
        assert!(!compiled.is_empty());
        assert_eq!(compiled.size(), 3);
        match compiled.query() {
            Some(EsQuery::QueryString(qs)) => {
                assert_eq!(qs.query, "name:cancer");
                assert_eq!(qs.default_operator.as_deref(), Some("AND"));
            }
            other => panic!("Expected QueryString, got {other:?}"),
        }
    }
}
