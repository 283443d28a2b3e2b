//! Read-side query execution
//!
//! Every entry point assembles one [`EsSearchRequest`] (or a `_count` call),
//! runs it against the backend and hands the raw response to
//! [`DocumentResults::from_response`]. Aggregation plans are parsed before
//! the backend is contacted, so configuration errors never cost a round-trip.

use crate::aggregations::{AggregationParser, AggregationProperties, MAX_TERMS_BUCKETS};
use crate::backends::SearchBackend;
use crate::filter::{compose_filter, compose_id_filter, IdFilter, TermFilter};
use crate::query::types::{
    BoolQuery, EsAggregation, EsQuery, EsSearchRequest, QueryStringQuery, SortClause,
    SortDirection, SourceFilter, TermsAgg, TrackTotalHits,
};
use crate::query::{CompiledQuery, QueryCompiler, QueryScope, QueryStringCompiler, SearchQuery};
use crate::response::EsSearchResponse;
use crate::results::{DocumentResult, DocumentResults, AGG_TOTAL_COUNT, CLASS_NAME_FIELD};
use crate::support::{clean_suggestion, flatten_source};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error};

/// Placeholder substituted with the locale in suggestion field patterns
pub const LOCALE_PLACEHOLDER: &str = "{locale}";

const ANALYZED_SUFFIX: &str = ".analyzed";

/// Paginated listing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentsRequest {
    pub from: usize,
    pub limit: usize,
    /// Field to sort on; relevance score, best first, when unset
    pub sort: Option<String>,
    /// `asc` (default) or `desc`
    pub order: Option<String>,
    pub query_string: Option<String>,
    /// Fields the query string searches
    pub fields: Vec<String>,
    pub term_filter: Option<TermFilter>,
    pub id_filter: Option<IdFilter>,
    /// Boolean flags; documents with any of them set to `true` are left out
    pub excluded_fields: Vec<String>,
}

impl Default for DocumentsRequest {
    fn default() -> Self {
        Self {
            from: 0,
            limit: crate::query::DEFAULT_SIZE,
            sort: None,
            order: None,
            query_string: None,
            fields: Vec::new(),
            term_filter: None,
            id_filter: None,
            excluded_fields: Vec::new(),
        }
    }
}

impl DocumentsRequest {
    pub fn new(from: usize, limit: usize) -> Self {
        Self {
            from,
            limit,
            ..Default::default()
        }
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: Option<&str>) -> Self {
        self.sort = Some(field.into());
        self.order = order.map(str::to_string);
        self
    }

    pub fn with_query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_term_filter(mut self, filter: TermFilter) -> Self {
        self.term_filter = Some(filter);
        self
    }

    pub fn with_id_filter(mut self, filter: IdFilter) -> Self {
        self.id_filter = Some(filter);
        self
    }

    pub fn with_excluded_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    fn sort_clause(&self) -> SortClause {
        match &self.sort {
            Some(field) => {
                SortClause::field(field.as_str(), SortDirection::parse_or_asc(self.order.as_deref()))
            }
            None => SortClause::score_desc(),
        }
    }
}

pub struct Searcher {
    backend: Arc<dyn SearchBackend>,
    parser: AggregationParser,
    compiler: Arc<dyn QueryCompiler>,
}

impl Searcher {
    pub fn new(backend: Arc<dyn SearchBackend>, parser: AggregationParser) -> Self {
        Self {
            backend,
            parser,
            compiler: Arc::new(QueryStringCompiler::new()),
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn QueryCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn parser(&self) -> &AggregationParser {
        &self.parser
    }

    /// Compile raw query text with the configured compiler
    pub fn make_query(&self, text: &str) -> Result<Box<dyn CompiledQuery>> {
        debug!("makeQuery: {}", text);
        self.compiler.compile(text)
    }

    /// Conjunction of `queries`. Paging comes from the first query, sorts
    /// are concatenated in order.
    pub fn and_query(&self, queries: &[&dyn CompiledQuery]) -> SearchQuery {
        let mut combined = SearchQuery::new();
        if let Some(first) = queries.first() {
            combined = combined.with_from(first.from()).with_size(first.size());
        }

        let fragments: Vec<EsQuery> = queries.iter().filter_map(|q| q.query().cloned()).collect();
        match fragments.len() {
            0 => {}
            1 => {
                if let Some(only) = fragments.into_iter().next() {
                    combined = combined.with_query(only);
                }
            }
            _ => {
                let all = fragments
                    .into_iter()
                    .fold(BoolQuery::default(), BoolQuery::must);
                combined = combined.with_query(all.into_query());
            }
        }

        for sort in queries.iter().flat_map(|q| q.sort()) {
            combined = combined.with_sort(sort.clone());
        }
        combined
    }

    /// Search with hits (scope `Detail`) or counts only (scope `Aggregation`).
    /// The query's bucket fields receive `aggregation_properties` as
    /// sub-aggregations.
    pub async fn query(
        &self,
        index: &str,
        query: &dyn CompiledQuery,
        scope: QueryScope,
        mandatory_source_fields: &[String],
        aggregation_properties: &AggregationProperties,
        id_filter: Option<&IdFilter>,
    ) -> Result<DocumentResults> {
        let aggs = self.bucket_aggregations(query.aggregation_buckets(), aggregation_properties)?;

        let mut request = EsSearchRequest {
            query: Some(effective_query(query, id_filter)),
            from: Some(query.from()),
            size: Some(match scope {
                QueryScope::Detail => query.size(),
                QueryScope::Aggregation => 0,
            }),
            source: source_config(scope, query, mandatory_source_fields),
            aggs,
            track_total_hits: Some(TrackTotalHits::Bool(true)),
            ..Default::default()
        };
        if !query.is_empty() {
            request.sort = query.sort().to_vec();
        }

        let response = self.search(index, &request, "query").await?;
        DocumentResults::from_response(response)
    }

    /// Aggregations only: no hits, no source
    pub async fn cover(
        &self,
        index: &str,
        query: &dyn CompiledQuery,
        aggregation_properties: &AggregationProperties,
        id_filter: Option<&IdFilter>,
    ) -> Result<DocumentResults> {
        let aggs = self.bucket_aggregations(query.aggregation_buckets(), aggregation_properties)?;
        let request = coverage_request(effective_query(query, id_filter), aggs);
        let response = self.search(index, &request, "cover").await?;
        DocumentResults::from_response(response)
    }

    /// As [`Searcher::cover`], with explicit sub-aggregation properties per
    /// bucket field
    pub async fn aggregate(
        &self,
        index: &str,
        query: &dyn CompiledQuery,
        aggregation_properties: &AggregationProperties,
        sub_aggregation_properties: &HashMap<String, AggregationProperties>,
        id_filter: Option<&IdFilter>,
    ) -> Result<DocumentResults> {
        let plan = self
            .parser
            .parse_with_sub_aggregations(aggregation_properties, sub_aggregation_properties)?;
        let request = coverage_request(effective_query(query, id_filter), with_total_count(plan.to_request_map()));
        let response = self.search(index, &request, "aggregate").await?;
        DocumentResults::from_response(response)
    }

    /// Free-text search; relevance order unless the query sorts
    pub async fn find(
        &self,
        index: &str,
        text: &str,
        id_filter: Option<&IdFilter>,
    ) -> Result<DocumentResults> {
        let query = self.compiler.compile(text)?;
        let sort = if query.sort().is_empty() {
            vec![SortClause::score_desc()]
        } else {
            query.sort().to_vec()
        };

        let request = EsSearchRequest {
            query: Some(effective_query(query.as_ref(), id_filter)),
            from: Some(query.from()),
            size: Some(query.size()),
            sort,
            ..Default::default()
        };
        let response = self.search(index, &request, "find").await?;
        DocumentResults::from_response(response)
    }

    /// Total count, or per-field value counts when the query names
    /// aggregation fields
    pub async fn count(
        &self,
        index: &str,
        text: &str,
        id_filter: Option<&IdFilter>,
    ) -> Result<DocumentResults> {
        let query = self.compiler.compile(text)?;
        let effective = effective_query(query.as_ref(), id_filter);

        if !query.aggregations().is_empty() {
            return self
                .count_with_aggregations(index, effective, query.aggregations())
                .await;
        }

        debug!("Request /{}/_count", index);
        let count = self
            .backend
            .count(index, &effective)
            .await
            .inspect_err(|e| error!("Failed to count {} - {}", index, e))?;
        debug!("Response /{}/_count", index);
        Ok(DocumentResults::from_count(count))
    }

    async fn count_with_aggregations(
        &self,
        index: &str,
        query: EsQuery,
        fields: &[String],
    ) -> Result<DocumentResults> {
        let aggs = fields
            .iter()
            .map(|field| (field.clone(), unbounded_terms(field)))
            .collect();
        let request = EsSearchRequest {
            query: Some(query),
            from: Some(0),
            size: Some(0),
            aggs,
            ..Default::default()
        };
        let response = self.search(index, &request, "count").await?;
        DocumentResults::from_response(response)
    }

    /// Top `limit` cleaned values of one localized field matching
    /// `query_text`. `field_pattern` may hold a `{locale}` placeholder; a
    /// trailing `.analyzed` is searched but not fetched.
    pub async fn suggest(
        &self,
        index: &str,
        limit: usize,
        locale: &str,
        query_text: &str,
        field_pattern: &str,
    ) -> Result<Vec<String>> {
        let localized_field = field_pattern.replace(LOCALE_PLACEHOLDER, locale);
        let source_field = localized_field.replace(ANALYZED_SUFFIX, "");

        let request = EsSearchRequest {
            query: Some(EsQuery::QueryString(QueryStringQuery {
                query: query_text.to_string(),
                default_field: Some(localized_field),
                fields: None,
                default_operator: Some("OR".to_string()),
            })),
            from: Some(0),
            size: Some(limit),
            source: Some(SourceFilter::Object {
                includes: Some(vec![source_field.clone()]),
                excludes: None,
            }),
            sort: vec![SortClause::score_desc()],
            ..Default::default()
        };

        let response = self.search(index, &request, "suggest").await?;
        let names = response
            .hits
            .hits
            .iter()
            .filter_map(|hit| hit.source.as_ref())
            .filter_map(|source| flatten_source(source).remove(&source_field))
            .map(|value| clean_suggestion(&value))
            .filter(|name| !name.is_empty())
            .collect();
        Ok(names)
    }

    pub async fn document_by_id(&self, index: &str, id: &str) -> Result<Option<DocumentResult>> {
        let request = EsSearchRequest {
            query: Some(EsQuery::ids([id])),
            ..Default::default()
        };
        self.first_document(index, &request, "get document by ID").await
    }

    /// Document `id`, only when its class discriminator matches
    pub async fn document_by_class_name(
        &self,
        index: &str,
        class_name: &str,
        id: &str,
    ) -> Result<Option<DocumentResult>> {
        let request = EsSearchRequest {
            query: Some(class_name_query(class_name).and(EsQuery::ids([id]))),
            ..Default::default()
        };
        self.first_document(index, &request, "get document by class name")
            .await
    }

    /// Paginated listing with optional query string and filters
    pub async fn documents(
        &self,
        index: &str,
        listing: &DocumentsRequest,
    ) -> Result<DocumentResults> {
        let query = listing.query_string.as_ref().map(|qs| {
            EsQuery::QueryString(QueryStringQuery {
                query: qs.clone(),
                default_field: None,
                fields: (!listing.fields.is_empty()).then(|| listing.fields.clone()),
                default_operator: None,
            })
        });
        let post_filter = compose_filter(listing.id_filter.as_ref(), listing.term_filter.as_ref());

        let mut exec = match (query, post_filter) {
            (Some(q), Some(f)) => Some(BoolQuery::default().must(q).filter(f).into_query()),
            (q, f) => q.or(f),
        };

        if !listing.excluded_fields.is_empty() {
            let mut excluded = BoolQuery::default();
            for field in &listing.excluded_fields {
                excluded = excluded.must_not(
                    EsQuery::term(field.as_str(), "true").and(EsQuery::exists(field.as_str())),
                );
            }
            if let Some(q) = exec {
                excluded = excluded.must(q);
            }
            exec = Some(excluded.into_query());
        }

        let request = EsSearchRequest {
            query: Some(exec.unwrap_or_else(EsQuery::match_all)),
            from: Some(listing.from),
            size: Some(listing.limit),
            sort: vec![listing.sort_clause()],
            ..Default::default()
        };
        let response = self.search(index, &request, "get documents").await?;
        DocumentResults::from_response(response)
    }

    /// Listing restricted to one class discriminator. Projection fields and
    /// excluded flags of `listing` do not apply here.
    pub async fn documents_by_class_name(
        &self,
        index: &str,
        class_name: &str,
        listing: &DocumentsRequest,
    ) -> Result<DocumentResults> {
        let mut query = class_name_query(class_name);
        if let Some(qs) = &listing.query_string {
            query = query.and(EsQuery::query_string(qs.as_str()));
        }
        if let Some(filter) = compose_filter(listing.id_filter.as_ref(), listing.term_filter.as_ref()) {
            query = query.and(filter);
        }

        let request = EsSearchRequest {
            query: Some(query),
            from: Some(listing.from),
            size: Some(listing.limit),
            sort: vec![listing.sort_clause()],
            ..Default::default()
        };
        let response = self
            .search(index, &request, "get documents by class name")
            .await?;
        DocumentResults::from_response(response)
    }

    /// Number of distinct values of `field` among documents that have it.
    /// A missing index counts zero.
    pub async fn count_documents_with_field(&self, index: &str, field: &str) -> Result<u64> {
        let name = field.replace('.', "-");
        let request = EsSearchRequest {
            query: Some(BoolQuery::default().should(EsQuery::exists(field)).into_query()),
            from: Some(0),
            size: Some(0),
            aggs: BTreeMap::from([(name.clone(), unbounded_terms(field))]),
            ..Default::default()
        };

        let response = match self.search(index, &request, "count documents with field").await {
            Ok(response) => response,
            Err(Error::IndexNotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        let results = DocumentResults::from_response(response)?;
        Ok(results.aggregation(&name).len() as u64)
    }

    async fn first_document(
        &self,
        index: &str,
        request: &EsSearchRequest,
        operation: &str,
    ) -> Result<Option<DocumentResult>> {
        let response = self.search(index, request, operation).await?;
        let results = DocumentResults::from_response(response)?;
        Ok(results.documents.into_iter().next())
    }

    fn bucket_aggregations(
        &self,
        buckets: &[String],
        properties: &AggregationProperties,
    ) -> Result<BTreeMap<String, EsAggregation>> {
        let subs: HashMap<String, AggregationProperties> = buckets
            .iter()
            .map(|field| (field.clone(), properties.clone()))
            .collect();
        let plan = self.parser.parse_with_sub_aggregations(properties, &subs)?;
        Ok(with_total_count(plan.to_request_map()))
    }

    async fn search(
        &self,
        index: &str,
        request: &EsSearchRequest,
        operation: &str,
    ) -> Result<EsSearchResponse> {
        debug!("Request /{}/_search ({})", index, operation);
        let response = self
            .backend
            .search(index, request)
            .await
            .inspect_err(|e| error!("Failed to {} {} - {}", operation, index, e))?;
        debug!("Response /{}/_search ({})", index, operation);
        Ok(response)
    }
}

/// Compiled query (or match-all) conjoined with the id filter
fn effective_query(query: &dyn CompiledQuery, id_filter: Option<&IdFilter>) -> EsQuery {
    let base = match query.query() {
        Some(q) if !query.is_empty() => q.clone(),
        _ => EsQuery::match_all(),
    };
    match id_filter {
        Some(filter) => base.and(compose_id_filter(filter)),
        None => base,
    }
}

/// `None` fetches the whole document
fn source_config(
    scope: QueryScope,
    query: &dyn CompiledQuery,
    mandatory: &[String],
) -> Option<SourceFilter> {
    if scope == QueryScope::Aggregation {
        return Some(SourceFilter::Bool(false));
    }
    let fields = query.source_fields()?;
    if fields.is_empty() {
        return Some(SourceFilter::Bool(false));
    }

    let mut includes: Vec<String> = Vec::with_capacity(fields.len() + mandatory.len());
    for field in fields.iter().chain(mandatory) {
        if !includes.contains(field) {
            includes.push(field.clone());
        }
    }
    Some(SourceFilter::Object {
        includes: Some(includes),
        excludes: None,
    })
}

fn coverage_request(query: EsQuery, aggs: BTreeMap<String, EsAggregation>) -> EsSearchRequest {
    EsSearchRequest {
        query: Some(query),
        from: Some(0),
        size: Some(0),
        source: Some(SourceFilter::Bool(false)),
        aggs,
        track_total_hits: Some(TrackTotalHits::Bool(true)),
        ..Default::default()
    }
}

fn with_total_count(
    mut aggs: BTreeMap<String, EsAggregation>,
) -> BTreeMap<String, EsAggregation> {
    aggs.insert(AGG_TOTAL_COUNT.to_string(), EsAggregation::global());
    aggs
}

fn unbounded_terms(field: &str) -> EsAggregation {
    let mut terms = TermsAgg::new(field);
    terms.size = Some(MAX_TERMS_BUCKETS);
    EsAggregation::terms(terms)
}

fn class_name_query(class_name: &str) -> EsQuery {
    EsQuery::QueryString(QueryStringQuery {
        query: class_name.to_string(),
        default_field: None,
        fields: Some(vec![CLASS_NAME_FIELD.to_string()]),
        default_operator: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_query_empty_is_match_all() {
        let q = SearchQuery::new();
        assert_eq!(effective_query(&q, None), EsQuery::match_all());
    }

    #[test]
    fn test_effective_query_with_filter() {
        let q = SearchQuery::new().with_query(EsQuery::term("a", "b"));
        let filter = IdFilter::ids(["x"]);
        match effective_query(&q, Some(&filter)) {
            EsQuery::Bool(b) => {
                assert_eq!(b.must[0], EsQuery::term("a", "b"));
                assert_eq!(b.must[1], EsQuery::ids(["x"]));
            }
            other => panic!("Expected Bool, got {other:?}"),
        }
    }

    #[test]
    fn test_source_config_rules() {
        let mandatory = vec!["id".to_string(), "name".to_string()];

        let full = SearchQuery::new();
        assert_eq!(source_config(QueryScope::Detail, &full, &mandatory), None);
        assert_eq!(
            source_config(QueryScope::Aggregation, &full, &mandatory),
            Some(SourceFilter::Bool(false))
        );

        let empty = SearchQuery::new().with_source_fields(Vec::<String>::new());
        assert_eq!(
            source_config(QueryScope::Detail, &empty, &mandatory),
            Some(SourceFilter::Bool(false))
        );

        let projected = SearchQuery::new().with_source_fields(["acronym", "name"]);
        assert_eq!(
            source_config(QueryScope::Detail, &projected, &mandatory),
            Some(SourceFilter::Object {
                includes: Some(vec!["acronym".into(), "name".into(), "id".into()]),
                excludes: None,
            })
        );
    }

    #[test]
    fn test_documents_request_sort_clause() {
        assert_eq!(DocumentsRequest::default().sort_clause(), SortClause::score_desc());
        assert_eq!(
            DocumentsRequest::default()
                .with_sort("name", Some("DESC"))
                .sort_clause(),
            SortClause::field("name", SortDirection::Desc)
        );
        assert_eq!(
            DocumentsRequest::default().with_sort("name", None).sort_clause(),
            SortClause::field("name", SortDirection::Asc)
        );
    }

    #[test]
    fn test_with_total_count_adds_global() {
        let aggs = with_total_count(BTreeMap::new());
        assert_eq!(aggs.get(AGG_TOTAL_COUNT), Some(&EsAggregation::global()));
    }
}
