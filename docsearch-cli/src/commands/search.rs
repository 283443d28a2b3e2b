use super::print_json;
use anyhow::{Context, Result};
use docsearch::aggregations::AggregationProperties;
use docsearch::filter::IdFilter;
use docsearch::SearchEngineService;

fn id_filter(ids: Option<&str>) -> Option<IdFilter> {
    ids.map(|list| {
        IdFilter::ids(
            list.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty()),
        )
    })
}

/// Parse repeated `key=value` arguments; a bare key declares a default
/// terms aggregation
fn aggregation_properties(pairs: &[String]) -> AggregationProperties {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            None => (pair.trim().to_string(), String::new()),
        })
        .collect()
}

pub async fn run_search(
    service: &SearchEngineService,
    index: &str,
    query: &str,
    ids: Option<&str>,
) -> Result<()> {
    let filter = id_filter(ids);
    let results = service
        .searcher()
        .find(index, query, filter.as_ref())
        .await
        .with_context(|| format!("Search on {} failed", index))?;
    print_json(&results)
}

pub async fn run_cover(
    service: &SearchEngineService,
    index: &str,
    query: &str,
    aggs: &[String],
) -> Result<()> {
    let searcher = service.searcher();
    let compiled = searcher.make_query(query)?;
    let properties = aggregation_properties(aggs);
    let results = searcher
        .cover(index, compiled.as_ref(), &properties, None)
        .await
        .with_context(|| format!("Coverage on {} failed", index))?;
    print_json(&results)
}

pub async fn run_count(service: &SearchEngineService, index: &str, query: &str) -> Result<()> {
    let results = service
        .searcher()
        .count(index, query, None)
        .await
        .with_context(|| format!("Count on {} failed", index))?;
    if results.aggregations.is_empty() {
        println!("{}", results.total);
        Ok(())
    } else {
        print_json(&results)
    }
}

pub async fn run_suggest(
    service: &SearchEngineService,
    index: &str,
    text: &str,
    field: &str,
    locale: &str,
    limit: usize,
) -> Result<()> {
    let suggestions = service
        .searcher()
        .suggest(index, limit, locale, text, field)
        .await
        .with_context(|| format!("Suggest on {} failed", index))?;
    for suggestion in suggestions {
        println!("{}", suggestion);
    }
    Ok(())
}

pub async fn run_get(service: &SearchEngineService, index: &str, id: &str) -> Result<()> {
    match service.searcher().document_by_id(index, id).await? {
        Some(document) => print_json(&document),
        None => anyhow::bail!("Document '{}' not found in {}", id, index),
    }
}
