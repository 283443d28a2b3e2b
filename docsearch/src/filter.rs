//! Identifier, path and term filters
//!
//! Composition is pure: every function maps filter values to an [`EsQuery`]
//! fragment without touching the backend.

use crate::query::types::{BoolQuery, EsQuery};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Field name that switches a plain filter to native id lookup
pub const ID_FIELD: &str = "id";

/// Trailing separator marking a path value as a prefix
pub const PATH_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdFilter {
    /// Match any of `values` on `field`. An empty set matches documents
    /// without the field.
    Plain {
        field: String,
        values: BTreeSet<String>,
    },
    /// Hierarchical paths. Included values ending in `/` match as prefixes,
    /// others exactly; excluded values are prefixes that narrow the included
    /// set and never match on their own.
    Path {
        field: String,
        values: BTreeSet<String>,
        #[serde(default)]
        excluded: BTreeSet<String>,
    },
}

impl IdFilter {
    pub fn plain<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IdFilter::Plain {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Native document id lookup
    pub fn ids<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::plain(ID_FIELD, values)
    }

    pub fn path<I, S, E, T>(field: impl Into<String>, values: I, excluded: E) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        E: IntoIterator<Item = T>,
        T: Into<String>,
    {
        IdFilter::Path {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            IdFilter::Plain { field, .. } | IdFilter::Path { field, .. } => field,
        }
    }

    pub fn values(&self) -> &BTreeSet<String> {
        match self {
            IdFilter::Plain { values, .. } | IdFilter::Path { values, .. } => values,
        }
    }

    /// Evaluate the filter against one document's field value, `None` when
    /// the document lacks the field.
    pub fn matches(&self, candidate: Option<&str>) -> bool {
        match self {
            IdFilter::Plain { values, .. } => match candidate {
                None => values.is_empty(),
                Some(value) => values.contains(value),
            },
            IdFilter::Path {
                values, excluded, ..
            } => {
                let Some(value) = candidate else {
                    return false;
                };
                let included = values.iter().any(|path| {
                    if path.ends_with(PATH_SEPARATOR) {
                        value.starts_with(path.as_str())
                    } else {
                        value == path
                    }
                });
                included && !excluded.iter().any(|path| value.starts_with(path.as_str()))
            }
        }
    }
}

/// Single-field equality filter; a `None` value disables it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TermFilter {
    pub field: String,
    pub value: Option<String>,
}

impl TermFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: Some(value.into()),
        }
    }
}

pub fn compose_id_filter(filter: &IdFilter) -> EsQuery {
    let (field, values) = match filter {
        IdFilter::Path {
            field,
            values,
            excluded,
        } => return compose_path_filter(field, values, excluded),
        IdFilter::Plain { field, values } => (field, values),
    };

    if values.is_empty() {
        BoolQuery::default()
            .must_not(EsQuery::exists(field.as_str()))
            .into_query()
    } else if field == ID_FIELD {
        EsQuery::ids(values.iter().cloned())
    } else {
        values
            .iter()
            .fold(BoolQuery::default(), |b, v| {
                b.should(EsQuery::term(field.as_str(), v.as_str()))
            })
            .into_query()
    }
}

/// `(included) AND NOT (excluded)`, or just the included disjunction
pub fn compose_path_filter(
    field: &str,
    values: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> EsQuery {
    let included = values
        .iter()
        .fold(BoolQuery::default(), |b, path| {
            if path.ends_with(PATH_SEPARATOR) {
                b.should(EsQuery::prefix(field, path.as_str()))
            } else {
                b.should(EsQuery::term(field, path.as_str()))
            }
        })
        .into_query();

    if excluded.is_empty() {
        return included;
    }

    let excluded = excluded
        .iter()
        .fold(BoolQuery::default(), |b, path| {
            b.should(EsQuery::prefix(field, path.as_str()))
        })
        .into_query();

    BoolQuery::default()
        .must(included)
        .must_not(excluded)
        .into_query()
}

/// Id filter and term filter conjoined; `None` when neither applies
pub fn compose_filter(id_filter: Option<&IdFilter>, term_filter: Option<&TermFilter>) -> Option<EsQuery> {
    let id_query = id_filter.map(compose_id_filter);
    let term_query = term_filter.and_then(|t| {
        t.value
            .as_deref()
            .map(|value| EsQuery::term(t.field.as_str(), value))
    });

    match (id_query, term_query) {
        (Some(id), Some(term)) => Some(id.and(term)),
        (id, term) => id.or(term),
    }
}
