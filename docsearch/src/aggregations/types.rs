use crate::query::types::EsAggregation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Suffix marking a localized field (`true` / anything else)
pub const LOCALIZED: &str = "localized";
/// Suffix carrying comma-separated output names
pub const ALIAS: &str = "alias";
/// Suffix carrying comma-separated aggregation kinds
pub const TYPE: &str = "type";
/// Suffix carrying comma-separated `from:to` ranges
pub const RANGES: &str = "ranges";

/// Recognized property suffixes, in the order they are documented
pub const SUFFIXES: [&str; 4] = [LOCALIZED, ALIAS, TYPE, RANGES];

/// Locale suffix of the language-neutral field
pub const UNDETERMINED_LOCALE: &str = "und";
/// Locale used when none are configured
pub const DEFAULT_LOCALE: &str = "en";

/// Practical upper bound on terms buckets (signed 16-bit maximum)
pub const MAX_TERMS_BUCKETS: usize = i16::MAX as usize;

/// Flat, sorted map of `field.path[.suffix] -> value`.
///
/// A bare key declares a terms aggregation with defaults; a key ending in one
/// of [`SUFFIXES`] configures the aggregation rooted at the rest of the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AggregationProperties(BTreeMap<String, String>);

impl AggregationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Property `<root>.<suffix>`
    pub fn get_suffixed(&self, root: &str, suffix: &str) -> Option<&str> {
        self.get(&format!("{root}.{suffix}"))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AggregationProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Aggregation kinds the parser knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Terms,
    Stats,
    Range,
}

impl AggregationKind {
    /// Parse a `type` token; `None` for anything unrecognized
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "terms" => Some(Self::Terms),
            "stats" => Some(Self::Stats),
            "range" => Some(Self::Range),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terms => "terms",
            Self::Stats => "stats",
            Self::Range => "range",
        }
    }
}

/// One concrete aggregation to send to the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedAggregation {
    /// Output name, as it will appear in the response
    pub name: String,
    /// Field the aggregation reads
    pub field: String,
    pub kind: AggregationKind,
    pub definition: EsAggregation,
}

/// Ordered aggregation definitions produced by one parse
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationPlan {
    pub aggregations: Vec<NamedAggregation>,
}

impl AggregationPlan {
    pub fn is_empty(&self) -> bool {
        self.aggregations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.aggregations.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.aggregations.iter().map(|a| a.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&NamedAggregation> {
        self.aggregations.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedAggregation> {
        self.aggregations.iter()
    }

    /// Request-body map `name -> definition`
    pub fn to_request_map(&self) -> BTreeMap<String, EsAggregation> {
        self.aggregations
            .iter()
            .map(|a| (a.name.clone(), a.definition.clone()))
            .collect()
    }
}

impl IntoIterator for AggregationPlan {
    type Item = NamedAggregation;
    type IntoIter = std::vec::IntoIter<NamedAggregation>;

    fn into_iter(self) -> Self::IntoIter {
        self.aggregations.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!(AggregationKind::parse("terms"), Some(AggregationKind::Terms));
        assert_eq!(AggregationKind::parse(" Stats "), Some(AggregationKind::Stats));
        assert_eq!(AggregationKind::parse("range"), Some(AggregationKind::Range));
        assert_eq!(AggregationKind::parse("histogram"), None);
        assert_eq!(AggregationKind::parse(""), None);
    }

    #[test]
    fn test_properties_sorted_and_suffixed() {
        let props: AggregationProperties = [("b", "x"), ("a.type", "stats"), ("a", "")]
            .into_iter()
            .collect();
        let keys: Vec<&str> = props.keys().collect();
        assert_eq!(keys, vec!["a", "a.type", "b"]);
        assert_eq!(props.get_suffixed("a", TYPE), Some("stats"));
        assert_eq!(props.get_suffixed("b", TYPE), None);
    }

    #[test]
    fn test_properties_deserialize_from_json_object() {
        let props: AggregationProperties =
            serde_json::from_str(r#"{"age.type": "stats", "age": ""}"#).unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("age.type"), Some("stats"));
    }

    #[test]
    fn test_max_terms_buckets() {
        assert_eq!(MAX_TERMS_BUCKETS, 32767);
    }
}
