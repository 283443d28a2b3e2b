//! Property-grammar parser for aggregation requests
//!
//! Turns a flat [`AggregationProperties`] map into an [`AggregationPlan`]:
//!
//! ```text
//! studyIds                         -> terms on studyIds
//! populations.name.localized=true  -> terms on populations.name.<locale>, .und
//! age.type=stats,range             -> stats + range on age
//! age.alias=ageStats,ageRanges
//! age.ranges=*:18,18:65,65:*
//! ```

use super::types::{
    AggregationKind, AggregationPlan, AggregationProperties, NamedAggregation, ALIAS,
    DEFAULT_LOCALE, LOCALIZED, MAX_TERMS_BUCKETS, RANGES, SUFFIXES, TYPE, UNDETERMINED_LOCALE,
};
use crate::query::types::{EsAggregation, RangeAgg, RangeBucket, SortDirection, TermsAgg};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};

const OPEN_BOUND: &str = "*";

#[derive(Debug, Clone)]
pub struct AggregationParser {
    locales: Vec<String>,
    /// Negative disables the terms `min_doc_count` setting
    min_doc_count: i64,
}

impl Default for AggregationParser {
    fn default() -> Self {
        Self::new(Vec::new(), 0)
    }
}

impl AggregationParser {
    pub fn new(locales: Vec<String>, min_doc_count: i64) -> Self {
        Self {
            locales,
            min_doc_count,
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn parse(&self, properties: &AggregationProperties) -> Result<AggregationPlan> {
        self.build(properties, &HashMap::new())
    }

    /// Parse `properties`, attaching the plans parsed from `sub_properties`
    /// under every terms/range aggregation whose target field is the key.
    pub fn parse_with_sub_aggregations(
        &self,
        properties: &AggregationProperties,
        sub_properties: &HashMap<String, AggregationProperties>,
    ) -> Result<AggregationPlan> {
        let mut sub_plans = HashMap::with_capacity(sub_properties.len());
        for (bucket_field, props) in sub_properties {
            sub_plans.insert(bucket_field.clone(), self.build(props, &HashMap::new())?);
        }
        self.build(properties, &sub_plans)
    }

    fn build(
        &self,
        properties: &AggregationProperties,
        sub_plans: &HashMap<String, AggregationPlan>,
    ) -> Result<AggregationPlan> {
        let roots: BTreeSet<&str> = properties.keys().map(root_of).collect();

        let mut plan = AggregationPlan::default();
        for root in roots {
            self.build_root(properties, root, sub_plans, &mut plan)?;
        }
        Ok(plan)
    }

    fn build_root(
        &self,
        properties: &AggregationProperties,
        field: &str,
        sub_plans: &HashMap<String, AggregationPlan>,
        plan: &mut AggregationPlan,
    ) -> Result<()> {
        let localized = properties
            .get_suffixed(field, LOCALIZED)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        let types: Vec<&str> = match properties.get_suffixed(field, TYPE) {
            Some(raw) => split_list(raw),
            None => vec![AggregationKind::Terms.as_str()],
        };
        let aliases: Vec<&str> = match properties.get_suffixed(field, ALIAS) {
            Some(raw) => {
                let aliases = split_list(raw);
                if aliases.len() != types.len() {
                    return Err(Error::Configuration(format!(
                        "Aggregation '{field}' declares {} alias(es) for {} type(s)",
                        aliases.len(),
                        types.len()
                    )));
                }
                aliases
            }
            None => vec![""; types.len()],
        };

        for (raw_type, alias) in types.iter().zip(aliases) {
            let kind = resolve_kind(field, raw_type, localized)?;
            let ranges = match kind {
                AggregationKind::Range => Some(parse_ranges(
                    field,
                    properties.get_suffixed(field, RANGES),
                )?),
                _ => None,
            };

            for (name, target) in self.output_fields(field, alias, localized) {
                trace!("Building aggregation '{}' of type '{}'", name, kind.as_str());
                let subs = sub_plans.get(&target);
                let definition = match kind {
                    AggregationKind::Terms => self.terms(&target, subs),
                    AggregationKind::Stats => EsAggregation::stats(target.clone()),
                    AggregationKind::Range => {
                        let mut agg = EsAggregation::range(RangeAgg {
                            field: target.clone(),
                            ranges: ranges.clone().unwrap_or_default(),
                        });
                        attach(&mut agg, subs);
                        agg
                    }
                };
                plan.aggregations.push(NamedAggregation {
                    name,
                    field: target,
                    kind,
                    definition,
                });
            }
        }
        Ok(())
    }

    fn terms(&self, field: &str, subs: Option<&AggregationPlan>) -> EsAggregation {
        let mut terms = TermsAgg::new(field);
        terms.size = Some(MAX_TERMS_BUCKETS);
        terms.order = Some(BTreeMap::from([("_key".to_string(), SortDirection::Asc)]));
        terms.min_doc_count = u64::try_from(self.min_doc_count).ok();

        let mut agg = EsAggregation::terms(terms);
        attach(&mut agg, subs);
        agg
    }

    /// Output name to target field, fanned out over locales when localized
    fn output_fields(&self, field: &str, alias: &str, localized: bool) -> Vec<(String, String)> {
        let name = if alias.is_empty() { field } else { alias };
        if !localized {
            return vec![(name.to_string(), field.to_string())];
        }

        let default_locale = [DEFAULT_LOCALE.to_string()];
        let locales: &[String] = if self.locales.is_empty() {
            &default_locale
        } else {
            &self.locales
        };

        locales
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(UNDETERMINED_LOCALE))
            .map(|locale| (format!("{name}.{locale}"), format!("{field}.{locale}")))
            .collect()
    }
}

/// Key with any recognized trailing suffix removed
fn root_of(key: &str) -> &str {
    SUFFIXES
        .iter()
        .find_map(|suffix| {
            key.strip_suffix(suffix)
                .and_then(|rest| rest.strip_suffix('.'))
                .filter(|root| !root.is_empty())
        })
        .unwrap_or(key)
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).collect()
}

fn resolve_kind(field: &str, raw: &str, localized: bool) -> Result<AggregationKind> {
    match (AggregationKind::parse(raw), localized) {
        (Some(_), true) => Ok(AggregationKind::Terms),
        (Some(kind), false) => Ok(kind),
        (None, true) => Err(Error::Configuration(format!(
            "Aggregation '{field}' is localized but declares unknown type '{raw}'"
        ))),
        (None, false) => {
            // Legacy callers rely on unknown types falling back to terms
            debug!(
                "Unknown aggregation type '{}' on '{}', using terms",
                raw, field
            );
            Ok(AggregationKind::Terms)
        }
    }
}

fn parse_ranges(field: &str, raw: Option<&str>) -> Result<Vec<RangeBucket>> {
    let raw = raw.ok_or_else(|| {
        Error::Configuration(format!(
            "Range aggregation '{field}' has no '{RANGES}' property"
        ))
    })?;

    let mut buckets = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let bounds: Vec<&str> = token.split(':').map(str::trim).collect();
        let &[from, to] = bounds.as_slice() else {
            return Err(Error::Configuration(format!(
                "Range '{token}' of aggregation '{field}' must be 'from:to'"
            )));
        };

        let (from, to) = match (from == OPEN_BOUND, to == OPEN_BOUND) {
            (true, true) => continue,
            (true, false) => (None, Some(parse_bound(field, token, to)?)),
            (false, true) => (Some(parse_bound(field, token, from)?), None),
            (false, false) => (
                Some(parse_bound(field, token, from)?),
                Some(parse_bound(field, token, to)?),
            ),
        };
        buckets.push(RangeBucket {
            key: Some(token.to_string()),
            from,
            to,
        });
    }
    Ok(buckets)
}

fn parse_bound(field: &str, token: &str, bound: &str) -> Result<f64> {
    bound
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "Range '{token}' of aggregation '{field}' has non-numeric bound '{bound}'"
            ))
        })
}

fn attach(agg: &mut EsAggregation, subs: Option<&AggregationPlan>) {
    if let Some(subs) = subs {
        for sub in subs.iter() {
            agg.aggs.insert(sub.name.clone(), sub.definition.clone());
        }
    }
}
