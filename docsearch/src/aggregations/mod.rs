//! Aggregation property grammar
//!
//! Aggregations are declared as a flat, dot-path keyed property map and
//! compiled into engine aggregation definitions by [`AggregationParser`].

mod parser;
mod types;

pub use parser::AggregationParser;
pub use types::{
    AggregationKind, AggregationPlan, AggregationProperties, NamedAggregation, ALIAS,
    DEFAULT_LOCALE, LOCALIZED, MAX_TERMS_BUCKETS, RANGES, SUFFIXES, TYPE, UNDETERMINED_LOCALE,
};
