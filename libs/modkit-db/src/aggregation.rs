//! The aggregation contract (spec §4.3): a raw multi-stage pipeline, or a
//! declarative config the engine compiles into one.

use crate::filter::Filter;

#[derive(Debug, Clone, Default)]
pub struct GroupBy {
    /// The `_id` expression of the `$group` stage — a field reference like
    /// `"$status"` or a compound document.
    pub id: serde_json::Value,
    /// `name -> {expression}` accumulator fields, e.g.
    /// `{"count": {"$sum": 1}}`.
    pub fields: Filter,
}

#[derive(Debug, Clone, Default)]
pub struct AggregationConfig {
    pub base_filter: Option<Filter>,
    pub group_by: Option<GroupBy>,
    pub sort: Option<Filter>,
    pub limit: Option<i64>,
    pub project: Option<Filter>,
}

#[derive(Debug, Clone)]
pub enum AggregateInput {
    /// A raw, already-staged pipeline. The repository still prepends its
    /// mandatory tenant/type/deleted filters (spec §4.2 invariants).
    Raw(Vec<bson::Document>),
    Config(AggregationConfig),
}
