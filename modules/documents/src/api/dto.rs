//! Wire types for the generic document routes (spec §6.1). Query strings
//! carry pagination/sort/filter; request bodies are raw JSON objects that
//! map straight onto [`modkit_db::Filter`] (the "open map" of spec §3.1).

use modkit_db::Filter;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Comma-separated field list; a leading `-` means descending, e.g.
    /// `-updatedAt,name`.
    pub sort: Option<String>,
    /// A JSON-encoded filter object, e.g. `{"status":"open"}`.
    pub filter: Option<String>,
    /// When present, routes the request through `search` instead of
    /// `findWithPagination` (spec §4.2 `search`).
    pub search: Option<String>,
}

impl ListQuery {
    /// # Errors
    /// Returns a message suitable for wrapping in `ApiError::validation` if
    /// `filter` is present but not a JSON object, or `sort` references no
    /// fields.
    pub fn parse_filter(&self) -> Result<Filter, String> {
        match &self.filter {
            None => Ok(Filter::new()),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err("filter must be a JSON object".to_owned()),
                Err(e) => Err(format!("invalid filter JSON: {e}")),
            },
        }
    }

    #[must_use]
    pub fn parse_sort(&self) -> Option<Filter> {
        let raw = self.sort.as_deref()?;
        let mut sort = Filter::new();
        for field in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if let Some(desc_field) = field.strip_prefix('-') {
                sort.insert(desc_field.to_owned(), Value::from(-1));
            } else {
                sort.insert(field.to_owned(), Value::from(1));
            }
        }
        if sort.is_empty() { None } else { Some(sort) }
    }
}

#[derive(Debug, Deserialize)]
pub struct AggregationRequestBody {
    /// The document type to aggregate over; the repository's mandatory
    /// tenant/type/deleted filters are always prepended (spec §4.2
    /// invariants, §4.3).
    #[serde(rename = "type")]
    pub doc_type: String,
    /// A raw, already-staged pipeline.
    #[serde(default)]
    pub pipeline: Option<Vec<Value>>,
    /// A declarative config, compiled into a pipeline by the repository
    /// (spec §4.3).
    #[serde(default)]
    pub config: Option<AggregationConfigBody>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AggregationConfigBody {
    #[serde(rename = "baseFilter")]
    pub base_filter: Option<Filter>,
    #[serde(rename = "groupBy")]
    pub group_by: Option<GroupByBody>,
    pub sort: Option<Filter>,
    pub limit: Option<i64>,
    pub project: Option<Filter>,
}

#[derive(Debug, Deserialize)]
pub struct GroupByBody {
    #[serde(rename = "_id")]
    pub id: Value,
    #[serde(default)]
    pub fields: Filter,
}

#[derive(Debug, Deserialize)]
pub struct SearchHierarchyQuery {
    pub q: String,
    /// Comma-separated list of document types to search across.
    pub types: String,
}
