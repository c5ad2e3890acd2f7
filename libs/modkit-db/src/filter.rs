//! Filter-map ↔ BSON bridging and the mandatory-filter invariants every
//! repository call enforces (spec §4.2 "automatically enforced on every
//! call").

use modkit_auth::TenantContext;
use modkit_errors::ApiError;
use serde_json::{Map, Value};

pub type Filter = Map<String, Value>;

/// Convert a caller-supplied filter map into BSON for the driver.
///
/// # Errors
/// Returns `ApiError::validation` if the map contains a value BSON cannot
/// represent.
pub fn filter_to_bson(filter: &Filter) -> Result<bson::Document, ApiError> {
    bson::to_document(filter).map_err(|e| ApiError::validation(format!("invalid filter: {e}")))
}

/// Prepend the structural invariants every repository call enforces (spec
/// §4.2 invariants 1-3): tenant scope (unless platform admin), soft-delete
/// exclusion (unless the caller already specified `deleted`), and the
/// repository's own `type`.
#[must_use]
pub fn mandatory_filter(tenant: &TenantContext, doc_type: &str, caller_filter: &bson::Document) -> bson::Document {
    let mut doc = bson::Document::new();
    if let Some(tenant_id) = tenant.filter_tenant_id() {
        doc.insert("tenantId", tenant_id);
    }
    doc.insert("type", doc_type);
    if !caller_filter.contains_key("deleted") {
        doc.insert("deleted", bson::doc! { "$ne": true });
    }
    for (k, v) in caller_filter {
        doc.insert(k.clone(), v.clone());
    }
    doc
}

/// Text fields searched by `Repository::search` (spec §4.2 `search`).
pub const SEARCHABLE_FIELDS: &[&str] = &["name", "code", "description", "tags"];

/// Known date-valued columns; referenced by the aggregation date-operator
/// guard (spec §4.3, §8 boundary behavior).
pub const DATE_FIELDS: &[&str] = &[
    "createdAt",
    "updatedAt",
    "deletedAt",
    "startedAt",
    "completedAt",
    "timestamp",
];

const DATE_OPERATORS: &[&str] = &["$gte", "$lte", "$gt", "$lt", "$eq"];

/// Validates a `baseFilter` for `aggregate` (spec §4.3, §8): any date
/// operator applied to a field outside `DATE_FIELDS` is rejected before the
/// pipeline ever runs.
///
/// # Errors
/// Returns `ApiError::validation` on the first offending field.
pub fn validate_date_operators(filter: &Filter) -> Result<(), ApiError> {
    for (field, value) in filter {
        if let Value::Object(ops) = value {
            let has_date_operator = ops.keys().any(|k| DATE_OPERATORS.contains(&k.as_str()));
            if has_date_operator && !DATE_FIELDS.contains(&field.as_str()) {
                return Err(ApiError::validation(format!(
                    "date operator used on non-date field '{field}'"
                )));
            }
        }
    }
    Ok(())
}

/// Emits an `$addFields` stage coercing ISO-8601 string values under
/// `DATE_FIELDS` to real BSON dates via `$toDate`, for any date field
/// present in `filter` with a string operand (spec §4.3).
#[must_use]
pub fn date_coercion_stage(filter: &Filter) -> Option<bson::Document> {
    let mut add_fields = bson::Document::new();
    for field in DATE_FIELDS {
        if filter.contains_key(*field) {
            add_fields.insert(*field, bson::doc! { "$toDate": format!("${field}") });
        }
    }
    if add_fields.is_empty() {
        None
    } else {
        Some(bson::doc! { "$addFields": add_fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_filter_adds_tenant_type_and_deleted() {
        let tenant = TenantContext::scoped("t1", "u1");
        let doc = mandatory_filter(&tenant, "asset", &bson::Document::new());
        assert_eq!(doc.get_str("tenantId").unwrap(), "t1");
        assert_eq!(doc.get_str("type").unwrap(), "asset");
        assert!(doc.contains_key("deleted"));
    }

    #[test]
    fn platform_admin_omits_tenant_filter() {
        let tenant = TenantContext::platform_admin("u1");
        let doc = mandatory_filter(&tenant, "asset", &bson::Document::new());
        assert!(!doc.contains_key("tenantId"));
    }

    #[test]
    fn date_operator_on_unknown_field_is_rejected() {
        let mut filter = Filter::new();
        filter.insert("lastLogin".to_owned(), serde_json::json!({"$gte": "2024-01-01"}));
        assert!(validate_date_operators(&filter).is_err());
    }

    #[test]
    fn date_operator_on_known_field_is_accepted() {
        let mut filter = Filter::new();
        filter.insert("createdAt".to_owned(), serde_json::json!({"$gte": "2024-01-01"}));
        assert!(validate_date_operators(&filter).is_ok());
    }
}
