//! The polymorphic `Document` record (spec §3.1) and its boundary
//! conversion to/from `bson::Document`.
//!
//! Per spec §9 ("interface + tagged variants"), there is exactly one Rust
//! type for every document in the store; the `type` field tags the variant
//! and type-specific payload lives in `fields`, an open map. The conversions
//! below are hand-rolled rather than derived via `#[serde(flatten)]`: the
//! known columns (`id`, `tenantId`, ...) are pulled out of the Mongo
//! document explicitly and everything left over becomes `fields`, which
//! keeps the reserved-column set obvious at a glance and sidesteps flatten's
//! interaction with BSON's own type system.

use chrono::{DateTime, Utc};
use modkit_errors::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const RESERVED_FIELDS: &[&str] = &[
    "_id",
    "tenantId",
    "type",
    "createdAt",
    "updatedAt",
    "deleted",
    "createdBy",
    "updatedBy",
    "deletedAt",
    "deletedBy",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub tenant_id: String,
    pub doc_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Convert into the BSON document persisted to Mongo. `id` becomes `_id`
    /// — the spec's "globally unique, opaque" id doubles as the primary key.
    ///
    /// # Errors
    /// Returns `ApiError::internal` if a field in the open map cannot be
    /// represented in BSON (this should never happen for JSON-shaped input).
    pub fn into_bson(self) -> Result<bson::Document, ApiError> {
        let mut doc = bson::doc! {
            "_id": self.id,
            "tenantId": self.tenant_id,
            "type": self.doc_type,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
            "deleted": self.deleted,
        };
        if let Some(v) = self.created_by {
            doc.insert("createdBy", v);
        }
        if let Some(v) = self.updated_by {
            doc.insert("updatedBy", v);
        }
        if let Some(v) = self.deleted_at {
            doc.insert("deletedAt", v);
        }
        if let Some(v) = self.deleted_by {
            doc.insert("deletedBy", v);
        }
        for (key, value) in self.fields {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let bson_value = bson::to_bson(&value)
                .map_err(|e| ApiError::internal(format!("field '{key}' is not representable in BSON: {e}")))?;
            doc.insert(key, bson_value);
        }
        Ok(doc)
    }

    /// Parse a BSON document read back from Mongo into a `Document`. Any
    /// field not in `RESERVED_FIELDS` goes into `fields`, regardless of
    /// insertion order.
    ///
    /// # Errors
    /// Returns `ApiError::database` if a required column is missing or
    /// malformed — this indicates store corruption, not caller error.
    pub fn from_bson(mut doc: bson::Document) -> Result<Self, ApiError> {
        let bad = |field: &str| ApiError::database(format!("document missing or malformed '{field}'"));

        let id = doc
            .remove("_id")
            .and_then(|v| match v {
                bson::Bson::String(s) => Some(s),
                other => other.as_object_id().map(|oid| oid.to_hex()),
            })
            .ok_or_else(|| bad("_id"))?;
        let tenant_id = doc.remove("tenantId").and_then(|v| v.as_str().map(str::to_owned)).ok_or_else(|| bad("tenantId"))?;
        let doc_type = doc.remove("type").and_then(|v| v.as_str().map(str::to_owned)).ok_or_else(|| bad("type"))?;
        let created_at = doc
            .remove("createdAt")
            .and_then(|v| v.as_datetime().copied())
            .map(chrono::DateTime::<Utc>::from)
            .ok_or_else(|| bad("createdAt"))?;
        let updated_at = doc
            .remove("updatedAt")
            .and_then(|v| v.as_datetime().copied())
            .map(chrono::DateTime::<Utc>::from)
            .ok_or_else(|| bad("updatedAt"))?;
        let deleted = doc.remove("deleted").and_then(bson::Bson::as_bool).unwrap_or(false);
        let created_by = doc.remove("createdBy").and_then(|v| v.as_str().map(str::to_owned));
        let updated_by = doc.remove("updatedBy").and_then(|v| v.as_str().map(str::to_owned));
        let deleted_at = doc
            .remove("deletedAt")
            .and_then(|v| v.as_datetime().copied())
            .map(chrono::DateTime::<Utc>::from);
        let deleted_by = doc.remove("deletedBy").and_then(|v| v.as_str().map(str::to_owned));

        let mut fields = Map::new();
        for (key, value) in doc {
            let json_value = serde_json::to_value(&value)
                .map_err(|e| ApiError::internal(format!("field '{key}' is not representable in JSON: {e}")))?;
            fields.insert(key, json_value);
        }

        Ok(Self {
            id,
            tenant_id,
            doc_type,
            created_at,
            updated_at,
            deleted,
            created_by,
            updated_by,
            deleted_at,
            deleted_by,
            fields,
        })
    }

    /// JSON projection returned over the wire, merging the open map back to
    /// the top level (spec §3.1 documents are flat records to API callers).
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".to_owned(), Value::String(self.id.clone()));
        map.insert("tenantId".to_owned(), Value::String(self.tenant_id.clone()));
        map.insert("type".to_owned(), Value::String(self.doc_type.clone()));
        map.insert("createdAt".to_owned(), Value::String(self.created_at.to_rfc3339()));
        map.insert("updatedAt".to_owned(), Value::String(self.updated_at.to_rfc3339()));
        map.insert("deleted".to_owned(), Value::Bool(self.deleted));
        if let Some(v) = &self.created_by {
            map.insert("createdBy".to_owned(), Value::String(v.clone()));
        }
        if let Some(v) = &self.updated_by {
            map.insert("updatedBy".to_owned(), Value::String(v.clone()));
        }
        if let Some(v) = &self.deleted_at {
            map.insert("deletedAt".to_owned(), Value::String(v.to_rfc3339()));
        }
        if let Some(v) = &self.deleted_by {
            map.insert("deletedBy".to_owned(), Value::String(v.clone()));
        }
        Value::Object(map)
    }

    /// The semantic projection used by the vector pipeline (spec §4.5,
    /// GLOSSARY): concatenation of the declared text fields.
    #[must_use]
    pub fn semantic_projection(&self, text_fields: &[&str], max_len: usize) -> String {
        let mut out = String::new();
        for field in text_fields {
            if let Some(Value::String(s)) = self.fields.get(*field) {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(s);
            }
        }
        out.truncate(max_len);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut fields = Map::new();
        fields.insert("name".to_owned(), Value::String("Pump".to_owned()));
        Document {
            id: "doc-1".to_owned(),
            tenant_id: "tenant-1".to_owned(),
            doc_type: "asset".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted: false,
            created_by: Some("user-1".to_owned()),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            fields,
        }
    }

    #[test]
    fn round_trips_through_bson() {
        let doc = sample();
        let id = doc.id.clone();
        let bson = doc.into_bson().expect("converts to bson");
        let restored = Document::from_bson(bson).expect("converts back");
        assert_eq!(restored.id, id);
        assert_eq!(restored.doc_type, "asset");
        assert_eq!(restored.fields.get("name"), Some(&Value::String("Pump".to_owned())));
    }

    #[test]
    fn reserved_fields_in_open_map_are_dropped_on_write() {
        let mut doc = sample();
        doc.fields.insert("tenantId".to_owned(), Value::String("sneaky".to_owned()));
        let bson = doc.into_bson().expect("converts");
        assert_eq!(bson.get_str("tenantId").expect("tenantId present"), "tenant-1");
    }

    #[test]
    fn semantic_projection_concatenates_declared_fields() {
        let mut doc = sample();
        doc.fields.insert("description".to_owned(), Value::String("Centrifugal pump".to_owned()));
        let projection = doc.semantic_projection(&["name", "description"], 1000);
        assert_eq!(projection, "Pump\nCentrifugal pump");
    }

    #[test]
    fn semantic_projection_truncates_to_max_len() {
        let doc = sample();
        let projection = doc.semantic_projection(&["name"], 2);
        assert_eq!(projection, "Pu");
    }
}
