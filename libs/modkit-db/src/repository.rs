//! The generic document repository (spec §4.2) — every route's only path
//! to the database (spec §9 "Mongoose-style models ... -> pure schemas +
//! services": this struct holds no business logic, only persistence).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::Collection;
use modkit_audit::{AuditEvent, AuditEventType, AuditTrail};
use modkit_auth::{ALL_TENANTS_SENTINEL, RequestContext, TenantContext};
use modkit_errors::ApiError;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::aggregation::{AggregateInput, AggregationConfig};
use crate::filter::{self, Filter, SEARCHABLE_FIELDS, filter_to_bson, mandatory_filter};
use crate::model::{Document, RESERVED_FIELDS};
use crate::pagination::{FindOptions, MAX_PAGE_LIMIT, PaginatedResult, PaginationOptions};

fn db_err(e: mongodb::error::Error) -> ApiError {
    ApiError::database(format!("mongo error: {e}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionItem {
    pub label: Value,
    pub value: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsResult {
    pub total: u64,
    pub by_status: HashMap<String, u64>,
}

/// Per-item outcome of `bulk_create` (spec §4.2 "partial success allowed").
pub enum BulkCreateOutcome {
    Created(Document),
    Failed { index: usize, error: ApiError },
}

pub struct Repository {
    collection: Collection<bson::Document>,
    tenant: TenantContext,
    doc_type: String,
    request: RequestContext,
    audit: Arc<dyn AuditTrail>,
}

impl Repository {
    #[must_use]
    pub fn new(
        collection: Collection<bson::Document>,
        tenant: TenantContext,
        doc_type: impl Into<String>,
        request: RequestContext,
        audit: Arc<dyn AuditTrail>,
    ) -> Self {
        Self {
            collection,
            tenant,
            doc_type: doc_type.into(),
            request,
            audit,
        }
    }

    fn sort_doc(sort: Option<&Filter>) -> Option<bson::Document> {
        sort.and_then(|s| filter_to_bson(s).ok())
    }

    async fn record_audit(&self, event_type: AuditEventType, resource_id: &str, before: Option<Value>, after: Option<Value>) {
        let mut event = AuditEvent::new(
            event_type,
            &self.request.tenant_context.user_id,
            &self.tenant.tenant_id,
            &self.doc_type,
            resource_id,
        );
        if let Some(b) = before {
            event = event.with_before(b);
        }
        if let Some(a) = after {
            event = event.with_after(a);
        }
        if let Err(e) = self.audit.record(event).await {
            tracing::error!(resource_id, error = %e, "failed to record audit event");
        }
    }

    /// spec §4.2 `find`.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find(&self, caller_filter: Filter, opts: FindOptions) -> Result<Vec<Document>, ApiError> {
        let caller_bson = filter_to_bson(&caller_filter)?;
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);
        let mut find = self.collection.find(filter);
        if let Some(sort) = Self::sort_doc(opts.sort.as_ref()) {
            find = find.sort(sort);
        }
        if let Some(limit) = opts.limit {
            find = find.limit(limit);
        }
        if let Some(skip) = opts.skip {
            find = find.skip(skip);
        }
        let cursor = find.await.map_err(db_err)?;
        let raw: Vec<bson::Document> = cursor.try_collect().await.map_err(db_err)?;
        raw.into_iter().map(Document::from_bson).collect()
    }

    /// spec §4.2 `findById`.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Document>, ApiError> {
        let caller_bson = bson::doc! { "_id": id };
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);
        let raw = self.collection.find_one(filter).await.map_err(db_err)?;
        raw.map(Document::from_bson).transpose()
    }

    /// spec §4.2 `findOne`.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_one(&self, caller_filter: Filter) -> Result<Option<Document>, ApiError> {
        let caller_bson = filter_to_bson(&caller_filter)?;
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);
        let raw = self.collection.find_one(filter).await.map_err(db_err)?;
        raw.map(Document::from_bson).transpose()
    }

    /// spec §4.2 `findWithPagination`. `limit == 0` yields an empty page
    /// with the correct `total` (spec §8 boundary behavior); `limit > 200`
    /// is rejected.
    ///
    /// # Errors
    /// `ApiError::validation` if `limit > 200`; `ApiError::database` on a
    /// driver error.
    pub async fn find_with_pagination(
        &self,
        caller_filter: Filter,
        opts: PaginationOptions,
    ) -> Result<PaginatedResult<Document>, ApiError> {
        if opts.limit > MAX_PAGE_LIMIT {
            return Err(ApiError::validation(format!("limit must be <= {MAX_PAGE_LIMIT}")));
        }
        let caller_bson = filter_to_bson(&caller_filter)?;
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);

        let total = self.collection.count_documents(filter.clone()).await.map_err(db_err)?;

        if opts.limit == 0 {
            return Ok(PaginatedResult::new(Vec::new(), total, opts.page, opts.limit));
        }

        let page = opts.page.max(1);
        let skip = (page - 1) * opts.limit;
        let mut find = self.collection.find(filter).limit(i64::try_from(opts.limit).unwrap_or(i64::MAX)).skip(skip);
        if let Some(sort) = Self::sort_doc(opts.sort.as_ref()) {
            find = find.sort(sort);
        }
        let cursor = find.await.map_err(db_err)?;
        let raw: Vec<bson::Document> = cursor.try_collect().await.map_err(db_err)?;
        let data = raw.into_iter().map(Document::from_bson).collect::<Result<Vec<_>, _>>()?;
        Ok(PaginatedResult::new(data, total, page, opts.limit))
    }

    fn resolve_create_tenant_id(&self, data: &Filter) -> Result<String, ApiError> {
        if self.tenant.tenant_id != ALL_TENANTS_SENTINEL {
            return Ok(self.tenant.tenant_id.clone());
        }
        data.get("tenantId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ApiError::validation("platform admin must specify tenantId to create a document"))
    }

    /// spec §4.2 `create`.
    ///
    /// # Errors
    /// `ApiError::validation` for malformed field values; `ApiError::database`
    /// on a driver error.
    pub async fn create(&self, mut data: Filter) -> Result<Document, ApiError> {
        let tenant_id = self.resolve_create_tenant_id(&data)?;
        for reserved in RESERVED_FIELDS {
            data.remove(*reserved);
        }
        data.remove("id");

        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            doc_type: self.doc_type.clone(),
            created_at: now,
            updated_at: now,
            deleted: false,
            created_by: Some(self.request.tenant_context.user_id.clone()),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            fields: data,
        };

        let bson_doc = doc.clone_into_bson()?;
        self.collection.insert_one(bson_doc).await.map_err(db_err)?;

        self.record_audit(AuditEventType::Create, &doc.id, None, Some(doc.to_json())).await;
        Ok(doc)
    }

    /// spec §4.2 `update`. Rejects a patch touching immutable columns
    /// before touching the database.
    ///
    /// # Errors
    /// `ApiError::validation` if the patch mutates an immutable field;
    /// `ApiError::not_found` if `id` doesn't resolve in tenant scope;
    /// `ApiError::database` on a driver error.
    pub async fn update(&self, id: &str, mut patch: Filter) -> Result<Document, ApiError> {
        for forbidden in ["id", "_id", "tenantId", "type", "createdAt"] {
            if patch.contains_key(forbidden) {
                return Err(ApiError::validation(format!("patch must not contain '{forbidden}'")));
            }
        }
        patch.remove("updatedAt");

        let before = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("document '{id}' not found")))?;

        let now = Utc::now();
        let mut set_doc = filter_to_bson(&patch)?;
        set_doc.insert("updatedAt", now);
        set_doc.insert("updatedBy", self.request.tenant_context.user_id.clone());

        let caller_bson = bson::doc! { "_id": id };
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);
        let result = self
            .collection
            .update_one(filter, bson::doc! { "$set": set_doc })
            .await
            .map_err(db_err)?;
        if result.matched_count == 0 {
            return Err(ApiError::not_found(format!("document '{id}' not found")));
        }

        let after = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("document '{id}' not found")))?;
        self.record_audit(AuditEventType::Update, id, Some(before.to_json()), Some(after.to_json())).await;
        Ok(after)
    }

    /// spec §4.2 `delete` — soft delete.
    ///
    /// # Errors
    /// `ApiError::not_found` if `id` doesn't resolve (including a second
    /// call against an already-deleted document, spec §8 idempotence).
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let before = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("document '{id}' not found")))?;

        let now = Utc::now();
        let caller_bson = bson::doc! { "_id": id };
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);
        let update = bson::doc! {
            "$set": {
                "deleted": true,
                "deletedAt": now,
                "deletedBy": self.request.tenant_context.user_id.clone(),
                "updatedAt": now,
            }
        };
        let result = self.collection.update_one(filter, update).await.map_err(db_err)?;
        if result.matched_count == 0 {
            return Err(ApiError::not_found(format!("document '{id}' not found")));
        }

        self.record_audit(AuditEventType::Delete, id, Some(before.to_json()), None).await;
        Ok(())
    }

    /// spec §4.2 `hardDelete` — irreversible, bypasses the soft-delete
    /// filter so an already-soft-deleted document can still be purged.
    ///
    /// # Errors
    /// `ApiError::not_found` if `id` doesn't resolve in tenant scope.
    pub async fn hard_delete(&self, id: &str) -> Result<(), ApiError> {
        let caller_bson = bson::doc! { "_id": id, "deleted": { "$in": [true, false] } };
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);
        let result = self.collection.delete_one(filter).await.map_err(db_err)?;
        if result.deleted_count == 0 {
            return Err(ApiError::not_found(format!("document '{id}' not found")));
        }
        self.record_audit(AuditEventType::HardDelete, id, None, None).await;
        Ok(())
    }

    /// spec §4.2 `search`: case-insensitive substring over
    /// [`SEARCHABLE_FIELDS`], ranked by the count of matching fields.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn search(&self, term: &str, opts: FindOptions) -> Result<Vec<Document>, ApiError> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        let escaped = regex_escape(term);
        let or_clauses: Vec<bson::Document> = SEARCHABLE_FIELDS
            .iter()
            .map(|field| bson::doc! { *field: { "$regex": &escaped, "$options": "i" } })
            .collect();
        let caller_bson = bson::doc! { "$or": or_clauses };
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);

        let mut find = self.collection.find(filter);
        if let Some(limit) = opts.limit {
            find = find.limit(limit);
        }
        let cursor = find.await.map_err(db_err)?;
        let raw: Vec<bson::Document> = cursor.try_collect().await.map_err(db_err)?;
        let mut docs = raw.into_iter().map(Document::from_bson).collect::<Result<Vec<_>, _>>()?;

        let needle = term.to_lowercase();
        docs.sort_by_key(|d| std::cmp::Reverse(match_count(d, &needle)));
        Ok(docs)
    }

    /// spec §4.2 `getOptions`.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn get_options(&self, caller_filter: Filter, label_field: &str, value_field: &str) -> Result<Vec<OptionItem>, ApiError> {
        let docs = self.find(caller_filter, FindOptions::default()).await?;
        let mut seen = std::collections::HashSet::new();
        let mut options = Vec::new();
        for doc in docs {
            let value = field_value(&doc, value_field);
            let key = value.to_string();
            if seen.insert(key) {
                options.push(OptionItem {
                    label: field_value(&doc, label_field),
                    value,
                });
            }
        }
        Ok(options)
    }

    /// spec §4.2 `getDistinctValues`.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn get_distinct_values(&self, field: &str, caller_filter: Filter) -> Result<Vec<Value>, ApiError> {
        let caller_bson = filter_to_bson(&caller_filter)?;
        let filter = mandatory_filter(&self.tenant, &self.doc_type, &caller_bson);
        let values = self.collection.distinct(field, filter).await.map_err(db_err)?;
        values
            .into_iter()
            .map(|b| serde_json::to_value(&b).map_err(|e| ApiError::internal(format!("distinct value not representable in JSON: {e}"))))
            .collect()
    }

    /// spec §4.2 `findByRelation`.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_by_relation(&self, field: &str, value: Value, opts: FindOptions) -> Result<Vec<Document>, ApiError> {
        let mut caller_filter = Filter::new();
        caller_filter.insert(field.to_owned(), value);
        self.find(caller_filter, opts).await
    }

    /// spec §4.2 `getStats`: counts by status and a total.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn get_stats(&self, caller_filter: Filter) -> Result<StatsResult, ApiError> {
        let docs = self.find(caller_filter, FindOptions::default()).await?;
        let mut by_status: HashMap<String, u64> = HashMap::new();
        for doc in &docs {
            if let Some(Value::String(status)) = doc.fields.get("status") {
                *by_status.entry(status.clone()).or_insert(0) += 1;
            }
        }
        Ok(StatsResult {
            total: docs.len() as u64,
            by_status,
        })
    }

    /// spec §4.3 `aggregate`.
    ///
    /// # Errors
    /// `ApiError::validation` if a declarative config references a date
    /// operator on a non-date field; `ApiError::database` on a driver error.
    pub async fn aggregate(&self, input: AggregateInput) -> Result<Vec<Value>, ApiError> {
        let mandatory = mandatory_filter(&self.tenant, &self.doc_type, &bson::Document::new());
        let mut pipeline = vec![bson::doc! { "$match": mandatory }];

        match input {
            AggregateInput::Raw(stages) => pipeline.extend(stages),
            AggregateInput::Config(config) => self.extend_with_config(&mut pipeline, config)?,
        }

        let cursor = self.collection.aggregate(pipeline).await.map_err(db_err)?;
        let raw: Vec<bson::Document> = cursor.try_collect().await.map_err(db_err)?;
        raw.into_iter()
            .map(|d| serde_json::to_value(&d).map_err(|e| ApiError::internal(format!("aggregation result not representable in JSON: {e}"))))
            .collect()
    }

    fn extend_with_config(&self, pipeline: &mut Vec<bson::Document>, config: AggregationConfig) -> Result<(), ApiError> {
        if let Some(base_filter) = &config.base_filter {
            filter::validate_date_operators(base_filter)?;
            if let Some(stage) = filter::date_coercion_stage(base_filter) {
                pipeline.push(stage);
            }
            pipeline.push(bson::doc! { "$match": filter_to_bson(base_filter)? });
        }
        if let Some(group_by) = config.group_by {
            let id_bson = bson::to_bson(&group_by.id).map_err(|e| ApiError::validation(format!("invalid groupBy._id: {e}")))?;
            let mut group_doc = bson::doc! { "_id": id_bson };
            for (name, expr) in &group_by.fields {
                let expr_bson = bson::to_bson(expr).map_err(|e| ApiError::validation(format!("invalid groupBy field '{name}': {e}")))?;
                group_doc.insert(name.clone(), expr_bson);
            }
            pipeline.push(bson::doc! { "$group": group_doc });
        }
        if let Some(sort) = &config.sort {
            pipeline.push(bson::doc! { "$sort": filter_to_bson(sort)? });
        }
        if let Some(limit) = config.limit {
            pipeline.push(bson::doc! { "$limit": limit });
        }
        if let Some(project) = &config.project {
            pipeline.push(bson::doc! { "$project": filter_to_bson(project)? });
        }
        Ok(())
    }

    /// spec §4.2 `bulkCreate`: per-item success/error, partial success
    /// allowed.
    pub async fn bulk_create(&self, docs: Vec<Filter>) -> Vec<BulkCreateOutcome> {
        let mut outcomes = Vec::with_capacity(docs.len());
        for (index, data) in docs.into_iter().enumerate() {
            match self.create(data).await {
                Ok(doc) => outcomes.push(BulkCreateOutcome::Created(doc)),
                Err(error) => outcomes.push(BulkCreateOutcome::Failed { index, error }),
            }
        }
        outcomes
    }
}

impl Document {
    fn clone_into_bson(&self) -> Result<bson::Document, ApiError> {
        self.clone().into_bson()
    }
}

fn field_value(doc: &Document, field: &str) -> Value {
    match field {
        "id" => Value::String(doc.id.clone()),
        "type" => Value::String(doc.doc_type.clone()),
        "tenantId" => Value::String(doc.tenant_id.clone()),
        _ => doc.fields.get(field).cloned().unwrap_or(Value::Null),
    }
}

fn match_count(doc: &Document, needle: &str) -> usize {
    SEARCHABLE_FIELDS
        .iter()
        .filter(|field| match doc.fields.get(**field) {
            Some(Value::String(s)) => s.to_lowercase().contains(needle),
            Some(Value::Array(items)) => items
                .iter()
                .any(|v| v.as_str().is_some_and(|s| s.to_lowercase().contains(needle))),
            _ => false,
        })
        .count()
}

/// Escapes regex metacharacters so `search` does literal substring matching,
/// not pattern matching, on caller-supplied text.
fn regex_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_escape_neutralizes_metacharacters() {
        assert_eq!(regex_escape("a.b*c"), "a\\.b\\*c");
    }

    #[test]
    fn field_value_reads_reserved_and_open_fields() {
        let mut fields = Filter::new();
        fields.insert("name".to_owned(), Value::String("Pump".to_owned()));
        let doc = Document {
            id: "id-1".to_owned(),
            tenant_id: "t1".to_owned(),
            doc_type: "asset".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted: false,
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            fields,
        };
        assert_eq!(field_value(&doc, "id"), Value::String("id-1".to_owned()));
        assert_eq!(field_value(&doc, "name"), Value::String("Pump".to_owned()));
        assert_eq!(field_value(&doc, "missing"), Value::Null);
    }
}
