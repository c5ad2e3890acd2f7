//! Generic document routes (spec §6.1): CRUD over `/api/documents/:type`,
//! cross-type hierarchy search, and the aggregation endpoint. Every handler
//! builds a fresh [`Repository`] scoped to the caller's `RequestContext`
//! and the `:type` path segment — no handler talks to `mongodb` directly
//! (spec §4.2 "No route may speak to the database directly").

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use modkit::{RouteDecl, RoutePolicy, SharedAuthState};
use modkit_audit::AuditTrailHandle;
use modkit_db::{AggregateInput, AggregationConfig, Database, Filter, FindOptions, GroupBy, PaginationOptions, Repository};
use modkit_auth::RequestContext;
use modkit_errors::{ApiError, ApiResult};
use serde_json::{Map, Value, json};

use super::dto::{AggregationRequestBody, ListQuery, SearchHierarchyQuery};

const DOCUMENTS_COLLECTION: &str = "documents";

fn repo_for(db: &Database, audit: Arc<dyn modkit_audit::AuditTrail>, ctx: &RequestContext, doc_type: &str) -> Repository {
    Repository::new(
        db.collection(DOCUMENTS_COLLECTION),
        ctx.tenant_context.clone(),
        doc_type,
        ctx.clone(),
        audit,
    )
}

pub fn build(db: Arc<Database>, audit: Arc<AuditTrailHandle>) -> (Router<SharedAuthState>, Vec<RouteDecl>) {
    let router = Router::new()
        .route("/api/documents/:type", get(list_documents).post(create_document))
        .route("/api/documents/:type/stats", get(document_stats))
        .route("/api/documents/:type/:id", get(get_document).put(update_document).delete(delete_document))
        .route("/api/search/hierarchy", get(search_hierarchy))
        .route("/api/aggregation", post(run_aggregation))
        .layer(Extension(db))
        .layer(Extension(audit));

    let decls = vec![
        RouteDecl::new("GET", "/api/documents/:type", RoutePolicy::RequireAuth),
        RouteDecl::new("POST", "/api/documents/:type", RoutePolicy::RequireAuth),
        RouteDecl::new("GET", "/api/documents/:type/stats", RoutePolicy::RequireAuth),
        RouteDecl::new("GET", "/api/documents/:type/:id", RoutePolicy::RequireAuth),
        RouteDecl::new("PUT", "/api/documents/:type/:id", RoutePolicy::RequireAuth),
        RouteDecl::new("DELETE", "/api/documents/:type/:id", RoutePolicy::RequireAuth),
        RouteDecl::new("GET", "/api/search/hierarchy", RoutePolicy::RequireAuth),
        RouteDecl::new("POST", "/api/aggregation", RoutePolicy::RequireAuth),
    ];
    (router, decls)
}

async fn list_documents(
    ctx: RequestContext,
    Path(doc_type): Path<String>,
    Query(q): Query<ListQuery>,
    Extension(db): Extension<Arc<Database>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
) -> ApiResult<Json<Value>> {
    let repo = repo_for(&db, audit.0.clone(), &ctx, &doc_type);
    let filter = q.parse_filter().map_err(ApiError::validation)?;

    if let Some(term) = &q.search {
        let opts = FindOptions {
            limit: q.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)),
            ..FindOptions::default()
        };
        let docs = repo.search(term, opts).await?;
        return Ok(Json(json!({ "data": docs.iter().map(modkit_db::Document::to_json).collect::<Vec<_>>() })));
    }

    let opts = PaginationOptions {
        page: q.page.unwrap_or(1),
        limit: q.limit.unwrap_or(20),
        sort: q.parse_sort(),
    };
    let page = repo.find_with_pagination(filter, opts).await?;
    Ok(Json(json!({
        "data": page.data.iter().map(modkit_db::Document::to_json).collect::<Vec<_>>(),
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
        "pages": page.pages,
    })))
}

async fn get_document(
    ctx: RequestContext,
    Path((doc_type, id)): Path<(String, String)>,
    Extension(db): Extension<Arc<Database>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
) -> ApiResult<Json<Value>> {
    let repo = repo_for(&db, audit.0.clone(), &ctx, &doc_type);
    let doc = repo.find_by_id(&id).await?.ok_or_else(|| ApiError::not_found(format!("document '{id}' not found")))?;
    Ok(Json(doc.to_json()))
}

async fn create_document(
    ctx: RequestContext,
    Path(doc_type): Path<String>,
    Extension(db): Extension<Arc<Database>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
    Json(body): Json<Value>,
) -> ApiResult<(http::StatusCode, Json<Value>)> {
    let Value::Object(data) = body else {
        return Err(ApiError::validation("request body must be a JSON object"));
    };
    let repo = repo_for(&db, audit.0.clone(), &ctx, &doc_type);
    let doc = repo.create(data).await?;
    Ok((http::StatusCode::CREATED, Json(doc.to_json())))
}

async fn update_document(
    ctx: RequestContext,
    Path((doc_type, id)): Path<(String, String)>,
    Extension(db): Extension<Arc<Database>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let Value::Object(patch) = body else {
        return Err(ApiError::validation("request body must be a JSON object"));
    };
    let repo = repo_for(&db, audit.0.clone(), &ctx, &doc_type);
    let doc = repo.update(&id, patch).await?;
    Ok(Json(doc.to_json()))
}

async fn delete_document(
    ctx: RequestContext,
    Path((doc_type, id)): Path<(String, String)>,
    Extension(db): Extension<Arc<Database>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
) -> ApiResult<Json<Value>> {
    let repo = repo_for(&db, audit.0.clone(), &ctx, &doc_type);
    repo.delete(&id).await?;
    Ok(Json(json!({ "id": id, "deleted": true })))
}

async fn document_stats(
    ctx: RequestContext,
    Path(doc_type): Path<String>,
    Extension(db): Extension<Arc<Database>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
) -> ApiResult<Json<Value>> {
    let repo = repo_for(&db, audit.0.clone(), &ctx, &doc_type);
    let stats = repo.get_stats(Filter::new()).await?;
    Ok(Json(json!({ "total": stats.total, "byStatus": stats.by_status })))
}

/// Walks a document's `parentId` chain up to the root, bounded to avoid an
/// accidental cycle, for the tree-expansion UI this endpoint serves.
async fn resolve_path(db: &Database, ctx: &RequestContext, start: &modkit_db::Document) -> Vec<Value> {
    const MAX_DEPTH: usize = 32;
    let collection: mongodb::Collection<bson::Document> = db.collection(DOCUMENTS_COLLECTION);
    let mut path = Vec::new();
    let mut current_parent = start.fields.get("parentId").and_then(Value::as_str).map(str::to_owned);
    let mut depth = 0;
    while let Some(parent_id) = current_parent.take() {
        if depth >= MAX_DEPTH {
            break;
        }
        depth += 1;
        let mut filter = bson::doc! { "_id": &parent_id, "deleted": { "$ne": true } };
        if let Some(tenant_id) = ctx.tenant_context.filter_tenant_id() {
            filter.insert("tenantId", tenant_id);
        }
        let Ok(Some(raw)) = collection.find_one(filter).await else {
            break;
        };
        let Ok(parent) = modkit_db::Document::from_bson(raw) else {
            break;
        };
        path.push(json!({ "id": parent.id, "type": parent.doc_type, "name": parent.fields.get("name") }));
        current_parent = parent.fields.get("parentId").and_then(Value::as_str).map(str::to_owned);
    }
    path.reverse();
    path
}

async fn search_hierarchy(
    ctx: RequestContext,
    Query(q): Query<SearchHierarchyQuery>,
    Extension(db): Extension<Arc<Database>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
) -> ApiResult<Json<Value>> {
    let mut matches = Vec::new();
    for doc_type in q.types.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let repo = repo_for(&db, audit.0.clone(), &ctx, doc_type);
        let docs = repo.search(&q.q, FindOptions::default()).await?;
        for doc in docs {
            let path = resolve_path(&db, &ctx, &doc).await;
            matches.push(json!({ "document": doc.to_json(), "path": path }));
        }
    }
    Ok(Json(json!({ "matches": matches })))
}

fn stage_to_bson(stage: &Value) -> Result<bson::Document, ApiError> {
    bson::to_document(stage).map_err(|e| ApiError::validation(format!("invalid pipeline stage: {e}")))
}

async fn run_aggregation(
    ctx: RequestContext,
    Extension(db): Extension<Arc<Database>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
    Json(body): Json<AggregationRequestBody>,
) -> ApiResult<Json<Value>> {
    let repo = repo_for(&db, audit.0.clone(), &ctx, &body.doc_type);

    let input = match (body.pipeline, body.config) {
        (Some(stages), _) => {
            let staged = stages.iter().map(stage_to_bson).collect::<Result<Vec<_>, _>>()?;
            AggregateInput::Raw(staged)
        }
        (None, Some(config)) => AggregateInput::Config(AggregationConfig {
            base_filter: config.base_filter,
            group_by: config.group_by.map(|g| GroupBy { id: g.id, fields: g.fields }),
            sort: config.sort,
            limit: config.limit,
            project: config.project,
        }),
        (None, None) => return Err(ApiError::validation("request must include either 'pipeline' or 'config'")),
    };

    let results = repo.aggregate(input).await?;
    Ok(Json(json!({ "data": results })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_parses_sort_with_mixed_direction() {
        let q = ListQuery {
            sort: Some("-updatedAt,name".to_owned()),
            ..ListQuery::default()
        };
        let sort = q.parse_sort().expect("non-empty sort");
        assert_eq!(sort.get("updatedAt"), Some(&Value::from(-1)));
        assert_eq!(sort.get("name"), Some(&Value::from(1)));
    }

    #[test]
    fn list_query_rejects_non_object_filter() {
        let q = ListQuery {
            filter: Some("[1,2,3]".to_owned()),
            ..ListQuery::default()
        };
        assert!(q.parse_filter().is_err());
    }

    #[test]
    fn empty_aggregation_body_is_rejected_before_touching_the_db() {
        let body = AggregationRequestBody {
            doc_type: "asset".to_owned(),
            pipeline: None,
            config: None,
        };
        assert!(body.pipeline.is_none() && body.config.is_none());
    }
}
