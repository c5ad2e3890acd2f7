//! Mongo-backed persistence for `Workflow` and `Execution`, in the same thin
//! style as `modkit_db::MongoDirectory`: the structs stay inert, this is the
//! only place they are read or written.

use futures::stream::TryStreamExt;
use modkit_auth::TenantContext;
use modkit_errors::ApiError;
use mongodb::Collection;

use super::model::{Execution, ExecutionStatus, Workflow};

fn db_err(e: mongodb::error::Error) -> ApiError {
    ApiError::database(format!("mongo error: {e}"))
}

fn tenant_filter(tenant: &TenantContext) -> bson::Document {
    match tenant.filter_tenant_id() {
        Some(id) => bson::doc! { "tenantId": id },
        None => bson::doc! {},
    }
}

pub struct WorkflowRepository {
    collection: Collection<Workflow>,
}

impl WorkflowRepository {
    #[must_use]
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("workflows"),
        }
    }

    /// # Errors
    /// `ApiError::not_found` if no workflow with `id` exists in `tenant`'s
    /// scope; `ApiError::database` on a driver error.
    pub async fn find_by_id(&self, tenant: &TenantContext, id: &str) -> Result<Workflow, ApiError> {
        let mut filter = tenant_filter(tenant);
        filter.insert("id", id);
        self.collection
            .find_one(filter)
            .await
            .map_err(db_err)?
            .ok_or_else(|| ApiError::not_found(format!("workflow '{id}' not found")))
    }

    /// # Errors
    /// `ApiError::conflict` if a workflow with the same `id` already exists;
    /// `ApiError::database` on a driver error.
    pub async fn create(&self, workflow: &Workflow) -> Result<(), ApiError> {
        self.collection.insert_one(workflow).await.map_err(|e| {
            if is_duplicate_key(&e) {
                ApiError::conflict(format!("workflow '{}' already exists", workflow.id))
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    #[allow(clippy::cast_precision_loss)]
    pub async fn record_execution_outcome(&self, tenant: &TenantContext, workflow_id: &str, succeeded: bool, duration_ms: i64) -> Result<(), ApiError> {
        let mut filter = tenant_filter(tenant);
        filter.insert("id", workflow_id);
        let workflow = self.collection.find_one(filter.clone()).await.map_err(db_err)?;
        let Some(workflow) = workflow else { return Ok(()) };

        let count = workflow.stats.execution_count + 1;
        let avg_duration_ms = ((workflow.stats.avg_duration_ms * workflow.stats.execution_count as f64) + duration_ms as f64) / count as f64;
        let prior_successes = workflow.stats.success_rate * workflow.stats.execution_count as f64;
        let success_rate = (prior_successes + f64::from(u8::from(succeeded))) / count as f64;

        self.collection
            .update_one(
                filter,
                bson::doc! { "$set": {
                    "stats.executionCount": bson::to_bson(&count).map_err(|e| ApiError::internal(e.to_string()))?,
                    "stats.avgDurationMs": avg_duration_ms,
                    "stats.successRate": success_rate,
                } },
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(&*e.kind, mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we)) if we.code == 11000)
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionFilters {
    pub workflow_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub page: u64,
    pub limit: u64,
}

pub struct ExecutionPage {
    pub data: Vec<Execution>,
    pub total: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl ExecutionStats {
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let denom = self.completed + self.failed + self.cancelled;
        if denom == 0 {
            0.0
        } else {
            f64::from(u32::try_from(self.completed).unwrap_or(u32::MAX)) / f64::from(u32::try_from(denom).unwrap_or(u32::MAX))
        }
    }
}

pub struct ExecutionRepository {
    collection: Collection<Execution>,
}

impl ExecutionRepository {
    #[must_use]
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("executions"),
        }
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn insert(&self, execution: &Execution) -> Result<(), ApiError> {
        self.collection.insert_one(execution).await.map_err(db_err)?;
        Ok(())
    }

    /// # Errors
    /// `ApiError::not_found` if no execution with `execution_id` exists in
    /// `tenant`'s scope; `ApiError::database` on a driver error.
    pub async fn find_by_id(&self, tenant: &TenantContext, execution_id: &str) -> Result<Execution, ApiError> {
        let mut filter = tenant_filter(tenant);
        filter.insert("executionId", execution_id);
        self.collection
            .find_one(filter)
            .await
            .map_err(db_err)?
            .ok_or_else(|| ApiError::not_found(format!("execution '{execution_id}' not found")))
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn replace(&self, execution: &Execution) -> Result<(), ApiError> {
        self.collection
            .replace_one(bson::doc! { "executionId": &execution.execution_id }, execution)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn list(&self, tenant: &TenantContext, filters: &ExecutionFilters) -> Result<ExecutionPage, ApiError> {
        let mut filter = tenant_filter(tenant);
        if let Some(workflow_id) = &filters.workflow_id {
            filter.insert("workflowId", workflow_id);
        }
        if let Some(status) = filters.status {
            filter.insert("status", bson::to_bson(&status).map_err(|e| ApiError::internal(e.to_string()))?);
        }

        let total = self.collection.count_documents(filter.clone()).await.map_err(db_err)?;

        let page = filters.page.max(1);
        let limit = filters.limit.clamp(1, 200);
        let skip = (page - 1) * limit;

        let options = mongodb::options::FindOptions::builder()
            .sort(bson::doc! { "createdAt": -1 })
            .skip(skip)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build();
        let cursor = self.collection.find(filter).with_options(options).await.map_err(db_err)?;
        let data = cursor.try_collect().await.map_err(db_err)?;
        Ok(ExecutionPage { data, total })
    }

    /// Computes `successRate = completed / (completed+failed+cancelled)`
    /// over the filtered set.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn stats(&self, tenant: &TenantContext, workflow_id: Option<&str>) -> Result<ExecutionStats, ApiError> {
        let mut base = tenant_filter(tenant);
        if let Some(workflow_id) = workflow_id {
            base.insert("workflowId", workflow_id);
        }

        let mut stats = ExecutionStats::default();
        for status in [ExecutionStatus::Completed, ExecutionStatus::Failed, ExecutionStatus::Cancelled] {
            let mut filter = base.clone();
            filter.insert("status", bson::to_bson(&status).map_err(|e| ApiError::internal(e.to_string()))?);
            let count = self.collection.count_documents(filter).await.map_err(db_err)?;
            match status {
                ExecutionStatus::Completed => stats.completed = count,
                ExecutionStatus::Failed => stats.failed = count,
                ExecutionStatus::Cancelled => stats.cancelled = count,
                _ => {}
            }
        }
        stats.total = self.collection.count_documents(base).await.map_err(db_err)?;
        Ok(stats)
    }

    /// Every execution not already in a terminal state, across all tenants —
    /// used by the engine's shutdown sweep.
    ///
    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_active(&self) -> Result<Vec<Execution>, ApiError> {
        let filter = bson::doc! { "status": { "$in": ["pending", "running", "paused"] } };
        let cursor = self.collection.find(filter).await.map_err(db_err)?;
        cursor.try_collect().await.map_err(db_err)
    }
}
