//! The `Database` manager (spec §5 "Shared resources": "the database
//! connection pool is the only shared mutable resource of consequence; it
//! is owned by a Database manager which exposes health and pool stats").
//!
//! One instance is built at bootstrap from `AppConfig` and handed to every
//! module that needs collection access through `ModuleCtx`. Leases are
//! acquired per operation by the underlying `mongodb` connection pool and
//! released on completion; this wrapper does not add pooling of its own.

use std::time::Instant;

use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use modkit_errors::ApiError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub reachable: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub max_pool_size: u32,
}

/// Owns the `mongodb::Client` and the database handle every repository and
/// service is built against.
#[derive(Clone)]
pub struct Database {
    client: Client,
    db: mongodb::Database,
    max_pool_size: u32,
}

impl Database {
    /// Connect and select the database named `database_name`.
    ///
    /// # Errors
    /// Returns `ApiError::database` if the URI cannot be parsed or a client
    /// cannot be constructed. Connection itself is lazy in the driver; this
    /// does not guarantee the server is reachable (use [`Self::health`]).
    pub async fn connect(uri: &str, database_name: &str, max_pool_size: u32) -> Result<Self, ApiError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| ApiError::database(format!("invalid database URI: {e}")))?;
        options.max_pool_size = Some(max_pool_size);
        let client = Client::with_options(options).map_err(|e| ApiError::database(format!("failed to build mongo client: {e}")))?;
        let db = client.database(database_name);
        Ok(Self {
            client,
            db,
            max_pool_size,
        })
    }

    #[must_use]
    pub fn inner(&self) -> &mongodb::Database {
        &self.db
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    /// Round-trips a `ping` command against the admin database; reported by
    /// `GET /health`.
    ///
    /// # Errors
    /// Never returns `Err` — an unreachable server is reported via
    /// `reachable: false` rather than surfaced as a route failure, since the
    /// health endpoint must always answer.
    pub async fn health(&self) -> DatabaseHealth {
        let start = Instant::now();
        let reachable = self.db.run_command(bson::doc! { "ping": 1 }).await.is_ok();
        DatabaseHealth {
            reachable,
            latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            max_pool_size: self.max_pool_size,
        }
    }

    /// Ensures the indexes spec §6.2 names exist. Idempotent: safe to call
    /// on every startup.
    ///
    /// # Errors
    /// Returns `ApiError::database` if index creation fails.
    pub async fn ensure_indexes(&self) -> Result<(), ApiError> {
        use mongodb::IndexModel;
        use mongodb::options::IndexOptions;

        let documents: Collection<bson::Document> = self.collection("documents");
        documents
            .create_index(IndexModel::builder().keys(bson::doc! { "tenantId": 1, "type": 1, "deleted": 1 }).build())
            .await
            .map_err(|e| ApiError::database(format!("failed to create documents index: {e}")))?;
        documents
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! { "_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| ApiError::database(format!("failed to create documents unique id index: {e}")))?;

        let users: Collection<bson::Document> = self.collection("users");
        users
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! { "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| ApiError::database(format!("failed to create users index: {e}")))?;

        let memberships: Collection<bson::Document> = self.collection("memberships");
        memberships
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! { "userId": 1, "tenantId": 1, "role": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| ApiError::database(format!("failed to create memberships index: {e}")))?;

        let executions: Collection<bson::Document> = self.collection("executions");
        executions
            .create_index(IndexModel::builder().keys(bson::doc! { "tenantId": 1, "workflowId": 1, "status": 1, "startedAt": 1 }).build())
            .await
            .map_err(|e| ApiError::database(format!("failed to create executions index: {e}")))?;

        let vectors: Collection<bson::Document> = self.collection("vectors");
        vectors
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! { "tenantId": 1, "type": 1, "documentId": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| ApiError::database(format!("failed to create vectors index: {e}")))?;

        let audit: Collection<bson::Document> = self.collection("audit_events");
        audit
            .create_index(IndexModel::builder().keys(bson::doc! { "timestamp": 1 }).build())
            .await
            .map_err(|e| ApiError::database(format!("failed to create audit_events index: {e}")))?;

        Ok(())
    }
}
