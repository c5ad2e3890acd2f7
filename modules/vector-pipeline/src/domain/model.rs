//! `VectorRecord` (spec §3.4): one semantic embedding per document, unique
//! by `documentId`.

use chrono::{DateTime, Utc};
use modkit_errors::ApiError;
use mongodb::Collection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    #[serde(rename = "documentId")]
    pub document_id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub embedding: Vec<f32>,
    #[serde(rename = "semanticHash")]
    pub semantic_hash: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A deterministic, cheap digest of a document's semantic projection — used
/// only to decide whether re-embedding is necessary (spec §4.5
/// "exactly-once-per-final-state"), never as a security boundary.
#[must_use]
pub fn semantic_hash(projection: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    projection.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn db_err(e: mongodb::error::Error) -> ApiError {
    ApiError::database(format!("mongo error: {e}"))
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(&*e.kind, mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we)) if we.code == 11000)
}

pub struct VectorRepository {
    collection: Collection<VectorRecord>,
}

impl VectorRepository {
    #[must_use]
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("vectors"),
        }
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn find_by_document_id(&self, document_id: &str) -> Result<Option<VectorRecord>, ApiError> {
        self.collection
            .find_one(bson::doc! { "documentId": document_id })
            .await
            .map_err(db_err)
    }

    /// Upserts `record` keyed by `documentId`; retries once on a duplicate-key
    /// race (spec §4.5 "Duplicate-key conflicts during upsert retry").
    ///
    /// # Errors
    /// `ApiError::database` on a driver error that isn't a duplicate key, or
    /// that persists through the retry.
    pub async fn upsert(&self, record: &VectorRecord) -> Result<(), ApiError> {
        let filter = bson::doc! { "documentId": &record.document_id };
        let doc = bson::to_document(record).map_err(|e| ApiError::internal(format!("vector record is not representable in BSON: {e}")))?;
        let update = bson::doc! { "$set": doc };

        match self.collection.update_one(filter.clone(), update.clone()).upsert(true).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => self
                .collection
                .update_one(filter, update)
                .upsert(true)
                .await
                .map(|_| ())
                .map_err(db_err),
            Err(e) => Err(db_err(e)),
        }
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn delete_by_document_id(&self, document_id: &str) -> Result<(), ApiError> {
        self.collection.delete_one(bson::doc! { "documentId": document_id }).await.map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_hash_is_deterministic() {
        assert_eq!(semantic_hash("Centrifugal pump"), semantic_hash("Centrifugal pump"));
    }

    #[test]
    fn semantic_hash_differs_on_change() {
        assert_ne!(semantic_hash("Centrifugal pump"), semantic_hash("Ball valve"));
    }
}
