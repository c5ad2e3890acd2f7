//! Persists the change stream's resume token across restarts (spec §9
//! "Change-stream resume tokens"): on restart, the watcher resumes from the
//! last acknowledged token; losing it degrades to a bounded scan.

use mongodb::Collection;
use mongodb::change_stream::event::ResumeToken;

const STATE_ID: &str = "vector-pipeline";

pub struct PipelineStateRepository {
    collection: Collection<bson::Document>,
}

impl PipelineStateRepository {
    #[must_use]
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("pipeline_state"),
        }
    }

    /// Returns `None` if no token was ever stored, or if the stored token
    /// cannot be deserialized — both cases fall back to a bounded scan.
    pub async fn load_resume_token(&self) -> Option<ResumeToken> {
        let doc = self.collection.find_one(bson::doc! { "_id": STATE_ID }).await.ok().flatten()?;
        let token_bson = doc.get("resumeToken")?.clone();
        bson::from_bson(token_bson).ok()
    }

    /// Best-effort: a failure to persist the token only costs an extra
    /// bounded scan on the next restart, not correctness.
    pub async fn save_resume_token(&self, token: &ResumeToken) {
        let Ok(token_bson) = bson::to_bson(token) else {
            return;
        };
        if let Err(e) = self
            .collection
            .update_one(bson::doc! { "_id": STATE_ID }, bson::doc! { "$set": { "resumeToken": token_bson } })
            .upsert(true)
            .await
        {
            tracing::warn!(error = %e, "failed to persist vector pipeline resume token");
        }
    }

    pub async fn clear_resume_token(&self) {
        let _ = self.collection.delete_one(bson::doc! { "_id": STATE_ID }).await;
    }
}
