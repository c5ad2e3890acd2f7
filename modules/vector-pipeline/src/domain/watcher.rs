//! Change-stream watcher (spec §4.5 "subscribes to the document collection's
//! change stream... filters events by monitored types"), with the bounded
//! scan fallback spec §9 directs when the resume token is missing or
//! invalid.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use futures::stream::StreamExt;
use modkit_db::Database;
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};
use mongodb::options::ChangeStreamOptions;
use tokio_util::sync::CancellationToken;

use super::debouncer::Debouncer;
use super::pipeline_state::PipelineStateRepository;

const DOCUMENTS_COLLECTION: &str = "documents";
/// How many of the most recently updated documents the fallback scan
/// considers — a bound so a lost resume token never triggers an unbounded
/// re-embed of the whole collection (spec §9 "degrades to a scan over the
/// monitored types bounded by the last-updated timestamp").
const SCAN_LIMIT: i64 = 500;
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Upsert,
    Delete,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub document_id: String,
    /// `None` for deletes — the change stream's `documentKey` carries only
    /// `_id`; `VectorRecord` is looked up and removed by `documentId` alone,
    /// so the tenant isn't needed to process a delete.
    pub tenant_id: Option<String>,
    pub doc_type: Option<String>,
    pub kind: ChangeKind,
    /// Monotonic per-watcher counter, useful only for tests asserting that
    /// debouncing kept the latest of several coalesced events.
    pub revision: u32,
}

pub struct Watcher {
    db: Arc<Database>,
    state: Arc<PipelineStateRepository>,
    monitored_types: Vec<String>,
}

impl Watcher {
    #[must_use]
    pub fn new(db: Arc<Database>, state: Arc<PipelineStateRepository>, monitored_types: Vec<String>) -> Self {
        Self { db, state, monitored_types }
    }

    /// Runs until `cancel` fires. Prefers the live change stream; falls back
    /// to a bounded scan (and retries the stream) on any driver error.
    pub async fn run(&self, debouncer: &Debouncer, cancel: &CancellationToken) {
        let mut revision: u32 = 0;
        while !cancel.is_cancelled() {
            match self.watch_change_stream(debouncer, cancel, &mut revision).await {
                Ok(()) => break, // cancelled cleanly
                Err(e) => {
                    tracing::warn!(error = %e, "vector pipeline change stream failed, falling back to bounded scan");
                    self.state.clear_resume_token().await;
                    self.bounded_scan(debouncer, &mut revision).await;
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }
    }

    async fn watch_change_stream(&self, debouncer: &Debouncer, cancel: &CancellationToken, revision: &mut u32) -> Result<(), String> {
        let collection: mongodb::Collection<bson::Document> = self.db.collection(DOCUMENTS_COLLECTION);
        let resume_token = self.state.load_resume_token().await;
        let options = ChangeStreamOptions::builder().resume_after(resume_token).build();

        let mut stream = collection
            .watch(Vec::<bson::Document>::new(), Some(options))
            .await
            .map_err(|e| format!("failed to open change stream: {e}"))?;

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                next = stream.next() => {
                    match next {
                        Some(Ok(event)) => {
                            self.handle_change_event(event, debouncer, revision);
                            if let Some(token) = stream.resume_token() {
                                self.state.save_resume_token(&token).await;
                            }
                        }
                        Some(Err(e)) => return Err(format!("change stream error: {e}")),
                        None => return Err("change stream ended unexpectedly".to_owned()),
                    }
                }
            }
        }
    }

    fn handle_change_event(&self, event: ChangeStreamEvent<bson::Document>, debouncer: &Debouncer, revision: &mut u32) {
        let Some(document_id) = event.document_key.as_ref().and_then(|k| k.get("_id")).and_then(bson::Bson::as_str) else {
            return;
        };

        let change = match event.operation_type {
            OperationType::Delete => ChangeEvent {
                document_id: document_id.to_owned(),
                tenant_id: None,
                doc_type: None,
                kind: ChangeKind::Delete,
                revision: *revision,
            },
            OperationType::Insert | OperationType::Update | OperationType::Replace => {
                let Some(full_document) = event.full_document else { return };
                let doc_type = full_document.get_str("type").ok().map(str::to_owned);
                let Some(doc_type) = doc_type else { return };
                if !self.monitored_types.iter().any(|t| t == &doc_type) {
                    return;
                }
                let tenant_id = full_document.get_str("tenantId").ok().map(str::to_owned);
                ChangeEvent {
                    document_id: document_id.to_owned(),
                    tenant_id,
                    doc_type: Some(doc_type),
                    kind: ChangeKind::Upsert,
                    revision: *revision,
                }
            }
            _ => return,
        };

        *revision = revision.wrapping_add(1);
        debouncer.push(change);
    }

    /// Bounded scan fallback (spec §9): the most recently updated documents
    /// of each monitored type, re-submitted through the same debouncer as a
    /// normal upsert event so the worker pool's skip-if-unchanged check
    /// still applies.
    async fn bounded_scan(&self, debouncer: &Debouncer, revision: &mut u32) {
        let collection: mongodb::Collection<bson::Document> = self.db.collection(DOCUMENTS_COLLECTION);
        let filter = bson::doc! { "type": { "$in": self.monitored_types.clone() }, "deleted": { "$ne": true } };

        let cursor = match collection.find(filter).sort(bson::doc! { "updatedAt": -1 }).limit(SCAN_LIMIT).await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::warn!(error = %e, "vector pipeline bounded scan failed to start");
                return;
            }
        };
        let docs: Vec<bson::Document> = match cursor.try_collect().await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "vector pipeline bounded scan failed to collect");
                return;
            }
        };

        for doc in docs {
            let Some(document_id) = doc.get_str("_id").ok().map(str::to_owned) else { continue };
            let Some(doc_type) = doc.get_str("type").ok().map(str::to_owned) else { continue };
            let tenant_id = doc.get_str("tenantId").ok().map(str::to_owned);
            *revision = revision.wrapping_add(1);
            debouncer.push(ChangeEvent {
                document_id,
                tenant_id,
                doc_type: Some(doc_type),
                kind: ChangeKind::Upsert,
                revision: *revision,
            });
        }
    }
}
