//! Orchestrates the watcher, debouncer, and embedding worker pool into one
//! runnable unit (spec §4.5), and tracks the status the health endpoint
//! reports.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use modkit::MetricsRegistry;
use modkit_db::{Database, Document};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::debouncer::Debouncer;
use super::embedder::EmbedderClient;
use super::model::{VectorRecord, VectorRepository, semantic_hash};
use super::pipeline_state::PipelineStateRepository;
use super::status::PipelineStatus;
use super::watcher::{ChangeEvent, ChangeKind, Watcher};

const DOCUMENTS_COLLECTION: &str = "documents";
const TEXT_FIELDS: &[&str] = &["name", "description", "notes", "title"];
const MAX_PROJECTION_LEN: usize = 4000;
const MAX_EMBED_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

pub struct PipelineConfig {
    pub monitored_types: Vec<String>,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

pub struct VectorPipeline {
    db: Arc<Database>,
    vectors: Arc<VectorRepository>,
    state: Arc<PipelineStateRepository>,
    embedder: Arc<EmbedderClient>,
    metrics: Arc<MetricsRegistry>,
    config: PipelineConfig,
    status: ArcSwap<PipelineStatus>,
    tasks: Mutex<Option<JoinSet<()>>>,
}

impl VectorPipeline {
    #[must_use]
    pub fn new(db: Arc<Database>, embedder: EmbedderClient, metrics: Arc<MetricsRegistry>, config: PipelineConfig) -> Self {
        let vectors = Arc::new(VectorRepository::new(db.inner()));
        let state = Arc::new(PipelineStateRepository::new(db.inner()));
        Self {
            db,
            vectors,
            state,
            embedder: Arc::new(embedder),
            metrics,
            config,
            status: ArcSwap::from_pointee(PipelineStatus::Disabled),
            tasks: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        **self.status.load()
    }

    /// Spawns the watcher and the worker pool. Idempotent: a second call
    /// while already running is a no-op.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        if self.tasks.lock().is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel::<ChangeEvent>(self.config.queue_capacity);
        let debouncer = Arc::new(Debouncer::new(tx));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut join_set = JoinSet::new();

        let watcher = Watcher::new(Arc::clone(&self.db), Arc::clone(&self.state), self.config.monitored_types.clone());
        let watcher_cancel = cancel.clone();
        let watcher_debouncer = Arc::clone(&debouncer);
        let this = Arc::clone(self);
        join_set.spawn(async move {
            watcher.run(&watcher_debouncer, &watcher_cancel).await;
            this.status.store(Arc::new(PipelineStatus::Failed));
        });

        for worker_id in 0..self.config.worker_count.max(1) {
            let rx = Arc::clone(&rx);
            let this = Arc::clone(self);
            let worker_cancel = cancel.clone();
            join_set.spawn(async move {
                this.run_worker(worker_id, rx, worker_cancel).await;
            });
        }

        self.status.store(Arc::new(PipelineStatus::Running));
        tracing::info!(worker_count = self.config.worker_count, "vector pipeline enabled/running");
        *self.tasks.lock() = Some(join_set);
    }

    /// Waits for all spawned tasks to finish (they observe `cancel`
    /// themselves; this just blocks until they're done).
    pub async fn stop(&self) {
        let join_set = self.tasks.lock().take();
        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }
    }

    async fn run_worker(&self, worker_id: usize, rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ChangeEvent>>>, cancel: CancellationToken) {
        loop {
            let event = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    () = cancel.cancelled() => return,
                    event = rx.recv() => event,
                }
            };
            let Some(event) = event else { return };

            self.metrics.incr_gauge("vector_pipeline_in_flight_jobs");
            let queue_depth = i64::try_from(rx.lock().await.len()).unwrap_or(0);
            self.metrics.set_gauge("vector_pipeline_queue_depth", queue_depth);
            if let Err(e) = self.process_event(&event).await {
                tracing::warn!(worker_id, document_id = %event.document_id, error = %e, "vector pipeline job failed permanently");
                self.metrics.incr_counter("vector_pipeline_errors_total");
            }
            self.metrics.decr_gauge("vector_pipeline_in_flight_jobs");
            #[allow(clippy::cast_possible_truncation)]
            self.metrics.set_gauge("vector_pipeline_last_activity_unix_seconds", chrono::Utc::now().timestamp());
        }
    }

    async fn process_event(&self, event: &ChangeEvent) -> Result<(), modkit_errors::ApiError> {
        if event.kind == ChangeKind::Delete {
            return self.vectors.delete_by_document_id(&event.document_id).await;
        }

        let collection: mongodb::Collection<bson::Document> = self.db.collection(DOCUMENTS_COLLECTION);
        let Some(raw) = collection.find_one(bson::doc! { "_id": &event.document_id }).await.map_err(|e| modkit_errors::ApiError::database(format!("mongo error: {e}")))? else {
            // Document vanished between the change event and this job running;
            // nothing left to embed.
            return Ok(());
        };
        let document = Document::from_bson(raw)?;
        let projection = document.semantic_projection(TEXT_FIELDS, MAX_PROJECTION_LEN);
        let hash = semantic_hash(&projection);

        if let Some(existing) = self.vectors.find_by_document_id(&event.document_id).await? {
            if existing.semantic_hash == hash && existing.last_error.is_none() {
                return Ok(());
            }
        }

        match self.embed_with_retry(&projection).await {
            Ok(embedding) => {
                self.metrics.incr_counter("vector_pipeline_embeddings_generated_total");
                let record = VectorRecord {
                    document_id: event.document_id.clone(),
                    tenant_id: document.tenant_id.clone(),
                    doc_type: document.doc_type.clone(),
                    embedding,
                    semantic_hash: hash,
                    updated_at: chrono::Utc::now(),
                    last_error: None,
                };
                self.vectors.upsert(&record).await
            }
            Err(e) => {
                // A permanent failure is recorded on the record rather than
                // propagated, so one bad document never stalls the pool.
                let record = VectorRecord {
                    document_id: event.document_id.clone(),
                    tenant_id: document.tenant_id.clone(),
                    doc_type: document.doc_type.clone(),
                    embedding: Vec::new(),
                    semantic_hash: hash,
                    updated_at: chrono::Utc::now(),
                    last_error: Some(e.to_string()),
                };
                self.vectors.upsert(&record).await?;
                Err(e)
            }
        }
    }

    async fn embed_with_retry(&self, projection: &str) -> Result<Vec<f32>, modkit_errors::ApiError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;
        for attempt in 1..=MAX_EMBED_ATTEMPTS {
            match self.embedder.embed(projection).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "embedding call failed, retrying");
                    last_err = Some(e);
                    if attempt < MAX_EMBED_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| modkit_errors::ApiError::external("embedding failed with no recorded error")))
    }
}
