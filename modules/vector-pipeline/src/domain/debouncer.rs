//! Coalesces rapid-fire change events for the same document into a single
//! job, preserving only the latest state (spec §4.5 "Coalescing preserves
//! the latest state only").

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::sleep;

use super::watcher::ChangeEvent;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

pub struct Debouncer {
    pending: Arc<DashMap<String, ChangeEvent>>,
    scheduled: Arc<DashMap<String, ()>>,
    jobs: mpsc::Sender<ChangeEvent>,
}

impl Debouncer {
    #[must_use]
    pub fn new(jobs: mpsc::Sender<ChangeEvent>) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            scheduled: Arc::new(DashMap::new()),
            jobs,
        }
    }

    /// Records `event` as the latest state for its document. If a debounce
    /// window is already counting down for that document, this just updates
    /// the pending state; otherwise it starts one.
    pub fn push(&self, event: ChangeEvent) {
        let document_id = event.document_id.clone();
        self.pending.insert(document_id.clone(), event);

        if self.scheduled.insert(document_id.clone(), ()).is_some() {
            return;
        }

        let pending = Arc::clone(&self.pending);
        let scheduled = Arc::clone(&self.scheduled);
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            sleep(DEBOUNCE_WINDOW).await;
            scheduled.remove(&document_id);
            if let Some((_, latest)) = pending.remove(&document_id) {
                if jobs.send(latest).await.is_err() {
                    tracing::warn!(document_id = %document_id, "vector pipeline job queue closed, dropping coalesced event");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::watcher::ChangeKind;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn three_rapid_updates_coalesce_into_one_job() {
        let (tx, mut rx) = mpsc::channel(8);
        let debouncer = Debouncer::new(tx);

        for i in 0..3 {
            debouncer.push(ChangeEvent {
                document_id: "doc-1".to_owned(),
                tenant_id: Some("tenant-1".to_owned()),
                doc_type: Some("asset".to_owned()),
                kind: ChangeKind::Upsert,
                revision: i,
            });
        }

        tokio::time::advance(DEBOUNCE_WINDOW + Duration::from_millis(50)).await;
        let job = rx.recv().await.expect("one coalesced job");
        assert_eq!(job.revision, 2);
        assert!(rx.try_recv().is_err(), "only one job should be emitted");
    }
}
