//! Shared progress state for a running export.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Collection-level completion tracking. The segment producer sets the
/// total, the write consumer advances it; the runner awaits completion.
#[derive(Debug, Default)]
pub struct ExportProgress {
    total_collections: AtomicUsize,
    completed_collections: AtomicUsize,
    rows_written: AtomicU64,
    notify: Notify,
}

impl ExportProgress {
    pub fn new(total_collections: usize) -> Self {
        Self {
            total_collections: AtomicUsize::new(total_collections),
            ..Default::default()
        }
    }

    pub fn mark_collection_done(&self, _collection: &str) {
        self.completed_collections.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn add_rows(&self, count: u64) {
        self.rows_written.fetch_add(count, Ordering::SeqCst);
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::SeqCst)
    }

    pub fn completed_collections(&self) -> usize {
        self.completed_collections.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_collections.load(Ordering::SeqCst)
            >= self.total_collections.load(Ordering::SeqCst)
    }

    /// Resolve once every collection has been marked done.
    pub async fn wait_complete(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_complete() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_when_every_collection_is_done() {
        let progress = Arc::new(ExportProgress::new(2));
        let waiter = progress.clone();
        let handle = tokio::spawn(async move { waiter.wait_complete().await });

        progress.mark_collection_done("a");
        assert!(!progress.is_complete());
        progress.mark_collection_done("b");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait_complete should resolve")
            .unwrap();
    }
}
