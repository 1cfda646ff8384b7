//! Outbox batcher: turns the unsynced backlog into bounded, durable batches

use std::sync::Arc;

use crate::db::SampleStore;
use crate::error::Result;
use crate::models::{Batch, BatchEntry};

/// Partitions the unsynced backlog into transmissible batches.
///
/// Chunks preserve timestamp order within and across batches, so a confirmed
/// prefix of batches is always a time-contiguous prefix of the backlog. Each
/// batch row is persisted before any network call so a crash between
/// "decided to send" and "actually sent" still leaves a retriable record.
pub struct OutboxBatcher {
    store: Arc<dyn SampleStore>,
    max_batch_size: usize,
}

impl OutboxBatcher {
    pub fn new(store: Arc<dyn SampleStore>, max_batch_size: usize) -> Self {
        Self {
            store,
            max_batch_size,
        }
    }

    /// Drain the current backlog into zero or more unconfirmed batches.
    ///
    /// The chunk's samples move to `PendingAck`, tagged with the owning
    /// batch, so a later tick won't re-batch them.
    pub fn create_batches(&self) -> Result<Vec<Batch>> {
        let backlog = self.store.select_unsynced()?;
        if backlog.is_empty() {
            return Ok(Vec::new());
        }

        let mut created = Vec::with_capacity(backlog.len().div_ceil(self.max_batch_size));
        for chunk in backlog.chunks(self.max_batch_size) {
            let entries: Vec<BatchEntry> = chunk.iter().map(BatchEntry::from_sample).collect();
            let payload = serde_json::to_string(&entries)?;

            let batch = self.store.insert_batch(&payload)?;
            let ids: Vec<i64> = chunk.iter().map(|sample| sample.id).collect();
            self.store.mark_pending(&ids, batch.id)?;

            tracing::debug!(batch_id = batch.id, samples = ids.len(), "batch created");
            created.push(batch);
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteSampleStore};
    use crate::models::{NewSample, SyncState};
    use pretty_assertions::assert_eq;

    fn store_with_backlog(n: usize) -> Arc<dyn SampleStore> {
        let store = SqliteSampleStore::new(Database::open_in_memory().unwrap());
        for i in 0..n {
            let ts = format!("2025-03-01 {:02}:{:02}:{:02}", i / 3600, (i / 60) % 60, i % 60);
            store
                .upsert(&NewSample::new(ts, Some(1), None).unwrap())
                .unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn backlog_splits_into_bounded_ordered_chunks() {
        let store = store_with_backlog(650);
        let batcher = OutboxBatcher::new(Arc::clone(&store), 300);

        let batches = batcher.create_batches().unwrap();
        let sizes: Vec<usize> = batches
            .iter()
            .map(|b| b.entries().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![300, 300, 50]);

        // Chunk i holds strictly earlier-or-equal timestamps than chunk i+1
        let mut all_dates = Vec::new();
        for batch in &batches {
            all_dates.extend(batch.entries().unwrap().into_iter().map(|e| e.date));
        }
        let mut sorted = all_dates.clone();
        sorted.sort();
        assert_eq!(all_dates, sorted);
        assert_eq!(all_dates.len(), 650);
    }

    #[test]
    fn batched_samples_leave_the_backlog() {
        let store = store_with_backlog(5);
        let batcher = OutboxBatcher::new(Arc::clone(&store), 300);

        let batches = batcher.create_batches().unwrap();
        assert_eq!(batches.len(), 1);
        assert!(store.select_unsynced().unwrap().is_empty());
        assert_eq!(store.state_counts().unwrap().pending_ack, 5);

        // Entries carry the local ids needed for precise ack correlation
        for entry in batches[0].entries().unwrap() {
            assert!(entry.entry_id.is_some());
        }
    }

    #[test]
    fn empty_backlog_creates_nothing() {
        let store = store_with_backlog(0);
        let batcher = OutboxBatcher::new(Arc::clone(&store), 300);
        assert!(batcher.create_batches().unwrap().is_empty());
        assert!(store.unconfirmed_batches().unwrap().is_empty());
    }

    #[test]
    fn pending_samples_keep_their_batch_tag() {
        let store = store_with_backlog(2);
        let batcher = OutboxBatcher::new(Arc::clone(&store), 300);
        let batch = &batcher.create_batches().unwrap()[0];

        for sample in store.list_recent(10).unwrap() {
            assert_eq!(sample.sync_state, SyncState::PendingAck);
            assert_eq!(sample.batch_id, Some(batch.id));
        }
    }
}
