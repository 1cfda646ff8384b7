//! Acknowledgment handler: correlates inbound acks to batches and samples

use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::SampleStore;
use crate::error::Result;
use crate::sync::message::Ack;

/// Marks batches confirmed and their samples synced when the peer
/// acknowledges them.
pub struct AckHandler {
    store: Arc<dyn SampleStore>,
}

impl AckHandler {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }

    /// Handle one observed ack blob for the batch id carried in the key.
    ///
    /// Unknown batch ids are ignored: they legitimately occur after a
    /// retention purge or a reinstall, and re-processing a confirmed batch's
    /// ack is a no-op beyond re-confirming it.
    pub fn handle_ack(&self, batch_id: i64, blob: &[u8]) -> Result<()> {
        let ack = match Ack::decode(blob) {
            Ok(ack) => ack,
            Err(cause) => {
                // The key alone identifies the batch; treat the blob as a
                // legacy whole-batch confirmation
                warn!(batch_id, %cause, "undecodable ack blob, confirming by key only");
                Ack {
                    batch_id,
                    confirmed_ids: Vec::new(),
                }
            }
        };
        if ack.batch_id != batch_id {
            warn!(batch_id, blob_batch_id = ack.batch_id, "ack key and blob disagree, using key");
        }

        let Some(batch) = self.store.get_batch(batch_id)? else {
            debug!(batch_id, "ack for unknown batch, ignoring");
            return Ok(());
        };

        self.store.mark_batch_confirmed(batch_id)?;

        let ids = if ack.confirmed_ids.is_empty() {
            self.ids_from_payload(&batch.payload_json, batch_id)?
        } else {
            ack.confirmed_ids
        };
        let updated = self.store.mark_synced(&ids)?;
        debug!(batch_id, updated, "batch confirmed, samples marked synced");
        Ok(())
    }

    /// Legacy fallback for acks that confirm a whole batch without naming
    /// samples: resolve each payload entry's de-duplication key to a local
    /// row. Ambiguity is confined to legacy peers; id-carrying acks never
    /// take this path.
    fn ids_from_payload(&self, payload_json: &str, batch_id: i64) -> Result<Vec<i64>> {
        debug!(batch_id, "ack named no samples, matching by de-duplication key");
        let entries: Vec<crate::models::BatchEntry> = serde_json::from_str(payload_json)?;
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(sample) = self.store.get_by_key(&entry.key())? {
                ids.push(sample.id);
            }
        }
        Ok(ids)
    }
}
