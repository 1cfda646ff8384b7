//! Receiver/applier: idempotent merge of inbound batches, ack emission

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::db::SampleStore;
use crate::error::Result;
use crate::sync::message::{ack_key, decode_payload, Ack};
use crate::sync::transport::Transport;

/// Applies inbound batch data and confirms it back to the sender.
///
/// Apply is idempotent: a redelivered batch upserts the same samples into
/// the same rows and re-emits an ack naming the same set, so retransmission
/// is always safe.
pub struct Receiver {
    store: Arc<dyn SampleStore>,
    transport: Arc<dyn Transport>,
}

impl Receiver {
    pub fn new(store: Arc<dyn SampleStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Handle one observed batch-data blob.
    ///
    /// A malformed item is skipped without aborting its batch-mates; a blob
    /// with nothing applicable is dropped without an ack, which makes the
    /// sender retry it.
    pub async fn handle_batch(&self, batch_id: i64, blob: &[u8]) -> Result<()> {
        let entries = match decode_payload(blob) {
            Ok(entries) => entries,
            Err(cause) => {
                warn!(batch_id, %cause, "dropping undecodable batch payload");
                return Ok(());
            }
        };

        let mut confirmed_ids = Vec::with_capacity(entries.len());
        let mut local_ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry_id = entry.entry_id;
            let sample = match entry.into_new_sample() {
                Ok(sample) => sample,
                Err(cause) => {
                    warn!(batch_id, %cause, "skipping malformed batch entry");
                    continue;
                }
            };
            // Already-present is the normal redelivery case, not an error
            let outcome = self.store.upsert(&sample)?;
            local_ids.push(outcome.id());
            if let Some(id) = entry_id {
                confirmed_ids.push(id);
            }
        }

        // Applied samples exist on both devices by construction; storing
        // them Synced keeps them out of this device's own outbox
        let applied = local_ids.len();
        self.store.mark_synced(&local_ids)?;

        if applied == 0 {
            warn!(batch_id, "no applicable entry in batch, withholding ack");
            return Ok(());
        }

        debug!(batch_id, applied, "batch applied");
        self.send_ack(batch_id, confirmed_ids).await;
        Ok(())
    }

    /// Confirm the batch back to the sender. A failed or lost ack only means
    /// the sender retransmits; no state here depends on it arriving.
    async fn send_ack(&self, batch_id: i64, confirmed_ids: Vec<i64>) {
        let ack = Ack {
            batch_id,
            confirmed_ids,
        };
        let blob = match ack.encode() {
            Ok(blob) => blob,
            Err(cause) => {
                error!(batch_id, %cause, "failed to encode ack");
                return;
            }
        };
        match self.transport.publish(&ack_key(batch_id), blob).await {
            Ok(()) => debug!(batch_id, "ack published"),
            Err(cause) => error!(batch_id, %cause, "failed to publish ack"),
        }
    }
}
