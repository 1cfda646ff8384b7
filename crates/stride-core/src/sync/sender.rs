//! Sender coordinator: decides, once per tick, what (if anything) to transmit

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::SyncConfig;
use crate::db::SampleStore;
use crate::error::Result;
use crate::models::Batch;
use crate::sync::message::batch_key;
use crate::sync::outbox::OutboxBatcher;
use crate::sync::transport::Transport;

/// What a synchronization tick decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No reachable peer; nothing was created or sent
    Offline,
    /// An earlier unconfirmed batch was republished verbatim
    Resent(i64),
    /// Still inside the cooldown window since the last transmission
    CooldownActive,
    /// This many newly created batches were transmitted
    Sent(usize),
    /// Peer reachable, nothing to send
    Idle,
}

/// Transient per-process send state; durable state lives in the store
struct SendState {
    last_send: Option<Instant>,
}

/// Drives the outbound half of the protocol.
///
/// The whole four-gate decision sequence runs under one mutex so concurrent
/// ticks cannot race on the cooldown or the outstanding-batch check.
pub struct SenderCoordinator {
    store: Arc<dyn SampleStore>,
    transport: Arc<dyn Transport>,
    batcher: OutboxBatcher,
    config: SyncConfig,
    state: Mutex<SendState>,
}

impl SenderCoordinator {
    pub fn new(
        store: Arc<dyn SampleStore>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Self {
        let batcher = OutboxBatcher::new(Arc::clone(&store), config.max_batch_size);
        Self {
            store,
            transport,
            batcher,
            config,
            state: Mutex::new(SendState { last_send: None }),
        }
    }

    /// One synchronization tick.
    ///
    /// Gates, in order: peer reachability, oldest outstanding batch,
    /// cooldown, new-batch creation. A resend bypasses the cooldown (the
    /// tick period bounds its rate) and any transmission resets the
    /// cooldown clock.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let mut state = self.state.lock().await;

        let peers = self.lookup_peers().await;
        if peers.is_empty() {
            debug!("no reachable peer, skipping sync tick");
            return Ok(TickOutcome::Offline);
        }

        let unconfirmed = self.store.unconfirmed_batches()?;
        if let Some(oldest) = unconfirmed.first() {
            debug!(
                batch_id = oldest.id,
                outstanding = unconfirmed.len(),
                "resending oldest unconfirmed batch; later batches wait for its ack"
            );
            self.publish_batch(oldest).await;
            state.last_send = Some(Instant::now());
            return Ok(TickOutcome::Resent(oldest.id));
        }

        if let Some(last_send) = state.last_send {
            let elapsed = last_send.elapsed();
            if elapsed < self.config.send_cooldown {
                debug!(?elapsed, "inside send cooldown, skipping");
                return Ok(TickOutcome::CooldownActive);
            }
        }

        let batches = self.batcher.create_batches()?;
        if batches.is_empty() {
            debug!("no unsynced samples to send");
            state.last_send = Some(Instant::now());
            return Ok(TickOutcome::Idle);
        }

        for batch in &batches {
            self.publish_batch(batch).await;
        }
        state.last_send = Some(Instant::now());
        Ok(TickOutcome::Sent(batches.len()))
    }

    /// Bounded-time reachability lookup, empty on timeout
    async fn lookup_peers(&self) -> Vec<String> {
        match tokio::time::timeout(
            self.config.peer_lookup_timeout,
            self.transport.reachable_peers(),
        )
        .await
        {
            Ok(peers) => peers,
            Err(_) => {
                debug!("peer lookup timed out");
                Vec::new()
            }
        }
    }

    /// Publish a batch; a failure only gets logged. The batch stays
    /// unconfirmed in the store and the outstanding gate retries it on a
    /// later tick.
    async fn publish_batch(&self, batch: &Batch) {
        let key = batch_key(batch.id);
        match self
            .transport
            .publish(&key, batch.payload_json.clone().into_bytes())
            .await
        {
            Ok(()) => debug!(batch_id = batch.id, "batch published"),
            Err(error) => error!(batch_id = batch.id, %error, "failed to publish batch"),
        }
    }
}
