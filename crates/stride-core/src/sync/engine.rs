//! Engine: ties the coordinator and the inbound handlers to running tasks

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::db::SampleStore;
use crate::error::Result;
use crate::models::TIMESTAMP_FORMAT;
use crate::sync::acks::AckHandler;
use crate::sync::message::{classify_key, MessageKind};
use crate::sync::receiver::Receiver;
use crate::sync::sender::SenderCoordinator;
use crate::sync::transport::Transport;

/// Running synchronization subsystem.
///
/// Holds the periodic tick task and the inbound dispatch task; dropping the
/// handle without calling [`SyncHandle::shutdown`] detaches the tasks.
pub struct SyncHandle {
    shutdown_tx: watch::Sender<bool>,
    tick_task: JoinHandle<()>,
    inbound_task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop ticking and detach from the transport.
    ///
    /// Durable state is untouched: unconfirmed batches and pending samples
    /// stay in the store and a later engine picks them up where this one
    /// left off. Transport events arriving after shutdown go nowhere.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.tick_task.await;
        let _ = self.inbound_task.await;
        info!("sync engine stopped");
    }
}

/// Starts the synchronization subsystem over a store and a transport.
pub struct SyncEngine;

impl SyncEngine {
    /// Spawn the tick and inbound-dispatch tasks.
    pub fn start(
        store: Arc<dyn SampleStore>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Result<SyncHandle> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let events = transport.subscribe();

        let sender = SenderCoordinator::new(Arc::clone(&store), Arc::clone(&transport), config.clone());
        let tick_task = tokio::spawn(Self::tick_loop(
            sender,
            Arc::clone(&store),
            config.clone(),
            shutdown_rx.clone(),
        ));

        let receiver = Receiver::new(Arc::clone(&store), Arc::clone(&transport));
        let acks = AckHandler::new(store);
        let inbound_task = tokio::spawn(Self::inbound_loop(receiver, acks, events, shutdown_rx));

        info!("sync engine started");
        Ok(SyncHandle {
            shutdown_tx,
            tick_task,
            inbound_task,
        })
    }

    async fn tick_loop(
        sender: SenderCoordinator,
        store: Arc<dyn SampleStore>,
        config: SyncConfig,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(config.tick_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_sweep = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = sender.tick().await {
                        error!(%error, "sync tick failed");
                    }
                    if last_sweep.elapsed() >= config.retention_sweep {
                        last_sweep = tokio::time::Instant::now();
                        match run_retention_sweep(store.as_ref(), &config) {
                            Ok((samples, batches)) => {
                                debug!(samples, batches, "retention sweep done");
                            }
                            Err(error) => error!(%error, "retention sweep failed"),
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn inbound_loop(
        receiver: Receiver,
        acks: AckHandler,
        mut events: tokio::sync::mpsc::UnboundedReceiver<crate::sync::TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match classify_key(&event.key) {
                        Some(MessageKind::BatchData(batch_id)) => {
                            if let Err(error) = receiver.handle_batch(batch_id, &event.blob).await {
                                error!(batch_id, %error, "failed to apply inbound batch");
                            }
                        }
                        Some(MessageKind::Ack(batch_id)) => {
                            if let Err(error) = acks.handle_ack(batch_id, &event.blob) {
                                error!(batch_id, %error, "failed to process ack");
                            }
                        }
                        None => debug!(key = %event.key, "ignoring unrelated transport event"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

/// Delete synced samples and confirmed batches older than the retention age.
///
/// Unsynced and pending rows are kept regardless of age; only data the peer
/// has confirmed is eligible.
pub fn run_retention_sweep(
    store: &dyn SampleStore,
    config: &SyncConfig,
) -> Result<(usize, usize)> {
    let age = chrono::Duration::from_std(config.retention_age)
        .map_err(|_| crate::Error::InvalidInput("retention age out of range".into()))?;

    let sample_cutoff = (chrono::Local::now() - age).format(TIMESTAMP_FORMAT).to_string();
    let batch_cutoff_ms = (chrono::Utc::now() - age).timestamp_millis();

    let samples = store.purge_samples_older_than(&sample_cutoff, true)?;
    let batches = store.purge_confirmed_batches_older_than(batch_cutoff_ms)?;
    Ok((samples, batches))
}
