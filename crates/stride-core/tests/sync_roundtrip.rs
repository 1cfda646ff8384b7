//! Two-device round-trip tests: a watch-side store syncing into a
//! phone-side store over a linked in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use stride_core::db::{Database, SampleStore, SqliteSampleStore};
use stride_core::models::NewSample;
use stride_core::sync::{
    classify_key, AckHandler, MemoryTransport, MessageKind, Receiver, SenderCoordinator,
    SyncEngine, TickOutcome, Transport, TransportEvent,
};
use stride_core::SyncConfig;

use tokio::sync::mpsc::UnboundedReceiver;

struct Device {
    store: Arc<dyn SampleStore>,
    transport: Arc<MemoryTransport>,
    events: UnboundedReceiver<TransportEvent>,
    sender: SenderCoordinator,
    receiver: Receiver,
    acks: AckHandler,
}

fn device(transport: MemoryTransport, config: &SyncConfig) -> Device {
    let store: Arc<dyn SampleStore> =
        Arc::new(SqliteSampleStore::new(Database::open_in_memory().unwrap()));
    let transport = Arc::new(transport);
    let events = transport.subscribe();
    let as_dyn: Arc<dyn Transport> = Arc::clone(&transport) as Arc<dyn Transport>;
    Device {
        sender: SenderCoordinator::new(Arc::clone(&store), Arc::clone(&as_dyn), config.clone()),
        receiver: Receiver::new(Arc::clone(&store), as_dyn),
        acks: AckHandler::new(Arc::clone(&store)),
        store,
        transport,
        events,
    }
}

fn linked_pair(config: &SyncConfig) -> (Device, Device) {
    let (watch_end, phone_end) = MemoryTransport::pair("watch", "phone");
    (device(watch_end, config), device(phone_end, config))
}

fn record(store: &Arc<dyn SampleStore>, start: usize, n: usize) {
    for i in start..start + n {
        let ts = format!(
            "2025-03-01 {:02}:{:02}:{:02}",
            8 + i / 3600,
            (i / 60) % 60,
            i % 60
        );
        store
            .upsert(&NewSample::new(ts, Some(1), Some(70.0 + (i % 30) as f64)).unwrap())
            .unwrap();
    }
}

/// Deliver every queued inbound event on a device. Publishing is synchronous
/// in the memory transport, so draining with `try_recv` is deterministic.
async fn pump(device: &mut Device) {
    while let Ok(event) = device.events.try_recv() {
        match classify_key(&event.key) {
            Some(MessageKind::BatchData(batch_id)) => {
                device
                    .receiver
                    .handle_batch(batch_id, &event.blob)
                    .await
                    .unwrap();
            }
            Some(MessageKind::Ack(batch_id)) => {
                device.acks.handle_ack(batch_id, &event.blob).unwrap();
            }
            None => {}
        }
    }
}

#[tokio::test(start_paused = true)]
async fn large_backlog_converges_and_settles_idle() {
    let config = SyncConfig::default();
    let (mut watch, mut phone) = linked_pair(&config);
    record(&watch.store, 0, 650);

    assert_eq!(watch.sender.tick().await.unwrap(), TickOutcome::Sent(3));
    pump(&mut phone).await; // apply 3 batches, emit 3 acks
    pump(&mut watch).await; // process the acks

    assert!(watch.store.unconfirmed_batches().unwrap().is_empty());
    assert_eq!(watch.store.state_counts().unwrap().synced, 650);
    assert_eq!(phone.store.list_recent(1000).unwrap().len(), 650);

    tokio::time::advance(Duration::from_secs(11)).await;
    assert_eq!(watch.sender.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test(start_paused = true)]
async fn lost_batch_is_retried_and_new_data_follows() {
    let config = SyncConfig::default();
    let (mut watch, mut phone) = linked_pair(&config);
    record(&watch.store, 0, 3);

    // First transmission succeeds locally but the link eats it
    watch.transport.set_fail_publishes(true);
    assert_eq!(watch.sender.tick().await.unwrap(), TickOutcome::Sent(1));
    watch.transport.set_fail_publishes(false);
    pump(&mut phone).await;
    assert!(phone.store.list_recent(10).unwrap().is_empty());

    // New samples arrive meanwhile; the outstanding batch still goes first,
    // unchanged
    record(&watch.store, 3, 5);
    let outstanding = watch.store.unconfirmed_batches().unwrap()[0].id;
    assert_eq!(
        watch.sender.tick().await.unwrap(),
        TickOutcome::Resent(outstanding)
    );
    pump(&mut phone).await;
    pump(&mut watch).await;

    assert_eq!(phone.store.list_recent(10).unwrap().len(), 3);
    assert_eq!(watch.store.state_counts().unwrap().synced, 3);

    // Once confirmed, the next tick (past cooldown) batches the remainder
    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(matches!(
        watch.sender.tick().await.unwrap(),
        TickOutcome::Sent(1)
    ));
    pump(&mut phone).await;
    pump(&mut watch).await;

    assert_eq!(phone.store.list_recent(10).unwrap().len(), 8);
    assert_eq!(watch.store.state_counts().unwrap().synced, 8);
}

#[tokio::test(start_paused = true)]
async fn duplicate_delivery_leaves_a_single_copy() {
    let config = SyncConfig::default();
    let (mut watch, mut phone) = linked_pair(&config);
    record(&watch.store, 0, 3);

    assert_eq!(watch.sender.tick().await.unwrap(), TickOutcome::Sent(1));
    let batch_id = watch.store.unconfirmed_batches().unwrap()[0].id;
    pump(&mut phone).await;

    // Network retransmission: the same batch arrives again
    assert_eq!(
        watch.sender.tick().await.unwrap(),
        TickOutcome::Resent(batch_id)
    );
    pump(&mut phone).await;

    assert_eq!(phone.store.list_recent(10).unwrap().len(), 3);

    // Both acks name the same set; the replay is a no-op
    pump(&mut watch).await;
    assert_eq!(watch.store.state_counts().unwrap().synced, 3);
    assert!(watch.store.unconfirmed_batches().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sync_flows_in_both_directions_at_once() {
    let config = SyncConfig::default();
    let (mut watch, mut phone) = linked_pair(&config);
    record(&watch.store, 0, 4);
    // The phone has its own local observations to push back
    phone
        .store
        .upsert(&NewSample::new("2025-03-01 07:00:00", Some(200), None).unwrap())
        .unwrap();

    assert_eq!(watch.sender.tick().await.unwrap(), TickOutcome::Sent(1));
    assert_eq!(phone.sender.tick().await.unwrap(), TickOutcome::Sent(1));
    pump(&mut phone).await;
    pump(&mut watch).await;
    pump(&mut phone).await;

    assert_eq!(watch.store.state_counts().unwrap().synced, 5);
    assert_eq!(phone.store.state_counts().unwrap().synced, 5);
    // Each side now has all 5 observations
    assert_eq!(watch.store.list_recent(10).unwrap().len(), 5);
    assert_eq!(phone.store.list_recent(10).unwrap().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn engines_converge_end_to_end() {
    let config = SyncConfig::default()
        .with_tick_period(Duration::from_millis(50))
        .with_send_cooldown(Duration::from_millis(50));

    let (watch_end, phone_end) = MemoryTransport::pair("watch", "phone");
    let watch_store: Arc<dyn SampleStore> =
        Arc::new(SqliteSampleStore::new(Database::open_in_memory().unwrap()));
    let phone_store: Arc<dyn SampleStore> =
        Arc::new(SqliteSampleStore::new(Database::open_in_memory().unwrap()));
    record(&watch_store, 0, 700);

    let watch_engine = SyncEngine::start(
        Arc::clone(&watch_store),
        Arc::new(watch_end),
        config.clone(),
    )
    .unwrap();
    let phone_engine =
        SyncEngine::start(Arc::clone(&phone_store), Arc::new(phone_end), config).unwrap();

    // Paused-time runtime auto-advances through the tick intervals
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if watch_store.state_counts().unwrap().synced == 700 {
            break;
        }
    }

    assert_eq!(watch_store.state_counts().unwrap().synced, 700);
    assert_eq!(phone_store.list_recent(1000).unwrap().len(), 700);
    assert!(watch_store.unconfirmed_batches().unwrap().is_empty());

    watch_engine.shutdown().await;
    phone_engine.shutdown().await;
}
