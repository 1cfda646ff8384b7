//! Abstract transport for the unreliable keyed pub/sub channel
//!
//! The protocol only needs three capabilities from the platform channel:
//! publish a keyed blob, observe inbound keyed blobs, and list currently
//! reachable peers. Platform adapters (Wear OS Data Layer and the like) live
//! outside this crate; [`MemoryTransport`] provides an in-process pair for
//! tests and the loopback demo.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Identifier of a reachable counterpart device
pub type PeerId = String;

/// Transport-level failures
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The channel rejected or failed the publish
    #[error("publish of {key} failed: {reason}")]
    PublishFailed { key: String, reason: String },
}

/// One observed keyed blob
#[derive(Debug, Clone)]
pub struct TransportEvent {
    pub key: String,
    pub blob: Vec<u8>,
}

/// The capability surface the sync protocol requires of a channel.
///
/// Delivery is at-least-once at best: messages may be lost, duplicated, or
/// reordered, and the protocol above is built to tolerate all three.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a keyed blob toward the peer
    async fn publish(&self, key: &str, blob: Vec<u8>) -> Result<(), TransportError>;

    /// Observe inbound keyed blobs. May be called again after a previous
    /// subscription is dropped (component re-attach).
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent>;

    /// Currently reachable peers; implementations bound the lookup time
    /// themselves and return empty on failure
    async fn reachable_peers(&self) -> Vec<PeerId>;
}

#[derive(Default)]
struct Inbox {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
}

impl Inbox {
    fn deliver(&self, event: &TransportEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn attach(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}

/// In-process transport: two linked endpoints over unbounded channels.
///
/// Models the channel's unreliability explicitly: while the link is down the
/// peer is not listed as reachable and published blobs are dropped on the
/// floor, and publishes can be forced to fail to exercise the retry path.
pub struct MemoryTransport {
    peer: PeerId,
    link_up: Arc<AtomicBool>,
    fail_publishes: AtomicBool,
    inbox: Arc<Inbox>,
    peer_inbox: Arc<Inbox>,
}

impl MemoryTransport {
    /// Create a connected pair of endpoints
    #[must_use]
    pub fn pair(a: impl Into<PeerId>, b: impl Into<PeerId>) -> (Self, Self) {
        let (a, b) = (a.into(), b.into());
        let link_up = Arc::new(AtomicBool::new(true));
        let inbox_a = Arc::new(Inbox::default());
        let inbox_b = Arc::new(Inbox::default());
        (
            Self {
                peer: b,
                link_up: Arc::clone(&link_up),
                fail_publishes: AtomicBool::new(false),
                inbox: Arc::clone(&inbox_a),
                peer_inbox: Arc::clone(&inbox_b),
            },
            Self {
                peer: a,
                link_up,
                fail_publishes: AtomicBool::new(false),
                inbox: inbox_b,
                peer_inbox: inbox_a,
            },
        )
    }

    /// Bring the shared link up or down (affects both endpoints)
    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
    }

    /// Force subsequent publishes from this endpoint to fail
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, key: &str, blob: Vec<u8>) -> Result<(), TransportError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::PublishFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if self.link_up.load(Ordering::SeqCst) {
            self.peer_inbox.deliver(&TransportEvent {
                key: key.to_string(),
                blob,
            });
        }
        // A blob published into a down link is silently lost, like any
        // message the channel drops in flight
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.inbox.attach()
    }

    async fn reachable_peers(&self) -> Vec<PeerId> {
        if self.link_up.load(Ordering::SeqCst) {
            vec![self.peer.clone()]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_in_both_directions() {
        let (watch, phone) = MemoryTransport::pair("watch", "phone");
        let mut phone_events = phone.subscribe();
        let mut watch_events = watch.subscribe();

        watch.publish("/a", b"ping".to_vec()).await.unwrap();
        phone.publish("/b", b"pong".to_vec()).await.unwrap();

        assert_eq!(phone_events.recv().await.unwrap().key, "/a");
        assert_eq!(watch_events.recv().await.unwrap().blob, b"pong");
    }

    #[tokio::test]
    async fn down_link_hides_the_peer_and_drops_blobs() {
        let (watch, phone) = MemoryTransport::pair("watch", "phone");
        let mut phone_events = phone.subscribe();

        watch.set_link_up(false);
        assert!(watch.reachable_peers().await.is_empty());
        assert!(phone.reachable_peers().await.is_empty());

        // Lost, not errored
        watch.publish("/a", b"ping".to_vec()).await.unwrap();

        watch.set_link_up(true);
        watch.publish("/b", b"ping".to_vec()).await.unwrap();
        assert_eq!(phone_events.recv().await.unwrap().key, "/b");
    }

    #[tokio::test]
    async fn injected_publish_failure_surfaces_as_error() {
        let (watch, _phone) = MemoryTransport::pair("watch", "phone");
        watch.set_fail_publishes(true);
        let err = watch.publish("/a", Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("/a"));
    }
}
