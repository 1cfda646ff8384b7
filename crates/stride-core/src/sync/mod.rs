//! Bidirectional batch synchronization protocol
//!
//! Two intermittently connected devices each keep a durable sample log and
//! converge on a shared, duplicate-free view of it over an unreliable keyed
//! pub/sub channel. Delivery is at-least-once with idempotent application:
//! batches may be lost, duplicated, or reordered, and correctness never
//! depends on arrival order.
//!
//! Outbound direction: [`OutboxBatcher`] turns the unsynced backlog into
//! bounded durable batches, [`SenderCoordinator`] decides per tick whether
//! to transmit a new batch or retry an outstanding one. Inbound direction:
//! [`Receiver`] idempotently merges peer batches and confirms them,
//! [`AckHandler`] correlates confirmations back to local batches and
//! samples. [`SyncEngine`] runs both directions as tasks.

mod acks;
mod engine;
pub mod message;
mod outbox;
mod receiver;
mod sender;
mod transport;

pub use acks::AckHandler;
pub use engine::{run_retention_sweep, SyncEngine, SyncHandle};
pub use message::{ack_key, batch_key, classify_key, Ack, MessageKind};
pub use outbox::OutboxBatcher;
pub use receiver::Receiver;
pub use sender::{SenderCoordinator, TickOutcome};
pub use transport::{MemoryTransport, PeerId, Transport, TransportError, TransportEvent};
