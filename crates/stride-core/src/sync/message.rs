//! Wire format: message keys, batch payloads, and acknowledgments
//!
//! The key space separates the two message directions so neither side
//! depends on delivery order: batch data arrives under
//! `/fitness_data_batch_{id}`, confirmations under
//! `/fitness_data_confirmed_{id}`, with the batch id embedded in the key
//! itself for correlation.

use serde::{Deserialize, Serialize};

use crate::models::BatchEntry;

/// Key prefix for batch-data messages
pub const BATCH_KEY_PREFIX: &str = "/fitness_data_batch_";
/// Key prefix for acknowledgment messages
pub const ACK_KEY_PREFIX: &str = "/fitness_data_confirmed_";

/// What an observed transport key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Batch data for the given batch id
    BatchData(i64),
    /// Acknowledgment of the given batch id
    Ack(i64),
}

/// The publish key for a batch-data message
#[must_use]
pub fn batch_key(batch_id: i64) -> String {
    format!("{BATCH_KEY_PREFIX}{batch_id}")
}

/// The publish key for an acknowledgment
#[must_use]
pub fn ack_key(batch_id: i64) -> String {
    format!("{ACK_KEY_PREFIX}{batch_id}")
}

/// Classify an observed key; `None` for keys this protocol doesn't own
#[must_use]
pub fn classify_key(key: &str) -> Option<MessageKind> {
    if let Some(id) = key.strip_prefix(BATCH_KEY_PREFIX) {
        return id.parse().ok().map(MessageKind::BatchData);
    }
    if let Some(id) = key.strip_prefix(ACK_KEY_PREFIX) {
        return id.parse().ok().map(MessageKind::Ack);
    }
    None
}

/// Decode a batch-data blob into its payload entries
pub fn decode_payload(blob: &[u8]) -> crate::Result<Vec<BatchEntry>> {
    Ok(serde_json::from_slice(blob)?)
}

/// An acknowledgment: "these samples are now safely stored here".
///
/// `confirmed_ids` echoes the sender-assigned `entryId`s of every sample
/// present on the receiver after applying the batch. An empty list means the
/// ack came from a legacy peer that only confirms whole batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "batchId")]
    pub batch_id: i64,
    #[serde(rename = "confirmedIds", default)]
    pub confirmed_ids: Vec<i64>,
}

impl Ack {
    /// Encode for transmission
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode an ack blob.
    ///
    /// Accepts the structured object form as well as the legacy bare
    /// batch-id blob some peers still send.
    pub fn decode(blob: &[u8]) -> crate::Result<Self> {
        if let Ok(ack) = serde_json::from_slice::<Self>(blob) {
            return Ok(ack);
        }
        let text = std::str::from_utf8(blob)
            .map_err(|_| crate::Error::InvalidInput("ack blob is not UTF-8".into()))?;
        let batch_id: i64 = text.trim().parse().map_err(|_| {
            crate::Error::InvalidInput(format!("unrecognized ack blob: {text:?}"))
        })?;
        Ok(Self {
            batch_id,
            confirmed_ids: Vec::new(),
        })
    }
}
