//! Sample model

use std::fmt;

use serde::{Deserialize, Serialize};

/// Timestamp format used for samples: second resolution, device-local clock
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Synchronization state of a stored sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    /// Not yet part of any batch
    Unsynced,
    /// Included in a transmitted batch awaiting acknowledgment
    PendingAck,
    /// Confirmed durably stored on the peer
    Synced,
}

impl SyncState {
    /// Integer encoding used by the store
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Unsynced => 0,
            Self::PendingAck => 1,
            Self::Synced => 2,
        }
    }

    /// Decode the store's integer encoding; unknown values read as `Unsynced`
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::PendingAck,
            2 => Self::Synced,
            _ => Self::Unsynced,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsynced => write!(f, "unsynced"),
            Self::PendingAck => write!(f, "pending-ack"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// The de-duplication key: two samples with the same key are the same
/// observation, regardless of which device stored them first.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleKey {
    /// Local timestamp string (`%Y-%m-%d %H:%M:%S`)
    pub recorded_at: String,
    /// Step count, if this observation carried one
    pub steps: Option<u32>,
    /// Heart rate in bpm, if this observation carried one
    pub heart_rate: Option<f64>,
}

/// A health observation not yet persisted (no store-assigned id)
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub recorded_at: String,
    pub steps: Option<u32>,
    pub heart_rate: Option<f64>,
}

impl NewSample {
    /// Create a new sample, enforcing that at least one measurement is present
    /// and that a heart rate, when given, is positive.
    pub fn new(
        recorded_at: impl Into<String>,
        steps: Option<u32>,
        heart_rate: Option<f64>,
    ) -> crate::Result<Self> {
        if steps.is_none() && heart_rate.is_none() {
            return Err(crate::Error::InvalidInput(
                "sample must carry steps or a heart rate".into(),
            ));
        }
        if let Some(bpm) = heart_rate {
            if !bpm.is_finite() || bpm <= 0.0 {
                return Err(crate::Error::InvalidInput(format!(
                    "heart rate must be a positive number, got {bpm}"
                )));
            }
        }
        Ok(Self {
            recorded_at: recorded_at.into(),
            steps,
            heart_rate,
        })
    }

    /// Create a sample timestamped with the current local time
    pub fn now(steps: Option<u32>, heart_rate: Option<f64>) -> crate::Result<Self> {
        let recorded_at = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::new(recorded_at, steps, heart_rate)
    }

    /// The de-duplication key of this sample
    #[must_use]
    pub fn key(&self) -> SampleKey {
        SampleKey {
            recorded_at: self.recorded_at.clone(),
            steps: self.steps,
            heart_rate: self.heart_rate,
        }
    }
}

/// A stored sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Store-assigned row id
    pub id: i64,
    /// Local timestamp string, second resolution
    pub recorded_at: String,
    pub steps: Option<u32>,
    pub heart_rate: Option<f64>,
    pub sync_state: SyncState,
    /// The batch this sample was last transmitted in, if any
    pub batch_id: Option<i64>,
}

impl Sample {
    /// The de-duplication key of this sample
    #[must_use]
    pub fn key(&self) -> SampleKey {
        SampleKey {
            recorded_at: self.recorded_at.clone(),
            steps: self.steps,
            heart_rate: self.heart_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_requires_a_measurement() {
        assert!(NewSample::new("2025-03-01 08:00:00", None, None).is_err());
        assert!(NewSample::new("2025-03-01 08:00:00", Some(12), None).is_ok());
        assert!(NewSample::new("2025-03-01 08:00:00", None, Some(71.0)).is_ok());
    }

    #[test]
    fn heart_rate_must_be_positive() {
        assert!(NewSample::new("2025-03-01 08:00:00", None, Some(0.0)).is_err());
        assert!(NewSample::new("2025-03-01 08:00:00", None, Some(-4.2)).is_err());
        assert!(NewSample::new("2025-03-01 08:00:00", None, Some(f64::NAN)).is_err());
    }

    #[test]
    fn sync_state_round_trips_through_integer_encoding() {
        for state in [SyncState::Unsynced, SyncState::PendingAck, SyncState::Synced] {
            assert_eq!(SyncState::from_i64(state.as_i64()), state);
        }
        // Unknown values degrade to Unsynced rather than failing the read
        assert_eq!(SyncState::from_i64(99), SyncState::Unsynced);
    }
}
