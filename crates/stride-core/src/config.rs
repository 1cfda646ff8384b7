//! Synchronization configuration

use std::time::Duration;

/// Tuning knobs for the sync protocol.
///
/// Defaults match the reference behavior: batches of at most 300 samples,
/// a 10 second cooldown between transmissions, a 5 second peer lookup
/// timeout, and a 7 day retention window for synced data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum number of samples per transmitted batch
    pub max_batch_size: usize,
    /// Minimum interval between successive transmissions
    pub send_cooldown: Duration,
    /// Period of the synchronization tick task
    pub tick_period: Duration,
    /// Age past which synced samples and confirmed batches are purged
    pub retention_age: Duration,
    /// Interval between retention sweeps run by the engine
    pub retention_sweep: Duration,
    /// Upper bound on the peer reachability lookup
    pub peer_lookup_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 300,
            send_cooldown: Duration::from_secs(10),
            tick_period: Duration::from_secs(10),
            retention_age: Duration::from_secs(7 * 24 * 60 * 60),
            retention_sweep: Duration::from_secs(60 * 60),
            peer_lookup_timeout: Duration::from_secs(5),
        }
    }
}

impl SyncConfig {
    /// Set the maximum batch size
    #[must_use]
    pub const fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set the minimum interval between transmissions
    #[must_use]
    pub const fn with_send_cooldown(mut self, cooldown: Duration) -> Self {
        self.send_cooldown = cooldown;
        self
    }

    /// Set the tick period of the sync task
    #[must_use]
    pub const fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Set the retention age for synced data
    #[must_use]
    pub const fn with_retention_age(mut self, age: Duration) -> Self {
        self.retention_age = age;
        self
    }

    /// Set the peer lookup timeout
    #[must_use]
    pub const fn with_peer_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.peer_lookup_timeout = timeout;
        self
    }

    /// Check the configuration for nonsensical values
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_batch_size == 0 {
            return Err(crate::Error::InvalidInput(
                "max_batch_size must be at least 1".into(),
            ));
        }
        if self.tick_period.is_zero() {
            return Err(crate::Error::InvalidInput(
                "tick_period must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_batch_size, 300);
        assert_eq!(config.send_cooldown, Duration::from_secs(10));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = SyncConfig::default().with_max_batch_size(0);
        assert!(config.validate().is_err());
    }
}
