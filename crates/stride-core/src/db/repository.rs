//! Sample and batch storage

use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{Batch, NewSample, Sample, SampleKey, SyncState};

use super::Database;

/// Outcome of an idempotent insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The sample was new; carries the assigned row id
    Inserted(i64),
    /// A sample with the same de-duplication key already existed
    AlreadyPresent(i64),
}

impl UpsertOutcome {
    /// The row id of the sample, whether new or pre-existing
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Inserted(id) | Self::AlreadyPresent(id) => id,
        }
    }
}

/// Per-state row counts, for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub unsynced: usize,
    pub pending_ack: usize,
    pub synced: usize,
}

/// Storage contract consumed by the sync protocol.
///
/// Every operation is safe to retry and safe to call concurrently from the
/// sender tick and the receiver callback.
pub trait SampleStore: Send + Sync {
    /// All unsynced samples, ordered by timestamp ascending
    fn select_unsynced(&self) -> Result<Vec<Sample>>;

    /// Idempotent insert keyed on `(recorded_at, steps, heart_rate)`;
    /// a duplicate is reported, not treated as an error
    fn upsert(&self, sample: &NewSample) -> Result<UpsertOutcome>;

    /// Look up a sample by its de-duplication key
    fn get_by_key(&self, key: &SampleKey) -> Result<Option<Sample>>;

    /// Tag samples as awaiting acknowledgment for the given batch
    fn mark_pending(&self, ids: &[i64], batch_id: i64) -> Result<usize>;

    /// Mark samples as durably delivered
    fn mark_synced(&self, ids: &[i64]) -> Result<usize>;

    /// Persist a new transmission record, returning it with its assigned id
    fn insert_batch(&self, payload_json: &str) -> Result<Batch>;

    /// Look up a batch by id
    fn get_batch(&self, batch_id: i64) -> Result<Option<Batch>>;

    /// All unconfirmed batches, oldest first
    fn unconfirmed_batches(&self) -> Result<Vec<Batch>>;

    /// Record that the peer acknowledged a batch
    fn mark_batch_confirmed(&self, batch_id: i64) -> Result<()>;

    /// Delete samples recorded before `cutoff`; with `only_synced`, rows
    /// still awaiting delivery are retained regardless of age
    fn purge_samples_older_than(&self, cutoff: &str, only_synced: bool) -> Result<usize>;

    /// Delete confirmed batches created before `cutoff_ms`
    fn purge_confirmed_batches_older_than(&self, cutoff_ms: i64) -> Result<usize>;

    /// Most recent samples, newest first
    fn list_recent(&self, limit: usize) -> Result<Vec<Sample>>;

    /// Row counts per sync state
    fn state_counts(&self) -> Result<StateCounts>;

    /// Total steps recorded on the given day (`%Y-%m-%d`)
    fn steps_for_day(&self, day: &str) -> Result<Option<u32>>;

    /// Average heart rate recorded on the given day
    fn avg_heart_rate_for_day(&self, day: &str) -> Result<Option<f64>>;

    /// Most recently recorded heart rate, any day
    fn last_heart_rate(&self) -> Result<Option<f64>>;
}

/// `SQLite` implementation of [`SampleStore`].
///
/// The connection sits behind a mutex so one handle can be shared by the
/// tick task and the inbound event handlers; each operation holds the lock
/// for its whole statement sequence.
pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
}

impl SqliteSampleStore {
    /// Create a store over an opened database
    #[must_use]
    pub fn new(database: Database) -> Self {
        Self {
            conn: Mutex::new(database.into_connection()),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another thread panicked mid-statement;
        // SQLite transactions keep the data consistent either way.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// NULL-aware key lookup; a plain `=` would never match absent fields
    fn find_by_key(conn: &Connection, key: &SampleKey) -> Result<Option<i64>> {
        let id = conn
            .query_row(
                "SELECT id FROM samples
                 WHERE recorded_at = ?1
                   AND (steps = ?2 OR (steps IS NULL AND ?2 IS NULL))
                   AND (heart_rate = ?3 OR (heart_rate IS NULL AND ?3 IS NULL))
                 LIMIT 1",
                params![key.recorded_at, key.steps, key.heart_rate],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Parse a sample from a database row
    fn parse_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sample> {
        Ok(Sample {
            id: row.get(0)?,
            recorded_at: row.get(1)?,
            steps: row.get(2)?,
            heart_rate: row.get(3)?,
            sync_state: SyncState::from_i64(row.get(4)?),
            batch_id: row.get(5)?,
        })
    }

    /// Parse a batch from a database row
    fn parse_batch(row: &rusqlite::Row<'_>) -> rusqlite::Result<Batch> {
        Ok(Batch {
            id: row.get(0)?,
            created_at: row.get(1)?,
            payload_json: row.get(2)?,
            confirmed: row.get::<_, i64>(3)? != 0,
        })
    }
}

const SAMPLE_COLUMNS: &str = "id, recorded_at, steps, heart_rate, sync_state, batch_id";
const BATCH_COLUMNS: &str = "id, created_at, payload_json, confirmed";

impl SampleStore for SqliteSampleStore {
    fn select_unsynced(&self) -> Result<Vec<Sample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples
             WHERE sync_state = 0
             ORDER BY recorded_at ASC, id ASC"
        ))?;
        let samples = stmt
            .query_map([], Self::parse_sample)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(samples)
    }

    fn upsert(&self, sample: &NewSample) -> Result<UpsertOutcome> {
        let conn = self.conn();
        let key = sample.key();

        if let Some(id) = Self::find_by_key(&conn, &key)? {
            return Ok(UpsertOutcome::AlreadyPresent(id));
        }

        // OR IGNORE keeps a constraint hit on the unique index silent; the
        // changes() check below turns it into AlreadyPresent
        conn.execute(
            "INSERT OR IGNORE INTO samples (recorded_at, steps, heart_rate, sync_state)
             VALUES (?1, ?2, ?3, 0)",
            params![sample.recorded_at, sample.steps, sample.heart_rate],
        )?;

        if conn.changes() == 0 {
            let id = Self::find_by_key(&conn, &key)?.ok_or_else(|| {
                crate::Error::NotFound(format!("sample at {}", key.recorded_at))
            })?;
            return Ok(UpsertOutcome::AlreadyPresent(id));
        }

        Ok(UpsertOutcome::Inserted(conn.last_insert_rowid()))
    }

    fn get_by_key(&self, key: &SampleKey) -> Result<Option<Sample>> {
        let conn = self.conn();
        let sample = conn
            .query_row(
                &format!(
                    "SELECT {SAMPLE_COLUMNS} FROM samples
                     WHERE recorded_at = ?1
                       AND (steps = ?2 OR (steps IS NULL AND ?2 IS NULL))
                       AND (heart_rate = ?3 OR (heart_rate IS NULL AND ?3 IS NULL))
                     LIMIT 1"
                ),
                params![key.recorded_at, key.steps, key.heart_rate],
                Self::parse_sample,
            )
            .optional()?;
        Ok(sample)
    }

    fn mark_pending(&self, ids: &[i64], batch_id: i64) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut updated = 0;
        for id in ids {
            updated += tx.execute(
                "UPDATE samples SET sync_state = 1, batch_id = ?1 WHERE id = ?2",
                params![batch_id, id],
            )?;
        }
        tx.commit()?;
        Ok(updated)
    }

    fn mark_synced(&self, ids: &[i64]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut updated = 0;
        for id in ids {
            updated += tx.execute(
                "UPDATE samples SET sync_state = 2 WHERE id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(updated)
    }

    fn insert_batch(&self, payload_json: &str) -> Result<Batch> {
        let conn = self.conn();
        let created_at = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO sent_batches (created_at, payload_json, confirmed) VALUES (?1, ?2, 0)",
            params![created_at, payload_json],
        )?;
        Ok(Batch {
            id: conn.last_insert_rowid(),
            created_at,
            payload_json: payload_json.to_string(),
            confirmed: false,
        })
    }

    fn get_batch(&self, batch_id: i64) -> Result<Option<Batch>> {
        let conn = self.conn();
        let batch = conn
            .query_row(
                &format!("SELECT {BATCH_COLUMNS} FROM sent_batches WHERE id = ?1"),
                params![batch_id],
                Self::parse_batch,
            )
            .optional()?;
        Ok(batch)
    }

    fn unconfirmed_batches(&self) -> Result<Vec<Batch>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BATCH_COLUMNS} FROM sent_batches
             WHERE confirmed = 0
             ORDER BY created_at ASC, id ASC"
        ))?;
        let batches = stmt
            .query_map([], Self::parse_batch)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(batches)
    }

    fn mark_batch_confirmed(&self, batch_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE sent_batches SET confirmed = 1 WHERE id = ?1",
            params![batch_id],
        )?;
        Ok(())
    }

    fn purge_samples_older_than(&self, cutoff: &str, only_synced: bool) -> Result<usize> {
        let conn = self.conn();
        let deleted = if only_synced {
            conn.execute(
                "DELETE FROM samples WHERE recorded_at < ?1 AND sync_state = 2",
                params![cutoff],
            )?
        } else {
            conn.execute(
                "DELETE FROM samples WHERE recorded_at < ?1",
                params![cutoff],
            )?
        };
        Ok(deleted)
    }

    fn purge_confirmed_batches_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM sent_batches WHERE confirmed = 1 AND created_at < ?1",
            params![cutoff_ms],
        )?;
        Ok(deleted)
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<Sample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?1"
        ))?;
        #[allow(clippy::cast_possible_wrap)]
        let samples = stmt
            .query_map(params![limit as i64], Self::parse_sample)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(samples)
    }

    fn state_counts(&self) -> Result<StateCounts> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT sync_state, COUNT(*) FROM samples GROUP BY sync_state")?;
        let mut counts = StateCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, usize>(1)?))
        })?;
        for row in rows {
            let (state, count) = row?;
            match SyncState::from_i64(state) {
                SyncState::Unsynced => counts.unsynced = count,
                SyncState::PendingAck => counts.pending_ack = count,
                SyncState::Synced => counts.synced = count,
            }
        }
        Ok(counts)
    }

    fn steps_for_day(&self, day: &str) -> Result<Option<u32>> {
        let conn = self.conn();
        let total = conn.query_row(
            "SELECT SUM(steps) FROM samples WHERE recorded_at LIKE ?1 || '%'",
            params![day],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    fn avg_heart_rate_for_day(&self, day: &str) -> Result<Option<f64>> {
        let conn = self.conn();
        let avg = conn.query_row(
            "SELECT AVG(heart_rate) FROM samples
             WHERE recorded_at LIKE ?1 || '%' AND heart_rate IS NOT NULL",
            params![day],
            |row| row.get(0),
        )?;
        Ok(avg)
    }

    fn last_heart_rate(&self) -> Result<Option<f64>> {
        let conn = self.conn();
        let bpm = conn
            .query_row(
                "SELECT heart_rate FROM samples
                 WHERE heart_rate IS NOT NULL
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bpm)
    }
}
