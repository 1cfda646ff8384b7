//! Database layer for Stride

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{SampleStore, SqliteSampleStore, StateCounts, UpsertOutcome};
