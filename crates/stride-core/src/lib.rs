//! stride-core - Core library for Stride
//!
//! This crate contains the shared models, the durable sample store, and the
//! bidirectional batch synchronization protocol used by both device roles
//! (wrist sensor host and companion host).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{Batch, BatchEntry, NewSample, Sample, SampleKey, SyncState};
