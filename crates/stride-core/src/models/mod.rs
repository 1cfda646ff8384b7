//! Domain models shared across the store and the sync protocol

mod batch;
mod sample;

pub use batch::{Batch, BatchEntry};
pub use sample::{NewSample, Sample, SampleKey, SyncState, TIMESTAMP_FORMAT};
