use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stride_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Provide at least one of --steps / --heart-rate")]
    EmptyMeasurement,
    #[error("Invalid timestamp {0:?}, expected %Y-%m-%d %H:%M:%S")]
    InvalidTimestamp(String),
}
