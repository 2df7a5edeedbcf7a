// src/error.rs - Crate-wide error type
use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("trace contains no samples")]
    EmptyTrace,
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("auto-tune failed: {0}")]
    TuneFailed(String),
    #[error("invalid sweep '{0}'")]
    InvalidSweep(String),
}

pub type SimResult<T> = Result<T, SimError>;
