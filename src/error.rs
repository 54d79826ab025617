//! Error types for the trainer.

use crate::config::ConfigurationError;
use crate::path_manager::PathError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Dataset error: {0}")]
    Dataset(String),
    #[error("Unknown {kind} class type '{name}'")]
    UnknownClassType { kind: &'static str, name: String },
    #[error("Training error: {0}")]
    Training(String),
    #[error("Checkpoint error for '{path}': {reason}")]
    Checkpoint { path: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TrainerError {
    fn from(error: serde_json::Error) -> Self {
        TrainerError::Dataset(format!("JSON serialization error: {error}"))
    }
}

impl TrainerError {
    pub fn unknown_class_type<N: Into<String>>(kind: &'static str, name: N) -> Self {
        Self::UnknownClassType {
            kind,
            name: name.into(),
        }
    }

    pub fn checkpoint<P: Into<String>, R: std::fmt::Display>(path: P, reason: R) -> Self {
        Self::Checkpoint {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type TrainerResult<T> = std::result::Result<T, TrainerError>;
