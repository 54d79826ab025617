//! Configuration Error Types
//!
//! Error handling for experiment configuration loading, merging and
//! validation. Messages name the offending key path so a failing override or
//! YAML file can be fixed without reading the loader.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at the requested location
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Invalid YAML syntax or shape
    #[error("Invalid YAML in configuration '{source_name}': {error}")]
    InvalidYaml { source_name: String, error: String },

    /// Key that does not exist in the experiment schema
    #[error("Unknown configuration field: {field}")]
    UnknownField { field: String },

    /// Value that must be supplied before the experiment can run
    #[error("Missing mandatory value for '{field}'")]
    MissingMandatoryValue { field: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Malformed `key.path=value` override
    #[error("Invalid override '{override_text}': {reason}")]
    InvalidOverride {
        override_text: String,
        reason: String,
    },

    /// Failure while merging a partial configuration over the defaults
    #[error("Failed to merge configuration: {error}")]
    ConfigMergeError { error: String },

    /// File I/O errors during configuration loading
    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },

    /// Serialization of an in-memory configuration failed
    #[error("Failed to serialize configuration: {error}")]
    SerializationError { error: String },
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn invalid_yaml<S: Into<String>, E: std::fmt::Display>(source_name: S, error: E) -> Self {
        Self::InvalidYaml {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    pub fn unknown_field<F: Into<String>>(field: F) -> Self {
        Self::UnknownField {
            field: field.into(),
        }
    }

    pub fn missing_mandatory_value<F: Into<String>>(field: F) -> Self {
        Self::MissingMandatoryValue {
            field: field.into(),
        }
    }

    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn invalid_override<O: Into<String>, R: Into<String>>(override_text: O, reason: R) -> Self {
        Self::InvalidOverride {
            override_text: override_text.into(),
            reason: reason.into(),
        }
    }

    pub fn merge_error<E: std::fmt::Display>(error: E) -> Self {
        Self::ConfigMergeError {
            error: error.to_string(),
        }
    }

    pub fn file_read_error<P: Into<String>, E: std::fmt::Display>(file_path: P, error: E) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    pub fn serialization_error<E: std::fmt::Display>(error: E) -> Self {
        Self::SerializationError {
            error: error.to_string(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;
