#![allow(clippy::doc_markdown)] // Allow technical terms like CUDA, YAML in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Implicitron Trainer
//!
//! Configuration wiring and a training entry point for a 3D-vision research
//! trainer.
//!
//! ## Overview
//!
//! An experiment is described by one [`ExperimentConfig`]: which dataset and
//! data loader providers to build, which model to fit and how to optimise it.
//! The default configuration renders to a stable YAML document, so changes to
//! the schema show up as a diff against a committed fixture.
//!
//! Training reads frame annotations through a [`PathManager`]. Plain paths go
//! to the local filesystem; `manifold://` URIs are served by a remote store
//! handler that is only registered in a privileged test context.
//!
//! ## Module Organization
//!
//! - [`config`] - Experiment configuration, YAML loading and overrides
//! - [`dataset`] - Frame annotations, dataset splits and batch planning
//! - [`model`] - Models fitted by the trainer
//! - [`solver`] - Optimizers and learning rate policies
//! - [`experiment`] - The training loop
//! - [`path_manager`] - Local and remote path resolution
//! - [`test_utils`] - Context-aware helpers for the integration tests
//!
//! ## Quick Start
//!
//! ```rust
//! use implicitron_trainer::ExperimentConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let yaml = ExperimentConfig::default().to_yaml()?;
//! assert!(yaml.starts_with("data_source_args:"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                                     # Unit and integration tests
//! PYTORCH3D_INTERACTIVE_TESTING=1 cargo test     # Also the GPU training smoke run
//! ```

#[macro_use]
mod macros;

pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod device;
pub mod environment;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod model;
pub mod path_manager;
pub mod snapshot;
pub mod solver;
pub mod stats;
pub mod test_utils;

pub use config::{ConfigLoader, ConfigurationError, ExperimentConfig};
pub use device::{Device, DeviceProbe, SystemDeviceProbe};
pub use environment::TestEnvironment;
pub use error::{TrainerError, TrainerResult};
pub use experiment::{run_training, run_training_with_path_manager, TrainingSummary};
pub use logging::{init_structured_logging, ScopedLogging};
pub use path_manager::{PathError, PathManager};
pub use snapshot::{verify_or_record, SnapshotError, SnapshotMode};
