//! # Experiment Configuration
//!
//! Strongly typed experiment configuration for the trainer. The structure is
//! the single source of truth for defaults: YAML files and `key.path=value`
//! overrides are merged over the serialized defaults by [`loader`].
//!
//! ## Stable serialization
//!
//! Keys are emitted in declaration order and never re-sorted, so the YAML
//! rendering of [`ExperimentConfig::default()`] is byte-for-byte stable and
//! can be pinned by a golden fixture.
//!
//! ## Usage
//!
//! ```rust
//! use implicitron_trainer::config::ExperimentConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = ExperimentConfig::default();
//! config.solver_args.max_epochs = 2;
//!
//! let yaml = config.to_yaml()?;
//! assert!(yaml.contains("max_epochs: 2"));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{class_types, tasks, MISSING};
use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{apply_override, load_experiment_config, ConfigLoader};

/// Root experiment configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Dataset and data loader provider selection with their arguments
    pub data_source_args: DataSourceArgs,

    /// Model selection and model arguments
    pub model_args: ModelArgs,

    /// Optimizer and learning rate schedule
    pub solver_args: SolverArgs,

    /// Skip training and only evaluate the restored model
    pub eval_only: bool,

    /// Directory receiving checkpoints and the config snapshot
    pub exp_dir: String,

    /// GPU ordinal used when a bare `cuda` device is requested
    pub gpu_idx: u32,

    /// Log training metrics every N batches
    pub metric_print_interval: usize,

    /// Continue from the checkpoints found in `exp_dir`
    pub resume: bool,

    /// Epoch to resume from; zero or negative picks the newest checkpoint
    pub resume_epoch: i64,

    /// Offset for the deterministic batch sampler
    pub seed: u64,

    pub store_checkpoints: bool,

    /// Number of newest checkpoints kept on disk; 0 keeps all
    pub store_checkpoints_purge: usize,

    /// Evaluate on the test split every N epochs; non-positive disables
    pub test_interval: i64,

    pub test_when_finished: bool,

    /// Evaluate on the validation split every N epochs; 0 disables
    pub validation_interval: usize,

    /// Gradient norm clipping threshold; 0 disables
    pub clip_grad: f64,
}

/// Data source wiring: which providers to build and how
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceArgs {
    pub dataset_map_provider_class_type: String,
    pub data_loader_map_provider_class_type: String,

    #[serde(rename = "dataset_map_provider_JsonIndexDatasetMapProvider_args")]
    pub dataset_map_provider_json_index_args: JsonIndexDatasetMapProviderArgs,

    #[serde(rename = "data_loader_map_provider_SequenceDataLoaderMapProvider_args")]
    pub data_loader_map_provider_sequence_args: SequenceDataLoaderMapProviderArgs,
}

/// Arguments of the JSON index dataset map provider
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JsonIndexDatasetMapProviderArgs {
    pub category: String,
    /// `singlesequence` or `multisequence`
    pub task_str: String,
    /// Local path or remote URI holding one directory per category
    pub dataset_root: String,
    /// Cap on frames per split; 0 means unlimited
    pub limit_to: usize,
    /// Cap on sequences per split; 0 means unlimited
    pub limit_sequences_to: usize,
    /// Cap on frames kept per sequence; negative means unlimited
    pub n_frames_per_sequence: i64,
    pub test_on_train: bool,
    pub restrict_sequence_name: Vec<String>,
    /// Index into the sorted test sequence names; negative disables
    pub test_restrict_sequence_id: i64,
    pub assert_single_seq: bool,
    pub only_test_set: bool,
}

/// Arguments of the sequence data loader map provider
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceDataLoaderMapProviderArgs {
    pub batch_size: usize,
    /// Training batches per epoch
    pub dataset_len: usize,
    /// Validation batches per epoch
    pub dataset_len_val: usize,
    /// Batch sizes cycled through; empty falls back to `batch_size`
    pub images_per_seq_options: Vec<usize>,
    pub sample_consecutive_frames: bool,
    /// Stride between frames of a consecutive batch; 0 and 1 pick adjacent frames
    pub consecutive_frames_max_gap: u64,
}

/// Model selection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelArgs {
    pub model_class_type: String,
    pub scene_center_init: [f64; 3],
    pub loss_weight: f64,
}

/// Optimizer and learning rate policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SolverArgs {
    /// `Adam`, `SGD` or `Adagrad`
    pub breed: String,
    pub weight_decay: f64,
    /// `MultiStepLR`, `Exponential` or `LinearExponential`
    pub lr_policy: String,
    pub lr: f64,
    pub gamma: f64,
    pub momentum: f64,
    pub betas: [f64; 2],
    pub milestones: Vec<u64>,
    pub max_epochs: u64,
    pub exponential_lr_step_size: u64,
    pub linear_exponential_lr_milestone: u64,
    pub linear_exponential_start_gamma: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_source_args: DataSourceArgs::default(),
            model_args: ModelArgs::default(),
            solver_args: SolverArgs::default(),
            eval_only: false,
            exp_dir: "./data/default_experiment/".to_string(),
            gpu_idx: 0,
            metric_print_interval: 5,
            resume: true,
            resume_epoch: -1,
            seed: 0,
            store_checkpoints: true,
            store_checkpoints_purge: 1,
            test_interval: -1,
            test_when_finished: false,
            validation_interval: 1,
            clip_grad: 0.0,
        }
    }
}

impl Default for DataSourceArgs {
    fn default() -> Self {
        Self {
            dataset_map_provider_class_type: MISSING.to_string(),
            data_loader_map_provider_class_type: class_types::SEQUENCE_DATA_LOADER_MAP_PROVIDER
                .to_string(),
            dataset_map_provider_json_index_args: JsonIndexDatasetMapProviderArgs::default(),
            data_loader_map_provider_sequence_args: SequenceDataLoaderMapProviderArgs::default(),
        }
    }
}

impl Default for JsonIndexDatasetMapProviderArgs {
    fn default() -> Self {
        Self {
            category: MISSING.to_string(),
            task_str: tasks::SINGLE_SEQUENCE.to_string(),
            dataset_root: String::new(),
            limit_to: 0,
            limit_sequences_to: 0,
            n_frames_per_sequence: -1,
            test_on_train: false,
            restrict_sequence_name: Vec::new(),
            test_restrict_sequence_id: -1,
            assert_single_seq: false,
            only_test_set: false,
        }
    }
}

impl Default for SequenceDataLoaderMapProviderArgs {
    fn default() -> Self {
        Self {
            batch_size: 1,
            dataset_len: 1000,
            dataset_len_val: 1,
            images_per_seq_options: Vec::new(),
            sample_consecutive_frames: false,
            consecutive_frames_max_gap: 0,
        }
    }
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            model_class_type: class_types::SCENE_CENTER_MODEL.to_string(),
            scene_center_init: [0.0, 0.0, 0.0],
            loss_weight: 1.0,
        }
    }
}

impl Default for SolverArgs {
    fn default() -> Self {
        Self {
            breed: "Adam".to_string(),
            weight_decay: 0.0,
            lr_policy: "MultiStepLR".to_string(),
            lr: 0.0005,
            gamma: 0.1,
            momentum: 0.9,
            betas: [0.9, 0.999],
            milestones: Vec::new(),
            max_epochs: 1000,
            exponential_lr_step_size: 250,
            linear_exponential_lr_milestone: 200,
            linear_exponential_start_gamma: 0.1,
        }
    }
}

impl ExperimentConfig {
    /// Render the configuration as YAML, keys in declaration order.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        serde_yaml::to_string(self).map_err(ConfigurationError::serialization_error)
    }

    /// Parse a complete configuration document.
    ///
    /// Partial documents go through [`ConfigLoader`], which fills the gaps
    /// from the defaults.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::invalid_yaml("<string>", e))
    }

    /// Check value ranges. Mandatory values may still be missing.
    pub fn validate(&self) -> ConfigResult<()> {
        let solver = &self.solver_args;
        if !(solver.lr > 0.0) {
            return Err(ConfigurationError::invalid_value(
                "solver_args.lr",
                solver.lr.to_string(),
                "learning rate must be positive",
            ));
        }
        if !(solver.gamma > 0.0) {
            return Err(ConfigurationError::invalid_value(
                "solver_args.gamma",
                solver.gamma.to_string(),
                "gamma must be positive",
            ));
        }
        for (i, beta) in solver.betas.iter().enumerate() {
            if !(0.0..1.0).contains(beta) {
                return Err(ConfigurationError::invalid_value(
                    format!("solver_args.betas[{i}]"),
                    beta.to_string(),
                    "betas must lie in [0, 1)",
                ));
            }
        }
        if solver.weight_decay < 0.0 {
            return Err(ConfigurationError::invalid_value(
                "solver_args.weight_decay",
                solver.weight_decay.to_string(),
                "weight decay cannot be negative",
            ));
        }
        if solver.exponential_lr_step_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "solver_args.exponential_lr_step_size",
                "0",
                "step size must be at least 1",
            ));
        }

        let loader = &self.data_source_args.data_loader_map_provider_sequence_args;
        if loader.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "data_source_args.data_loader_map_provider_SequenceDataLoaderMapProvider_args.batch_size",
                "0",
                "batch size must be at least 1",
            ));
        }
        if loader.images_per_seq_options.contains(&0) {
            return Err(ConfigurationError::invalid_value(
                "data_source_args.data_loader_map_provider_SequenceDataLoaderMapProvider_args.images_per_seq_options",
                format!("{:?}", loader.images_per_seq_options),
                "every option must be at least 1",
            ));
        }

        if self.clip_grad < 0.0 {
            return Err(ConfigurationError::invalid_value(
                "clip_grad",
                self.clip_grad.to_string(),
                "clipping threshold cannot be negative",
            ));
        }
        if self.exp_dir.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "exp_dir",
                "",
                "experiment directory cannot be empty",
            ));
        }

        Ok(())
    }

    /// [`validate`](Self::validate) plus the values that must be set before
    /// training can start.
    pub fn validate_for_training(&self) -> ConfigResult<()> {
        self.validate()?;

        let source = &self.data_source_args;
        if source.dataset_map_provider_class_type == MISSING {
            return Err(ConfigurationError::missing_mandatory_value(
                "data_source_args.dataset_map_provider_class_type",
            ));
        }
        if source.dataset_map_provider_class_type == class_types::JSON_INDEX_DATASET_MAP_PROVIDER
            && source.dataset_map_provider_json_index_args.category == MISSING
        {
            return Err(ConfigurationError::missing_mandatory_value(
                "data_source_args.dataset_map_provider_JsonIndexDatasetMapProvider_args.category",
            ));
        }
        if source.data_loader_map_provider_class_type == MISSING {
            return Err(ConfigurationError::missing_mandatory_value(
                "data_source_args.data_loader_map_provider_class_type",
            ));
        }
        if self.model_args.model_class_type == MISSING {
            return Err(ConfigurationError::missing_mandatory_value(
                "model_args.model_class_type",
            ));
        }
        Ok(())
    }
}
