//! # Test Utilities
//!
//! Helpers shared by the integration tests: resolving a path manager that
//! respects the execution context, and the interactive training smoke run
//! that only fires when a person asked for it.

use crate::config::ExperimentConfig;
use crate::constants::{class_types, log_targets};
use crate::device::{Device, DeviceProbe};
use crate::environment::TestEnvironment;
use crate::error::{TrainerError, TrainerResult};
use crate::experiment::{run_training_with_path_manager, TrainingSummary};
use crate::logging::ScopedLogging;
use crate::path_manager::{PathManager, RemoteStoreHandler};
use std::sync::Arc;
use tracing::debug;

/// Dataset location used by the interactive smoke run
pub const SMOKE_TEST_DATASET_ROOT: &str = "manifold://co3d/tree/extracted";
pub const SMOKE_TEST_CATEGORY: &str = "skateboard";

/// Path manager for reading dataset files in the current execution context
///
/// With `silence_logs`, the path manager's own log targets are turned off in
/// `logging` for as long as that scope lives. Inside a restricted worker the
/// remote store is unreachable and this fails. In a privileged test context
/// the remote store handler is registered; elsewhere only local paths work.
pub fn get_path_manager(
    env: &TestEnvironment,
    logging: &mut ScopedLogging,
    silence_logs: bool,
) -> TrainerResult<PathManager> {
    if silence_logs {
        logging.silence(log_targets::REMOTE_STORE);
        logging.silence(log_targets::PATH_MANAGER);
    }

    if env.inside_restricted_worker {
        return Err(TrainerError::Configuration(
            "Cannot get to manifold from RE".to_string(),
        ));
    }

    let mut path_manager = PathManager::new();
    if env.privileged_test_context {
        let handler = RemoteStoreHandler::new(&env.remote_store_root);
        debug!(mount_root = %handler.mount_root().display(), "Registering remote store handler");
        path_manager.register_handler(handler)?;
    }
    Ok(path_manager)
}

/// Default configuration adjusted for the short interactive training run
pub fn from_defaults_config() -> ExperimentConfig {
    let mut cfg = ExperimentConfig::default();

    let data_source = &mut cfg.data_source_args;
    data_source.dataset_map_provider_class_type =
        class_types::JSON_INDEX_DATASET_MAP_PROVIDER.to_string();

    let dataset_args = &mut data_source.dataset_map_provider_json_index_args;
    dataset_args.category = SMOKE_TEST_CATEGORY.to_string();
    dataset_args.test_restrict_sequence_id = 0;
    dataset_args.dataset_root = SMOKE_TEST_DATASET_ROOT.to_string();
    dataset_args.limit_sequences_to = 5;

    data_source.data_loader_map_provider_sequence_args.dataset_len = 1;
    cfg.solver_args.max_epochs = 2;
    cfg
}

/// Run `train` on the first GPU with [`from_defaults_config`]
///
/// Returns `Ok(None)` without probing devices or calling `train` unless
/// interactive testing is enabled. Errors from `train` are returned as is.
pub fn run_from_defaults<T, F>(
    env: &TestEnvironment,
    probe: &dyn DeviceProbe,
    train: F,
) -> TrainerResult<Option<T>>
where
    F: FnOnce(&ExperimentConfig, Device) -> TrainerResult<T>,
{
    if !env.interactive_testing {
        debug!("Interactive testing disabled, skipping training smoke run");
        return Ok(None);
    }

    let cfg = from_defaults_config();
    let device = Device::cuda(0, probe)?;
    train(&cfg, device).map(Some)
}

/// The interactive smoke run wired to the real trainer
///
/// The dataset provider reads through the context-aware path manager.
pub fn run_training_from_defaults(
    env: &TestEnvironment,
    probe: &dyn DeviceProbe,
) -> TrainerResult<Option<TrainingSummary>> {
    run_from_defaults(env, probe, |cfg, device| {
        let mut logging = ScopedLogging::new();
        let path_manager = get_path_manager(env, &mut logging, true)?;
        run_training_with_path_manager(cfg, device, Arc::new(path_manager))
    })
}
