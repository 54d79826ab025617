//! # Trainer Constants
//!
//! Class-type names, file names and environment variables shared by the
//! configuration, data and experiment layers.

/// Placeholder written for configuration values that must be supplied
/// before an experiment can run.
pub const MISSING: &str = "???";

/// Registered implementation names selectable through `*_class_type` keys
pub mod class_types {
    pub const JSON_INDEX_DATASET_MAP_PROVIDER: &str = "JsonIndexDatasetMapProvider";
    pub const SEQUENCE_DATA_LOADER_MAP_PROVIDER: &str = "SequenceDataLoaderMapProvider";
    pub const SCENE_CENTER_MODEL: &str = "SceneCenterModel";
}

/// Files read from and written to dataset roots and experiment directories
pub mod files {
    pub const FRAME_ANNOTATIONS: &str = "frame_annotations.json";
    pub const SET_LISTS: &str = "set_lists.json";
    pub const EXPERIMENT_CONFIG: &str = "expconfig.yaml";
    pub const CHECKPOINT_PREFIX: &str = "model_epoch_";
    pub const CHECKPOINT_SUFFIX: &str = ".json";
}

/// Process environment consulted when building a [`crate::TestEnvironment`]
pub mod env_vars {
    pub const INTERACTIVE_TESTING: &str = "PYTORCH3D_INTERACTIVE_TESTING";
    pub const INSIDE_RESTRICTED_WORKER: &str = "INSIDE_RE_WORKER";
    pub const PRIVILEGED_TEST_CONTEXT: &str = "FB_TEST";
    pub const REMOTE_STORE_ROOT: &str = "MANIFOLD_MOUNT_ROOT";
    pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";
    pub const TRAINER_ENV: &str = "IMPLICITRON_ENV";
    pub const LOG_FILTER: &str = "IMPLICITRON_LOG";
}

/// URI scheme served by the remote store handler
pub const REMOTE_STORE_SCHEME: &str = "manifold://";

/// Default mount point of the remote store on worker machines
pub const DEFAULT_REMOTE_STORE_ROOT: &str = "/mnt/manifold";

/// Log targets belonging to the path manager
pub mod log_targets {
    pub const PATH_MANAGER: &str = "implicitron_trainer::path_manager";
    pub const REMOTE_STORE: &str = "implicitron_trainer::path_manager::remote";
}

/// Split names produced by dataset map providers
pub mod splits {
    pub const TRAIN: &str = "train";
    pub const VAL: &str = "val";
    pub const TEST: &str = "test";

    pub const SUBSET_KNOWN: &str = "known";
    pub const SUBSET_UNSEEN: &str = "unseen";
}

/// Task names understood by the JSON index provider
pub mod tasks {
    pub const SINGLE_SEQUENCE: &str = "singlesequence";
    pub const MULTI_SEQUENCE: &str = "multisequence";
}
