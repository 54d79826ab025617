//! Epoch checkpoints stored as JSON files in the experiment directory.
//!
//! File names are `model_epoch_XXXXXXXX.json` with a zero-padded epoch, so a
//! lexical listing is also chronological.

use crate::constants::files;
use crate::error::{TrainerError, TrainerResult};
use crate::path_manager::{join_path, PathManager};
use crate::stats::EpochStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: u64,
    pub model_class_type: String,
    pub model_state: serde_json::Value,
    pub optimizer_state: serde_json::Value,
    /// Stats of every pass up to and including `epoch`
    pub stats: Vec<EpochStats>,
    pub created_at: DateTime<Utc>,
}

pub fn checkpoint_file_name(epoch: u64) -> String {
    format!(
        "{}{epoch:08}{}",
        files::CHECKPOINT_PREFIX,
        files::CHECKPOINT_SUFFIX
    )
}

pub fn checkpoint_path(exp_dir: &str, epoch: u64) -> String {
    join_path(exp_dir, &[&checkpoint_file_name(epoch)])
}

fn parse_checkpoint_epoch(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(files::CHECKPOINT_PREFIX)?
        .strip_suffix(files::CHECKPOINT_SUFFIX)?
        .parse()
        .ok()
}

/// Epochs with a checkpoint in `exp_dir`, ascending
pub fn list_checkpoint_epochs(path_manager: &PathManager, exp_dir: &str) -> TrainerResult<Vec<u64>> {
    if !path_manager.exists(exp_dir)? {
        return Ok(Vec::new());
    }
    let mut epochs: Vec<u64> = path_manager
        .ls(exp_dir)?
        .iter()
        .filter_map(|name| parse_checkpoint_epoch(name))
        .collect();
    epochs.sort_unstable();
    Ok(epochs)
}

/// Checkpoint to resume from
///
/// A positive `resume_epoch` must have a checkpoint; zero or negative picks
/// the newest checkpoint, if any.
pub fn find_checkpoint(
    path_manager: &PathManager,
    exp_dir: &str,
    resume_epoch: i64,
) -> TrainerResult<Option<String>> {
    let epochs = list_checkpoint_epochs(path_manager, exp_dir)?;
    match u64::try_from(resume_epoch).ok().filter(|&epoch| epoch > 0) {
        Some(epoch) => {
            if epochs.contains(&epoch) {
                Ok(Some(checkpoint_path(exp_dir, epoch)))
            } else {
                Err(TrainerError::checkpoint(
                    checkpoint_path(exp_dir, epoch),
                    "requested resume epoch has no checkpoint",
                ))
            }
        }
        None => Ok(epochs.last().map(|&epoch| checkpoint_path(exp_dir, epoch))),
    }
}

pub fn save_checkpoint(
    path_manager: &PathManager,
    exp_dir: &str,
    checkpoint: &Checkpoint,
) -> TrainerResult<String> {
    let path = checkpoint_path(exp_dir, checkpoint.epoch);
    let contents = serde_json::to_string_pretty(checkpoint)
        .map_err(|e| TrainerError::checkpoint(&path, e))?;
    path_manager.write_string(&path, &contents)?;
    info!(path = %path, epoch = checkpoint.epoch, "Stored checkpoint");
    Ok(path)
}

pub fn load_checkpoint(path_manager: &PathManager, path: &str) -> TrainerResult<Checkpoint> {
    let contents = path_manager.read_to_string(path)?;
    let checkpoint: Checkpoint =
        serde_json::from_str(&contents).map_err(|e| TrainerError::checkpoint(path, e))?;
    debug!(path = %path, epoch = checkpoint.epoch, "Loaded checkpoint");
    Ok(checkpoint)
}

/// Delete all but the newest `keep` checkpoints; `keep == 0` deletes nothing
///
/// Returns the removed epochs.
pub fn purge_checkpoints(
    path_manager: &PathManager,
    exp_dir: &str,
    keep: usize,
) -> TrainerResult<Vec<u64>> {
    if keep == 0 {
        return Ok(Vec::new());
    }
    let epochs = list_checkpoint_epochs(path_manager, exp_dir)?;
    let stale = &epochs[..epochs.len().saturating_sub(keep)];
    for &epoch in stale {
        let path = checkpoint_path(exp_dir, epoch);
        path_manager.remove_file(&path)?;
        debug!(path = %path, "Purged checkpoint");
    }
    Ok(stale.to_vec())
}
