//! # Experiment Runner
//!
//! Drives one training run end to end: builds the data and model from an
//! [`ExperimentConfig`], optionally restores the newest checkpoint, then
//! alternates training epochs with validation and test passes.

use crate::checkpoint::{self, Checkpoint};
use crate::config::ExperimentConfig;
use crate::constants::{files, splits};
use crate::dataset::{
    build_data_loader_map_provider, build_dataset_map_provider, DataLoader, FrameDataset,
};
use crate::device::Device;
use crate::error::{TrainerError, TrainerResult};
use crate::model::{build_model, Model};
use crate::path_manager::{join_path, PathManager};
use crate::solver::{clip_grad_norm, Solver};
use crate::stats::{EpochStats, StatsAccumulator};
use chrono::Utc;
use std::sync::Arc;

/// Outcome of [`run_training`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub device: Device,
    pub exp_dir: String,
    /// First epoch trained in this run (after resuming)
    pub start_epoch: u64,
    pub epochs_run: u64,
    pub resumed_from: Option<String>,
    pub train_stats: Vec<EpochStats>,
    pub val_stats: Vec<EpochStats>,
    pub test_stats: Vec<EpochStats>,
    /// Checkpoints written by this run, in order
    pub checkpoints: Vec<String>,
}

impl TrainingSummary {
    pub fn last_train_objective(&self) -> Option<f64> {
        self.train_stats.last().map(|s| s.objective)
    }
}

/// Train with a path manager that only knows the local filesystem
pub fn run_training(cfg: &ExperimentConfig, device: Device) -> TrainerResult<TrainingSummary> {
    run_training_with_path_manager(cfg, device, Arc::new(PathManager::new()))
}

pub fn run_training_with_path_manager(
    cfg: &ExperimentConfig,
    device: Device,
    path_manager: Arc<PathManager>,
) -> TrainerResult<TrainingSummary> {
    cfg.validate_for_training()?;

    crate::log_training!(info, "Starting experiment",
        device: device.to_string(),
        exp_dir: cfg.exp_dir,
        max_epochs: cfg.solver_args.max_epochs,
        eval_only: cfg.eval_only
    );

    path_manager.mkdirs(&cfg.exp_dir)?;
    path_manager.write_string(
        &join_path(&cfg.exp_dir, &[files::EXPERIMENT_CONFIG]),
        &cfg.to_yaml()?,
    )?;

    let dataset_map = build_dataset_map_provider(&cfg.data_source_args, Arc::clone(&path_manager))?
        .get_dataset_map()?;
    let loaders = build_data_loader_map_provider(&cfg.data_source_args, cfg.seed)?
        .get_data_loader_map(&dataset_map)?;

    let mut model = build_model(&cfg.model_args)?;
    let mut solver = Solver::from_args(&cfg.solver_args)?;

    let mut summary = TrainingSummary {
        device,
        exp_dir: cfg.exp_dir.clone(),
        start_epoch: 0,
        epochs_run: 0,
        resumed_from: None,
        train_stats: Vec::new(),
        val_stats: Vec::new(),
        test_stats: Vec::new(),
        checkpoints: Vec::new(),
    };
    let mut history = Vec::new();

    if cfg.resume || cfg.eval_only {
        if let Some(path) = checkpoint::find_checkpoint(&path_manager, &cfg.exp_dir, cfg.resume_epoch)? {
            let restored = checkpoint::load_checkpoint(&path_manager, &path)?;
            if restored.model_class_type != model.class_type() {
                return Err(TrainerError::checkpoint(
                    &path,
                    format!(
                        "checkpoint holds a {} but the experiment builds a {}",
                        restored.model_class_type,
                        model.class_type()
                    ),
                ));
            }
            model.load_state(restored.model_state)?;
            solver.optimizer = serde_json::from_value(restored.optimizer_state)
                .map_err(|e| TrainerError::checkpoint(&path, e))?;
            summary.start_epoch = restored.epoch + 1;
            history = restored.stats;
            crate::log_training!(info, "Resumed from checkpoint", path: path, epoch: restored.epoch);
            summary.resumed_from = Some(path);
        }
    }

    let test_split = dataset_map.test.as_ref().zip(loaders.test.as_ref());

    if cfg.eval_only {
        let Some((dataset, loader)) = test_split else {
            return Err(TrainerError::Training(
                "eval_only requested but the dataset has no test split".to_string(),
            ));
        };
        let epoch = summary.start_epoch.saturating_sub(1);
        summary
            .test_stats
            .push(evaluate(&*model, dataset, loader, epoch, splits::TEST)?);
        return Ok(summary);
    }

    let (train_dataset, train_loader) = dataset_map
        .train
        .as_ref()
        .zip(loaders.train.as_ref())
        .ok_or_else(|| TrainerError::Training("the dataset has no train split".to_string()))?;
    if train_loader.is_empty() {
        return Err(TrainerError::Training(
            "the train split yields no batches".to_string(),
        ));
    }

    for epoch in summary.start_epoch..cfg.solver_args.max_epochs {
        let stats = train_epoch(
            cfg,
            &mut *model,
            &mut solver,
            train_dataset,
            train_loader,
            epoch,
        )?;
        history.push(stats.clone());
        summary.train_stats.push(stats);

        if cfg.validation_interval > 0 && epoch % cfg.validation_interval as u64 == 0 {
            if let Some((dataset, loader)) = dataset_map.val.as_ref().zip(loaders.val.as_ref()) {
                let stats = evaluate(&*model, dataset, loader, epoch, splits::VAL)?;
                history.push(stats.clone());
                summary.val_stats.push(stats);
            }
        }

        if let Ok(interval) = u64::try_from(cfg.test_interval) {
            if interval > 0 && epoch % interval == 0 {
                if let Some((dataset, loader)) = test_split {
                    let stats = evaluate(&*model, dataset, loader, epoch, splits::TEST)?;
                    history.push(stats.clone());
                    summary.test_stats.push(stats);
                }
            }
        }

        if cfg.store_checkpoints {
            let stored = Checkpoint {
                epoch,
                model_class_type: model.class_type().to_string(),
                model_state: model.state()?,
                optimizer_state: serde_json::to_value(&solver.optimizer)?,
                stats: history.clone(),
                created_at: Utc::now(),
            };
            summary
                .checkpoints
                .push(checkpoint::save_checkpoint(&path_manager, &cfg.exp_dir, &stored)?);
            checkpoint::purge_checkpoints(&path_manager, &cfg.exp_dir, cfg.store_checkpoints_purge)?;
        }

        summary.epochs_run += 1;
    }

    if cfg.test_when_finished {
        if let Some((dataset, loader)) = test_split {
            let epoch = cfg.solver_args.max_epochs.saturating_sub(1);
            summary
                .test_stats
                .push(evaluate(&*model, dataset, loader, epoch, splits::TEST)?);
        }
    }

    crate::log_training!(info, "Experiment finished",
        epochs_run: summary.epochs_run,
        final_objective: summary.last_train_objective()
    );
    Ok(summary)
}

fn train_epoch(
    cfg: &ExperimentConfig,
    model: &mut dyn Model,
    solver: &mut Solver,
    dataset: &FrameDataset,
    loader: &DataLoader,
    epoch: u64,
) -> TrainerResult<EpochStats> {
    let lr = solver.lr_at(epoch);
    let mut acc = StatsAccumulator::default();

    for batch in loader.batches(epoch) {
        let frames = dataset.gather(&batch.frame_indices)?;
        let output = model.forward(&batch.sequence_name, &frames)?;
        if !output.objective.is_finite() {
            return Err(TrainerError::Training(format!(
                "non-finite objective {} at epoch {epoch} on sequence '{}'",
                output.objective, batch.sequence_name
            )));
        }

        let (names, mut grads): (Vec<String>, Vec<_>) = output.gradients.into_iter().unzip();
        if cfg.clip_grad > 0.0 {
            clip_grad_norm(&mut grads, cfg.clip_grad);
        }
        for (name, grad) in names.iter().zip(&grads) {
            solver.optimizer.step(name, model.parameter_mut(name), grad, lr);
        }

        acc.update(frames.len(), output.objective, &output.metrics);
        if cfg.metric_print_interval > 0 && acc.batches() % cfg.metric_print_interval == 0 {
            crate::log_training!(info, "Training progress",
                epoch: epoch,
                batch: acc.batches(),
                lr: lr,
                objective: acc.objective()
            );
        }
    }

    Ok(acc.finish(splits::TRAIN, epoch, Some(lr)))
}

fn evaluate(
    model: &dyn Model,
    dataset: &FrameDataset,
    loader: &DataLoader,
    epoch: u64,
    split: &str,
) -> TrainerResult<EpochStats> {
    let mut acc = StatsAccumulator::default();
    for batch in loader.batches(epoch) {
        let frames = dataset.gather(&batch.frame_indices)?;
        let output = model.forward(&batch.sequence_name, &frames)?;
        acc.update(frames.len(), output.objective, &output.metrics);
    }
    let stats = acc.finish(split, epoch, None);
    crate::log_training!(info, "Evaluation finished",
        split: split,
        epoch: epoch,
        objective: stats.objective
    );
    Ok(stats)
}
