//! Per-epoch metric aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Averaged metrics of one pass over a split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub split: String,
    pub epoch: u64,
    pub batches: usize,
    pub frames: usize,
    /// Learning rate in effect; `None` for evaluation passes
    pub lr: Option<f64>,
    pub objective: f64,
    pub metrics: BTreeMap<String, f64>,
}

/// Running frame-weighted means
#[derive(Debug, Default)]
pub(crate) struct StatsAccumulator {
    batches: usize,
    frames: usize,
    objective_sum: f64,
    metric_sums: BTreeMap<String, f64>,
}

impl StatsAccumulator {
    pub(crate) fn update(&mut self, frames: usize, objective: f64, metrics: &BTreeMap<String, f64>) {
        let weight = frames as f64;
        self.batches += 1;
        self.frames += frames;
        self.objective_sum += objective * weight;
        for (name, value) in metrics {
            *self.metric_sums.entry(name.clone()).or_insert(0.0) += value * weight;
        }
    }

    pub(crate) fn batches(&self) -> usize {
        self.batches
    }

    /// Mean objective so far
    pub(crate) fn objective(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.objective_sum / self.frames as f64
        }
    }

    pub(crate) fn finish(self, split: &str, epoch: u64, lr: Option<f64>) -> EpochStats {
        let objective = self.objective();
        let frames = self.frames.max(1) as f64;
        EpochStats {
            split: split.to_string(),
            epoch,
            batches: self.batches,
            frames: self.frames,
            lr,
            objective,
            metrics: self
                .metric_sums
                .into_iter()
                .map(|(name, sum)| (name, sum / frames))
                .collect(),
        }
    }
}
