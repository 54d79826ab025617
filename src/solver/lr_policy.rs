//! Learning rate schedules.

use crate::config::SolverArgs;
use crate::error::{TrainerError, TrainerResult};
use serde::{Deserialize, Serialize};

/// Per-epoch multiplier applied to the base learning rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LrPolicy {
    /// `gamma` raised to the number of milestones already reached
    MultiStep { milestones: Vec<u64>, gamma: f64 },
    /// `gamma^(epoch / step_size)`
    Exponential { gamma: f64, step_size: u64 },
    /// Linear ramp from `start_gamma` to 1 over `milestone` epochs, then
    /// exponential decay measured from the milestone
    LinearExponential {
        milestone: u64,
        start_gamma: f64,
        gamma: f64,
        step_size: u64,
    },
}

impl LrPolicy {
    pub fn from_args(args: &SolverArgs) -> TrainerResult<Self> {
        let step_size = args.exponential_lr_step_size.max(1);
        match args.lr_policy.to_lowercase().as_str() {
            "multisteplr" | "multistep" => {
                let mut milestones = args.milestones.clone();
                milestones.sort_unstable();
                Ok(LrPolicy::MultiStep {
                    milestones,
                    gamma: args.gamma,
                })
            }
            "exponential" => Ok(LrPolicy::Exponential {
                gamma: args.gamma,
                step_size,
            }),
            "linearexponential" => Ok(LrPolicy::LinearExponential {
                milestone: args.linear_exponential_lr_milestone,
                start_gamma: args.linear_exponential_start_gamma,
                gamma: args.gamma,
                step_size,
            }),
            _ => Err(TrainerError::Configuration(format!(
                "Unknown lr_policy '{}', expected MultiStepLR, Exponential or LinearExponential",
                args.lr_policy
            ))),
        }
    }

    pub fn factor(&self, epoch: u64) -> f64 {
        match self {
            LrPolicy::MultiStep { milestones, gamma } => {
                let reached = milestones.iter().filter(|&&m| m <= epoch).count();
                gamma.powi(i32::try_from(reached).unwrap_or(i32::MAX))
            }
            LrPolicy::Exponential { gamma, step_size } => {
                gamma.powf(epoch as f64 / *step_size as f64)
            }
            LrPolicy::LinearExponential {
                milestone,
                start_gamma,
                gamma,
                step_size,
            } => {
                if epoch < *milestone {
                    let w = (*milestone - epoch) as f64 / *milestone as f64;
                    w * start_gamma + (1.0 - w)
                } else {
                    gamma.powf((epoch - milestone) as f64 / *step_size as f64)
                }
            }
        }
    }

    /// Learning rate for `epoch` given the base rate
    pub fn lr_at(&self, base_lr: f64, epoch: u64) -> f64 {
        base_lr * self.factor(epoch)
    }
}
