//! First-order optimizers over named 3-vector parameters.
//!
//! State is kept per parameter name so that parameters created mid-training
//! (e.g. a sequence seen for the first time) start with fresh moments while
//! the rest keep theirs.

use crate::config::SolverArgs;
use crate::error::{TrainerError, TrainerResult};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ADAM_EPS: f64 = 1e-8;
const ADAGRAD_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Breed {
    Adam { beta1: f64, beta2: f64 },
    Sgd { momentum: f64 },
    Adagrad,
}

impl Breed {
    pub fn from_args(args: &SolverArgs) -> TrainerResult<Self> {
        match args.breed.to_lowercase().as_str() {
            "adam" => Ok(Breed::Adam {
                beta1: args.betas[0],
                beta2: args.betas[1],
            }),
            "sgd" => Ok(Breed::Sgd {
                momentum: args.momentum,
            }),
            "adagrad" => Ok(Breed::Adagrad),
            _ => Err(TrainerError::Configuration(format!(
                "Unknown solver breed '{}', expected Adam, SGD or Adagrad",
                args.breed
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ParamState {
    step: u64,
    /// First moment (Adam), momentum buffer (SGD) or squared-gradient sum (Adagrad)
    m: [f64; 3],
    /// Second moment (Adam only)
    v: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimizer {
    breed: Breed,
    weight_decay: f64,
    state: BTreeMap<String, ParamState>,
}

impl Optimizer {
    pub fn new(breed: Breed, weight_decay: f64) -> Self {
        Self {
            breed,
            weight_decay,
            state: BTreeMap::new(),
        }
    }

    pub fn from_args(args: &SolverArgs) -> TrainerResult<Self> {
        Ok(Self::new(Breed::from_args(args)?, args.weight_decay))
    }

    pub fn breed(&self) -> Breed {
        self.breed
    }

    /// Number of updates applied to `name` so far
    pub fn steps_taken(&self, name: &str) -> u64 {
        self.state.get(name).map_or(0, |s| s.step)
    }

    /// Apply one update to `param` with learning rate `lr`
    pub fn step(&mut self, name: &str, param: &mut Vector3<f64>, grad: &Vector3<f64>, lr: f64) {
        let grad = grad + *param * self.weight_decay;
        let state = self.state.entry(name.to_string()).or_default();
        state.step += 1;

        let mut m = Vector3::from(state.m);
        let mut v = Vector3::from(state.v);

        let update = match self.breed {
            Breed::Adam { beta1, beta2 } => {
                let t = state.step as f64;
                m = m * beta1 + grad * (1.0 - beta1);
                v = v * beta2 + grad.component_mul(&grad) * (1.0 - beta2);

                let m_hat = m / (1.0 - beta1.powf(t));
                let v_hat = v / (1.0 - beta2.powf(t));
                m_hat.zip_map(&v_hat, |m, v| m / (v.sqrt() + ADAM_EPS))
            }
            Breed::Sgd { momentum } => {
                if momentum > 0.0 {
                    m = if state.step == 1 { grad } else { m * momentum + grad };
                    m
                } else {
                    grad
                }
            }
            Breed::Adagrad => {
                m += grad.component_mul(&grad);
                grad.zip_map(&m, |g, sum| g / (sum.sqrt() + ADAGRAD_EPS))
            }
        };

        *param -= update * lr;
        state.m = m.into();
        state.v = v.into();
    }
}

/// Rescale `grads` so their joint L2 norm is at most `max_norm`
///
/// Returns the norm before clipping. A non-positive `max_norm` leaves the
/// gradients untouched.
pub fn clip_grad_norm(grads: &mut [Vector3<f64>], max_norm: f64) -> f64 {
    let total = grads.iter().map(|g| g.norm_squared()).sum::<f64>().sqrt();
    if max_norm > 0.0 && total > max_norm {
        let scale = max_norm / (total + 1e-6);
        for grad in grads.iter_mut() {
            *grad *= scale;
        }
    }
    total
}
