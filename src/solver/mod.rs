//! # Solver
//!
//! Optimizer breeds and learning rate policies built from [`SolverArgs`].

pub mod lr_policy;
pub mod optimizer;

use crate::config::SolverArgs;
use crate::error::TrainerResult;

pub use lr_policy::LrPolicy;
pub use optimizer::{clip_grad_norm, Breed, Optimizer};

/// Optimizer plus the schedule driving its learning rate
#[derive(Debug, Clone)]
pub struct Solver {
    pub optimizer: Optimizer,
    pub lr_policy: LrPolicy,
    base_lr: f64,
}

impl Solver {
    pub fn from_args(args: &SolverArgs) -> TrainerResult<Self> {
        Ok(Self {
            optimizer: Optimizer::from_args(args)?,
            lr_policy: LrPolicy::from_args(args)?,
            base_lr: args.lr,
        })
    }

    pub fn lr_at(&self, epoch: u64) -> f64 {
        self.lr_policy.lr_at(self.base_lr, epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_solver() {
        let solver = Solver::from_args(&SolverArgs::default()).unwrap();
        assert!(matches!(solver.optimizer.breed(), Breed::Adam { .. }));
        assert_eq!(solver.lr_at(0), 0.0005);
        assert_eq!(solver.lr_at(999), 0.0005);
    }

    #[test]
    fn test_invalid_names_fail() {
        let args = SolverArgs {
            lr_policy: "Plateau".to_string(),
            ..SolverArgs::default()
        };
        assert!(Solver::from_args(&args).is_err());
    }
}
