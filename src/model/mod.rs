//! # Models
//!
//! A model maps a batch of frames from one sequence to an objective and the
//! gradients of that objective with respect to its named parameters.

pub mod scene_center;

use crate::config::ModelArgs;
use crate::constants::class_types;
use crate::dataset::FrameAnnotation;
use crate::error::{TrainerError, TrainerResult};
use nalgebra::Vector3;
use std::collections::BTreeMap;

pub use scene_center::SceneCenterModel;

/// Result of one forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// Weighted loss minimised by the optimizer
    pub objective: f64,
    /// Gradient of `objective` per parameter name
    pub gradients: Vec<(String, Vector3<f64>)>,
    /// Unweighted metrics reported in the epoch stats
    pub metrics: BTreeMap<String, f64>,
}

pub trait Model: std::fmt::Debug {
    fn class_type(&self) -> &'static str;

    /// Evaluate on `frames`, all belonging to `sequence_name`
    fn forward(&self, sequence_name: &str, frames: &[&FrameAnnotation]) -> TrainerResult<ModelOutput>;

    /// Mutable access to a parameter, creating it from the initial value when new
    fn parameter_mut(&mut self, name: &str) -> &mut Vector3<f64>;

    fn state(&self) -> TrainerResult<serde_json::Value>;

    fn load_state(&mut self, state: serde_json::Value) -> TrainerResult<()>;
}

/// Instantiate the model selected in `args`
pub fn build_model(args: &ModelArgs) -> TrainerResult<Box<dyn Model>> {
    match args.model_class_type.as_str() {
        class_types::SCENE_CENTER_MODEL => Ok(Box::new(SceneCenterModel::new(args)?)),
        other => Err(TrainerError::unknown_class_type("model", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_model() {
        let model = build_model(&ModelArgs::default()).unwrap();
        assert_eq!(model.class_type(), class_types::SCENE_CENTER_MODEL);

        let args = ModelArgs {
            model_class_type: "NeRF".to_string(),
            ..ModelArgs::default()
        };
        assert!(matches!(
            build_model(&args),
            Err(TrainerError::UnknownClassType { kind: "model", .. })
        ));
    }
}
