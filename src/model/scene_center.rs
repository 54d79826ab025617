//! Per-sequence scene centre estimation.
//!
//! Each sequence gets one point `p`. A frame contributes the squared distance
//! from `p` to its viewing ray `C + s*d`:
//!
//! ```text
//! loss(p) = |(I - d d^T)(p - C)|^2
//! grad(p) = 2 (I - d d^T)(p - C)
//! ```
//!
//! Cameras of a turntable-style capture all look at the object, so the
//! minimiser is the object centre.

use super::{Model, ModelOutput};
use crate::config::ModelArgs;
use crate::constants::class_types;
use crate::dataset::FrameAnnotation;
use crate::error::{TrainerError, TrainerResult};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const METRIC_RAY_DISTANCE: &str = "ray_distance";
pub const METRIC_OBJECTIVE: &str = "objective";

#[derive(Debug, Clone, PartialEq)]
pub struct SceneCenterModel {
    init: Vector3<f64>,
    loss_weight: f64,
    centers: BTreeMap<String, Vector3<f64>>,
}

#[derive(Serialize, Deserialize)]
struct SceneCenterState {
    centers: BTreeMap<String, [f64; 3]>,
}

/// Projector onto the plane orthogonal to the ray direction
fn ray_projector(frame: &FrameAnnotation) -> (Matrix3<f64>, Vector3<f64>) {
    let d = frame.viewpoint.optical_axis();
    (Matrix3::identity() - d * d.transpose(), frame.viewpoint.camera_center())
}

impl SceneCenterModel {
    pub fn new(args: &ModelArgs) -> TrainerResult<Self> {
        if !args.loss_weight.is_finite() || args.loss_weight <= 0.0 {
            return Err(TrainerError::Configuration(format!(
                "model loss_weight must be positive, got {}",
                args.loss_weight
            )));
        }
        Ok(Self {
            init: Vector3::from(args.scene_center_init),
            loss_weight: args.loss_weight,
            centers: BTreeMap::new(),
        })
    }

    pub fn center(&self, sequence_name: &str) -> Option<&Vector3<f64>> {
        self.centers.get(sequence_name)
    }

    /// Exact least-squares centre for `frames`; `None` when all rays are parallel
    pub fn closed_form_center(frames: &[&FrameAnnotation]) -> Option<Vector3<f64>> {
        let (a, b) = frames.iter().fold(
            (Matrix3::<f64>::zeros(), Vector3::<f64>::zeros()),
            |(a, b), frame| {
                let (projector, center) = ray_projector(frame);
                (a + projector, b + projector * center)
            },
        );
        a.lu().solve(&b).filter(|p| p.iter().all(|v| v.is_finite()))
    }
}

impl Model for SceneCenterModel {
    fn class_type(&self) -> &'static str {
        class_types::SCENE_CENTER_MODEL
    }

    fn forward(&self, sequence_name: &str, frames: &[&FrameAnnotation]) -> TrainerResult<ModelOutput> {
        if frames.is_empty() {
            return Err(TrainerError::Training(format!(
                "empty batch for sequence '{sequence_name}'"
            )));
        }
        let p = self.centers.get(sequence_name).copied().unwrap_or(self.init);

        let (loss_sum, grad_sum) = frames.iter().fold(
            (0.0, Vector3::zeros()),
            |(loss, grad): (f64, Vector3<f64>), frame| {
                let (projector, center) = ray_projector(frame);
                let residual = projector * (p - center);
                (loss + residual.norm_squared(), grad + residual * 2.0)
            },
        );
        let n = frames.len() as f64;
        let ray_distance = loss_sum / n;
        let objective = self.loss_weight * ray_distance;

        Ok(ModelOutput {
            objective,
            gradients: vec![(sequence_name.to_string(), grad_sum * (self.loss_weight / n))],
            metrics: BTreeMap::from([
                (METRIC_RAY_DISTANCE.to_string(), ray_distance),
                (METRIC_OBJECTIVE.to_string(), objective),
            ]),
        })
    }

    fn parameter_mut(&mut self, name: &str) -> &mut Vector3<f64> {
        self.centers.entry(name.to_string()).or_insert(self.init)
    }

    fn state(&self) -> TrainerResult<serde_json::Value> {
        let state = SceneCenterState {
            centers: self
                .centers
                .iter()
                .map(|(name, c)| (name.clone(), [c.x, c.y, c.z]))
                .collect(),
        };
        Ok(serde_json::to_value(state)?)
    }

    fn load_state(&mut self, state: serde_json::Value) -> TrainerResult<()> {
        let state: SceneCenterState = serde_json::from_value(state)?;
        self.centers = state
            .centers
            .into_iter()
            .map(|(name, c)| (name, Vector3::from(c)))
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_fixtures::frame_around;

    fn frames(target: Vector3<f64>) -> Vec<FrameAnnotation> {
        (0..6).map(|n| frame_around("seq", n, target)).collect()
    }

    #[test]
    fn test_zero_loss_at_target() {
        let target = Vector3::new(0.5, -1.0, 2.0);
        let owned = frames(target);
        let batch: Vec<&FrameAnnotation> = owned.iter().collect();

        let mut model = SceneCenterModel::new(&ModelArgs::default()).unwrap();
        *model.parameter_mut("seq") = target;
        let output = model.forward("seq", &batch).unwrap();

        assert!(output.objective < 1e-18);
        assert!(output.gradients[0].1.norm() < 1e-9);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let owned = frames(Vector3::new(1.0, 0.0, 0.0));
        let batch: Vec<&FrameAnnotation> = owned.iter().collect();
        let args = ModelArgs {
            loss_weight: 2.5,
            ..ModelArgs::default()
        };
        let mut model = SceneCenterModel::new(&args).unwrap();
        let p = Vector3::new(0.3, 0.7, -0.2);
        *model.parameter_mut("seq") = p;

        let analytic = model.forward("seq", &batch).unwrap().gradients[0].1;
        let h = 1e-6;
        for axis in 0..3 {
            let mut offset = Vector3::zeros();
            offset[axis] = h;
            *model.parameter_mut("seq") = p + offset;
            let plus = model.forward("seq", &batch).unwrap().objective;
            *model.parameter_mut("seq") = p - offset;
            let minus = model.forward("seq", &batch).unwrap().objective;
            let numeric = (plus - minus) / (2.0 * h);
            assert!((numeric - analytic[axis]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_closed_form_recovers_target() {
        let target = Vector3::new(-2.0, 0.25, 3.0);
        let owned = frames(target);
        let batch: Vec<&FrameAnnotation> = owned.iter().collect();
        let center = SceneCenterModel::closed_form_center(&batch).unwrap();
        assert!((center - target).norm() < 1e-9);
    }

    #[test]
    fn test_unknown_sequence_uses_init() {
        let args = ModelArgs {
            scene_center_init: [1.0, 2.0, 3.0],
            ..ModelArgs::default()
        };
        let mut model = SceneCenterModel::new(&args).unwrap();
        assert!(model.center("fresh").is_none());
        assert_eq!(*model.parameter_mut("fresh"), Vector3::new(1.0, 2.0, 3.0));
        assert!(model.center("fresh").is_some());
    }

    #[test]
    fn test_empty_batch_fails() {
        let model = SceneCenterModel::new(&ModelArgs::default()).unwrap();
        assert!(matches!(
            model.forward("seq", &[]),
            Err(TrainerError::Training(_))
        ));
    }

    #[test]
    fn test_state_round_trip() {
        let mut model = SceneCenterModel::new(&ModelArgs::default()).unwrap();
        *model.parameter_mut("a") = Vector3::new(1.0, 2.0, 3.0);
        let state = model.state().unwrap();

        let mut restored = SceneCenterModel::new(&ModelArgs::default()).unwrap();
        restored.load_state(state).unwrap();
        assert_eq!(restored, model);
        assert!(restored.load_state(serde_json::json!({"bogus": 1})).is_err());
    }

    #[test]
    fn test_rejects_non_positive_loss_weight() {
        let args = ModelArgs {
            loss_weight: 0.0,
            ..ModelArgs::default()
        };
        assert!(SceneCenterModel::new(&args).is_err());
    }
}
