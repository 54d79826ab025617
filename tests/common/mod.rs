//! Shared fixtures for the integration tests.

#![allow(dead_code)] // Not every test binary uses every builder

use implicitron_trainer::constants::files;
use implicitron_trainer::dataset::{FrameAnnotation, Viewpoint};
use implicitron_trainer::ExperimentConfig;
use nalgebra::{Matrix3, Vector3};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Camera at `eye` looking at `target`
pub fn viewpoint_looking_at(eye: Vector3<f64>, target: Vector3<f64>) -> Viewpoint {
    let z = (target - eye).normalize();
    let helper = if z.y.abs() < 0.9 { Vector3::y() } else { Vector3::x() };
    let x = helper.cross(&z).normalize();
    let y = z.cross(&x);
    let r = Matrix3::from_columns(&[x, y, z]);
    let t = -(r.transpose() * eye);
    Viewpoint {
        rotation: [
            [r[(0, 0)], r[(0, 1)], r[(0, 2)]],
            [r[(1, 0)], r[(1, 1)], r[(1, 2)]],
            [r[(2, 0)], r[(2, 1)], r[(2, 2)]],
        ],
        translation: [t.x, t.y, t.z],
        focal_length: [1.0, 1.0],
        principal_point: [0.0, 0.0],
    }
}

/// Builder for an on-disk category directory in the JSON index layout
///
/// Every sequence orbits its own object centre; the first
/// `train_frames` frames of each sequence go to `train_known`, the rest to
/// `test_known`.
pub struct DatasetBuilder {
    category: String,
    sequences: Vec<(String, Vector3<f64>, u64)>,
    train_frames: u64,
}

impl DatasetBuilder {
    pub fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            sequences: Vec::new(),
            train_frames: 4,
        }
    }

    pub fn with_sequence(mut self, name: &str, center: [f64; 3], frames: u64) -> Self {
        self.sequences
            .push((name.to_string(), Vector3::from(center), frames));
        self
    }

    pub fn with_train_frames(mut self, train_frames: u64) -> Self {
        self.train_frames = train_frames;
        self
    }

    /// Write the category below `root`
    pub fn write(&self, root: &Path) {
        let mut annotations = Vec::new();
        let mut train = Vec::new();
        let mut test = Vec::new();

        for (name, center, frames) in &self.sequences {
            for n in 0..*frames {
                let angle = n as f64 * 0.7;
                let eye = center
                    + Vector3::new(5.0 * angle.cos(), 1.0 + 0.1 * n as f64, 5.0 * angle.sin());
                let image_path = format!("{name}/images/frame{n:06}.jpg");
                let entry = serde_json::json!([name, n, image_path]);
                if n < self.train_frames {
                    train.push(entry);
                } else {
                    test.push(entry);
                }
                annotations.push(FrameAnnotation {
                    sequence_name: name.clone(),
                    frame_number: n,
                    frame_timestamp: n as f64 / 30.0,
                    image_path,
                    viewpoint: viewpoint_looking_at(eye, *center),
                });
            }
        }

        let dir = root.join(&self.category);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(files::FRAME_ANNOTATIONS),
            serde_json::to_string_pretty(&annotations).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.join(files::SET_LISTS),
            serde_json::json!({ "train_known": train, "test_known": test }).to_string(),
        )
        .unwrap();
    }
}

/// Small CPU experiment over a dataset written below `temp_dir`
pub fn experiment_config(temp_dir: &TempDir, dataset_root: &str, category: &str) -> ExperimentConfig {
    let mut cfg = ExperimentConfig::default();
    cfg.exp_dir = temp_dir
        .path()
        .join("experiment")
        .to_string_lossy()
        .into_owned();

    let data_source = &mut cfg.data_source_args;
    data_source.dataset_map_provider_class_type = "JsonIndexDatasetMapProvider".to_string();
    data_source.dataset_map_provider_json_index_args.category = category.to_string();
    data_source.dataset_map_provider_json_index_args.dataset_root = dataset_root.to_string();
    data_source.data_loader_map_provider_sequence_args.dataset_len = 20;
    data_source.data_loader_map_provider_sequence_args.batch_size = 3;

    cfg.solver_args.lr = 0.05;
    cfg.solver_args.max_epochs = 3;
    cfg.metric_print_interval = 10;
    cfg
}
