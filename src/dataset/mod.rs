//! # Datasets
//!
//! Frame annotations grouped into train/val/test splits by a
//! [`DatasetMapProvider`], and per-epoch batch plans built over those splits
//! by a [`DataLoaderMapProvider`]. Both are selected by class-type name from
//! [`DataSourceArgs`].

pub mod data_loader;
pub mod json_index;

use crate::config::DataSourceArgs;
use crate::constants::class_types;
use crate::error::{TrainerError, TrainerResult};
use crate::path_manager::PathManager;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use data_loader::{
    DataLoader, DataLoaderMap, DataLoaderMapProvider, FrameBatch, SequenceDataLoaderMapProvider,
};
pub use json_index::JsonIndexDatasetMapProvider;

/// Camera pose and intrinsics in row-vector convention:
/// `x_cam = x_world * R + T`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    #[serde(rename = "R")]
    pub rotation: [[f64; 3]; 3],
    #[serde(rename = "T")]
    pub translation: [f64; 3],
    pub focal_length: [f64; 2],
    pub principal_point: [f64; 2],
}

impl Viewpoint {
    fn rotation_matrix(&self) -> Matrix3<f64> {
        let r = &self.rotation;
        Matrix3::new(
            r[0][0], r[0][1], r[0][2], //
            r[1][0], r[1][1], r[1][2], //
            r[2][0], r[2][1], r[2][2],
        )
    }

    /// Camera centre in world coordinates
    pub fn camera_center(&self) -> Vector3<f64> {
        -(self.rotation_matrix() * Vector3::from(self.translation))
    }

    /// Unit viewing direction (camera +z) in world coordinates
    pub fn optical_axis(&self) -> Vector3<f64> {
        let axis = self.rotation_matrix().column(2).into_owned();
        let norm = axis.norm();
        if norm > 0.0 {
            axis / norm
        } else {
            Vector3::z()
        }
    }
}

/// One annotated frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnnotation {
    pub sequence_name: String,
    pub frame_number: u64,
    #[serde(default)]
    pub frame_timestamp: f64,
    pub image_path: String,
    pub viewpoint: Viewpoint,
}

/// Frames of one split, ordered by sequence name then frame number
#[derive(Debug, Clone, Default)]
pub struct FrameDataset {
    name: String,
    frames: Vec<FrameAnnotation>,
    sequences: BTreeMap<String, Vec<usize>>,
}

impl FrameDataset {
    pub fn new<N: Into<String>>(name: N, mut frames: Vec<FrameAnnotation>) -> Self {
        frames.sort_by(|a, b| {
            a.sequence_name
                .cmp(&b.sequence_name)
                .then(a.frame_number.cmp(&b.frame_number))
        });
        let mut sequences: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, frame) in frames.iter().enumerate() {
            sequences
                .entry(frame.sequence_name.clone())
                .or_default()
                .push(index);
        }
        Self {
            name: name.into(),
            frames,
            sequences,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, index: usize) -> Option<&FrameAnnotation> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[FrameAnnotation] {
        &self.frames
    }

    /// Sorted sequence names
    pub fn sequence_names(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(String::as_str)
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// Frame indices of one sequence in frame-number order
    pub fn sequence_frame_indices(&self, sequence_name: &str) -> &[usize] {
        self.sequences
            .get(sequence_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve batch indices into frames
    pub fn gather(&self, indices: &[usize]) -> TrainerResult<Vec<&FrameAnnotation>> {
        indices
            .iter()
            .map(|&index| {
                self.frames.get(index).ok_or_else(|| {
                    TrainerError::Dataset(format!(
                        "frame index {index} out of range for split '{}' ({} frames)",
                        self.name,
                        self.frames.len()
                    ))
                })
            })
            .collect()
    }
}

/// Train/val/test splits; a split is `None` when the provider was asked
/// not to build it
#[derive(Debug, Clone, Default)]
pub struct DatasetMap {
    pub train: Option<FrameDataset>,
    pub val: Option<FrameDataset>,
    pub test: Option<FrameDataset>,
}

impl DatasetMap {
    pub fn splits(&self) -> impl Iterator<Item = &FrameDataset> {
        [&self.train, &self.val, &self.test]
            .into_iter()
            .filter_map(Option::as_ref)
    }
}

/// Builds the dataset splits for an experiment
pub trait DatasetMapProvider {
    fn get_dataset_map(&self) -> TrainerResult<DatasetMap>;
}

/// Instantiate the dataset map provider selected in `args`
pub fn build_dataset_map_provider(
    args: &DataSourceArgs,
    path_manager: Arc<PathManager>,
) -> TrainerResult<Box<dyn DatasetMapProvider>> {
    match args.dataset_map_provider_class_type.as_str() {
        class_types::JSON_INDEX_DATASET_MAP_PROVIDER => Ok(Box::new(
            JsonIndexDatasetMapProvider::new(
                args.dataset_map_provider_json_index_args.clone(),
                path_manager,
            )?,
        )),
        other => Err(TrainerError::unknown_class_type("dataset map provider", other)),
    }
}

/// Instantiate the data loader map provider selected in `args`
pub fn build_data_loader_map_provider(
    args: &DataSourceArgs,
    seed: u64,
) -> TrainerResult<Box<dyn DataLoaderMapProvider>> {
    match args.data_loader_map_provider_class_type.as_str() {
        class_types::SEQUENCE_DATA_LOADER_MAP_PROVIDER => Ok(Box::new(
            SequenceDataLoaderMapProvider::new(
                args.data_loader_map_provider_sequence_args.clone(),
                seed,
            ),
        )),
        other => Err(TrainerError::unknown_class_type("data loader map provider", other)),
    }
}
