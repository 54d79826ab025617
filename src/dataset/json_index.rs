//! JSON index dataset map provider.
//!
//! Reads a category directory laid out as
//!
//! ```text
//! <dataset_root>/<category>/frame_annotations.json   [FrameAnnotation, ...]
//! <dataset_root>/<category>/set_lists.json           {"train_known": [[seq, frame, path], ...], ...}
//! ```
//!
//! through an injected [`PathManager`], so the root may be a local directory
//! or any URI the manager has a handler for.

use super::{DatasetMap, DatasetMapProvider, FrameAnnotation, FrameDataset};
use crate::config::JsonIndexDatasetMapProviderArgs;
use crate::constants::{files, splits, tasks, MISSING};
use crate::error::{TrainerError, TrainerResult};
use crate::path_manager::{join_path, PathManager};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// `[sequence_name, frame_number, image_path]`
type SetListEntry = (String, u64, String);

pub struct JsonIndexDatasetMapProvider {
    args: JsonIndexDatasetMapProviderArgs,
    path_manager: Arc<PathManager>,
}

impl std::fmt::Debug for JsonIndexDatasetMapProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonIndexDatasetMapProvider")
            .field("args", &self.args)
            .field("handlers", &self.path_manager.registered_prefixes())
            .finish()
    }
}

impl JsonIndexDatasetMapProvider {
    pub fn new(
        args: JsonIndexDatasetMapProviderArgs,
        path_manager: Arc<PathManager>,
    ) -> TrainerResult<Self> {
        if args.task_str != tasks::SINGLE_SEQUENCE && args.task_str != tasks::MULTI_SEQUENCE {
            return Err(TrainerError::Configuration(format!(
                "Unknown task_str '{}', expected '{}' or '{}'",
                args.task_str,
                tasks::SINGLE_SEQUENCE,
                tasks::MULTI_SEQUENCE
            )));
        }
        if args.category.is_empty() || args.category == MISSING {
            return Err(TrainerError::Configuration(
                "JsonIndexDatasetMapProvider requires a category".to_string(),
            ));
        }
        if args.dataset_root.is_empty() {
            return Err(TrainerError::Configuration(
                "JsonIndexDatasetMapProvider requires a dataset_root".to_string(),
            ));
        }
        if args.test_restrict_sequence_id >= 0 {
            if args.task_str != tasks::SINGLE_SEQUENCE {
                return Err(TrainerError::Configuration(
                    "test_restrict_sequence_id is only meaningful for singlesequence tasks"
                        .to_string(),
                ));
            }
            if !args.restrict_sequence_name.is_empty() {
                return Err(TrainerError::Configuration(
                    "test_restrict_sequence_id and restrict_sequence_name are mutually exclusive"
                        .to_string(),
                ));
            }
        }
        Ok(Self { args, path_manager })
    }

    pub fn args(&self) -> &JsonIndexDatasetMapProviderArgs {
        &self.args
    }

    fn category_root(&self) -> String {
        join_path(&self.args.dataset_root, &[&self.args.category])
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, file_name: &str) -> TrainerResult<T> {
        let path = join_path(&self.category_root(), &[file_name]);
        debug!(path = %path, "Loading dataset index file");
        let contents = self.path_manager.read_to_string(&path)?;
        serde_json::from_str(&contents)
            .map_err(|e| TrainerError::Dataset(format!("Failed to parse '{path}': {e}")))
    }

    /// Set-list names feeding each split
    fn set_names_mapping(&self) -> Vec<(&'static str, Vec<String>)> {
        let single_sequence = self.args.task_str == tasks::SINGLE_SEQUENCE;
        let subset_name = |prefix: &str, subset: &str| format!("{prefix}_{subset}");
        let mut mapping = Vec::new();

        if !self.args.only_test_set {
            let prefix = if self.args.test_on_train {
                splits::TEST
            } else {
                splits::TRAIN
            };
            let subset = if single_sequence {
                splits::SUBSET_KNOWN
            } else {
                splits::SUBSET_UNSEEN
            };
            mapping.push((splits::TRAIN, vec![subset_name(prefix, subset)]));
        }

        let mut prefixes = vec![splits::TEST];
        if !single_sequence {
            prefixes.push(splits::TRAIN);
        }
        let eval_sets: Vec<String> = prefixes
            .iter()
            .flat_map(|prefix| {
                [splits::SUBSET_KNOWN, splits::SUBSET_UNSEEN]
                    .iter()
                    .map(move |subset| subset_name(prefix, subset))
            })
            .collect();

        if !self.args.test_on_train && !self.args.only_test_set {
            mapping.push((splits::VAL, eval_sets.clone()));
        }
        mapping.push((splits::TEST, eval_sets));
        mapping
    }

    /// Sequence names every split is restricted to; empty means no restriction
    fn restricted_sequences(
        &self,
        split_frames: &BTreeMap<&'static str, Vec<FrameAnnotation>>,
    ) -> TrainerResult<BTreeSet<String>> {
        if self.args.test_restrict_sequence_id < 0 {
            return Ok(self.args.restrict_sequence_name.iter().cloned().collect());
        }

        let test_sequences: BTreeSet<&str> = split_frames
            .get(splits::TEST)
            .into_iter()
            .flatten()
            .map(|frame| frame.sequence_name.as_str())
            .collect();
        let index = usize::try_from(self.args.test_restrict_sequence_id).unwrap_or(usize::MAX);
        let name = test_sequences.iter().nth(index).ok_or_else(|| {
            TrainerError::Dataset(format!(
                "test_restrict_sequence_id {} out of range: test split has {} sequence(s)",
                self.args.test_restrict_sequence_id,
                test_sequences.len()
            ))
        })?;
        debug!(sequence = %name, "Restricting all splits to test sequence");
        Ok(BTreeSet::from([name.to_string()]))
    }

    fn apply_limits(&self, frames: Vec<FrameAnnotation>, split: &str) -> FrameDataset {
        let mut dataset = FrameDataset::new(split, frames);

        if self.args.limit_sequences_to > 0 {
            let keep: BTreeSet<String> = dataset
                .sequence_names()
                .take(self.args.limit_sequences_to)
                .map(str::to_string)
                .collect();
            let frames = dataset
                .frames()
                .iter()
                .filter(|frame| keep.contains(&frame.sequence_name))
                .cloned()
                .collect();
            dataset = FrameDataset::new(split, frames);
        }

        if self.args.n_frames_per_sequence > 0 {
            let per_sequence = usize::try_from(self.args.n_frames_per_sequence).unwrap_or(usize::MAX);
            let frames = dataset
                .sequence_names()
                .flat_map(|name| {
                    dataset
                        .sequence_frame_indices(name)
                        .iter()
                        .take(per_sequence)
                        .filter_map(|&index| dataset.frame(index).cloned())
                })
                .collect();
            dataset = FrameDataset::new(split, frames);
        }

        if self.args.limit_to > 0 && dataset.len() > self.args.limit_to {
            let frames = dataset.frames()[..self.args.limit_to].to_vec();
            dataset = FrameDataset::new(split, frames);
        }

        dataset
    }
}

impl DatasetMapProvider for JsonIndexDatasetMapProvider {
    fn get_dataset_map(&self) -> TrainerResult<DatasetMap> {
        let annotations: Vec<FrameAnnotation> = self.read_json(files::FRAME_ANNOTATIONS)?;
        let set_lists: HashMap<String, Vec<SetListEntry>> = self.read_json(files::SET_LISTS)?;

        let by_key: HashMap<(&str, u64), &FrameAnnotation> = annotations
            .iter()
            .map(|frame| ((frame.sequence_name.as_str(), frame.frame_number), frame))
            .collect();

        let mut split_frames: BTreeMap<&'static str, Vec<FrameAnnotation>> = BTreeMap::new();
        for (split, set_names) in self.set_names_mapping() {
            let mut frames = Vec::new();
            for set_name in &set_names {
                let Some(entries) = set_lists.get(set_name) else {
                    debug!(split = split, set_list = %set_name, "Set list absent, skipping");
                    continue;
                };
                for (sequence_name, frame_number, _) in entries {
                    let frame = by_key
                        .get(&(sequence_name.as_str(), *frame_number))
                        .ok_or_else(|| {
                            TrainerError::Dataset(format!(
                                "set list '{set_name}' references unknown frame {sequence_name}/{frame_number}"
                            ))
                        })?;
                    frames.push((*frame).clone());
                }
            }
            split_frames.insert(split, frames);
        }

        let restrict = self.restricted_sequences(&split_frames)?;
        if !restrict.is_empty() {
            for frames in split_frames.values_mut() {
                frames.retain(|frame| restrict.contains(&frame.sequence_name));
            }
        }

        let mut dataset_map = DatasetMap::default();
        for (split, frames) in split_frames {
            let dataset = self.apply_limits(frames, split);
            match split {
                splits::TRAIN => dataset_map.train = Some(dataset),
                splits::VAL => dataset_map.val = Some(dataset),
                _ => dataset_map.test = Some(dataset),
            }
        }

        if self.args.assert_single_seq {
            if let Some(split) = dataset_map.splits().find(|d| d.sequence_count() > 1) {
                return Err(TrainerError::Dataset(format!(
                    "assert_single_seq set but split '{}' holds {} sequences",
                    split.name(),
                    split.sequence_count()
                )));
            }
        }

        for split in dataset_map.splits() {
            crate::log_data!(info, "Dataset split built",
                category: self.args.category,
                split: split.name(),
                sequences: split.sequence_count(),
                frames: split.len()
            );
        }

        Ok(dataset_map)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::frame;
    use super::*;
    use crate::config::ExperimentConfig;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_category(root: &Path, category: &str, frames: &[FrameAnnotation], set_lists: serde_json::Value) {
        let dir = root.join(category);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(files::FRAME_ANNOTATIONS),
            serde_json::to_string(frames).unwrap(),
        )
        .unwrap();
        fs::write(dir.join(files::SET_LISTS), set_lists.to_string()).unwrap();
    }

    fn entries(frames: &[FrameAnnotation]) -> serde_json::Value {
        serde_json::Value::Array(
            frames
                .iter()
                .map(|f| serde_json::json!([f.sequence_name, f.frame_number, f.image_path]))
                .collect(),
        )
    }

    /// Three sequences with four frames each; frames 0-2 train, frame 3 test
    fn setup_dataset() -> (TempDir, JsonIndexDatasetMapProviderArgs) {
        let temp_dir = TempDir::new().unwrap();
        let mut all = Vec::new();
        let mut train = Vec::new();
        let mut test = Vec::new();
        for sequence in ["seq_c", "seq_a", "seq_b"] {
            for number in 0..4 {
                let f = frame(sequence, number);
                if number < 3 {
                    train.push(f.clone());
                } else {
                    test.push(f.clone());
                }
                all.push(f);
            }
        }
        write_category(
            temp_dir.path(),
            "skateboard",
            &all,
            serde_json::json!({
                "train_known": entries(&train),
                "test_known": entries(&test),
            }),
        );

        let mut args = ExperimentConfig::default()
            .data_source_args
            .dataset_map_provider_json_index_args;
        args.category = "skateboard".to_string();
        args.dataset_root = temp_dir.path().to_string_lossy().into_owned();
        (temp_dir, args)
    }

    fn provider(args: JsonIndexDatasetMapProviderArgs) -> JsonIndexDatasetMapProvider {
        JsonIndexDatasetMapProvider::new(args, Arc::new(PathManager::new())).unwrap()
    }

    #[test]
    fn test_singlesequence_split_mapping() {
        let (_temp_dir, args) = setup_dataset();
        let map = provider(args).get_dataset_map().unwrap();

        let train = map.train.unwrap();
        assert_eq!(train.len(), 9);
        assert_eq!(train.sequence_count(), 3);
        assert_eq!(map.val.unwrap().len(), 3);
        assert_eq!(map.test.unwrap().len(), 3);
    }

    #[test]
    fn test_restrict_to_test_sequence_id() {
        let (_temp_dir, mut args) = setup_dataset();
        args.test_restrict_sequence_id = 1;
        let map = provider(args).get_dataset_map().unwrap();

        for split in map.splits() {
            assert_eq!(split.sequence_names().collect::<Vec<_>>(), vec!["seq_b"]);
        }
        assert_eq!(map.train.unwrap().len(), 3);
    }

    #[test]
    fn test_restrict_sequence_id_out_of_range() {
        let (_temp_dir, mut args) = setup_dataset();
        args.test_restrict_sequence_id = 7;
        let result = provider(args).get_dataset_map();
        assert!(matches!(result, Err(TrainerError::Dataset(_))));
    }

    #[test]
    fn test_limits() {
        let (_temp_dir, mut args) = setup_dataset();
        args.limit_sequences_to = 2;
        args.n_frames_per_sequence = 2;
        let map = provider(args.clone()).get_dataset_map().unwrap();
        let train = map.train.unwrap();
        assert_eq!(train.sequence_names().collect::<Vec<_>>(), vec!["seq_a", "seq_b"]);
        assert_eq!(train.len(), 4);

        args.limit_to = 3;
        let map = provider(args).get_dataset_map().unwrap();
        assert_eq!(map.train.unwrap().len(), 3);
    }

    #[test]
    fn test_only_test_set_and_test_on_train() {
        let (_temp_dir, mut args) = setup_dataset();
        args.only_test_set = true;
        let map = provider(args.clone()).get_dataset_map().unwrap();
        assert!(map.train.is_none());
        assert!(map.val.is_none());
        assert_eq!(map.test.unwrap().len(), 3);

        args.only_test_set = false;
        args.test_on_train = true;
        let map = provider(args).get_dataset_map().unwrap();
        // train reads test_known; no validation split
        assert_eq!(map.train.unwrap().len(), 3);
        assert!(map.val.is_none());
    }

    #[test]
    fn test_assert_single_seq() {
        let (_temp_dir, mut args) = setup_dataset();
        args.assert_single_seq = true;
        assert!(provider(args.clone()).get_dataset_map().is_err());

        args.test_restrict_sequence_id = 0;
        assert!(provider(args).get_dataset_map().is_ok());
    }

    #[test]
    fn test_unknown_frame_in_set_list() {
        let temp_dir = TempDir::new().unwrap();
        let known = vec![frame("seq_a", 0)];
        write_category(
            temp_dir.path(),
            "apple",
            &known,
            serde_json::json!({ "train_known": [["seq_a", 5, "missing.jpg"]] }),
        );

        let mut args = ExperimentConfig::default()
            .data_source_args
            .dataset_map_provider_json_index_args;
        args.category = "apple".to_string();
        args.dataset_root = temp_dir.path().to_string_lossy().into_owned();

        assert!(matches!(
            provider(args).get_dataset_map(),
            Err(TrainerError::Dataset(_))
        ));
    }

    #[test]
    fn test_remote_root_without_handler_fails() {
        let (_temp_dir, mut args) = setup_dataset();
        args.dataset_root = "manifold://co3d/tree/extracted".to_string();
        let result = provider(args).get_dataset_map();
        assert!(matches!(result, Err(TrainerError::Path(_))));
    }

    #[test]
    fn test_constructor_validation() {
        let (_temp_dir, args) = setup_dataset();
        let path_manager = Arc::new(PathManager::new());

        let mut bad = args.clone();
        bad.task_str = "fewview".to_string();
        assert!(JsonIndexDatasetMapProvider::new(bad, Arc::clone(&path_manager)).is_err());

        let mut bad = args.clone();
        bad.category = MISSING.to_string();
        assert!(JsonIndexDatasetMapProvider::new(bad, Arc::clone(&path_manager)).is_err());

        let mut bad = args.clone();
        bad.task_str = tasks::MULTI_SEQUENCE.to_string();
        bad.test_restrict_sequence_id = 0;
        assert!(JsonIndexDatasetMapProvider::new(bad, Arc::clone(&path_manager)).is_err());

        let mut bad = args;
        bad.test_restrict_sequence_id = 0;
        bad.restrict_sequence_name = vec!["seq_a".to_string()];
        assert!(JsonIndexDatasetMapProvider::new(bad, path_manager).is_err());
    }
}
