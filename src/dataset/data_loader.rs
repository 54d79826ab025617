//! Sequence-aware batch planning.
//!
//! A [`DataLoader`] does not hold frames; it yields [`FrameBatch`]es of
//! indices into the [`FrameDataset`] it was built for. Every batch draws its
//! frames from a single sequence, and the plan for a given `(seed, epoch)`
//! is deterministic.

use super::{DatasetMap, FrameDataset};
use crate::config::SequenceDataLoaderMapProviderArgs;
use crate::constants::splits;
use crate::error::{TrainerError, TrainerResult};

/// Frame indices of one batch, all from `sequence_name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBatch {
    pub sequence_name: String,
    pub frame_indices: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SamplingMode {
    /// `num_batches` sampled batches, optionally reshuffled every epoch
    Sampled { num_batches: usize, reshuffle: bool },
    /// One batch per sequence holding all of its frames
    FullSequences,
}

#[derive(Debug, Clone)]
pub struct DataLoader {
    split: String,
    sequences: Vec<(String, Vec<usize>)>,
    args: SequenceDataLoaderMapProviderArgs,
    seed: u64,
    mode: SamplingMode,
}

impl DataLoader {
    fn new(
        dataset: &FrameDataset,
        args: &SequenceDataLoaderMapProviderArgs,
        seed: u64,
        mode: SamplingMode,
    ) -> Self {
        let sequences = dataset
            .sequence_names()
            .map(|name| (name.to_string(), dataset.sequence_frame_indices(name).to_vec()))
            .filter(|(_, indices)| !indices.is_empty())
            .collect();
        Self {
            split: dataset.name().to_string(),
            sequences,
            args: args.clone(),
            seed,
            mode,
        }
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    /// Number of batches per epoch
    pub fn len(&self) -> usize {
        if self.sequences.is_empty() {
            return 0;
        }
        match self.mode {
            SamplingMode::Sampled { num_batches, .. } => num_batches,
            SamplingMode::FullSequences => self.sequences.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batch plan for `epoch`
    pub fn batches(&self, epoch: u64) -> Vec<FrameBatch> {
        if self.sequences.is_empty() {
            return Vec::new();
        }
        match self.mode {
            SamplingMode::FullSequences => self
                .sequences
                .iter()
                .map(|(name, indices)| FrameBatch {
                    sequence_name: name.clone(),
                    frame_indices: indices.clone(),
                })
                .collect(),
            SamplingMode::Sampled {
                num_batches,
                reshuffle,
            } => {
                let epoch = if reshuffle { epoch } else { 0 };
                (0..num_batches)
                    .map(|batch| self.sample_batch(epoch, num_batches, batch))
                    .collect()
            }
        }
    }

    fn sample_batch(&self, epoch: u64, num_batches: usize, batch: usize) -> FrameBatch {
        let global = self
            .seed
            .wrapping_add(epoch.wrapping_mul(num_batches as u64))
            .wrapping_add(batch as u64);
        let sequence_count = self.sequences.len() as u64;
        let (name, indices) = &self.sequences[(global % sequence_count) as usize];

        let requested = if self.args.images_per_seq_options.is_empty() {
            self.args.batch_size
        } else {
            self.args.images_per_seq_options[batch % self.args.images_per_seq_options.len()]
        };
        let size = requested.clamp(1, indices.len());
        let offset = (global / sequence_count) as usize;

        let frame_indices = if self.args.sample_consecutive_frames {
            self.consecutive_window(indices, size, offset)
        } else {
            spread(indices, size, offset)
        };

        FrameBatch {
            sequence_name: name.clone(),
            frame_indices,
        }
    }

    /// `size` neighbouring frames starting at a rotating position, each step
    /// at most `consecutive_frames_max_gap` positions apart (0 = adjacent)
    fn consecutive_window(&self, indices: &[usize], size: usize, offset: usize) -> Vec<usize> {
        let stride = usize::try_from(self.args.consecutive_frames_max_gap)
            .unwrap_or(usize::MAX)
            .max(1);
        let stride = stride.min((indices.len() - 1).checked_div(size.saturating_sub(1)).unwrap_or(1).max(1));
        let span = (size - 1) * stride + 1;
        let start = offset % (indices.len() - span + 1);
        (0..size).map(|i| indices[start + i * stride]).collect()
    }
}

/// `size` frames evenly spread over the sequence, rotated by `offset`
fn spread(indices: &[usize], size: usize, offset: usize) -> Vec<usize> {
    let step = indices.len() / size;
    let start = offset % step.max(1);
    let mut picked: Vec<usize> = (0..size).map(|i| indices[start + i * step]).collect();
    picked.sort_unstable();
    picked
}

/// Loaders for each split of a [`DatasetMap`]
#[derive(Debug, Clone, Default)]
pub struct DataLoaderMap {
    pub train: Option<DataLoader>,
    pub val: Option<DataLoader>,
    pub test: Option<DataLoader>,
}

/// Builds data loaders over the dataset splits
pub trait DataLoaderMapProvider {
    fn get_data_loader_map(&self, datasets: &DatasetMap) -> TrainerResult<DataLoaderMap>;
}

#[derive(Debug, Clone)]
pub struct SequenceDataLoaderMapProvider {
    args: SequenceDataLoaderMapProviderArgs,
    seed: u64,
}

impl SequenceDataLoaderMapProvider {
    pub fn new(args: SequenceDataLoaderMapProviderArgs, seed: u64) -> Self {
        Self { args, seed }
    }

    fn validate(&self) -> TrainerResult<()> {
        if self.args.batch_size == 0 {
            return Err(TrainerError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.args.images_per_seq_options.contains(&0) {
            return Err(TrainerError::Configuration(
                "images_per_seq_options entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl DataLoaderMapProvider for SequenceDataLoaderMapProvider {
    fn get_data_loader_map(&self, datasets: &DatasetMap) -> TrainerResult<DataLoaderMap> {
        self.validate()?;

        let train = datasets.train.as_ref().map(|dataset| {
            DataLoader::new(
                dataset,
                &self.args,
                self.seed,
                SamplingMode::Sampled {
                    num_batches: self.args.dataset_len,
                    reshuffle: true,
                },
            )
        });
        // validation batches never change between epochs
        let val = datasets.val.as_ref().map(|dataset| {
            DataLoader::new(
                dataset,
                &self.args,
                self.seed,
                SamplingMode::Sampled {
                    num_batches: self.args.dataset_len_val,
                    reshuffle: false,
                },
            )
        });
        let test = datasets
            .test
            .as_ref()
            .map(|dataset| DataLoader::new(dataset, &self.args, self.seed, SamplingMode::FullSequences));

        for (split, loader) in [
            (splits::TRAIN, &train),
            (splits::VAL, &val),
            (splits::TEST, &test),
        ] {
            if let Some(loader) = loader {
                crate::log_data!(debug, "Data loader built",
                    split: split,
                    batches_per_epoch: loader.len()
                );
            }
        }

        Ok(DataLoaderMap { train, val, test })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::frame;
    use super::*;
    use crate::config::ExperimentConfig;

    fn dataset(name: &str, sequences: &[(&str, u64)]) -> FrameDataset {
        let frames = sequences
            .iter()
            .flat_map(|(seq, count)| (0..*count).map(move |n| frame(seq, n)))
            .collect();
        FrameDataset::new(name, frames)
    }

    fn default_args() -> SequenceDataLoaderMapProviderArgs {
        ExperimentConfig::default()
            .data_source_args
            .data_loader_map_provider_sequence_args
    }

    fn dataset_map() -> DatasetMap {
        DatasetMap {
            train: Some(dataset("train", &[("a", 10), ("b", 4), ("c", 7)])),
            val: Some(dataset("val", &[("a", 2), ("b", 2)])),
            test: Some(dataset("test", &[("a", 3), ("c", 1)])),
        }
    }

    fn assert_single_sequence(dataset: &FrameDataset, batch: &FrameBatch) {
        let frames = dataset.gather(&batch.frame_indices).unwrap();
        assert!(frames.iter().all(|f| f.sequence_name == batch.sequence_name));
    }

    #[test]
    fn test_train_loader_respects_dataset_len() {
        let mut args = default_args();
        args.dataset_len = 6;
        args.batch_size = 3;
        let datasets = dataset_map();
        let loaders = SequenceDataLoaderMapProvider::new(args, 0)
            .get_data_loader_map(&datasets)
            .unwrap();

        let train = loaders.train.unwrap();
        let batches = train.batches(0);
        assert_eq!(batches.len(), 6);
        for batch in &batches {
            assert_single_sequence(datasets.train.as_ref().unwrap(), batch);
            assert_eq!(batch.frame_indices.len(), 3);
        }
    }

    #[test]
    fn test_batches_are_deterministic_per_epoch() {
        let mut args = default_args();
        args.dataset_len = 5;
        args.batch_size = 2;
        let loaders = SequenceDataLoaderMapProvider::new(args.clone(), 42)
            .get_data_loader_map(&dataset_map())
            .unwrap();
        let again = SequenceDataLoaderMapProvider::new(args, 42)
            .get_data_loader_map(&dataset_map())
            .unwrap();

        let train = loaders.train.unwrap();
        assert_eq!(train.batches(3), again.train.unwrap().batches(3));
        assert_ne!(train.batches(0), train.batches(1));
    }

    #[test]
    fn test_batch_size_capped_by_sequence_length() {
        let mut args = default_args();
        args.dataset_len = 9;
        args.batch_size = 8;
        let datasets = dataset_map();
        let loaders = SequenceDataLoaderMapProvider::new(args, 0)
            .get_data_loader_map(&datasets)
            .unwrap();

        for batch in loaders.train.unwrap().batches(0) {
            let available = datasets
                .train
                .as_ref()
                .unwrap()
                .sequence_frame_indices(&batch.sequence_name)
                .len();
            assert_eq!(batch.frame_indices.len(), available.min(8));
        }
    }

    #[test]
    fn test_images_per_seq_options_cycle() {
        let mut args = default_args();
        args.dataset_len = 4;
        args.images_per_seq_options = vec![1, 2];
        let datasets = DatasetMap {
            train: Some(dataset("train", &[("a", 10)])),
            ..Default::default()
        };
        let loaders = SequenceDataLoaderMapProvider::new(args, 0)
            .get_data_loader_map(&datasets)
            .unwrap();

        let sizes: Vec<usize> = loaders
            .train
            .unwrap()
            .batches(0)
            .iter()
            .map(|b| b.frame_indices.len())
            .collect();
        assert_eq!(sizes, vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_consecutive_frames_respect_max_gap() {
        let mut args = default_args();
        args.dataset_len = 10;
        args.batch_size = 3;
        args.sample_consecutive_frames = true;
        args.consecutive_frames_max_gap = 2;
        let datasets = DatasetMap {
            train: Some(dataset("train", &[("a", 10)])),
            ..Default::default()
        };
        let loaders = SequenceDataLoaderMapProvider::new(args, 7)
            .get_data_loader_map(&datasets)
            .unwrap();

        for batch in loaders.train.unwrap().batches(0) {
            assert_eq!(batch.frame_indices.len(), 3);
            for pair in batch.frame_indices.windows(2) {
                assert!(pair[1] > pair[0]);
                assert!(pair[1] - pair[0] <= 2);
            }
        }
    }

    #[test]
    fn test_val_and_test_loaders() {
        let datasets = dataset_map();
        let loaders = SequenceDataLoaderMapProvider::new(default_args(), 0)
            .get_data_loader_map(&datasets)
            .unwrap();

        let val = loaders.val.unwrap();
        assert_eq!(val.len(), 1);
        assert_eq!(val.batches(0), val.batches(5));

        let test = loaders.test.unwrap();
        let batches = test.batches(0);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].sequence_name, "a");
        assert_eq!(batches[0].frame_indices, vec![0, 1, 2]);
        assert_eq!(batches[1].frame_indices, vec![3]);
    }

    #[test]
    fn test_empty_split_yields_no_batches() {
        let datasets = DatasetMap {
            train: Some(FrameDataset::new("train", Vec::new())),
            ..Default::default()
        };
        let loaders = SequenceDataLoaderMapProvider::new(default_args(), 0)
            .get_data_loader_map(&datasets)
            .unwrap();
        let train = loaders.train.unwrap();
        assert!(train.is_empty());
        assert!(train.batches(0).is_empty());
        assert!(loaders.val.is_none());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut args = default_args();
        args.batch_size = 0;
        assert!(SequenceDataLoaderMapProvider::new(args, 0)
            .get_data_loader_map(&dataset_map())
            .is_err());
    }
}
