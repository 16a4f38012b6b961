use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use burn::data::dataset::{Dataset, InMemDataset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{self, CifarRecord, DatasetError, NUM_CLASSES, NUM_TRAIN_SHARDS};

/// A preprocessed sample: pixel values rescaled to `[0, 1]` in CHW order and
/// the label as a one-hot vector of length [`NUM_CLASSES`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreparedItem {
    pub image: Vec<f32>,
    pub target: Vec<f32>,
}

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("shard encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("shard decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Rescale the entire input to `[0, 1]` by its global minimum and maximum.
///
/// When the input has no spread (all values equal, a single value, or no
/// values at all) the rescaling is undefined; this returns all zeros rather
/// than dividing by zero.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if values.is_empty() || range <= 0.0 {
        return vec![0.0; values.len()];
    }

    values.iter().map(|v| (v - min) / range).collect()
}

/// One-hot encode labels into standard basis vectors of length `num_classes`.
///
/// The class count is explicit so the encoding width does not depend on which
/// labels happen to be present in the slice.
pub fn one_hot_encode(labels: &[u8], num_classes: usize) -> Vec<Vec<f32>> {
    labels
        .iter()
        .map(|&label| {
            assert!(
                (label as usize) < num_classes,
                "label {label} out of range for {num_classes} classes"
            );
            let mut encoded = vec![0.0; num_classes];
            encoded[label as usize] = 1.0;
            encoded
        })
        .collect()
}

/// Normalize a whole shard at once and one-hot encode its labels.
pub fn prepare_items(records: &[CifarRecord]) -> Vec<PreparedItem> {
    let pixels: Vec<f32> = records
        .iter()
        .flat_map(|record| record.image.iter().map(|&b| b as f32))
        .collect();
    let pixels = normalize(&pixels);

    let labels: Vec<u8> = records.iter().map(|record| record.label).collect();
    let targets = one_hot_encode(&labels, NUM_CLASSES);

    pixels
        .chunks_exact(dataset::IMAGE_BYTES)
        .zip(targets)
        .map(|(image, target)| PreparedItem {
            image: image.to_vec(),
            target,
        })
        .collect()
}

/// Number of items kept for training; the remainder is the validation slice.
fn split_index(len: usize) -> usize {
    len - len / 10
}

fn train_path(out_dir: &Path, shard_id: usize) -> PathBuf {
    out_dir.join(format!("preprocess_batch_{shard_id}.bin"))
}

fn validation_path(out_dir: &Path) -> PathBuf {
    out_dir.join("preprocess_validation.bin")
}

fn test_path(out_dir: &Path) -> PathBuf {
    out_dir.join("preprocess_test.bin")
}

fn write_shard(path: &Path, items: &[PreparedItem]) -> Result<(), PreprocessError> {
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serde::encode_into_std_write(items, &mut writer, bincode::config::standard())?;
    Ok(())
}

fn load_shard(path: &Path) -> Result<Vec<PreparedItem>, PreprocessError> {
    let mut reader = BufReader::new(File::open(path)?);
    let items = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
    Ok(items)
}

/// Preprocess every raw shard and serialize the results to `out_dir`.
///
/// The last 10 % of each training shard is split off into a shared
/// validation file. Skipped entirely when all output files already exist.
pub fn preprocess_and_save(raw_dir: &Path, out_dir: &Path) -> Result<(), PreprocessError> {
    let all_present = (1..=NUM_TRAIN_SHARDS).all(|i| train_path(out_dir, i).exists())
        && validation_path(out_dir).exists()
        && test_path(out_dir).exists();
    if all_present {
        log::info!("preprocessed shards already present in {}", out_dir.display());
        return Ok(());
    }

    fs::create_dir_all(out_dir)?;

    let mut validation = Vec::new();
    for shard_id in 1..=NUM_TRAIN_SHARDS {
        let records = dataset::read_shard(&dataset::train_shard_path(raw_dir, shard_id))?;
        let items = prepare_items(&records);
        let split = split_index(items.len());

        write_shard(&train_path(out_dir, shard_id), &items[..split])?;
        validation.extend_from_slice(&items[split..]);
        log::info!("preprocessed training shard {shard_id} ({split} train items)");
    }
    write_shard(&validation_path(out_dir), &validation)?;

    let records = dataset::read_shard(&dataset::test_shard_path(raw_dir))?;
    write_shard(&test_path(out_dir), &prepare_items(&records))?;

    Ok(())
}

/// Preprocessed CIFAR-10 split backed by an in-memory dataset.
pub struct PreparedDataset {
    dataset: InMemDataset<PreparedItem>,
}

impl Dataset<PreparedItem> for PreparedDataset {
    fn get(&self, index: usize) -> Option<PreparedItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl PreparedDataset {
    /// All preprocessed training shards, concatenated.
    pub fn train(out_dir: &Path) -> Result<Self, PreprocessError> {
        let mut items = Vec::new();
        for shard_id in 1..=NUM_TRAIN_SHARDS {
            items.extend(load_shard(&train_path(out_dir, shard_id))?);
        }
        Ok(Self::from_items(items))
    }

    pub fn validation(out_dir: &Path) -> Result<Self, PreprocessError> {
        Ok(Self::from_items(load_shard(&validation_path(out_dir))?))
    }

    pub fn test(out_dir: &Path) -> Result<Self, PreprocessError> {
        Ok(Self::from_items(load_shard(&test_path(out_dir))?))
    }

    pub fn from_items(items: Vec<PreparedItem>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_extremes_to_unit_range() {
        let normalized = normalize(&[0.0, 128.0, 255.0]);

        assert_eq!(normalized[0], 0.0);
        assert_eq!(normalized[2], 1.0);
        assert!(normalized.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn normalize_is_relative_to_the_input_given() {
        let normalized = normalize(&[10.0, 20.0]);

        assert_eq!(normalized, vec![0.0, 1.0]);
    }

    #[test]
    fn normalize_constant_input_falls_back_to_zeros() {
        // A 32x32x3 all-128 image has no spread; the documented fallback is
        // an all-zero output instead of a division by zero.
        let constant = vec![128.0; dataset::IMAGE_BYTES];

        assert_eq!(normalize(&constant), vec![0.0; dataset::IMAGE_BYTES]);
        assert_eq!(normalize(&[]), Vec::<f32>::new());
        assert_eq!(normalize(&[7.0]), vec![0.0]);
    }

    #[test]
    fn one_hot_encode_produces_standard_basis_vectors() {
        let encoded = one_hot_encode(&[0, 1, 2], 3);

        assert_eq!(
            encoded,
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ]
        );
    }

    #[test]
    fn one_hot_width_does_not_depend_on_labels_present() {
        // Even when the highest class is absent, the width stays fixed.
        let encoded = one_hot_encode(&[0, 3], NUM_CLASSES);

        assert!(encoded.iter().all(|v| v.len() == NUM_CLASSES));
        assert_eq!(encoded[1][3], 1.0);
        assert_eq!(encoded[1].iter().sum::<f32>(), 1.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn one_hot_rejects_label_outside_class_range() {
        one_hot_encode(&[10], NUM_CLASSES);
    }

    #[test]
    fn prepare_items_normalizes_and_encodes_per_shard() {
        let records = vec![
            CifarRecord {
                label: 2,
                image: vec![0; dataset::IMAGE_BYTES],
            },
            CifarRecord {
                label: 9,
                image: vec![255; dataset::IMAGE_BYTES],
            },
        ];

        let items = prepare_items(&records);

        assert_eq!(items.len(), 2);
        assert!(items[0].image.iter().all(|&v| v == 0.0));
        assert!(items[1].image.iter().all(|&v| v == 1.0));
        assert_eq!(items[0].target[2], 1.0);
        assert_eq!(items[1].target[9], 1.0);
        assert_eq!(items[0].target.iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn split_keeps_ninety_percent_for_training() {
        assert_eq!(split_index(20), 18);
        assert_eq!(split_index(10_000), 9_000);
        assert_eq!(split_index(9), 9); // too small to split
    }

    #[test]
    fn shard_serialization_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocess_batch_1.bin");
        let items = vec![PreparedItem {
            image: vec![0.0, 0.5, 1.0],
            target: vec![0.0, 1.0],
        }];

        write_shard(&path, &items).unwrap();
        let loaded = load_shard(&path).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].image, items[0].image);
        assert_eq!(loaded[0].target, items[0].target);
    }
}
