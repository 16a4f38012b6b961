//! CIFAR-10 image classification pipeline: download the dataset, preprocess
//! it into normalized one-hot shards, train a small convolutional network,
//! then reload the checkpoint and evaluate it on the test split.

pub mod data;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod preprocess;
pub mod training;

use burn::optim::AdamConfig;
use burn::tensor::backend::AutodiffBackend;

use crate::model::ModelConfig;
use crate::training::TrainingConfig;

pub const ARTIFACT_DIR: &str = "/tmp/image-classification";

/// Run the full pipeline on the given device.
pub fn run<B: AutodiffBackend>(device: B::Device) {
    let data_dir = dataset::default_data_dir();
    let raw_dir = dataset::download_and_extract(&data_dir)
        .expect("CIFAR-10 archive should download and extract");

    let prepared_dir = data_dir.join("preprocessed");
    preprocess::preprocess_and_save(&raw_dir, &prepared_dir)
        .expect("Preprocessing should complete");

    training::train::<B>(
        ARTIFACT_DIR,
        &prepared_dir,
        TrainingConfig::new(ModelConfig::new(), AdamConfig::new()),
        device.clone(),
    );

    inference::test_model::<B::InnerBackend>(ARTIFACT_DIR, &prepared_dir, device);
}
