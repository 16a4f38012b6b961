use std::path::Path;

use burn::{
    config::Config,
    data::{
        dataloader::{batcher::Batcher, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::Module,
    record::{CompactRecorder, Recorder},
    tensor::{activation::softmax, backend::Backend, ElementConversion},
};
use rand::seq::index::sample;

use crate::{
    data::ClassificationBatcher,
    dataset::LABEL_NAMES,
    model::Model,
    preprocess::{PreparedDataset, PreparedItem},
    training::TrainingConfig,
};

const NUM_SAMPLES: usize = 4;
const TOP_N_PREDICTIONS: usize = 3;

/// Restore the trained model from the artifacts saved by
/// [`train`](crate::training::train) into a fresh module.
pub fn load_trained<B: Backend>(artifact_dir: &str, device: &B::Device) -> Model<B> {
    let config = TrainingConfig::load(format!("{artifact_dir}/config.json"))
        .expect("Config should exist for the model");
    let record = CompactRecorder::new()
        .load(format!("{artifact_dir}/model").into(), device)
        .expect("Trained model should exist");

    config.model.init::<B>(device).load_record(record)
}

/// Accuracy over the whole dataset, in percent.
///
/// Batches are weighted by their size, so a short final batch does not skew
/// the result.
pub fn test_accuracy<B: Backend>(
    model: &Model<B>,
    dataset: PreparedDataset,
    batch_size: usize,
    device: &B::Device,
) -> f64 {
    let dataloader = DataLoaderBuilder::new(ClassificationBatcher)
        .batch_size(batch_size)
        .build(dataset);

    let mut correct = 0usize;
    let mut total = 0usize;

    for batch in dataloader.iter() {
        let batch_len = batch.images.dims()[0];
        let output = model.forward(batch.images);
        let predictions = output.argmax(1).flatten::<1>(0, 1);

        let hits: i64 = predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        correct += hits as usize;
        total += batch_len;
    }

    100.0 * correct as f64 / total as f64
}

/// Evaluate the saved checkpoint against the preprocessed test shard and
/// print a few random sample predictions with their top class probabilities.
pub fn test_model<B: Backend>(artifact_dir: &str, prepared_dir: &Path, device: B::Device) {
    let config = TrainingConfig::load(format!("{artifact_dir}/config.json"))
        .expect("Config should exist for the model");
    let model = load_trained::<B>(artifact_dir, &device);

    let dataset = PreparedDataset::test(prepared_dir).expect("Test shard should be prepared");
    let samples = draw_samples(&dataset, NUM_SAMPLES);

    let accuracy = test_accuracy(&model, dataset, config.batch_size, &device);
    println!("Testing Accuracy: {accuracy:.2}%");

    display_predictions(&model, samples, &device);
}

fn draw_samples(dataset: &PreparedDataset, count: usize) -> Vec<PreparedItem> {
    let mut rng = rand::rng();
    sample(&mut rng, dataset.len(), count.min(dataset.len()))
        .iter()
        .filter_map(|index| dataset.get(index))
        .collect()
}

fn display_predictions<B: Backend>(model: &Model<B>, samples: Vec<PreparedItem>, device: &B::Device) {
    let batch = ClassificationBatcher.batch(samples, device);
    let logits = model.forward(batch.images);
    let probabilities = softmax(logits, 1);

    let (top_probabilities, top_classes) =
        probabilities.topk_with_indices(TOP_N_PREDICTIONS, 1);

    let top_probabilities = top_probabilities
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .expect("Probabilities should convert to a vector");
    let top_classes = top_classes
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .expect("Class indices should convert to a vector");
    let actual = batch
        .targets
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .expect("Targets should convert to a vector");

    for (row, label) in actual.iter().enumerate() {
        let offset = row * TOP_N_PREDICTIONS;
        let guesses: Vec<String> = (offset..offset + TOP_N_PREDICTIONS)
            .map(|i| {
                format!(
                    "{} ({:.1}%)",
                    LABEL_NAMES[top_classes[i] as usize],
                    100.0 * top_probabilities[i]
                )
            })
            .collect();

        println!(
            "Sample {row}: actual = {}, predicted = {}",
            LABEL_NAMES[*label as usize],
            guesses.join(", ")
        );
    }
}
