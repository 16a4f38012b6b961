use std::path::Path;
use std::time::Instant;

use burn::{
    config::Config,
    data::dataloader::DataLoaderBuilder,
    module::Module,
    nn::loss::CrossEntropyLossConfig,
    optim::AdamConfig,
    record::CompactRecorder,
    tensor::backend::{AutodiffBackend, Backend},
    tensor::{Int, Tensor},
    train::{
        metric::{AccuracyMetric, LossMetric},
        ClassificationOutput, LearnerBuilder, TrainOutput, TrainStep, ValidStep,
    },
};

use crate::{
    data::{ClassificationBatch, ClassificationBatcher},
    model::{Model, ModelConfig},
    preprocess::PreparedDataset,
};

impl<B: Backend> Model<B> {
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<ClassificationBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(&self, batch: ClassificationBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<ClassificationBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(&self, batch: ClassificationBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: AdamConfig,
    #[config(default = 50)]
    pub num_epochs: usize,
    #[config(default = 1024)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1.0e-3)]
    pub learning_rate: f64,
}

fn create_artifact_dir(artifact_dir: &str) {
    // Remove existing artifacts before to get an accurate learner summary
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir).ok();
}

/// Train the classifier on the preprocessed shards and save the final model
/// plus its configuration under `artifact_dir`.
///
/// Loss and accuracy are reported per epoch on both the training and the
/// held-out validation split; only the final parameters are persisted.
pub fn train<B: AutodiffBackend>(
    artifact_dir: &str,
    prepared_dir: &Path,
    config: TrainingConfig,
    device: B::Device,
) {
    create_artifact_dir(artifact_dir);
    config
        .save(format!("{artifact_dir}/config.json"))
        .expect("Config should be saved successfully");

    B::seed(config.seed);

    let batcher = ClassificationBatcher;

    let dataloader_train = DataLoaderBuilder::new(batcher.clone())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(PreparedDataset::train(prepared_dir).expect("Training shards should be prepared"));

    let dataloader_valid = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(
            PreparedDataset::validation(prepared_dir)
                .expect("Validation shard should be prepared"),
        );

    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .devices(vec![device.clone()])
        .num_epochs(config.num_epochs)
        .summary()
        .build(
            config.model.init::<B>(&device),
            config.optimizer.init(),
            config.learning_rate,
        );

    let now = Instant::now();
    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    let elapsed = now.elapsed().as_secs();
    println!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);

    model_trained
        .save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())
        .expect("Trained model should be saved successfully");
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::batcher::Batcher;
    use burn::optim::{GradientsParams, Optimizer};

    use crate::preprocess::PreparedItem;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn synthetic_batch(device: &<TestBackend as Backend>::Device) -> ClassificationBatch<TestBackend> {
        let items = (0..4)
            .map(|i| {
                let mut target = vec![0.0; 10];
                target[i % 10] = 1.0;
                PreparedItem {
                    image: (0..crate::dataset::IMAGE_BYTES)
                        .map(|p| ((p + i * 31) % 256) as f32 / 255.0)
                        .collect(),
                    target,
                }
            })
            .collect();

        ClassificationBatcher.batch(items, device)
    }

    #[test]
    fn one_optimizer_step_changes_the_weights() {
        let device = Default::default();
        TestBackend::seed(42);

        let model = ModelConfig::new().init::<TestBackend>(&device);
        let mut optimizer = AdamConfig::new().init();
        let batch = synthetic_batch(&device);

        let before = model.fc1.weight.val();
        let output = model.forward_classification(batch.images, batch.targets);
        let gradients = GradientsParams::from_grads(output.loss.backward(), &model);
        let model = optimizer.step(1.0e-3, model, gradients);
        let after = model.fc1.weight.val();

        let unchanged: bool = before.equal(after).all().into_scalar();
        assert!(!unchanged, "optimizer step should update at least one weight");
    }

    #[test]
    fn training_step_produces_finite_loss_and_gradients() {
        let device = Default::default();
        TestBackend::seed(7);

        let model = ModelConfig::new().init::<TestBackend>(&device);
        let batch = synthetic_batch(&device);

        let output = TrainStep::step(&model, batch);
        let loss: f32 = output.item.loss.into_scalar();

        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }
}
