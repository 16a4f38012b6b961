use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::dataset::{IMAGE_CHANNELS, IMAGE_SIZE};
use crate::preprocess::PreparedItem;

#[derive(Clone, Default)]
pub struct ClassificationBatcher;

#[derive(Clone, Debug)]
pub struct ClassificationBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// Index of the set position in a one-hot vector.
fn class_index(one_hot: &[f32]) -> i64 {
    one_hot
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, _)| index as i64)
        .unwrap_or(0)
}

impl<B: Backend> Batcher<B, PreparedItem, ClassificationBatch<B>> for ClassificationBatcher {
    fn batch(&self, items: Vec<PreparedItem>, device: &B::Device) -> ClassificationBatch<B> {
        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    TensorData::from([class_index(&item.target).elem::<B::IntElem>()]),
                    device,
                )
            })
            .collect();

        let images = items
            .into_iter()
            .map(|item| {
                // Prepared images are already CHW and rescaled to [0, 1].
                TensorData::new(
                    item.image,
                    Shape::new([IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
                )
            })
            .map(|data| Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device))
            .collect();

        let images: Tensor<B, 4> = Tensor::stack(images, 0);
        let targets = Tensor::cat(targets, 0);

        ClassificationBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::IMAGE_BYTES;

    type TestBackend = burn::backend::NdArray<f32>;

    fn item(label: usize, fill: f32) -> PreparedItem {
        let mut target = vec![0.0; 10];
        target[label] = 1.0;
        PreparedItem {
            image: vec![fill; IMAGE_BYTES],
            target,
        }
    }

    #[test]
    fn batches_images_and_recovers_integer_targets() {
        let device = Default::default();
        let batcher = ClassificationBatcher;

        let batch: ClassificationBatch<TestBackend> =
            batcher.batch(vec![item(3, 0.25), item(9, 0.75)], &device);

        assert_eq!(batch.images.dims(), [2, 3, 32, 32]);
        assert_eq!(batch.targets.dims(), [2]);
        let targets = batch.targets.into_data().convert::<i64>();
        assert_eq!(targets.to_vec::<i64>().unwrap(), vec![3, 9]);
    }

    #[test]
    fn class_index_finds_the_set_position() {
        assert_eq!(class_index(&[0.0, 0.0, 1.0]), 2);
        assert_eq!(class_index(&[1.0, 0.0, 0.0]), 0);
    }
}
