use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::dataset::{IMAGE_CHANNELS, IMAGE_SIZE, NUM_CLASSES};

/// Weights start from a small-variance normal distribution.
const WEIGHT_STD: f64 = 0.1;

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
    /// Feature maps produced by the convolution layer.
    #[config(default = 64)]
    pub conv_filters: usize,
    #[config(default = 384)]
    pub fc1_units: usize,
    #[config(default = 192)]
    pub fc2_units: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

/// Convolution with "same" padding followed by ReLU and 2x2 max pooling,
/// halving the spatial dimensions (32x32 -> 16x16).
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(channels: [usize; 2], device: &B::Device) -> Self {
        let conv = Conv2dConfig::new(channels, [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: WEIGHT_STD,
            })
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            pool,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.activation.forward(x);
        self.pool.forward(x)
    }
}

/// The CIFAR-10 classifier: one conv/pool block, two dense layers and a
/// linear output layer producing raw logits. Dropout is applied after the
/// conv block and after each dense activation; it is only active on an
/// autodiff backend, so validation and inference run at full capacity.
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    pub conv: ConvBlock<B>,
    pub dropout: Dropout,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub output: Linear<B>,
    pub activation: Relu,
}

impl ModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let initializer = Initializer::Normal {
            mean: 0.0,
            std: WEIGHT_STD,
        };
        let flattened = self.conv_filters * (IMAGE_SIZE / 2) * (IMAGE_SIZE / 2);

        Model {
            conv: ConvBlock::new([IMAGE_CHANNELS, self.conv_filters], device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc1: LinearConfig::new(flattened, self.fc1_units)
                .with_initializer(initializer.clone())
                .init(device),
            fc2: LinearConfig::new(self.fc1_units, self.fc2_units)
                .with_initializer(initializer.clone())
                .init(device),
            output: LinearConfig::new(self.fc2_units, self.num_classes)
                .with_initializer(initializer)
                .init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Model<B> {
    /// # Shapes
    ///
    /// - images: `[batch_size, 3, 32, 32]`
    /// - output: `[batch_size, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv.forward(images);
        let x = self.dropout.forward(x);

        let x = x.flatten::<2>(1, 3);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        let x = self.fc2.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.output.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    #[test]
    fn conv_block_halves_spatial_dimensions() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new([3, 64], &device);

        let input = Tensor::zeros([2, 3, 32, 32], &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [2, 64, 16, 16]);
    }

    #[test]
    fn forward_produces_one_logit_per_class() {
        let device = Default::default();
        let model = ModelConfig::new().init::<TestBackend>(&device);

        let images = Tensor::zeros([4, 3, 32, 32], &device);
        let logits = model.forward(images);

        assert_eq!(logits.dims(), [4, NUM_CLASSES]);
    }

    #[test]
    fn config_defaults_match_the_published_topology() {
        let config = ModelConfig::new();

        assert_eq!(config.num_classes, 10);
        assert_eq!(config.conv_filters, 64);
        assert_eq!(config.fc1_units, 384);
        assert_eq!(config.fc2_units, 192);
        assert_eq!(config.dropout, 0.5);
    }
}
