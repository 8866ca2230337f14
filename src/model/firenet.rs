//! FireNet: plain convolutional base with an MLP head
//!
//! The base and the head are separate modules so the head can be trained
//! alone while the base stays frozen.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::{xavier_linear, BinaryClassifier};

/// Filters of the five convolutional blocks
pub const FIRENET_FILTERS: [usize; 5] = [32, 64, 128, 256, 512];

/// Configuration for the FireNet model
#[derive(Config, Debug)]
pub struct FireNetModelConfig {
    #[config(default = "150")]
    pub input_size: usize,

    #[config(default = "0.5")]
    pub dropout: f64,
}

impl FireNetModelConfig {
    /// Spatial side after the five 2x2 max-pools
    pub fn feature_side(&self) -> usize {
        self.input_size >> FIRENET_FILTERS.len()
    }

    /// Width of the flattened base output fed to the head
    pub fn flatten_dim(&self) -> usize {
        let side = self.feature_side();
        FIRENET_FILTERS[FIRENET_FILTERS.len() - 1] * side * side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> FireNet<B> {
        let mut blocks = Vec::with_capacity(FIRENET_FILTERS.len());
        let mut in_channels = 3;
        for &filters in FIRENET_FILTERS.iter() {
            blocks.push(FireBlock::new(in_channels, filters, device));
            in_channels = filters;
        }

        let head = FireNetHead {
            fc1: xavier_linear(self.flatten_dim(), 512, device),
            dropout1: DropoutConfig::new(self.dropout).init(),
            fc2: xavier_linear(512, 256, device),
            dropout2: DropoutConfig::new(self.dropout).init(),
            output: xavier_linear(256, 1, device),
            relu: Relu::new(),
        };

        FireNet {
            base: FireNetBase { blocks },
            head,
            input_size: self.input_size,
        }
    }
}

/// `conv3x3 ReLU conv3x3 ReLU maxpool2 BN`
#[derive(Module, Debug)]
pub struct FireBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pool: MaxPool2d,
    pub bn: BatchNorm<B>,
    relu: Relu,
}

impl<B: Backend> FireBlock<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = |c_in: usize| {
            Conv2dConfig::new([c_in, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init::<B>(device)
        };

        Self {
            conv1: conv(in_channels),
            conv2: conv(out_channels),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv1.forward(x));
        let x = self.relu.forward(self.conv2.forward(x));
        self.bn.forward(self.pool.forward(x))
    }
}

/// Convolutional feature extractor
#[derive(Module, Debug)]
pub struct FireNetBase<B: Backend> {
    pub blocks: Vec<FireBlock<B>>,
}

impl<B: Backend> FireNetBase<B> {
    /// `[N, 3, S, S] -> [N, 512 * (S/32)^2]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        x.flatten(1, 3)
    }
}

/// MLP classifier head
#[derive(Module, Debug)]
pub struct FireNetHead<B: Backend> {
    pub fc1: Linear<B>,
    dropout1: Dropout,
    pub fc2: Linear<B>,
    dropout2: Dropout,
    pub output: Linear<B>,
    relu: Relu,
}

impl<B: Backend> FireNetHead<B> {
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout1.forward(self.relu.forward(self.fc1.forward(features)));
        let x = self.dropout2.forward(self.relu.forward(self.fc2.forward(x)));
        self.output.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct FireNet<B: Backend> {
    pub base: FireNetBase<B>,
    pub head: FireNetHead<B>,
    input_size: usize,
}

impl<B: Backend> FireNet<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.base.forward(x))
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }
}

impl<B: Backend> BinaryClassifier<B> for FireNet<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }

    fn input_size(&self) -> usize {
        self.input_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_flatten_dim_at_default_resolution() {
        let config = FireNetModelConfig::new();
        // 150 -> 75 -> 37 -> 18 -> 9 -> 4
        assert_eq!(config.feature_side(), 4);
        assert_eq!(config.flatten_dim(), 8192);
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = FireNetModelConfig::new()
            .with_input_size(64)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let features = model.base.forward(input.clone());
        assert_eq!(features.dims(), [2, 512 * 2 * 2]);
        assert_eq!(model.forward(input).dims(), [2, 1]);
    }

    #[test]
    fn test_five_blocks() {
        let device = Default::default();
        let model = FireNetModelConfig::new()
            .with_input_size(32)
            .init::<TestBackend>(&device);
        assert_eq!(model.base.blocks.len(), 5);
        // The head is a strict subset of the parameters
        assert!(model.head.num_params() < model.num_params());
    }
}
