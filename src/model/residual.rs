//! Residual convolutional block with a projection shortcut

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::kaiming_conv_init;

/// Configuration for [`ResidualBlock`]
#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    pub in_channels: usize,
    pub out_channels: usize,

    #[config(default = "1")]
    pub stride: usize,
}

impl ResidualBlockConfig {
    /// The skip path needs a projection when the shape changes
    pub fn needs_projection(&self) -> bool {
        self.in_channels != self.out_channels || self.stride != 1
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBlock<B> {
        let (c_in, c_out, s) = (self.in_channels, self.out_channels, self.stride);

        let shortcut = self.needs_projection().then(|| Projection {
            conv: Conv2dConfig::new([c_in, c_out], [1, 1])
                .with_stride([s, s])
                .with_bias(false)
                .with_initializer(kaiming_conv_init())
                .init(device),
            bn: BatchNormConfig::new(c_out).init(device),
        });

        ResidualBlock {
            conv1: conv3x3(c_in, c_out, s, device),
            bn1: BatchNormConfig::new(c_out).init(device),
            conv2: conv3x3(c_out, c_out, 1, device),
            bn2: BatchNormConfig::new(c_out).init(device),
            shortcut,
            relu: Relu::new(),
        }
    }
}

/// 3x3 convolution with padding 1 and no bias (batch norm follows)
pub(crate) fn conv3x3<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .with_initializer(kaiming_conv_init())
        .init(device)
}

/// 1x1 conv + batch norm on the skip path
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

impl<B: Backend> Projection<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// `ReLU(bn2(conv2(ReLU(bn1(conv1(x))))) + skip(x))`
///
/// Output spatial size is `ceil(H / stride) x ceil(W / stride)`.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B>,
    /// `None` means identity
    pub shortcut: Option<Projection<B>>,
    relu: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(projection) => projection.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));

        self.relu.forward(out + identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_stride_two_halves_with_ceiling() {
        let device = Default::default();
        let block = ResidualBlockConfig::new(32, 64)
            .with_stride(2)
            .init::<TestBackend>(&device);

        for (h, w) in [(128usize, 128usize), (9, 7), (1, 1)] {
            let input = Tensor::<TestBackend, 4>::random(
                [2, 32, h, w],
                Distribution::Normal(0.0, 1.0),
                &device,
            );
            let output = block.forward(input);
            assert_eq!(output.dims(), [2, 64, h.div_ceil(2), w.div_ceil(2)]);
        }
    }

    #[test]
    fn test_projection_when_channels_differ() {
        let device = Default::default();
        let block = ResidualBlockConfig::new(32, 64).init::<TestBackend>(&device);

        let projection = block.shortcut.as_ref().expect("projection shortcut");
        // 1x1 kernel, no bias
        assert_eq!(projection.conv.num_params(), 32 * 64);
        assert!(projection.num_params() > 32 * 64);
    }

    #[test]
    fn test_identity_when_shape_is_kept() {
        let device = Default::default();
        let config = ResidualBlockConfig::new(16, 16);
        assert!(!config.needs_projection());

        let block = config.init::<TestBackend>(&device);
        assert!(block.shortcut.is_none());

        let input = Tensor::<TestBackend, 4>::ones([1, 16, 5, 5], &device);
        assert_eq!(block.forward(input).dims(), [1, 16, 5, 5]);
    }

    #[test]
    fn test_output_is_non_negative() {
        let device = Default::default();
        let block = ResidualBlockConfig::new(3, 8)
            .with_stride(2)
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random(
            [2, 3, 6, 6],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let values: Vec<f32> = block.forward(input).into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| *v >= 0.0));
    }
}
