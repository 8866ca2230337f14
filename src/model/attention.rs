//! Channel and spatial attention gates
//!
//! Both modules return a tensor of the same shape as their input, rescaled
//! by a sigmoid gate: per channel for [`ChannelAttention`], per pixel for
//! [`SpatialAttention`].

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

/// Configuration for [`ChannelAttention`]
#[derive(Config, Debug)]
pub struct ChannelAttentionConfig {
    pub channels: usize,

    /// Bottleneck reduction ratio
    #[config(default = "16")]
    pub reduction: usize,
}

impl ChannelAttentionConfig {
    /// Bottleneck width: `channels / reduction`, never below 1
    pub fn hidden(&self) -> usize {
        (self.channels / self.reduction.max(1)).max(1)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ChannelAttention<B> {
        let hidden = self.hidden();
        let init = Initializer::XavierUniform { gain: 1.0 };

        ChannelAttention {
            fc1: LinearConfig::new(self.channels, hidden)
                .with_bias(false)
                .with_initializer(init.clone())
                .init(device),
            fc2: LinearConfig::new(hidden, self.channels)
                .with_bias(false)
                .with_initializer(init)
                .init(device),
            relu: Relu::new(),
        }
    }
}

/// Squeeze-and-excitation style gate fed by both average- and max-pooled
/// channel descriptors through a shared bottleneck
#[derive(Module, Debug)]
pub struct ChannelAttention<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    relu: Relu,
}

impl<B: Backend> ChannelAttention<B> {
    /// `[N, C, H, W] -> [N, C, H, W]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch_size, channels, _, _] = x.dims();

        let avg = x
            .clone()
            .mean_dim(3)
            .mean_dim(2)
            .reshape([batch_size, channels]);
        let max = x
            .clone()
            .max_dim(3)
            .max_dim(2)
            .reshape([batch_size, channels]);

        let gate = sigmoid(self.bottleneck(avg) + self.bottleneck(max));
        x * gate.reshape([batch_size, channels, 1, 1])
    }

    fn bottleneck(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.fc2.forward(self.relu.forward(self.fc1.forward(x)))
    }
}

/// Configuration for [`SpatialAttention`]
#[derive(Config, Debug)]
pub struct SpatialAttentionConfig {
    #[config(default = "7")]
    pub kernel_size: usize,
}

impl SpatialAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpatialAttention<B> {
        let k = self.kernel_size;
        let pad = k / 2;

        SpatialAttention {
            conv: Conv2dConfig::new([2, 1], [k, k])
                .with_padding(PaddingConfig2d::Explicit(pad, pad))
                .with_bias(false)
                .with_initializer(super::kaiming_conv_init())
                .init(device),
        }
    }
}

/// Per-pixel gate computed from channel-wise mean and max maps
#[derive(Module, Debug)]
pub struct SpatialAttention<B: Backend> {
    pub conv: Conv2d<B>,
}

impl<B: Backend> SpatialAttention<B> {
    /// `[N, C, H, W] -> [N, C, H, W]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let avg = x.clone().mean_dim(1);
        let max = x.clone().max_dim(1);

        let gate = sigmoid(self.conv.forward(Tensor::cat(vec![avg, max], 1)));
        x * gate
    }
}
