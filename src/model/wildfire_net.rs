//! WildfireNet: residual CNN with channel and spatial attention
//!
//! ```text
//! stem      conv3x3(3->32) BN ReLU, conv3x3(32->32) BN ReLU
//! layer1    Residual(32->64,  s2) + CA
//! layer2    Residual(64->128, s2) + CA
//! layer3    Residual(128->256,s2) + CA + SA
//! layer4    Residual(256->512,s2) + CA + SA
//! head      GAP -> Dropout(p) -> FC 256 -> ReLU -> Dropout(p)
//!           -> FC 64 -> ReLU -> Dropout(p/2) -> FC output_units
//! ```
//!
//! The network expects images that are already resized and normalized.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::Conv2d,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::attention::{
    ChannelAttention, ChannelAttentionConfig, SpatialAttention, SpatialAttentionConfig,
};
use super::residual::{conv3x3, ResidualBlock, ResidualBlockConfig};
use super::{xavier_linear, BinaryClassifier};
use crate::model::config::TrainingConfig;

/// Configuration for the WildfireNet model
#[derive(Config, Debug)]
pub struct WildfireNetConfig {
    /// Square input resolution the network is trained at
    #[config(default = "128")]
    pub input_size: usize,

    /// Dropout of the classifier head (the last dropout uses half of it)
    #[config(default = "0.4")]
    pub dropout: f64,

    /// Logits emitted by the head (1 for the binary sigmoid formulation)
    #[config(default = "1")]
    pub output_units: usize,

    /// Channel-attention reduction ratio
    #[config(default = "16")]
    pub reduction: usize,
}

impl WildfireNetConfig {
    pub fn from_training(config: &TrainingConfig) -> Self {
        Self::new()
            .with_input_size(config.input_size)
            .with_dropout(config.dropout)
            .with_output_units(config.output_units())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> WildfireNet<B> {
        let channels = [32, 64, 128, 256, 512];
        let block = |i: usize| {
            ResidualBlockConfig::new(channels[i], channels[i + 1])
                .with_stride(2)
                .init::<B>(device)
        };
        let channel_attention = |i: usize| {
            ChannelAttentionConfig::new(channels[i + 1])
                .with_reduction(self.reduction)
                .init::<B>(device)
        };

        WildfireNet {
            stem_conv1: conv3x3(3, 32, 1, device),
            stem_bn1: BatchNormConfig::new(32).init(device),
            stem_conv2: conv3x3(32, 32, 1, device),
            stem_bn2: BatchNormConfig::new(32).init(device),

            layer1: block(0),
            ca1: channel_attention(0),
            layer2: block(1),
            ca2: channel_attention(1),
            layer3: block(2),
            ca3: channel_attention(2),
            sa3: SpatialAttentionConfig::new().init(device),
            layer4: block(3),
            ca4: channel_attention(3),
            sa4: SpatialAttentionConfig::new().init(device),

            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc1: xavier_linear(512, 256, device),
            dropout1: DropoutConfig::new(self.dropout).init(),
            fc2: xavier_linear(256, 64, device),
            dropout2: DropoutConfig::new(self.dropout / 2.0).init(),
            fc3: xavier_linear(64, self.output_units, device),
            relu: Relu::new(),

            input_size: self.input_size,
        }
    }
}

/// Residual + attention wildfire classifier
#[derive(Module, Debug)]
pub struct WildfireNet<B: Backend> {
    pub stem_conv1: Conv2d<B>,
    pub stem_bn1: BatchNorm<B>,
    pub stem_conv2: Conv2d<B>,
    pub stem_bn2: BatchNorm<B>,

    pub layer1: ResidualBlock<B>,
    pub ca1: ChannelAttention<B>,
    pub layer2: ResidualBlock<B>,
    pub ca2: ChannelAttention<B>,
    pub layer3: ResidualBlock<B>,
    pub ca3: ChannelAttention<B>,
    pub sa3: SpatialAttention<B>,
    pub layer4: ResidualBlock<B>,
    pub ca4: ChannelAttention<B>,
    pub sa4: SpatialAttention<B>,

    global_pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    pub fc1: Linear<B>,
    dropout1: Dropout,
    pub fc2: Linear<B>,
    dropout2: Dropout,
    pub fc3: Linear<B>,
    relu: Relu,

    input_size: usize,
}

impl<B: Backend> WildfireNet<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Normalized images `[batch_size, 3, input_size, input_size]`
    ///
    /// # Returns
    /// * Logits `[batch_size, output_units]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.stem_bn1.forward(self.stem_conv1.forward(x)));
        let x = self.relu.forward(self.stem_bn2.forward(self.stem_conv2.forward(x)));

        let x = self.ca1.forward(self.layer1.forward(x));
        let x = self.ca2.forward(self.layer2.forward(x));
        let x = self.sa3.forward(self.ca3.forward(self.layer3.forward(x)));
        let x = self.sa4.forward(self.ca4.forward(self.layer4.forward(x)));

        // [B, 512, h, w] -> [B, 512]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dropout.forward(x);
        let x = self.dropout1.forward(self.relu.forward(self.fc1.forward(x)));
        let x = self.dropout2.forward(self.relu.forward(self.fc2.forward(x)));
        self.fc3.forward(x)
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }
}

impl<B: Backend> BinaryClassifier<B> for WildfireNet<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }

    fn input_size(&self) -> usize {
        self.input_size
    }
}
