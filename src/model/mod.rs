//! Model module: network architectures built with Burn
//!
//! - `attention`: channel and spatial attention gates
//! - `residual`: residual convolutional block with projection shortcut
//! - `wildfire_net`: the WildfireNet classifier
//! - `firenet`: the FireNet classifier with a convolutional base and an MLP head
//! - `config`: serializable run configurations
//!
//! Every classifier emits a single logit per image; `sigmoid(logit) >= 0.5`
//! means wildfire.

pub mod attention;
pub mod config;
pub mod firenet;
pub mod residual;
pub mod wildfire_net;

use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};

use crate::utils::error::{Result, WildfireError};

pub use config::{Architecture, FineTunePolicy, FireNetConfig, TrainingConfig};
pub use firenet::{FireNet, FireNetModelConfig};
pub use wildfire_net::{WildfireNet, WildfireNetConfig};

/// A network producing one logit per image
pub trait BinaryClassifier<B: Backend> {
    /// Images `[N, 3, H, W]` to logits `[N, 1]`
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Square resolution the network was built for
    fn input_size(&self) -> usize;

    /// Reject batches that were not prepared at the trained resolution
    fn check_input(&self, dims: [usize; 4]) -> Result<()> {
        let [_, channels, height, width] = dims;
        let size = self.input_size();
        if channels != 3 || height != size || width != size {
            return Err(WildfireError::Config(format!(
                "expected input [N, 3, {s}, {s}], got {:?}",
                dims,
                s = size
            )));
        }
        Ok(())
    }
}

/// Kaiming-normal, fan-out, gain sqrt(2) for convolutions followed by ReLU
pub(crate) fn kaiming_conv_init() -> Initializer {
    Initializer::KaimingNormal {
        gain: std::f64::consts::SQRT_2,
        fan_out_only: true,
    }
}

/// Linear layer with Xavier-uniform weights and a zero bias
pub(crate) fn xavier_linear<B: Backend>(
    d_input: usize,
    d_output: usize,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output)
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device);
    linear.bias = Some(Initializer::Zeros.init([d_output], device));
    linear
}
