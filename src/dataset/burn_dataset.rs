//! Burn Batcher Integration
//!
//! Turns decoded samples into `[N, 3, H, W]` image tensors plus `[N, 1]`
//! binary targets for the single-logit classifiers.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Pixel normalization applied when a batch is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// (x - mean) / std with ImageNet statistics
    #[default]
    ImageNet,
    /// Keep pixels scaled to [0, 1]
    UnitRange,
}

/// A decoded sample ready for batching
#[derive(Clone, Debug)]
pub struct WildfireItem {
    /// Image data as flattened CHW float array [3 * H * W] in [0, 1]
    pub image: Vec<f32>,
    /// Class label (0 = no wildfire, 1 = wildfire)
    pub label: usize,
}

/// A batch of images and binary targets
#[derive(Clone, Debug)]
pub struct WildfireBatch<B: Backend> {
    /// Images [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Binary targets [batch_size, 1]
    pub targets: Tensor<B, 2, Int>,
    /// The same labels on the host, in batch order
    pub labels: Vec<usize>,
}

/// Batcher for wildfire samples
#[derive(Clone, Debug)]
pub struct WildfireBatcher {
    image_size: usize,
    normalization: Normalization,
}

impl WildfireBatcher {
    pub fn new(image_size: usize, normalization: Normalization) -> Self {
        Self {
            image_size,
            normalization,
        }
    }
}

impl<B: Backend> Batcher<B, WildfireItem, WildfireBatch<B>> for WildfireBatcher {
    fn batch(&self, items: Vec<WildfireItem>, device: &B::Device) -> WildfireBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
        let images_data: Vec<f32> = items.into_iter().flat_map(|item| item.image).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let images = match self.normalization {
            Normalization::ImageNet => {
                let mean = Tensor::<B, 4>::from_floats(
                    TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
                    device,
                );
                let std = Tensor::<B, 4>::from_floats(
                    TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
                    device,
                );
                (images - mean) / std
            }
            Normalization::UnitRange => images,
        };

        let targets_data: Vec<i64> = labels.iter().map(|&label| label as i64).collect();
        let targets = Tensor::<B, 2, Int>::from_data(
            TensorData::new(targets_data, [batch_size, 1]),
            device,
        );

        WildfireBatch {
            images,
            targets,
            labels,
        }
    }
}
