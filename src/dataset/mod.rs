//! Dataset module for image-folder wildfire data
//!
//! - `loader`: split indexing and up-front layout validation
//! - `augmentation`: training-time image augmentation
//! - `burn_dataset`: Burn batcher producing image/target tensors
//! - `batches`: prefetching, multi-threaded batch loader

pub mod augmentation;
pub mod batches;
pub mod burn_dataset;
pub mod loader;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use batches::{BatchLoader, BatchStream};
pub use burn_dataset::{Normalization, WildfireBatch, WildfireBatcher, WildfireItem};
pub use loader::{validate_layout, DatasetLayout, ImageFolder, ImageSample};

/// Human-readable labels of the two classes
pub const CLASS_LABELS: [&str; 2] = ["No Wildfire", "Wildfire"];
