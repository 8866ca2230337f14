//! # Wildfire Detection
//!
//! Binary wildfire classification of satellite image tiles with the Burn
//! framework.
//!
//! ## Features
//!
//! - **WildfireNet**: residual CNN with channel and spatial attention, trained
//!   with AdamW and a per-batch one-cycle learning rate
//! - **FireNet**: plain CNN trained in two stages (frozen-base head training,
//!   then optional fine-tuning)
//! - Best-on-validation checkpoints with JSON sidecars, test-set reports
//!   (classification report, confusion matrix, ROC AUC) as CSV
//! - Checkpoint-based prediction for single images or directories
//!
//! ## Modules
//!
//! - `dataset`: Split indexing, augmentation and the prefetching batch loader
//! - `model`: Network architectures and run configurations
//! - `training`: Training loop, evaluation, schedules, checkpoints and runs
//! - `inference`: Prediction and checkpoint evaluation
//! - `utils`: Logging, metrics, report writers and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wildfire_detection::backend::{default_device, TrainingBackend};
//! use wildfire_detection::model::TrainingConfig;
//! use wildfire_detection::training::run_training;
//!
//! let config = TrainingConfig {
//!     data_dir: "data/wildfire".into(),
//!     ..Default::default()
//! };
//! let outcome = run_training::<TrainingBackend>(&config, &default_device())?;
//! println!("test accuracy: {:.4}", outcome.test.evaluation.accuracy);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{validate_layout, BatchLoader, DatasetLayout, ImageFolder, CLASS_LABELS};
pub use inference::{Prediction, Predictor};
pub use model::{
    Architecture, BinaryClassifier, FineTunePolicy, FireNet, FireNetConfig, TrainingConfig,
    WildfireNet, WildfireNetConfig,
};
pub use training::{run_firenet, run_training, Evaluation};
pub use utils::error::{Result, WildfireError};

/// Default WildfireNet input resolution
pub const IMAGE_SIZE: usize = 128;

/// Default FireNet input resolution
pub const FIRENET_IMAGE_SIZE: usize = 150;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
