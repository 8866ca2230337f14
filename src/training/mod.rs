//! Training module for the wildfire classifiers
//!
//! This module provides:
//! - A generic one-epoch training loop with binary cross-entropy
//! - Fixed-order validation / test evaluation
//! - One-cycle, constant and reduce-on-plateau learning rates, early stopping
//! - Checkpointing with best-on-validation selection
//! - The WildfireNet run and the two-stage FireNet run

pub mod checkpoint;
pub mod evaluator;
pub mod firenet;
pub mod history;
pub mod orchestrator;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{BestModelTracker, CheckpointConfig, RunPaths};
pub use evaluator::{evaluate, Evaluation};
pub use firenet::{run_firenet, FireNetOutcome, FrozenBase};
pub use history::{EpochRecord, TrainingHistory};
pub use orchestrator::{run_training, write_test_report, TestReport, TrainingOutcome};
pub use scheduler::{
    ConstantLr, EarlyStopping, OneCycleLr, PlateauMode, ReduceOnPlateauState, StepScheduler,
};
pub use trainer::{train_one_epoch, EpochStats, FullModel, TrainStep};
