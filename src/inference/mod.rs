//! Inference module for checkpoint prediction and evaluation
//!
//! - Single image, batch and directory prediction with a decision threshold
//! - Re-evaluation of a saved checkpoint on any dataset split

pub mod predictor;

use std::path::Path;

use burn::tensor::backend::Backend;

pub use predictor::{LoadedModel, Prediction, Predictor, DEFAULT_THRESHOLD};

use crate::dataset::{BatchLoader, ImageFolder};
use crate::training::evaluator::{evaluate, Evaluation};
use crate::utils::error::{Result, WildfireError};

/// Evaluate a checkpoint on `<data_dir>/<split>`
pub fn evaluate_checkpoint<B: Backend>(
    checkpoint: &Path,
    data_dir: &Path,
    split: &str,
    batch_size: usize,
    workers: usize,
    device: &B::Device,
) -> Result<(Evaluation, Vec<String>)> {
    let split_dir = data_dir.join(split);
    if !split_dir.is_dir() {
        return Err(WildfireError::MissingSplit {
            root: data_dir.to_path_buf(),
            split: split.to_string(),
        });
    }

    let predictor = Predictor::<B>::from_checkpoint(checkpoint, device)?;
    let folder = ImageFolder::new(&split_dir)?;
    let class_names = folder.classes.clone();
    let loader = BatchLoader::eval(folder, predictor.input_size(), batch_size, workers)?;

    let evaluation = evaluate::<B, _>(predictor.model(), &loader, predictor.batcher(), device)?;
    Ok((evaluation, class_names))
}
