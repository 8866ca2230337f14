//! Inference Predictor Module
//!
//! Rebuilds a network from a checkpoint sidecar, loads its weights and
//! classifies single images or whole directories.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::dataset::loader::is_image;
use crate::dataset::{
    Augmenter, ImageSample, Normalization, WildfireBatch, WildfireBatcher, WildfireItem,
    CLASS_LABELS,
};
use crate::model::{
    Architecture, BinaryClassifier, FireNet, FireNetModelConfig, WildfireNet, WildfireNetConfig,
};
use crate::training::checkpoint::{load_model, CheckpointConfig};
use crate::training::trainer::logits_to_vec;
use crate::utils::error::{Result, WildfireError};

/// Default decision threshold on the wildfire probability
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub image_path: Option<PathBuf>,
    /// Probability of the wildfire class
    pub probability: f32,
    /// 1 when `probability >= threshold`
    pub prediction: usize,
    pub label: String,
    pub threshold: f32,
    pub inference_time_ms: f64,
}

impl Prediction {
    fn new(probability: f32, threshold: f32, image_path: Option<PathBuf>, elapsed_ms: f64) -> Self {
        let prediction = usize::from(probability >= threshold);
        Self {
            image_path,
            probability,
            prediction,
            label: CLASS_LABELS[prediction].to_string(),
            threshold,
            inference_time_ms: elapsed_ms,
        }
    }

    /// Probability of the predicted class
    pub fn confidence(&self) -> f32 {
        if self.prediction == 1 {
            self.probability
        } else {
            1.0 - self.probability
        }
    }

    pub fn display(&self) -> String {
        let mut output = String::new();
        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }
        output.push_str(&format!("Prediction: {}\n", self.label));
        output.push_str(&format!(
            "Wildfire probability: {:.2}% (threshold {:.2})\n",
            self.probability * 100.0,
            self.threshold
        ));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));
        output
    }
}

/// A network rebuilt from a checkpoint
#[derive(Debug)]
pub enum LoadedModel<B: Backend> {
    WildfireNet(WildfireNet<B>),
    FireNet(FireNet<B>),
}

impl<B: Backend> BinaryClassifier<B> for LoadedModel<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            LoadedModel::WildfireNet(model) => model.forward(images),
            LoadedModel::FireNet(model) => model.forward(images),
        }
    }

    fn input_size(&self) -> usize {
        match self {
            LoadedModel::WildfireNet(model) => model.input_size(),
            LoadedModel::FireNet(model) => model.input_size(),
        }
    }
}

/// Predictor for running inference with a trained model
pub struct Predictor<B: Backend> {
    model: LoadedModel<B>,
    config: CheckpointConfig,
    preprocess: Augmenter,
    batcher: WildfireBatcher,
    threshold: f32,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Load a checkpoint (`name`, `name.mpk.gz` or `name.json`)
    pub fn from_checkpoint(path: &Path, device: &B::Device) -> Result<Self> {
        let config = CheckpointConfig::read(path)?;
        let model = match config.architecture {
            Architecture::WildfireNet => {
                let model = WildfireNetConfig::new()
                    .with_input_size(config.input_size)
                    .with_dropout(config.dropout)
                    .init::<B>(device);
                LoadedModel::WildfireNet(load_model(model, path, device)?)
            }
            Architecture::FireNet => {
                let model = FireNetModelConfig::new()
                    .with_input_size(config.input_size)
                    .init::<B>(device);
                LoadedModel::FireNet(load_model(model, path, device)?)
            }
        };
        let normalization = match config.architecture {
            Architecture::WildfireNet => Normalization::ImageNet,
            Architecture::FireNet => Normalization::UnitRange,
        };
        info!(
            "Loaded {} checkpoint {:?} (input {}x{})",
            config.architecture, path, config.input_size, config.input_size
        );

        Ok(Self {
            model,
            preprocess: Augmenter::no_augmentation(config.input_size as u32),
            batcher: WildfireBatcher::new(config.input_size, normalization),
            config,
            threshold: DEFAULT_THRESHOLD,
            device: device.clone(),
        })
    }

    pub fn with_threshold(mut self, threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(WildfireError::Config(format!(
                "threshold must be in [0, 1], got {}",
                threshold
            )));
        }
        self.threshold = threshold;
        Ok(self)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn architecture(&self) -> Architecture {
        self.config.architecture
    }

    pub fn input_size(&self) -> usize {
        self.config.input_size
    }

    pub fn model(&self) -> &LoadedModel<B> {
        &self.model
    }

    /// Batcher matching the preprocessing the model was trained with
    pub fn batcher(&self) -> &WildfireBatcher {
        &self.batcher
    }

    pub fn predict_file(&self, path: &Path) -> Result<Prediction> {
        let mut predictions = self.predict_files(&[path.to_path_buf()])?;
        predictions
            .pop()
            .ok_or_else(|| WildfireError::Tensor("empty prediction batch".to_string()))
    }

    /// Predict a batch of image files in one forward pass
    pub fn predict_files(&self, paths: &[PathBuf]) -> Result<Vec<Prediction>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let items = paths
            .iter()
            .map(|path| {
                let sample = ImageSample {
                    path: path.clone(),
                    label: 0,
                };
                Ok(WildfireItem {
                    image: self.preprocess.preprocess(sample.load()?, None),
                    label: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let batch = <WildfireBatcher as Batcher<B, WildfireItem, WildfireBatch<B>>>::batch(
            &self.batcher,
            items,
            &self.device,
        );
        self.model.check_input(batch.images.dims())?;
        let logits = logits_to_vec(self.model.logits(batch.images))?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0 / paths.len() as f64;
        Ok(logits
            .into_iter()
            .zip(paths)
            .map(|(logit, path)| {
                let probability = 1.0 / (1.0 + (-logit).exp());
                Prediction::new(probability, self.threshold, Some(path.clone()), elapsed_ms)
            })
            .collect())
    }

    /// Predict every image under `dir`, in file-name order
    pub fn predict_dir(&self, dir: &Path, batch_size: usize) -> Result<Vec<Prediction>> {
        if !dir.is_dir() {
            return Err(WildfireError::PathNotFound(dir.to_path_buf()));
        }
        let files: Vec<PathBuf> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        let mut predictions = Vec::with_capacity(files.len());
        for chunk in files.chunks(batch_size.max(1)) {
            predictions.extend(self.predict_files(chunk)?);
        }
        Ok(predictions)
    }
}
