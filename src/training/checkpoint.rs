//! Checkpoint saving, loading and best-model selection
//!
//! A checkpoint is a Burn record (`<name>.mpk.gz`, full precision) plus a
//! JSON sidecar (`<name>.json`) carrying the run configuration, so the
//! architecture can be rebuilt before the weights are loaded.

use std::path::{Path, PathBuf};

use burn::{
    module::{Module, ModuleVisitor, Param},
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder},
    tensor::{backend::Backend, Tensor},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;

use super::history::TrainingHistory;
use crate::model::config::default_dropout;
use crate::model::Architecture;
use crate::utils::error::{Result, ResultExt, WildfireError};

/// Extension Burn appends to the record file
pub const RECORD_EXTENSION: &str = "mpk.gz";

fn recorder() -> NamedMpkGzFileRecorder<FullPrecisionSettings> {
    NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
}

/// Checkpoint name without any extension
///
/// Accepts `name`, `name.mpk.gz` or `name.json`.
pub fn checkpoint_stem(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    for suffix in [".mpk.gz", ".json"] {
        if let Some(stem) = text.strip_suffix(suffix) {
            return PathBuf::from(stem);
        }
    }
    path.to_path_buf()
}

/// Path of the JSON sidecar next to a checkpoint
pub fn metadata_path(path: &Path) -> PathBuf {
    let mut name = checkpoint_stem(path).into_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// Path of the Burn record file of a checkpoint
pub fn record_path(path: &Path) -> PathBuf {
    let mut name = checkpoint_stem(path).into_os_string();
    name.push(".");
    name.push(RECORD_EXTENSION);
    PathBuf::from(name)
}

/// Write the weights of `model` to `<path>.mpk.gz`
pub fn save_model<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<PathBuf> {
    let stem = checkpoint_stem(path);
    model
        .clone()
        .save_file(&stem, &recorder())
        .with_context(|| format!("Failed to save model to {:?}", stem))?;
    Ok(record_path(&stem))
}

/// Float parameter shapes in visiting order
#[derive(Default)]
struct ParamShapes(Vec<Vec<usize>>);

impl<B: Backend> ModuleVisitor<B> for ParamShapes {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        self.0.push(param.val().dims().to_vec());
    }
}

fn param_shapes<B: Backend, M: Module<B>>(model: &M) -> Vec<Vec<usize>> {
    let mut shapes = ParamShapes::default();
    model.visit(&mut shapes);
    shapes.0
}

/// Load weights from `<path>.mpk.gz` into an already-built `model`
///
/// The record must match the model parameter for parameter; Burn itself
/// accepts records of any shape.
pub fn load_model<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> Result<M> {
    let stem = checkpoint_stem(path);
    let file = record_path(&stem);
    if !file.exists() {
        return Err(WildfireError::PathNotFound(file));
    }
    let expected = param_shapes(&model);
    let loaded = model
        .load_file(&stem, &recorder(), device)
        .with_context(|| format!("Failed to load model from {:?}", file))?;

    let found = param_shapes(&loaded);
    if found.len() != expected.len() {
        return Err(WildfireError::Checkpoint(format!(
            "{:?} holds {} parameters, the model has {}",
            file,
            found.len(),
            expected.len()
        )));
    }
    if let Some((want, got)) = expected.iter().zip(&found).find(|(want, got)| want != got) {
        return Err(WildfireError::Checkpoint(format!(
            "{:?} does not match the model: parameter of shape {:?} stored as {:?}",
            file, want, got
        )));
    }
    Ok(loaded)
}

pub fn write_metadata<T: Serialize>(path: &Path, metadata: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(metadata_path(path), json)?;
    Ok(())
}

pub fn read_metadata<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = metadata_path(path);
    if !file.exists() {
        return Err(WildfireError::PathNotFound(file));
    }
    let json = std::fs::read_to_string(&file)?;
    Ok(serde_json::from_str(&json)?)
}

/// Sidecar of a best-on-validation checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestCheckpointMeta {
    pub val_acc: f64,
    pub epoch: usize,
    #[serde(default)]
    pub architecture: Architecture,
    pub config: serde_json::Value,
}

/// Sidecar of the end-of-run checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalCheckpointMeta {
    pub best_val_acc: f64,
    pub history: TrainingHistory,
    #[serde(default)]
    pub architecture: Architecture,
    pub config: serde_json::Value,
}

/// The part of a sidecar needed to rebuild a network
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointConfig {
    pub architecture: Architecture,
    pub input_size: usize,
    pub dropout: f64,
}

#[derive(Deserialize)]
struct SidecarHeader {
    #[serde(default)]
    architecture: Architecture,
    config: SidecarConfig,
}

#[derive(Deserialize)]
struct SidecarConfig {
    input_size: usize,
    #[serde(default = "default_dropout")]
    dropout: f64,
}

impl CheckpointConfig {
    /// Read the architecture fields from either kind of sidecar
    pub fn read(path: &Path) -> Result<Self> {
        let header: SidecarHeader = read_metadata(path)?;
        Ok(Self {
            architecture: header.architecture,
            input_size: header.config.input_size,
            dropout: header.config.dropout,
        })
    }
}

/// Highest validation accuracy seen so far; only strict improvements count
#[derive(Debug, Clone, Default)]
pub struct BestModelTracker {
    best: f64,
    best_epoch: Option<usize>,
}

impl BestModelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `accuracy` beats every earlier epoch
    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> bool {
        if accuracy > self.best {
            self.best = accuracy;
            self.best_epoch = Some(epoch);
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

/// Timestamped artifact paths of one run
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub models_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub timestamp: String,
}

impl RunPaths {
    /// Create `<output_dir>/models` and `<output_dir>/logs`
    ///
    /// The run is claimed by creating `logs/config_<ts>.json`; if another run
    /// already holds that timestamp, `_1`, `_2`, ... is appended.
    pub fn create(output_dir: &Path, timestamp: String) -> Result<Self> {
        let models_dir = output_dir.join("models");
        let logs_dir = output_dir.join("logs");
        std::fs::create_dir_all(&models_dir)?;
        std::fs::create_dir_all(&logs_dir)?;

        let mut candidate = timestamp.clone();
        let mut attempt = 0;
        let timestamp = loop {
            let claim = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(logs_dir.join(format!("config_{}.json", candidate)));
            match claim {
                Ok(_) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    candidate = format!("{}_{}", timestamp, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        };
        info!("Writing artifacts to {:?} (run {})", output_dir, timestamp);
        Ok(Self {
            models_dir,
            logs_dir,
            timestamp,
        })
    }

    /// `models/<prefix>_<ts>` (no extension)
    pub fn model(&self, prefix: &str) -> PathBuf {
        self.models_dir.join(format!("{}_{}", prefix, self.timestamp))
    }

    /// `logs/<prefix>_<ts>.csv`
    pub fn log(&self, prefix: &str) -> PathBuf {
        self.logs_dir.join(format!("{}_{}.csv", prefix, self.timestamp))
    }
}
