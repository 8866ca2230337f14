//! Run Configuration Module
//!
//! Serializable run configurations for the two training pipelines. A
//! configuration is built once (defaults, optional JSON file, CLI overrides),
//! validated, and then passed by reference. It is embedded into every
//! checkpoint sidecar so inference can rebuild the architecture.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::utils::error::{Result, WildfireError};

/// Network family selected at configuration time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Architecture {
    #[default]
    WildfireNet,
    FireNet,
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Architecture::WildfireNet => write!(f, "WildfireNet"),
            Architecture::FireNet => write!(f, "FireNet"),
        }
    }
}

pub(crate) fn default_dropout() -> f64 {
    0.4
}

fn default_pct_start() -> f64 {
    0.1
}

/// WildfireNet training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Dataset root containing train/, valid/ and test/
    pub data_dir: PathBuf,

    /// Root for models/ and logs/
    pub output_dir: PathBuf,

    /// Square input resolution fed to the network
    pub input_size: usize,

    pub batch_size: usize,

    /// Image decoding threads (also the prefetch depth)
    pub workers: usize,

    pub seed: u64,

    pub epochs: usize,

    /// Peak learning rate of the one-cycle schedule
    pub lr: f64,

    /// Decoupled (AdamW) weight decay
    pub weight_decay: f64,

    #[serde(default = "default_dropout")]
    pub dropout: f64,

    /// Number of classes; the sigmoid head emits `num_classes - 1` logits
    pub num_classes: usize,

    /// Fraction of steps spent warming up to the peak LR
    #[serde(default = "default_pct_start")]
    pub pct_start: f64,

    #[serde(default)]
    pub augmentation: AugmentationConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/wildfire"),
            output_dir: PathBuf::from("output/wildfirenet"),
            input_size: 128,
            batch_size: 16,
            workers: 2,
            seed: 42,
            epochs: 30,
            lr: 1e-3,
            weight_decay: 1e-4,
            dropout: default_dropout(),
            num_classes: 2,
            pct_start: default_pct_start(),
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Logit count of the classifier head
    pub fn output_units(&self) -> usize {
        self.num_classes.saturating_sub(1)
    }

    /// Validate the configuration before any model or loader is built
    pub fn validate(&self) -> Result<()> {
        if self.output_units() == 0 {
            return Err(WildfireError::Config(
                "num_classes must be at least 2 (head emits num_classes - 1 logits)".to_string(),
            ));
        }
        if self.input_size < 16 {
            return Err(WildfireError::Config(
                "input_size must be at least 16".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(WildfireError::Config("batch_size must be > 0".to_string()));
        }
        if self.epochs == 0 {
            return Err(WildfireError::Config("epochs must be > 0".to_string()));
        }
        if self.lr <= 0.0 {
            return Err(WildfireError::Config("lr must be > 0".to_string()));
        }
        if self.weight_decay < 0.0 {
            return Err(WildfireError::Config(
                "weight_decay must be >= 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(WildfireError::Config(
                "dropout must be in range [0.0, 1.0)".to_string(),
            ));
        }
        if !(self.pct_start > 0.0 && self.pct_start < 1.0) {
            return Err(WildfireError::Config(
                "pct_start must be in range (0.0, 1.0)".to_string(),
            ));
        }
        self.augmentation.validate()?;
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Whether the fine-tuning stage of FireNet runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FineTunePolicy {
    /// Always fine-tune the whole network after the head stage
    Always,
    /// Skip fine-tuning when the head stage improved validation accuracy
    /// over the untrained baseline by at least `min_gain`
    SkipWhenHeadGain { min_gain: f64 },
}

impl Default for FineTunePolicy {
    fn default() -> Self {
        Self::Always
    }
}

impl FineTunePolicy {
    /// Decide whether stage 2 runs given baseline and head-stage val accuracy
    pub fn should_fine_tune(&self, baseline_acc: f64, head_acc: f64) -> bool {
        match self {
            FineTunePolicy::Always => true,
            FineTunePolicy::SkipWhenHeadGain { min_gain } => head_acc - baseline_acc < *min_gain,
        }
    }
}

/// FireNet two-stage training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireNetConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub input_size: usize,
    pub batch_size: usize,
    pub workers: usize,
    pub seed: u64,

    /// Epochs with the convolutional base frozen
    pub head_epochs: usize,
    pub fine_tune_epochs: usize,

    /// Adam learning rate of the head stage
    pub lr: f64,
    pub fine_tune_lr: f64,

    /// Early-stopping patience on validation loss
    pub patience: usize,

    #[serde(default)]
    pub fine_tune_policy: FineTunePolicy,

    #[serde(default)]
    pub augmentation: AugmentationConfig,
}

impl Default for FireNetConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/wildfire"),
            output_dir: PathBuf::from("output/firenet"),
            input_size: 150,
            batch_size: 32,
            workers: 4,
            seed: 42,
            head_epochs: 8,
            fine_tune_epochs: 30,
            lr: 1e-4,
            fine_tune_lr: 1e-5,
            patience: 5,
            fine_tune_policy: FineTunePolicy::Always,
            augmentation: AugmentationConfig::geometric(),
        }
    }
}

impl FireNetConfig {
    pub fn validate(&self) -> Result<()> {
        // Five 2x2 max-pools must leave at least one pixel
        if self.input_size < 32 {
            return Err(WildfireError::Config(
                "input_size must be at least 32 for FireNet".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(WildfireError::Config("batch_size must be > 0".to_string()));
        }
        if self.head_epochs == 0 {
            return Err(WildfireError::Config("head_epochs must be > 0".to_string()));
        }
        if self.lr <= 0.0 || self.fine_tune_lr <= 0.0 {
            return Err(WildfireError::Config(
                "learning rates must be > 0".to_string(),
            ));
        }
        if let FineTunePolicy::SkipWhenHeadGain { min_gain } = self.fine_tune_policy {
            if min_gain < 0.0 {
                return Err(WildfireError::Config("min_gain must be >= 0".to_string()));
            }
        }
        self.augmentation.validate()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_training_config() {
        let config = TrainingConfig::default();
        assert_eq!(config.input_size, 128);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.output_units(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_training_configs() {
        let config = TrainingConfig {
            num_classes: 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(WildfireError::Config(_))));

        let config = TrainingConfig {
            dropout: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_dropout_defaults() {
        let mut value = serde_json::to_value(TrainingConfig::default()).unwrap();
        value.as_object_mut().unwrap().remove("dropout");
        value.as_object_mut().unwrap().remove("augmentation");
        let config: TrainingConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.dropout, 0.4);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = TrainingConfig {
            epochs: 3,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.seed, 42);
    }

    #[test]
    fn test_fine_tune_policy() {
        assert!(FineTunePolicy::Always.should_fine_tune(0.5, 0.99));

        let policy = FineTunePolicy::SkipWhenHeadGain { min_gain: 0.005 };
        // Head stage gained 10 points: fine-tuning skipped
        assert!(!policy.should_fine_tune(0.80, 0.90));
        // Gain below the threshold: fine-tuning runs
        assert!(policy.should_fine_tune(0.80, 0.803));
        assert!(policy.should_fine_tune(0.80, 0.70));
    }

    #[test]
    fn test_fine_tune_policy_serde() {
        let json = r#"{"mode":"skip_when_head_gain","min_gain":0.005}"#;
        let policy: FineTunePolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy, FineTunePolicy::SkipWhenHeadGain { min_gain: 0.005 });
    }

    #[test]
    fn test_firenet_config_validation() {
        assert!(FireNetConfig::default().validate().is_ok());
        let config = FireNetConfig {
            input_size: 16,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
