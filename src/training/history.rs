//! Per-epoch training history and its CSV logs

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::Result;

/// Metrics of one finished epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based
    pub epoch: usize,
    pub train_loss: f64,
    pub train_acc: f64,
    pub val_loss: f64,
    pub val_acc: f64,
    /// Learning rate at the start of the epoch
    pub lr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub records: Vec<EpochRecord>,
}

#[derive(Serialize)]
struct StagedRecord<'a> {
    stage: &'a str,
    epoch: usize,
    train_loss: f64,
    train_acc: f64,
    val_loss: f64,
    val_acc: f64,
    lr: f64,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// Highest validation accuracy recorded, 0.0 when empty
    pub fn best_val_acc(&self) -> f64 {
        self.records.iter().map(|r| r.val_acc).fold(0.0, f64::max)
    }

    /// `epoch,train_loss,train_acc,val_loss,val_acc,lr`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        if self.records.is_empty() {
            writer.write_record(["epoch", "train_loss", "train_acc", "val_loss", "val_acc", "lr"])?;
        }
        writer.flush()?;
        debug!("Training history written to {:?}", path);
        Ok(())
    }

    /// Concatenate stage histories into one CSV with a leading `stage` column
    /// and epochs renumbered across stages
    pub fn write_combined_csv(path: &Path, stages: &[(&str, &TrainingHistory)]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut epoch = 0;
        for (stage, history) in stages {
            for record in &history.records {
                epoch += 1;
                writer.serialize(StagedRecord {
                    stage,
                    epoch,
                    train_loss: record.train_loss,
                    train_acc: record.train_acc,
                    val_loss: record.val_loss,
                    val_acc: record.val_acc,
                    lr: record.lr,
                })?;
            }
        }
        writer.flush()?;
        debug!("Combined history written to {:?}", path);
        Ok(())
    }
}
