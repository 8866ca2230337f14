//! Validation and test evaluation
//!
//! Runs a non-autodiff model over a fixed-order split. Callers pass
//! `model.valid()` so batch norm uses running statistics and dropout is off.

use burn::tensor::{backend::Backend, ElementConversion};

use super::trainer::{bce_with_logits, logits_to_vec};
use crate::dataset::{BatchLoader, WildfireBatcher};
use crate::model::BinaryClassifier;
use crate::utils::error::Result;
use crate::utils::metrics::{auc, roc_curve, BinaryConfusionMatrix, ClassificationReport, RocPoint};

/// Loss, accuracy and per-sample outputs of one pass, in dataset order
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub y_true: Vec<usize>,
    pub y_pred: Vec<usize>,
    /// Sigmoid probabilities of the positive class
    pub y_score: Vec<f32>,
}

impl Evaluation {
    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    pub fn confusion_matrix(&self) -> BinaryConfusionMatrix {
        BinaryConfusionMatrix::from_predictions(&self.y_true, &self.y_pred)
    }

    pub fn classification_report(&self, class_names: &[String]) -> ClassificationReport {
        ClassificationReport::from_predictions(&self.y_true, &self.y_pred, class_names)
    }

    pub fn roc_curve(&self) -> Vec<RocPoint> {
        roc_curve(&self.y_true, &self.y_score)
    }

    /// Area under the ROC curve; NaN when only one class is present
    pub fn auc(&self) -> f64 {
        let curve = self.roc_curve();
        if curve.is_empty() {
            f64::NAN
        } else {
            auc(&curve)
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Evaluate `model` on every batch of `loader`
pub fn evaluate<B, M>(
    model: &M,
    loader: &BatchLoader,
    batcher: &WildfireBatcher,
    device: &B::Device,
) -> Result<Evaluation>
where
    B: Backend,
    M: BinaryClassifier<B>,
{
    let mut loss_sum = 0.0f64;
    let mut y_true = Vec::with_capacity(loader.len());
    let mut y_pred = Vec::with_capacity(loader.len());
    let mut y_score = Vec::with_capacity(loader.len());

    for batch in loader.batches::<B>(0, batcher, device)? {
        let batch = batch?;
        model.check_input(batch.images.dims())?;
        let batch_size = batch.labels.len();

        let logits = model.logits(batch.images);
        let loss: f64 = bce_with_logits(logits.clone(), batch.targets)
            .into_scalar()
            .elem();
        loss_sum += loss * batch_size as f64;

        for logit in logits_to_vec(logits)? {
            y_pred.push(usize::from(logit >= 0.0));
            y_score.push(sigmoid(logit));
        }
        y_true.extend(batch.labels);
    }

    let total = y_true.len();
    let correct = y_true.iter().zip(&y_pred).filter(|(t, p)| t == p).count();

    Ok(Evaluation {
        loss: loss_sum / total.max(1) as f64,
        accuracy: correct as f64 / total.max(1) as f64,
        y_true,
        y_pred,
        y_score,
    })
}
