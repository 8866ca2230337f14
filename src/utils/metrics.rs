//! Metrics Module for Binary Classification
//!
//! Evaluation metrics computed from the ordered `(y_true, y_pred, y_score)`
//! sequences returned by the evaluator:
//! - Binary confusion matrix
//! - Per-class precision, recall, F1 and support (classification report)
//! - ROC curve and area under it

use serde::{Deserialize, Serialize};

/// 2x2 confusion matrix, rows = true class, columns = predicted class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl BinaryConfusionMatrix {
    /// Build from parallel label/prediction sequences (0 = negative, 1 = positive)
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize]) -> Self {
        let mut matrix = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t, p) {
                (0, 0) => matrix.true_negatives += 1,
                (0, _) => matrix.false_positives += 1,
                (_, 0) => matrix.false_negatives += 1,
                _ => matrix.true_positives += 1,
            }
        }
        matrix
    }

    /// Entry at `[actual][predicted]`
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        match (actual, predicted) {
            (0, 0) => self.true_negatives,
            (0, _) => self.false_positives,
            (_, 0) => self.false_negatives,
            _ => self.true_positives,
        }
    }

    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.true_negatives + self.true_positives) as f64 / total as f64
        }
    }

    /// Rows as `[[tn, fp], [fn, tp]]`
    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negatives, self.false_positives],
            [self.false_negatives, self.true_positives],
        ]
    }
}

/// Precision / recall / F1 for a single class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(class_name: &str, tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if tp + fn_ > 0 {
            tp as f64 / (tp + fn_) as f64
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_name: class_name.to_string(),
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

/// Per-class table plus accuracy and macro / weighted averages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Build the report for the two classes named in `class_names` (index 0 = negative)
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize], class_names: &[String]) -> Self {
        let cm = BinaryConfusionMatrix::from_predictions(y_true, y_pred);
        let name = |i: usize| {
            class_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", i))
        };

        // Class 0 is "positive" from its own point of view: its TP are true negatives.
        let negative = ClassMetrics::from_counts(
            &name(0),
            cm.true_negatives,
            cm.false_negatives,
            cm.false_positives,
        );
        let positive = ClassMetrics::from_counts(
            &name(1),
            cm.true_positives,
            cm.false_positives,
            cm.false_negatives,
        );
        let per_class = vec![negative, positive];

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let n = per_class.len() as f64;
        let macro_avg = ClassMetrics {
            class_name: "macro avg".to_string(),
            precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n,
            recall: per_class.iter().map(|m| m.recall).sum::<f64>() / n,
            f1: per_class.iter().map(|m| m.f1).sum::<f64>() / n,
            support: total_support,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total_support == 0 {
                0.0
            } else {
                per_class.iter().map(|m| f(m) * m.support as f64).sum::<f64>()
                    / total_support as f64
            }
        };
        let weighted_avg = ClassMetrics {
            class_name: "weighted avg".to_string(),
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total_support,
        };

        Self {
            per_class,
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }

    /// Render as a plain text table
    pub fn to_table(&self) -> String {
        let mut out = format!(
            "{:>16} {:>10} {:>10} {:>10} {:>10}\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for m in &self.per_class {
            out.push_str(&format_row(m));
        }
        out.push('\n');
        out.push_str(&format!(
            "{:>16} {:>10} {:>10} {:>10.4} {:>10}\n",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        ));
        out.push_str(&format_row(&self.macro_avg));
        out.push_str(&format_row(&self.weighted_avg));
        out
    }
}

fn format_row(m: &ClassMetrics) -> String {
    format!(
        "{:>16} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
        m.class_name, m.precision, m.recall, m.f1, m.support
    )
}

/// One operating point of the ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub fpr: f64,
    pub tpr: f64,
}

/// ROC curve over every distinct score, starting at (0, 0)
///
/// Returns an empty curve when either class is absent.
pub fn roc_curve(y_true: &[usize], y_score: &[f32]) -> Vec<RocPoint> {
    let positives = y_true.iter().filter(|&&t| t == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return Vec::new();
    }

    let mut pairs: Vec<(f32, usize)> = y_score
        .iter()
        .copied()
        .zip(y_true.iter().copied())
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut curve = vec![RocPoint {
        threshold: f64::INFINITY,
        fpr: 0.0,
        tpr: 0.0,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < pairs.len() {
        let score = pairs[i].0;
        // Ties share a single operating point
        while i < pairs.len() && pairs[i].0 == score {
            if pairs[i].1 == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        curve.push(RocPoint {
            threshold: score as f64,
            fpr: fp as f64 / negatives as f64,
            tpr: tp as f64 / positives as f64,
        });
    }

    curve
}

/// Trapezoidal area under a ROC curve
pub fn auc(curve: &[RocPoint]) -> f64 {
    curve
        .windows(2)
        .map(|w| (w[1].fpr - w[0].fpr) * (w[1].tpr + w[0].tpr) / 2.0)
        .sum()
}
