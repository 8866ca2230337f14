//! CSV writers for test-set artifacts
//!
//! Numeric tables only: classification report, confusion matrix, ROC curve
//! points and the one-row test summary.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::Result;
use super::metrics::{BinaryConfusionMatrix, ClassificationReport, RocPoint};

/// One-row summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSummary {
    pub model: String,
    pub test_loss: f64,
    pub test_accuracy: f64,
    pub test_auc: f64,
    pub trainable_params: usize,
    pub best_val_acc: f64,
    pub epochs_trained: usize,
}

pub fn write_classification_report(path: &Path, report: &ClassificationReport) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(["class", "precision", "recall", "f1_score", "support"])?;
    for m in report
        .per_class
        .iter()
        .chain([&report.macro_avg, &report.weighted_avg])
    {
        w.write_record([
            m.class_name.clone(),
            format!("{:.6}", m.precision),
            format!("{:.6}", m.recall),
            format!("{:.6}", m.f1),
            m.support.to_string(),
        ])?;
    }
    w.write_record([
        "accuracy".to_string(),
        String::new(),
        String::new(),
        format!("{:.6}", report.accuracy),
        report.macro_avg.support.to_string(),
    ])?;
    w.flush()?;
    info!("Classification report written to {:?}", path);
    Ok(())
}

pub fn write_confusion_matrix(
    path: &Path,
    matrix: &BinaryConfusionMatrix,
    class_names: &[String],
) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    let mut header = vec!["actual\\predicted".to_string()];
    header.extend(class_names.iter().cloned());
    w.write_record(&header)?;
    for (actual, row) in matrix.as_rows().iter().enumerate() {
        let mut record = vec![class_names
            .get(actual)
            .cloned()
            .unwrap_or_else(|| actual.to_string())];
        record.extend(row.iter().map(|v| v.to_string()));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_roc_curve(path: &Path, curve: &[RocPoint]) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    for point in curve {
        w.serialize(point)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_test_summary(path: &Path, summary: &TestSummary) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    w.serialize(summary)?;
    w.flush()?;
    info!("Test summary written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::metrics::roc_curve;

    fn names() -> Vec<String> {
        vec!["nowildfire".to_string(), "wildfire".to_string()]
    }

    #[test]
    fn test_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let y_true = vec![0, 1, 1, 0];
        let y_pred = vec![0, 1, 0, 0];
        let y_score = vec![0.2, 0.9, 0.4, 0.1];

        let report = ClassificationReport::from_predictions(&y_true, &y_pred, &names());
        let report_path = dir.path().join("classification_report.csv");
        write_classification_report(&report_path, &report).unwrap();
        let text = std::fs::read_to_string(&report_path).unwrap();
        assert!(text.starts_with("class,precision,recall,f1_score,support"));
        assert!(text.contains("weighted avg"));

        let cm = BinaryConfusionMatrix::from_predictions(&y_true, &y_pred);
        let cm_path = dir.path().join("confusion.csv");
        write_confusion_matrix(&cm_path, &cm, &names()).unwrap();
        let text = std::fs::read_to_string(&cm_path).unwrap();
        assert!(text.contains("nowildfire,2,0"));
        assert!(text.contains("wildfire,1,1"));

        let roc_path = dir.path().join("roc.csv");
        write_roc_curve(&roc_path, &roc_curve(&y_true, &y_score)).unwrap();
        let text = std::fs::read_to_string(&roc_path).unwrap();
        assert!(text.starts_with("threshold,fpr,tpr"));
    }

    #[test]
    fn test_summary_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_summary.csv");
        let summary = TestSummary {
            model: "WildfireNet".to_string(),
            test_loss: 0.12,
            test_accuracy: 0.97,
            test_auc: 0.99,
            trainable_params: 1000,
            best_val_acc: 0.96,
            epochs_trained: 30,
        };
        write_test_summary(&path, &summary).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("model,test_loss,test_accuracy,test_auc,trainable_params,best_val_acc,epochs_trained")
        );
        assert!(lines.next().unwrap().starts_with("WildfireNet,0.12,0.97"));
    }
}
