//! End-to-end runs of both training pipelines on a tiny synthetic dataset

use std::path::{Path, PathBuf};

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use image::{ImageBuffer, Rgb};

use wildfire_detection::inference::evaluate_checkpoint;
use wildfire_detection::training::checkpoint::record_path;
use wildfire_detection::{
    run_firenet, run_training, Architecture, FineTunePolicy, FireNetConfig, Predictor,
    TrainingConfig, WildfireError,
};

type Inner = NdArray;
type Train = Autodiff<NdArray>;

fn write_dataset(root: &Path, per_class: usize) {
    for split in ["train", "valid", "test"] {
        for (label, class_name) in ["nowildfire", "wildfire"].iter().enumerate() {
            let dir = root.join(split).join(class_name);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let shade = if label == 0 { 30 } else { 230 };
                let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(24, 24, |x, y| {
                    Rgb([shade, ((x * 3 + y + i as u32) % 255) as u8, 255 - shade])
                });
                img.save(dir.join(format!("{}.png", i))).unwrap();
            }
        }
    }
}

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(prefix))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

#[test]
fn wildfirenet_run_writes_artifacts_and_reloads() {
    let data = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 4);

    let config = TrainingConfig {
        data_dir: data.path().to_path_buf(),
        output_dir: output.path().to_path_buf(),
        input_size: 32,
        batch_size: 4,
        workers: 1,
        epochs: 2,
        ..Default::default()
    };
    let device = Default::default();
    let outcome = run_training::<Train>(&config, &device).unwrap();

    assert_eq!(outcome.history.len(), 2);
    assert!((0.0..=1.0).contains(&outcome.best_val_acc));
    assert_eq!(outcome.test.evaluation.len(), 8);
    assert!(record_path(&outcome.final_checkpoint).exists());

    let logs = &outcome.paths.logs_dir;
    for prefix in ["history_", "test_summary_", "classification_report_", "roc_", "confusion_", "config_"] {
        assert_eq!(files_with_prefix(logs, prefix).len(), 1, "missing {}", prefix);
    }

    // Weights and sidecar rebuild an identical classifier
    let (evaluation, classes) = evaluate_checkpoint::<Inner>(
        &outcome.final_checkpoint,
        data.path(),
        "valid",
        4,
        1,
        &device,
    )
    .unwrap();
    assert_eq!(classes, vec!["nowildfire", "wildfire"]);
    assert_eq!(evaluation.len(), 8);

    // The test report comes from the best checkpoint, not the last epoch
    let tested = outcome
        .best_checkpoint
        .clone()
        .unwrap_or_else(|| outcome.final_checkpoint.clone());
    let (reloaded, _) =
        evaluate_checkpoint::<Inner>(&tested, data.path(), "test", 4, 1, &device).unwrap();
    assert_eq!(reloaded.y_true, outcome.test.evaluation.y_true);
    assert_eq!(reloaded.y_score, outcome.test.evaluation.y_score);

    let predictor = Predictor::<Inner>::from_checkpoint(&outcome.final_checkpoint, &device).unwrap();
    assert_eq!(predictor.architecture(), Architecture::WildfireNet);
    let predictions = predictor
        .predict_dir(&data.path().join("test/wildfire"), 3)
        .unwrap();
    assert_eq!(predictions.len(), 4);
}

#[test]
fn wildfirenet_run_rejects_missing_split() {
    let data = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 1);
    std::fs::remove_dir_all(data.path().join("valid")).unwrap();

    let config = TrainingConfig {
        data_dir: data.path().to_path_buf(),
        output_dir: output.path().to_path_buf(),
        input_size: 32,
        epochs: 1,
        ..Default::default()
    };
    let result = run_training::<Train>(&config, &Default::default());
    assert!(matches!(result, Err(WildfireError::MissingSplit { .. })));
}

#[test]
fn firenet_two_stage_run() {
    let data = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 3);

    let config = FireNetConfig {
        data_dir: data.path().to_path_buf(),
        output_dir: output.path().to_path_buf(),
        input_size: 32,
        batch_size: 4,
        workers: 1,
        head_epochs: 1,
        fine_tune_epochs: 1,
        fine_tune_policy: FineTunePolicy::Always,
        ..Default::default()
    };
    let device = Default::default();
    let outcome = run_firenet::<Train>(&config, &device).unwrap();

    assert_eq!(outcome.head.history.len(), 1);
    let fine_tune = outcome.fine_tune.as_ref().expect("fine-tuning should run");
    assert_eq!(fine_tune.history.len(), 1);
    assert!(outcome.best_val_acc >= outcome.head.best_val_acc);
    assert_eq!(outcome.test.evaluation.len(), 6);

    let logs = &outcome.paths.logs_dir;
    assert_eq!(files_with_prefix(logs, "history_combined_").len(), 1);
    assert_eq!(files_with_prefix(logs, "training_head_").len(), 1);
    assert_eq!(files_with_prefix(logs, "training_finetune_").len(), 1);

    let predictor = Predictor::<Inner>::from_checkpoint(&outcome.final_checkpoint, &device).unwrap();
    assert_eq!(predictor.architecture(), Architecture::FireNet);
    assert_eq!(predictor.input_size(), 32);
}

#[test]
fn firenet_zero_fine_tune_epochs_skips_stage() {
    let data = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 2);

    let config = FireNetConfig {
        data_dir: data.path().to_path_buf(),
        output_dir: output.path().to_path_buf(),
        input_size: 32,
        batch_size: 4,
        workers: 1,
        head_epochs: 1,
        fine_tune_epochs: 0,
        ..Default::default()
    };
    let outcome = run_firenet::<Train>(&config, &Default::default()).unwrap();

    assert!(outcome.fine_tune.is_none());
    assert!(record_path(&outcome.final_checkpoint).exists());
}
