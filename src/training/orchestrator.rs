//! WildfireNet training run
//!
//! Validates configuration and dataset, trains with AdamW and a per-batch
//! one-cycle schedule, keeps the best-on-validation checkpoint, then reloads
//! it and writes the test-set report.

use std::path::PathBuf;

use burn::{
    module::{AutodiffModule, Module},
    optim::AdamWConfig,
    tensor::backend::{AutodiffBackend, Backend},
};
use tracing::{info, warn};

use super::checkpoint::{
    load_model, save_model, write_metadata, BestCheckpointMeta, BestModelTracker,
    FinalCheckpointMeta, RunPaths,
};
use super::evaluator::{evaluate, Evaluation};
use super::history::{EpochRecord, TrainingHistory};
use super::scheduler::{OneCycleLr, StepScheduler};
use super::trainer::{train_one_epoch, FullModel};
use crate::dataset::{
    validate_layout, Augmenter, BatchLoader, Normalization, WildfireBatcher,
};
use crate::model::{Architecture, BinaryClassifier, TrainingConfig, WildfireNetConfig};
use crate::utils::error::{Result, WildfireError};
use crate::utils::logging::TrainingLogger;
use crate::utils::report::{
    write_classification_report, write_confusion_matrix, write_roc_curve, write_test_summary,
    TestSummary,
};
use crate::utils::{format_number, run_timestamp};

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub paths: RunPaths,
    pub history: TrainingHistory,
    pub best_val_acc: f64,
    /// `None` when no epoch beat 0.0 validation accuracy
    pub best_checkpoint: Option<PathBuf>,
    pub final_checkpoint: PathBuf,
    pub test: TestReport,
}

/// Test-set evaluation plus the summary row written to disk
#[derive(Debug, Clone)]
pub struct TestReport {
    pub evaluation: Evaluation,
    pub auc: f64,
    pub summary: TestSummary,
}

/// Run-level facts that go into the test summary
#[derive(Debug, Clone)]
pub struct ReportContext<'a> {
    pub model_name: &'a str,
    pub class_names: &'a [String],
    pub trainable_params: usize,
    pub best_val_acc: f64,
    pub epochs_trained: usize,
}

/// Train WildfireNet end to end
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingOutcome> {
    config.validate()?;
    let layout = validate_layout(&config.data_dir)?;
    if layout.classes().len() != config.num_classes {
        return Err(WildfireError::Config(format!(
            "num_classes is {} but the dataset has classes {:?}",
            config.num_classes,
            layout.classes()
        )));
    }
    let class_names = layout.classes().to_vec();

    B::seed(device, config.seed);

    let paths = RunPaths::create(&config.output_dir, run_timestamp())?;
    config.save(&paths.logs_dir.join(format!("config_{}.json", paths.timestamp)))?;

    let augmenter = Augmenter::new(config.augmentation.clone(), config.input_size as u32);
    let train_loader = BatchLoader::train(
        layout.train,
        augmenter,
        config.batch_size,
        config.workers,
        config.seed,
    )?;
    let valid_loader =
        BatchLoader::eval(layout.valid, config.input_size, config.batch_size, config.workers)?;
    let test_loader =
        BatchLoader::eval(layout.test, config.input_size, config.batch_size, config.workers)?;
    let batcher = WildfireBatcher::new(config.input_size, Normalization::ImageNet);

    let mut model = WildfireNetConfig::from_training(config).init::<B>(device);
    let trainable_params = model.num_params();
    info!(
        "WildfireNet: {} parameters, input {}x{}",
        format_number(trainable_params),
        config.input_size,
        config.input_size
    );

    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .init::<B, crate::model::WildfireNet<B>>();
    let mut scheduler = OneCycleLr::new(
        config.lr,
        train_loader.num_batches() * config.epochs,
        config.pct_start,
    );

    let config_json = serde_json::to_value(config)?;
    let mut tracker = BestModelTracker::new();
    let mut best_checkpoint = None;
    let mut history = TrainingHistory::new();
    let mut logger = TrainingLogger::new("WildfireNet", config.epochs);
    let history_path = paths.log("history");

    for epoch in 1..=config.epochs {
        logger.start_epoch(epoch);
        let lr = scheduler.lr();

        let batches = train_loader.batches::<B>(epoch, &batcher, device)?;
        let (trained, stats) = train_one_epoch(
            model,
            &mut optimizer,
            &mut scheduler,
            &FullModel,
            batches,
            train_loader.num_batches(),
        )?;
        model = trained;

        let val = evaluate::<B::InnerBackend, _>(&model.valid(), &valid_loader, &batcher, device)?;
        let record = EpochRecord {
            epoch,
            train_loss: stats.loss,
            train_acc: stats.accuracy,
            val_loss: val.loss,
            val_acc: val.accuracy,
            lr,
        };
        history.push(record);
        history.write_csv(&history_path)?;
        logger.end_epoch(&record);

        if tracker.observe(epoch, val.accuracy) {
            let path = paths.model("wildfirenet_best");
            save_model(&model, &path)?;
            write_metadata(
                &path,
                &BestCheckpointMeta {
                    val_acc: val.accuracy,
                    epoch,
                    architecture: Architecture::WildfireNet,
                    config: config_json.clone(),
                },
            )?;
            logger.log_new_best(val.accuracy);
            best_checkpoint = Some(path);
        }
    }
    logger.log_complete(history.len(), tracker.best());

    let final_checkpoint = paths.model("wildfirenet_final");
    save_model(&model, &final_checkpoint)?;
    write_metadata(
        &final_checkpoint,
        &FinalCheckpointMeta {
            best_val_acc: tracker.best(),
            history: history.clone(),
            architecture: Architecture::WildfireNet,
            config: config_json,
        },
    )?;
    info!("Final model saved to {:?}", final_checkpoint);

    match &best_checkpoint {
        Some(path) => {
            model = load_model(model, path, device)?;
            info!("Reloaded best checkpoint {:?} for testing", path);
        }
        None => warn!("No epoch improved validation accuracy; testing the final weights"),
    }

    let test = write_test_report::<B::InnerBackend, _>(
        &model.valid(),
        &test_loader,
        &batcher,
        device,
        &paths,
        &ReportContext {
            model_name: "WildfireNet",
            class_names: &class_names,
            trainable_params,
            best_val_acc: tracker.best(),
            epochs_trained: history.len(),
        },
    )?;

    Ok(TrainingOutcome {
        paths,
        history,
        best_val_acc: tracker.best(),
        best_checkpoint,
        final_checkpoint,
        test,
    })
}

/// Evaluate on the test split and write the report CSVs
pub fn write_test_report<B, M>(
    model: &M,
    loader: &BatchLoader,
    batcher: &WildfireBatcher,
    device: &B::Device,
    paths: &RunPaths,
    context: &ReportContext<'_>,
) -> Result<TestReport>
where
    B: Backend,
    M: BinaryClassifier<B>,
{
    let evaluation = evaluate::<B, M>(model, loader, batcher, device)?;
    let report = evaluation.classification_report(context.class_names);
    let curve = evaluation.roc_curve();
    let auc = evaluation.auc();

    info!(
        "Test loss {:.4} | accuracy {:.2}% | AUC {:.4}",
        evaluation.loss,
        evaluation.accuracy * 100.0,
        auc
    );
    info!("Classification report (test):\n{}", report.to_table());

    write_classification_report(&paths.log("classification_report"), &report)?;
    write_confusion_matrix(
        &paths.log("confusion"),
        &evaluation.confusion_matrix(),
        context.class_names,
    )?;
    write_roc_curve(&paths.log("roc"), &curve)?;

    let summary = TestSummary {
        model: context.model_name.to_string(),
        test_loss: evaluation.loss,
        test_accuracy: evaluation.accuracy,
        test_auc: auc,
        trainable_params: context.trainable_params,
        best_val_acc: context.best_val_acc,
        epochs_trained: context.epochs_trained,
    };
    write_test_summary(&paths.log("test_summary"), &summary)?;

    Ok(TestReport {
        evaluation,
        auc,
        summary,
    })
}
