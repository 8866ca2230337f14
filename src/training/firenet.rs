//! FireNet two-stage training
//!
//! Stage 1 trains the MLP head on top of the frozen convolutional base.
//! Stage 2 unfreezes the whole network at a lower learning rate; whether it
//! runs is decided by [`FineTunePolicy`]. Both stages use Adam, early
//! stopping on validation loss and reduce-on-plateau.

use std::path::PathBuf;

use burn::{
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams},
    tensor::{backend::AutodiffBackend, Tensor},
};
use tracing::{info, warn};

use super::checkpoint::{
    save_model, write_metadata, BestCheckpointMeta, BestModelTracker, FinalCheckpointMeta,
    RunPaths,
};
use super::evaluator::evaluate;
use super::history::{EpochRecord, TrainingHistory};
use super::orchestrator::{write_test_report, ReportContext, TestReport};
use super::scheduler::{ConstantLr, EarlyStopping, PlateauMode, ReduceOnPlateauState, StepScheduler};
use super::trainer::{train_one_epoch, FullModel, TrainStep};
use crate::dataset::{validate_layout, Augmenter, BatchLoader, Normalization, WildfireBatcher};
use crate::model::firenet::{FireNet, FireNetModelConfig};
use crate::model::{Architecture, BinaryClassifier, FineTunePolicy, FireNetConfig};
use crate::utils::error::Result;
use crate::utils::logging::TrainingLogger;
use crate::utils::{format_number, run_timestamp};

/// Train only the head; the base runs in inference mode on detached inputs
#[derive(Debug, Clone, Copy, Default)]
pub struct FrozenBase;

impl<B: AutodiffBackend> TrainStep<B, FireNet<B>> for FrozenBase {
    fn forward(&self, model: &FireNet<B>, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = model.base.valid().forward(images.inner());
        model.head.forward(Tensor::from_inner(features))
    }

    fn gradients(&self, model: &FireNet<B>, mut grads: B::Gradients) -> GradientsParams {
        GradientsParams::from_module(&mut grads, &model.head)
    }

    fn check_input(&self, model: &FireNet<B>, dims: [usize; 4]) -> Result<()> {
        model.check_input(dims)
    }
}

/// Stage-specific settings
#[derive(Debug, Clone)]
struct StageSettings {
    name: &'static str,
    best_prefix: &'static str,
    log_prefix: &'static str,
    epochs: usize,
    /// Added to the stage epoch so shuffles differ between stages
    epoch_offset: usize,
    lr: f64,
    plateau_patience: usize,
    min_lr: f64,
}

struct StageContext<'a, B: AutodiffBackend> {
    config: &'a FireNetConfig,
    config_json: &'a serde_json::Value,
    paths: &'a RunPaths,
    train_loader: &'a BatchLoader,
    valid_loader: &'a BatchLoader,
    batcher: &'a WildfireBatcher,
    device: &'a B::Device,
}

struct StageOutcome<B: AutodiffBackend> {
    model: FireNet<B>,
    history: TrainingHistory,
    best_val_acc: f64,
    best_checkpoint: Option<PathBuf>,
    /// Validation accuracy of the weights the stage hands on
    val_acc: f64,
    stopped_early: bool,
}

/// Summary of one stage
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub history: TrainingHistory,
    pub best_val_acc: f64,
    pub best_checkpoint: Option<PathBuf>,
    pub val_acc: f64,
    pub stopped_early: bool,
}

impl<B: AutodiffBackend> StageOutcome<B> {
    fn report(&self, name: &str) -> StageReport {
        StageReport {
            name: name.to_string(),
            history: self.history.clone(),
            best_val_acc: self.best_val_acc,
            best_checkpoint: self.best_checkpoint.clone(),
            val_acc: self.val_acc,
            stopped_early: self.stopped_early,
        }
    }
}

/// Everything a finished FireNet run produced
#[derive(Debug, Clone)]
pub struct FireNetOutcome {
    pub paths: RunPaths,
    /// Validation accuracy of the untrained network
    pub baseline_val_acc: f64,
    pub head: StageReport,
    /// `None` when the policy skipped fine-tuning
    pub fine_tune: Option<StageReport>,
    pub best_val_acc: f64,
    pub final_checkpoint: PathBuf,
    pub test: TestReport,
}

fn run_stage<B, T>(
    mut model: FireNet<B>,
    step: &T,
    settings: &StageSettings,
    ctx: &StageContext<'_, B>,
) -> Result<StageOutcome<B>>
where
    B: AutodiffBackend,
    T: TrainStep<B, FireNet<B>>,
{
    info!(
        "=== {}: {} epochs at lr {:.1e} ===",
        settings.name, settings.epochs, settings.lr
    );

    let mut optimizer = AdamConfig::new().init::<B, FireNet<B>>();
    let mut scheduler = ConstantLr::new(settings.lr);
    let mut plateau = ReduceOnPlateauState::new(
        settings.lr,
        0.5,
        settings.plateau_patience,
        settings.min_lr,
        PlateauMode::Min,
    );
    let mut stopper = EarlyStopping::new(ctx.config.patience);
    let mut tracker = BestModelTracker::new();
    let mut best_checkpoint = None;
    let mut history = TrainingHistory::new();
    let mut logger = TrainingLogger::new(settings.name, settings.epochs);
    let log_path = ctx.paths.log(settings.log_prefix);
    let mut stopped_early = false;

    for epoch in 1..=settings.epochs {
        logger.start_epoch(epoch);
        let lr = scheduler.lr();

        let batches = ctx.train_loader.batches::<B>(
            settings.epoch_offset + epoch,
            ctx.batcher,
            ctx.device,
        )?;
        let (trained, stats) = train_one_epoch(
            model,
            &mut optimizer,
            &mut scheduler,
            step,
            batches,
            ctx.train_loader.num_batches(),
        )?;
        model = trained;

        let val = evaluate::<B::InnerBackend, _>(
            &model.valid(),
            ctx.valid_loader,
            ctx.batcher,
            ctx.device,
        )?;
        let record = EpochRecord {
            epoch,
            train_loss: stats.loss,
            train_acc: stats.accuracy,
            val_loss: val.loss,
            val_acc: val.accuracy,
            lr,
        };
        history.push(record);
        history.write_csv(&log_path)?;
        logger.end_epoch(&record);

        if tracker.observe(epoch, val.accuracy) {
            let path = ctx.paths.model(settings.best_prefix);
            save_model(&model, &path)?;
            write_metadata(
                &path,
                &BestCheckpointMeta {
                    val_acc: val.accuracy,
                    epoch,
                    architecture: Architecture::FireNet,
                    config: ctx.config_json.clone(),
                },
            )?;
            logger.log_new_best(val.accuracy);
            best_checkpoint = Some(path);
        }

        let stop = stopper.observe(epoch, val.loss, || model.clone());

        let next_lr = plateau.step(val.loss);
        if plateau.lr_was_reduced() {
            info!("[{}] Reducing learning rate to {:.1e}", settings.name, next_lr);
        }
        scheduler.set_lr(next_lr);

        if stop {
            logger.log_early_stop(ctx.config.patience);
            stopped_early = true;
            break;
        }
    }
    logger.log_complete(history.len(), tracker.best());

    let mut val_acc = history.last().map(|r| r.val_acc).unwrap_or(0.0);
    if stopped_early {
        if let Some(best_epoch) = stopper.best_epoch() {
            val_acc = history.records[best_epoch - 1].val_acc;
        }
        if let Some(best) = stopper.into_best() {
            info!("[{}] Restored weights with the lowest validation loss", settings.name);
            model = best;
        }
    }

    Ok(StageOutcome {
        model,
        history,
        best_val_acc: tracker.best(),
        best_checkpoint,
        val_acc,
        stopped_early,
    })
}

/// Train FireNet in two stages and write the test report
pub fn run_firenet<B: AutodiffBackend>(
    config: &FireNetConfig,
    device: &B::Device,
) -> Result<FireNetOutcome> {
    config.validate()?;
    let layout = validate_layout(&config.data_dir)?;
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
    let batcher = WildfireBatcher::new(config.input_size, Normalization::UnitRange);

    let model = FireNetModelConfig::new()
        .with_input_size(config.input_size)
        .init::<B>(device);
    let trainable_params = model.num_params();
    info!(
        "FireNet: {} parameters ({} in the head)",
        format_number(trainable_params),
        format_number(model.head.num_params())
    );

    let baseline = evaluate::<B::InnerBackend, _>(&model.valid(), &valid_loader, &batcher, device)?;
    info!("Baseline validation accuracy: {:.2}%", baseline.accuracy * 100.0);

    let config_json = serde_json::to_value(config)?;
    let ctx = StageContext {
        config,
        config_json: &config_json,
        paths: &paths,
        train_loader: &train_loader,
        valid_loader: &valid_loader,
        batcher: &batcher,
        device,
    };

    let head_settings = StageSettings {
        name: "Head",
        best_prefix: "firenet_head_best",
        log_prefix: "training_head",
        epochs: config.head_epochs,
        epoch_offset: 0,
        lr: config.lr,
        plateau_patience: 3,
        min_lr: 1e-7,
    };
    let head = run_stage(model, &FrozenBase, &head_settings, &ctx)?;
    let head_report = head.report(head_settings.name);
    info!(
        "Validation accuracy after head training: {:.2}% (baseline {:.2}%)",
        head.val_acc * 100.0,
        baseline.accuracy * 100.0
    );

    let fine_tune_wanted = config
        .fine_tune_policy
        .should_fine_tune(baseline.accuracy, head.val_acc);
    let (model, fine_tune_report) = if fine_tune_wanted && config.fine_tune_epochs > 0 {
        let settings = StageSettings {
            name: "Fine-tune",
            best_prefix: "firenet_finetuned_best",
            log_prefix: "training_finetune",
            epochs: config.fine_tune_epochs,
            epoch_offset: config.head_epochs,
            lr: config.fine_tune_lr,
            plateau_patience: 4,
            min_lr: 1e-8,
        };
        let stage = run_stage(head.model, &FullModel, &settings, &ctx)?;
        let report = stage.report(settings.name);
        (stage.model, Some(report))
    } else {
        match config.fine_tune_policy {
            FineTunePolicy::SkipWhenHeadGain { min_gain } if !fine_tune_wanted => info!(
                "Skipping fine-tuning: head stage gained {:.4} >= {:.4}",
                head.val_acc - baseline.accuracy,
                min_gain
            ),
            _ => warn!("Skipping fine-tuning: fine_tune_epochs is 0"),
        }
        (head.model, None)
    };

    let best_val_acc = fine_tune_report
        .as_ref()
        .map(|r| r.best_val_acc)
        .unwrap_or(0.0)
        .max(head_report.best_val_acc);

    let mut combined = TrainingHistory::new();
    let mut stages: Vec<(&str, &TrainingHistory)> = vec![("head", &head_report.history)];
    if let Some(report) = &fine_tune_report {
        stages.push(("fine_tune", &report.history));
    }
    TrainingHistory::write_combined_csv(&paths.log("history_combined"), &stages)?;
    for (_, history) in &stages {
        for record in &history.records {
            combined.push(EpochRecord {
                epoch: combined.len() + 1,
                ..*record
            });
        }
    }

    let final_checkpoint = paths.model("firenet_final");
    save_model(&model, &final_checkpoint)?;
    write_metadata(
        &final_checkpoint,
        &FinalCheckpointMeta {
            best_val_acc,
            history: combined.clone(),
            architecture: Architecture::FireNet,
            config: config_json.clone(),
        },
    )?;
    info!("Final model saved to {:?}", final_checkpoint);

    let test = write_test_report::<B::InnerBackend, _>(
        &model.valid(),
        &test_loader,
        &batcher,
        device,
        &paths,
        &ReportContext {
            model_name: "FireNet",
            class_names: &class_names,
            trainable_params,
            best_val_acc,
            epochs_trained: combined.len(),
        },
    )?;

    Ok(FireNetOutcome {
        paths,
        baseline_val_acc: baseline.accuracy,
        head: head_report,
        fine_tune: fine_tune_report,
        best_val_acc,
        final_checkpoint,
        test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::WildfireBatch;
    use burn::backend::Autodiff;
    use burn::tensor::{Distribution, Int, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    fn weights(model: &FireNet<TestBackend>) -> (Vec<f32>, Vec<f32>) {
        let base = model.base.blocks[0].conv1.weight.val().into_data().to_vec().unwrap();
        let head = model.head.fc1.weight.val().into_data().to_vec().unwrap();
        (base, head)
    }

    #[test]
    fn test_frozen_base_only_updates_head() {
        let device = Default::default();
        let model = FireNetModelConfig::new()
            .with_input_size(32)
            .init::<TestBackend>(&device);
        let (base_before, head_before) = weights(&model);

        let batch = WildfireBatch {
            images: Tensor::<TestBackend, 4>::random(
                [2, 3, 32, 32],
                Distribution::Uniform(0.0, 1.0),
                &device,
            ),
            targets: Tensor::<TestBackend, 2, Int>::from_data(
                TensorData::new(vec![0i64, 1], [2, 1]),
                &device,
            ),
            labels: vec![0, 1],
        };

        let mut optimizer = AdamConfig::new().init::<TestBackend, FireNet<TestBackend>>();
        let mut scheduler = ConstantLr::new(1e-2);
        let (model, stats) = train_one_epoch(
            model,
            &mut optimizer,
            &mut scheduler,
            &FrozenBase,
            vec![Ok(batch)],
            1,
        )
        .unwrap();
        assert!(stats.loss.is_finite());

        let (base_after, head_after) = weights(&model);
        assert_eq!(base_before, base_after);
        assert_ne!(head_before, head_after);
    }
}
