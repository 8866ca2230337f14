//! Wildfire Detection CLI
//!
//! Entry point for training WildfireNet / FireNet, evaluating checkpoints,
//! predicting images and inspecting a dataset.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use wildfire_detection::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use wildfire_detection::dataset::loader::SPLITS;
use wildfire_detection::dataset::ImageFolder;
use wildfire_detection::inference::{evaluate_checkpoint, Predictor};
use wildfire_detection::model::{FineTunePolicy, FireNetConfig, TrainingConfig};
use wildfire_detection::training::{run_firenet, run_training, TestReport};
use wildfire_detection::utils::format_number;
use wildfire_detection::utils::logging::{init_logging, LogConfig, LogLevel};

/// Wildfire detection from satellite imagery
#[derive(Parser, Debug)]
#[command(name = "wildfire")]
#[command(version)]
#[command(about = "Binary wildfire classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Explicit log level (trace, debug, info, warn, error)
    #[arg(long, conflicts_with_all = ["verbose", "quiet"])]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by both training pipelines
#[derive(Args, Debug)]
struct CommonTrainArgs {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset root containing train/, valid/ and test/
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Root for models/ and logs/
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Square input resolution
    #[arg(long)]
    input_size: Option<usize>,

    /// Image decoding threads
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Disable training-time augmentation
    #[arg(long, default_value = "false")]
    no_augmentation: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train WildfireNet
    Train {
        #[command(flatten)]
        common: CommonTrainArgs,

        #[arg(short, long)]
        epochs: Option<usize>,

        /// Peak learning rate of the one-cycle schedule
        #[arg(short, long)]
        lr: Option<f64>,

        #[arg(long)]
        weight_decay: Option<f64>,

        #[arg(long)]
        dropout: Option<f64>,
    },

    /// Train FireNet (head stage, then optional fine-tuning)
    Firenet {
        #[command(flatten)]
        common: CommonTrainArgs,

        #[arg(long)]
        head_epochs: Option<usize>,

        #[arg(long)]
        fine_tune_epochs: Option<usize>,

        /// Learning rate of the head stage
        #[arg(short, long)]
        lr: Option<f64>,

        #[arg(long)]
        fine_tune_lr: Option<f64>,

        /// Early-stopping patience on validation loss
        #[arg(long)]
        patience: Option<usize>,

        /// Skip fine-tuning when the head stage gains at least this much
        /// validation accuracy over the untrained network
        #[arg(long)]
        skip_when_head_gain: Option<f64>,
    },

    /// Evaluate a checkpoint on a dataset split
    Evaluate {
        /// Checkpoint path (with or without extension)
        #[arg(short, long)]
        model: PathBuf,

        #[arg(short, long, default_value = "data/wildfire")]
        data_dir: PathBuf,

        #[arg(short, long, default_value = "test")]
        split: String,

        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        #[arg(long, default_value = "2")]
        workers: usize,
    },

    /// Predict a single image or every image in a directory
    Predict {
        /// Checkpoint path (with or without extension)
        #[arg(short, long)]
        model: PathBuf,

        /// Image file or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Decision threshold on the wildfire probability
        #[arg(short, long, default_value = "0.5")]
        threshold: f32,

        #[arg(short, long, default_value = "16")]
        batch_size: usize,

        /// Print predictions as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show per-split, per-class image counts
    Stats {
        #[arg(short, long, default_value = "data/wildfire")]
        data_dir: PathBuf,
    },
}

/// Apply the shared training flags to either configuration type
macro_rules! apply_common {
    ($config:ident, $common:ident) => {
        if let Some(v) = $common.data_dir {
            $config.data_dir = v;
        }
        if let Some(v) = $common.output_dir {
            $config.output_dir = v;
        }
        if let Some(v) = $common.batch_size {
            $config.batch_size = v;
        }
        if let Some(v) = $common.input_size {
            $config.input_size = v;
        }
        if let Some(v) = $common.workers {
            $config.workers = v;
        }
        if let Some(v) = $common.seed {
            $config.seed = v;
        }
        if $common.no_augmentation {
            $config.augmentation = wildfire_detection::dataset::AugmentationConfig::none();
        }
    };
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if let Some(level) = &cli.log_level {
        LogConfig::with_level(LogLevel::parse(level))
    } else if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            common,
            epochs,
            lr,
            weight_decay,
            dropout,
        } => {
            let mut config = match &common.config {
                Some(path) => TrainingConfig::load(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?,
                None => TrainingConfig::default(),
            };
            apply_common!(config, common);
            if let Some(v) = epochs {
                config.epochs = v;
            }
            if let Some(v) = lr {
                config.lr = v;
            }
            if let Some(v) = weight_decay {
                config.weight_decay = v;
            }
            if let Some(v) = dropout {
                config.dropout = v;
            }
            cmd_train(&config)?;
        }

        Commands::Firenet {
            common,
            head_epochs,
            fine_tune_epochs,
            lr,
            fine_tune_lr,
            patience,
            skip_when_head_gain,
        } => {
            let mut config = match &common.config {
                Some(path) => FireNetConfig::load(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?,
                None => FireNetConfig::default(),
            };
            apply_common!(config, common);
            if let Some(v) = head_epochs {
                config.head_epochs = v;
            }
            if let Some(v) = fine_tune_epochs {
                config.fine_tune_epochs = v;
            }
            if let Some(v) = lr {
                config.lr = v;
            }
            if let Some(v) = fine_tune_lr {
                config.fine_tune_lr = v;
            }
            if let Some(v) = patience {
                config.patience = v;
            }
            if let Some(min_gain) = skip_when_head_gain {
                config.fine_tune_policy = FineTunePolicy::SkipWhenHeadGain { min_gain };
            }
            cmd_firenet(&config)?;
        }

        Commands::Evaluate {
            model,
            data_dir,
            split,
            batch_size,
            workers,
        } => {
            cmd_evaluate(&model, &data_dir, &split, batch_size, workers)?;
        }

        Commands::Predict {
            model,
            input,
            threshold,
            batch_size,
            json,
        } => {
            cmd_predict(&model, &input, threshold, batch_size, json)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   🔥 Wildfire Detection                                      ║
 ║   Satellite image classification with Burn + Rust            ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .red()
    );
}

fn print_test_report(report: &TestReport) {
    let evaluation = &report.evaluation;
    let matrix = evaluation.confusion_matrix();

    println!();
    println!("{}", "Test Results:".cyan().bold());
    println!("  📉 Loss:      {:.4}", evaluation.loss);
    println!("  ✅ Accuracy:  {:.2}%", evaluation.accuracy * 100.0);
    println!("  📈 ROC AUC:   {:.4}", report.auc);
    println!("  🧮 Confusion: TN {} | FP {} | FN {} | TP {}",
        matrix.true_negatives, matrix.false_positives, matrix.false_negatives, matrix.true_positives
    );
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  📁 Data:          {:?}", config.data_dir);
    println!("  💾 Output:        {:?}", config.output_dir);
    println!("  🖼️  Input size:    {}", config.input_size);
    println!("  🔄 Epochs:        {}", config.epochs);
    println!("  📦 Batch size:    {}", config.batch_size);
    println!("  📈 Max LR:        {}", config.lr);
    println!("  🧠 Backend:       {}", backend_name());
    println!();

    let outcome = run_training::<TrainingBackend>(config, &default_device())?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  🎉 Best validation accuracy: {:.2}%", outcome.best_val_acc * 100.0);
    match &outcome.best_checkpoint {
        Some(path) => println!("  💾 Best model:  {:?}", path),
        None => println!("  {} no epoch improved validation accuracy", "Warning:".yellow()),
    }
    println!("  💾 Final model: {:?}", outcome.final_checkpoint);
    println!("  📝 Logs:        {:?}", outcome.paths.logs_dir);
    print_test_report(&outcome.test);

    Ok(())
}

fn cmd_firenet(config: &FireNetConfig) -> Result<()> {
    println!("{}", "FireNet Configuration:".cyan().bold());
    println!("  📁 Data:             {:?}", config.data_dir);
    println!("  💾 Output:           {:?}", config.output_dir);
    println!("  🖼️  Input size:       {}", config.input_size);
    println!("  🔄 Head epochs:      {}", config.head_epochs);
    println!("  🔄 Fine-tune epochs: {}", config.fine_tune_epochs);
    println!("  🧭 Fine-tune policy: {:?}", config.fine_tune_policy);
    println!("  🧠 Backend:          {}", backend_name());
    println!();

    let outcome = run_firenet::<TrainingBackend>(config, &default_device())?;

    println!();
    println!("{}", "FireNet Training Complete!".green().bold());
    println!("  📊 Baseline val accuracy:   {:.2}%", outcome.baseline_val_acc * 100.0);
    println!("  🏷️  After head training:     {:.2}%", outcome.head.val_acc * 100.0);
    match &outcome.fine_tune {
        Some(stage) => println!("  🔧 After fine-tuning:       {:.2}%", stage.val_acc * 100.0),
        None => println!("  🔧 Fine-tuning:             {}", "skipped".yellow()),
    }
    println!("  🎉 Best validation accuracy: {:.2}%", outcome.best_val_acc * 100.0);
    println!("  💾 Final model: {:?}", outcome.final_checkpoint);
    print_test_report(&outcome.test);

    Ok(())
}

fn cmd_evaluate(
    model: &Path,
    data_dir: &Path,
    split: &str,
    batch_size: usize,
    workers: usize,
) -> Result<()> {
    info!("Evaluating {:?} on {:?}/{}", model, data_dir, split);

    let (evaluation, class_names) = evaluate_checkpoint::<DefaultBackend>(
        model,
        data_dir,
        split,
        batch_size,
        workers,
        &default_device(),
    )?;

    let report = evaluation.classification_report(&class_names);
    let matrix = evaluation.confusion_matrix();

    println!("{}", format!("Evaluation on '{}':", split).cyan().bold());
    println!("  📷 Samples:   {}", format_number(evaluation.len()));
    println!("  📉 Loss:      {:.4}", evaluation.loss);
    println!("  ✅ Accuracy:  {:.2}%", evaluation.accuracy * 100.0);
    println!("  📈 ROC AUC:   {:.4}", evaluation.auc());
    println!();
    println!("{}", report.to_table());
    println!("{}", "Confusion matrix (rows = actual):".cyan());
    for (name, row) in class_names.iter().zip(matrix.as_rows()) {
        println!("  {:>12} {:>6} {:>6}", name, row[0], row[1]);
    }

    Ok(())
}

fn cmd_predict(
    model: &Path,
    input: &Path,
    threshold: f32,
    batch_size: usize,
    json: bool,
) -> Result<()> {
    let predictor = Predictor::<DefaultBackend>::from_checkpoint(model, &default_device())?
        .with_threshold(threshold)?;

    let predictions = if input.is_dir() {
        predictor.predict_dir(input, batch_size)?
    } else {
        vec![predictor.predict_file(input)?]
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&predictions)?);
        return Ok(());
    }

    for prediction in &predictions {
        let label = if prediction.prediction == 1 {
            prediction.label.red().bold()
        } else {
            prediction.label.green().bold()
        };
        let name = prediction
            .image_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "  {:<50} {:<12} p(wildfire) = {:.4}",
            name, label, prediction.probability
        );
    }
    let positives = predictions.iter().filter(|p| p.prediction == 1).count();
    println!();
    println!(
        "  {} of {} images classified as wildfire (threshold {:.2})",
        positives,
        predictions.len(),
        threshold
    );

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    if !data_dir.exists() {
        println!("{} Dataset directory not found: {:?}", "Error:".red(), data_dir);
        println!();
        println!("Expected structure:");
        println!("  {}/{{train,valid,test}}/{{nowildfire,wildfire}}/*.jpg", data_dir.display());
        return Ok(());
    }

    println!("{}", "Dataset Statistics:".cyan().bold());
    for split in SPLITS {
        let dir = data_dir.join(split);
        if !dir.is_dir() {
            println!("  {} missing split '{}'", "Warning:".yellow(), split);
            continue;
        }
        let folder = ImageFolder::new(&dir)?;
        let total = folder.samples.len();
        println!();
        println!("  {} ({} images)", split.bold(), format_number(total));
        for (name, count) in folder.classes.iter().zip(folder.class_counts()) {
            let pct = 100.0 * count as f64 / total.max(1) as f64;
            println!("    {:20} {:>7} ({:>5.1}%)", name, format_number(count), pct);
        }
    }

    Ok(())
}
