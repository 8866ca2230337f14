//! Logging Module
//!
//! Console logging through `tracing`, and the per-epoch logger shared by the
//! WildfireNet run and both FireNet stages.

use std::time::Instant;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::training::history::EpochRecord;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Print the module path of each event
    pub include_target: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::with_level(LogLevel::Info)
    }
}

impl LogConfig {
    pub fn with_level(level: LogLevel) -> Self {
        Self {
            level,
            include_target: level <= LogLevel::Debug,
            ansi_colors: true,
        }
    }

    /// Debug output with module paths
    pub fn verbose() -> Self {
        Self::with_level(LogLevel::Debug)
    }

    /// Warnings and errors only
    pub fn quiet() -> Self {
        Self::with_level(LogLevel::Warn)
    }
}

/// Log level, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name, falling back to Info
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Install the global subscriber; fails if one is already set
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Epoch-level progress for one training stage
pub struct TrainingLogger {
    stage: String,
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    stage_start: Instant,
}

impl TrainingLogger {
    pub fn new(stage: &str, total_epochs: usize) -> Self {
        let now = Instant::now();
        Self {
            stage: stage.to_string(),
            epoch: 0,
            total_epochs,
            epoch_start: now,
            stage_start: now,
        }
    }

    /// Mark the start of a 1-based epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
    }

    /// Seconds left for the remaining epochs at the average pace so far
    fn eta_secs(&self) -> f64 {
        let per_epoch = self.stage_start.elapsed().as_secs_f64() / self.epoch.max(1) as f64;
        self.total_epochs.saturating_sub(self.epoch) as f64 * per_epoch
    }

    pub fn end_epoch(&self, record: &EpochRecord) {
        info!(
            "[{}] {}/{} ({:.1}s) train loss {:.4} acc {:.2}% | val loss {:.4} acc {:.2}% | lr {:.2e} | eta {}",
            self.stage,
            record.epoch,
            self.total_epochs,
            self.epoch_start.elapsed().as_secs_f64(),
            record.train_loss,
            record.train_acc * 100.0,
            record.val_loss,
            record.val_acc * 100.0,
            record.lr,
            super::format_duration(self.eta_secs())
        );
    }

    pub fn log_new_best(&self, accuracy: f64) {
        info!("[{}] New best val accuracy {:.2}%, checkpoint saved", self.stage, accuracy * 100.0);
    }

    pub fn log_early_stop(&self, patience: usize) {
        warn!(
            "[{}] Early stop at epoch {}: val loss flat for {} epochs",
            self.stage, self.epoch, patience
        );
    }

    pub fn log_complete(&self, epochs_run: usize, best_accuracy: f64) {
        info!(
            "[{}] Done: {} epochs in {}, best val accuracy {:.2}%",
            self.stage,
            epochs_run,
            super::format_duration(self.stage_start.elapsed().as_secs_f64()),
            best_accuracy * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("loud"), LogLevel::Info);
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert!(!LogConfig::default().include_target);
        assert!(LogConfig::verbose().include_target);
        assert_eq!(LogConfig::quiet().level, LogLevel::Warn);
    }

    #[test]
    fn test_eta_shrinks_with_epochs() {
        let mut logger = TrainingLogger::new("WildfireNet", 4);
        logger.start_epoch(4);
        assert_eq!(logger.eta_secs(), 0.0);
        logger.end_epoch(&EpochRecord {
            epoch: 4,
            train_loss: 0.5,
            train_acc: 0.75,
            val_loss: 0.4,
            val_acc: 0.8,
            lr: 1e-3,
        });
    }
}
