//! Utilities module for logging, metrics, reports and error types
//!
//! - Structured logging with tracing
//! - Binary classification metrics (confusion matrix, classification report, ROC AUC)
//! - CSV report writers for test artifacts
//! - Error handling types

pub mod error;
pub mod logging;
pub mod metrics;
pub mod report;

pub use error::{Result, WildfireError};
pub use logging::init_logging;
pub use metrics::{BinaryConfusionMatrix, ClassificationReport};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

/// Timestamp used to key every artifact of a run, to the millisecond
pub fn run_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(4_848_353), "4,848,353");
        assert_eq!(format_number(42), "42");
    }

    #[test]
    fn test_run_timestamp_shape() {
        let ts = run_timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[8..9], "_");
        assert_eq!(&ts[15..16], "_");
    }
}
