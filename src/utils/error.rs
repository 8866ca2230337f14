//! Error Handling Module
//!
//! Defines the error type for the wildfire detection library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for wildfire detection operations
#[derive(Error, Debug)]
pub enum WildfireError {
    /// Invalid configuration value, detected before any work starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A required dataset split directory is absent
    #[error("Missing dataset split '{split}' under {root}")]
    MissingSplit { root: PathBuf, split: String },

    /// Splits do not expose the same class directories
    #[error("Class mismatch in split '{split}': expected {expected:?}, found {found:?}")]
    ClassMismatch {
        split: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error saving or restoring model weights
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Tensor data could not be read back from the device
    #[error("Tensor error: {0}")]
    Tensor(String),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for WildfireError {
    fn from(err: serde_json::Error) -> Self {
        WildfireError::Serialization(err.to_string())
    }
}

/// Convenience Result type for wildfire detection operations
pub type Result<T> = std::result::Result<T, WildfireError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| WildfireError::Checkpoint(format!("{}: {:?}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| WildfireError::Checkpoint(format!("{}: {:?}", f(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WildfireError::Config("batch_size must be > 0".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: batch_size must be > 0"
        );
    }

    #[test]
    fn test_missing_split_display() {
        let err = WildfireError::MissingSplit {
            root: PathBuf::from("/data/wildfire"),
            split: "valid".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("valid"));
        assert!(msg.contains("/data/wildfire"));
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/path/to/tile.jpg");
        let err = WildfireError::ImageLoad(path, "truncated file".to_string());
        assert!(format!("{}", err).contains("tile.jpg"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let with_context = result.context("Failed to load record");
        assert!(matches!(with_context, Err(WildfireError::Checkpoint(_))));
    }
}
