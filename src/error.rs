//! Error types for PMD telemetry processing.
//!
//! Framing desynchronisation and lost packets are *not* errors: the framer
//! resynchronises on the next header and packet loss is reported through the
//! lost-packet counter stream. The variants below cover the failures that a
//! caller can actually act on, such as a broken transport, an unreadable capture file
//! or an invalid pipeline configuration.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use pmdstream::PmdError;
//!
//! let error = PmdError::transport_failed("serial read returned EIO");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for PMD operations.
pub type Result<T, E = PmdError> = std::result::Result<T, E>;

/// Main error type for PMD operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PmdError {
    #[error("PMD transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Capture file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("Downsampling window size must be at least 1, got {size}")]
    InvalidWindowSize { size: usize },

    #[error("Channel '{channel}' closed")]
    ChannelClosed { channel: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },
}

impl PmdError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            PmdError::Transport { .. } => true,
            PmdError::ChannelClosed { .. } => true,
            PmdError::File { .. } => false,
            PmdError::Config { .. } => false,
            PmdError::InvalidWindowSize { .. } => false,
            PmdError::Parse { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PmdError::Transport { .. } => vec![
                "Check that the PMD is powered and the USB cable is seated",
                "Verify no other application holds the serial port",
                "Reconnect to reset the framer and sequence counter",
            ],
            PmdError::File { .. } => vec![
                "Check the capture file exists and is readable",
                "Verify the file contains raw PMD bytes",
            ],
            PmdError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare field names against PipelineConfig",
            ],
            PmdError::InvalidWindowSize { .. } => {
                vec!["Use a downsampling window size of 1 or greater"]
            }
            PmdError::ChannelClosed { .. } => vec![
                "Reconnect the device to restart the pipeline",
                "Make sure the connection is not dropped while streams are in use",
            ],
            PmdError::Parse { .. } => vec![
                "Verify source data integrity",
                "Check data format compatibility",
            ],
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        PmdError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        PmdError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        PmdError::File { path, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(details: impl Into<String>) -> Self {
        PmdError::Config { details: details.into() }
    }

    /// Helper constructor for closed channel errors.
    pub fn channel_closed(channel: impl Into<String>) -> Self {
        PmdError::ChannelClosed { channel: channel.into() }
    }
}

impl From<std::io::Error> for PmdError {
    fn from(err: std::io::Error) -> Self {
        PmdError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for PmdError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        PmdError::Parse { context: "pipeline configuration".to_string(), details: err.to_string() }
    }
}
