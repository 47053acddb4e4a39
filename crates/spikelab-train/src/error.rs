//! Error types for the training crate

use thiserror::Error;

use spikelab_core::CoreError;

/// Result type for training operations
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur while configuring or running training
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid training or evolution configuration
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Reason the configuration was rejected
        reason: String,
    },

    /// Error raised by the simulation core
    #[error("Core error: {source}")]
    Core {
        #[from]
        /// Source core error
        source: CoreError,
    },
}

impl TrainError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
