//! Error taxonomy shared by sources, views and the registry

use thiserror::Error;

/// Errors raised while loading, configuring or sampling datasets
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    /// An image or array fetch (or its decode) failed
    #[error("failed to load '{source_name}': {reason}")]
    LoadFailure { source_name: String, reason: String },

    /// The dataset description or a view request is malformed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation touched data that is not available yet
    #[error("invalid state: {0}")]
    State(String),
}

impl DatasetError {
    pub fn load_failure(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        DatasetError::LoadFailure {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        DatasetError::Configuration(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        DatasetError::State(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
