//! Autosave runtime error types

use thiserror::Error;

/// Errors surfaced by the autosave runtime and its configuration
#[derive(Error, Debug)]
pub enum SyncError {
    /// The scene-sync actor has stopped (unmounted or panicked)
    #[error("Scene sync unavailable: {0}")]
    Unavailable(String),

    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        SyncError::Unavailable(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config(message.into())
    }
}
