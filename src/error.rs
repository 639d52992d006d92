use thiserror::Error;

use crate::audio_system::source::Category;
use crate::state::Lifecycle;

/// Sound-manager errors using thiserror for structured error handling.
///
/// None of these are fatal: the facade logs them and returns without side
/// effects. `DuplicateName` only comes out of registration.

#[derive(Error, Debug)]
pub enum SoundError {
    #[error("{category} clip not found: {name}")]
    ClipNotFound { category: Category, name: String },

    #[error("No free {category} channel available")]
    NoFreeChannel { category: Category },

    #[error("Duplicate {category} clip name: {name}")]
    DuplicateName { category: Category, name: String },

    #[error("Audio backend failure")]
    Backend(#[from] BackendError),

    #[error("Sound manager is not running ({state})")]
    NotRunning { state: Lifecycle },
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to decode audio format")]
    DecodeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Audio playback failed")]
    PlaybackFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load clip '{name}' from {path}")]
    ClipLoadFailed {
        name: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Registration(#[from] SoundError),
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
