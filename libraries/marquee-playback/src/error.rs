//! Error types for the playback-state core

use thiserror::Error;

/// Player errors
///
/// Provider-reported failures are not represented here: they travel through
/// the event stream as `ProviderEvent::Error` and are never swallowed.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// No registered provider can play the item's source
    #[error("No suitable provider found for source: {descriptor}")]
    NoSuitableProvider {
        /// The source that could not be matched
        descriptor: String,
    },

    /// Operation needs a provider but the model holds none
    #[error("No provider attached")]
    NoProvider,

    /// Ad-break operation called before `init`
    #[error("Instream session not initialized: {0}")]
    NotInitialized(&'static str),

    /// Configuration could not be built or deserialized
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted settings could not be read
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlayerError {
    /// Create a selection failure for the given source descriptor
    pub fn no_suitable_provider(descriptor: impl Into<String>) -> Self {
        Self::NoSuitableProvider {
            descriptor: descriptor.into(),
        }
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;
