//! Error types for readsync

use thiserror::Error;

/// Result type alias for readsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for readsync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No sync destination configured")]
    NoSyncDestinationConfigured,

    #[error("No document digest available for the current document")]
    MissingDocumentDigest,

    #[error("Network unavailable")]
    NetworkUnavailable,

    #[error("Remote snapshot invalid: {0}")]
    RemoteSnapshotInvalid(String),

    #[error("Local store invalid: {0}")]
    LocalStoreInvalid(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Check if error is retryable once connectivity comes back
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable | SyncError::Transport(_) | SyncError::Io(_)
        )
    }

    /// Errors the user can fix from the settings (no retry helps)
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::NoSyncDestinationConfigured | SyncError::Config(_)
        )
    }

    /// Message shown to the user for an interactive failure
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::NoSyncDestinationConfigured => {
                "Please set up a sync destination before syncing."
            }
            SyncError::MissingDocumentDigest => "Cannot identify the current document.",
            _ => "Sync failed, check your connection.",
        }
    }
}
