//! Error types for the feed playback core

use crate::resource::ResourceKey;

/// A playback resource could not be constructed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// The factory failed to open a decoder session
    #[error("failed to open decoder session for {key}: {reason}")]
    Construction { key: ResourceKey, reason: String },
}

impl ResourceError {
    /// Shorthand for a construction failure
    pub fn construction(key: &ResourceKey, reason: impl Into<String>) -> Self {
        ResourceError::Construction {
            key: key.clone(),
            reason: reason.into(),
        }
    }
}

/// A decoder session rejected a control command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// The decoder refused the command
    #[error("decoder rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },

    /// The session was already stopped
    #[error("decoder session is closed")]
    Closed,
}

/// Errors surfaced by the visibility coordinator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// The requested index is past the end of the known feed sequence
    #[error("feed index {index} out of range (known items: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The resource for the requested item could not be constructed
    #[error(transparent)]
    Construction(#[from] ResourceError),
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
