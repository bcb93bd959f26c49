//! clipfeed Core Library
//!
//! Playback lifecycle for a vertically scrolling video feed: one decoder
//! session per feed item, a bounded set of them kept warm, and exactly one
//! playing at a time.

pub mod coordinator;
pub mod error;
pub mod feed;
pub mod resource;
pub mod sim;

pub use coordinator::{
    ActivationOutcome, ActivationTicket, ActivePosition, CompletionOutcome, CoordinatorConfig,
    PendingActivation, ResourceCache, VisibilityCoordinator,
};
pub use error::{CoordinatorError, CoordinatorResult, PlaybackError, ResourceError};
pub use feed::{FeedItem, FeedProvider, ItemMetadata, ResourceFactory};
pub use resource::{DecoderSession, MediaLocator, PlaybackState, Resource, ResourceKey};

// Cache and scheduling types that appear in the coordinator's API
pub use clipfeed_cache::{CacheConfig, CacheStats, MemoryPressure, PressurePolicy};
pub use clipfeed_scheduler::{CancellationToken, RequestId, RequestToken};
