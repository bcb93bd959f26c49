//! clipfeed Scheduler Library
//!
//! Timing decisions for the video feed: which asynchronous construction
//! request is still current, and when to ask the feed for its next page.
//!
//! # Example
//!
//! ```
//! use clipfeed_scheduler::{PaginationTrigger, RequestTracker};
//!
//! let mut tracker = RequestTracker::new();
//! let token = tracker.issue();
//!
//! // ... build the decoder session elsewhere, then:
//! if tracker.settle(&token) {
//!     // still current, safe to start playback
//! }
//!
//! let mut pages = PaginationTrigger::new(2);
//! if pages.should_request(8, 10, true) {
//!     // ask the feed provider for more items
//! }
//! ```

mod cancel;
mod pagination;

// Re-export public API
pub use cancel::{CancellationToken, RequestId, RequestToken, RequestTracker};
pub use pagination::{PaginationTrigger, DEFAULT_TRAILING_WINDOW};
