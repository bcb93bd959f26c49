//! Next-page triggering for a paginated feed
//!
//! Landing on an item in the trailing window of the known sequence asks the
//! feed provider for more items. The trigger remembers the sequence length at
//! which it last fired, so repeated activations of the same tail item (or
//! per-frame visibility callbacks) request the page once.

use tracing::info;

/// Default number of tail items that trigger a next-page request
pub const DEFAULT_TRAILING_WINDOW: usize = 1;

/// Single-fire next-page trigger
///
/// # Example
///
/// ```
/// use clipfeed_scheduler::PaginationTrigger;
///
/// let mut trigger = PaginationTrigger::new(1);
///
/// assert!(!trigger.should_request(8, 10, true));
/// assert!(trigger.should_request(9, 10, true));
/// assert!(!trigger.should_request(9, 10, true));
///
/// // a new page arrived; its tail fires again
/// assert!(trigger.should_request(19, 20, true));
/// ```
#[derive(Debug, Clone)]
pub struct PaginationTrigger {
    trailing_window: usize,

    /// Sequence length at the last request; only ever grows
    last_requested_boundary: Option<usize>,
}

impl PaginationTrigger {
    /// Create a trigger firing within the last `trailing_window` items
    ///
    /// A window of 0 is treated as 1 (the last item).
    pub fn new(trailing_window: usize) -> Self {
        Self {
            trailing_window: trailing_window.max(1),
            last_requested_boundary: None,
        }
    }

    /// Whether `index` lies within the trailing window of `known_len` items
    pub fn in_trailing_window(&self, index: usize, known_len: usize) -> bool {
        known_len > 0 && index < known_len && index + self.trailing_window >= known_len
    }

    /// Decide whether to request the next page, recording the request
    ///
    /// Returns `true` at most once per sequence length: the boundary marker
    /// must strictly grow before the trigger can fire again.
    ///
    /// The marker is a length, not an item identity. If items are removed
    /// and a later page brings the sequence back to exactly the old
    /// boundary, that tail stays quiet until the sequence grows past it or
    /// the trigger is `reset`.
    pub fn should_request(&mut self, index: usize, known_len: usize, has_more: bool) -> bool {
        if !has_more || !self.in_trailing_window(index, known_len) {
            return false;
        }

        if matches!(self.last_requested_boundary, Some(boundary) if boundary >= known_len) {
            return false;
        }

        self.last_requested_boundary = Some(known_len);
        info!(index, known_len, "requesting next feed page");
        true
    }

    /// Sequence length at which the last request fired
    pub fn last_requested_boundary(&self) -> Option<usize> {
        self.last_requested_boundary
    }

    /// Size of the trailing window
    pub fn trailing_window(&self) -> usize {
        self.trailing_window
    }

    /// Forget the boundary marker, e.g. when the feed is reloaded from scratch
    pub fn reset(&mut self) {
        self.last_requested_boundary = None;
    }
}

impl Default for PaginationTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_TRAILING_WINDOW)
    }
}
