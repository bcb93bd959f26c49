//! Request tokens for asynchronous resource construction
//!
//! Every activation that needs a resource built off the UI thread gets a
//! `RequestToken`. Issuing a newer token cancels the previous one, so a
//! completion can tell whether it has been superseded before it touches
//! playback state. Builders may also poll the token to stop early.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Unique request identifier, increasing in issue order
pub type RequestId = u64;

/// Cancellation flag for cooperative cancellation
///
/// Workers can periodically check `is_cancelled()` to determine if they
/// should stop processing. Multiple tokens can share the same underlying
/// cancellation state via Arc.
///
/// # Example
///
/// ```
/// use clipfeed_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    ///
    /// The token starts in a non-cancelled state.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token
    ///
    /// All clones of this token will also observe the cancellation.
    /// This operation is idempotent - calling it multiple times is safe.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if this token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle identifying one in-flight construction request
#[derive(Debug, Clone)]
pub struct RequestToken {
    id: RequestId,
    cancel: CancellationToken,
}

impl RequestToken {
    /// Identifier of this request
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Whether a newer request (or an explicit cancel) superseded this one
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancellation flag that can be handed to the builder
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl PartialEq for RequestToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RequestToken {}

/// Tracks the single outstanding construction request
///
/// Only the most recently issued request is current. Anything older is stale
/// and must discard whatever it produced.
///
/// # Example
///
/// ```
/// use clipfeed_scheduler::RequestTracker;
///
/// let mut tracker = RequestTracker::new();
/// let first = tracker.issue();
/// let second = tracker.issue();
///
/// assert!(first.is_cancelled());
/// assert!(!tracker.settle(&first));
/// assert!(tracker.settle(&second));
/// ```
#[derive(Debug, Default)]
pub struct RequestTracker {
    next_id: RequestId,
    current: Option<RequestToken>,
}

impl RequestTracker {
    /// Create a tracker with no outstanding request
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new request, cancelling the outstanding one if any
    pub fn issue(&mut self) -> RequestToken {
        self.cancel_current();

        let token = RequestToken {
            id: self.next_id,
            cancel: CancellationToken::new(),
        };
        self.next_id += 1;
        self.current = Some(token.clone());
        token
    }

    /// Cancel the outstanding request
    ///
    /// Returns `true` if there was one.
    pub fn cancel_current(&mut self) -> bool {
        match self.current.take() {
            Some(token) => {
                token.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Check whether `token` is still the outstanding request
    pub fn is_current(&self, token: &RequestToken) -> bool {
        !token.is_cancelled() && self.current.as_ref() == Some(token)
    }

    /// Settle a completed request
    ///
    /// Returns `true` and clears the outstanding request if `token` is
    /// current; returns `false` for stale tokens, leaving state untouched.
    pub fn settle(&mut self, token: &RequestToken) -> bool {
        if self.is_current(token) {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Identifier of the outstanding request
    pub fn pending(&self) -> Option<RequestId> {
        self.current.as_ref().map(RequestToken::id)
    }
}
