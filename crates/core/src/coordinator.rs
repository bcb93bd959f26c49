//! Visibility-driven playback coordination
//!
//! Turns scroll and visibility events from the host into a single active
//! feed item. The coordinator owns the resource cache for its feed surface:
//! it looks resources up (opening decoder sessions on a miss), pauses the
//! previously active resource before the next one plays, and asks the feed
//! provider for more items as the active position nears the tail.
//!
//! Activation comes in two flavours:
//! 1. `activate`: the factory opens the session inline on the UI thread
//! 2. `begin_activation` / `complete_activation`: the host opens the session
//!    elsewhere and hands it back with the request token it was issued.
//!    Completions that were superseded in the meantime are discarded without
//!    ever playing.

use clipfeed_cache::{
    BoundedResourceCache, CacheConfig, MemoryPressure, MemoryPressureReactor, PressurePolicy,
};
use clipfeed_scheduler::{PaginationTrigger, RequestId, RequestToken, RequestTracker};
use tracing::{debug, warn};

use crate::error::{CoordinatorError, CoordinatorResult, ResourceError};
use crate::feed::{FeedItem, FeedProvider, ResourceFactory};
use crate::resource::{DecoderSession, Resource, ResourceKey};

/// Cache type owned by a coordinator
pub type ResourceCache<S> = BoundedResourceCache<ResourceKey, Resource<S>>;

/// Coordinator tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Tail items that trigger a next-page request
    pub trailing_window: usize,
    /// Items after the active one to warm into the cache on activation
    pub prefetch_ahead: usize,
    /// Initial feed-wide mute state
    pub start_muted: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            trailing_window: clipfeed_scheduler::DEFAULT_TRAILING_WINDOW,
            prefetch_ahead: 0,
            start_muted: false,
        }
    }
}

/// Which item, if any, is playing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActivePosition {
    /// Nothing is playing
    #[default]
    Idle,
    /// Exactly one resource is playing
    Active { key: ResourceKey, index: usize },
}

/// Result of an activation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The item was already active
    Unchanged,
    /// The item became active
    Activated {
        key: ResourceKey,
        index: usize,
        cache_hit: bool,
    },
}

/// Activation that needs a decoder session opened by the host
#[derive(Debug)]
pub struct PendingActivation {
    token: RequestToken,
    item: FeedItem,
    index: usize,
}

impl PendingActivation {
    /// Request token; `token().cancellation()` lets the builder stop early
    pub fn token(&self) -> &RequestToken {
        &self.token
    }

    /// Item to open a session for
    pub fn item(&self) -> &FeedItem {
        &self.item
    }

    /// Feed index the activation was requested for
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether a newer request superseded this one
    pub fn is_superseded(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Result of `begin_activation`
#[derive(Debug)]
pub enum ActivationTicket {
    /// Served without construction (already active or cache hit)
    Ready(ActivationOutcome),
    /// The host must open a session and call `complete_activation`
    Pending(PendingActivation),
}

/// Result of `complete_activation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The completed item is now active
    Activated { key: ResourceKey, index: usize },
    /// The request was superseded; its session was stopped and dropped
    Stale { key: ResourceKey },
}

/// Decides which single feed resource plays
///
/// All methods are expected on the host's UI thread. References handed out
/// (`active_resource_mut`, `resource`) are borrows that end before the next
/// call.
///
/// # Example
///
/// ```
/// use clipfeed_core::sim::{EventLog, SimulatedFactory, SimulatedSession, StaticFeed};
/// use clipfeed_core::{ActivationOutcome, ResourceCache, VisibilityCoordinator};
///
/// let log = EventLog::new();
/// let feed = StaticFeed::from_keys(["a", "b", "c"]);
/// let factory = SimulatedFactory::new(log.clone());
/// let cache: ResourceCache<SimulatedSession> = ResourceCache::new(2);
///
/// let mut coordinator = VisibilityCoordinator::new(cache, feed, factory);
/// coordinator.activate(0).unwrap();
/// coordinator.activate(1).unwrap();
///
/// assert_eq!(coordinator.active_index(), Some(1));
/// assert_eq!(log.max_concurrent_playing(), 1);
/// assert_eq!(coordinator.activate(1).unwrap(), ActivationOutcome::Unchanged);
/// ```
pub struct VisibilityCoordinator<S, P, F>
where
    S: DecoderSession,
{
    cache: ResourceCache<S>,
    reactor: MemoryPressureReactor,
    feed: P,
    factory: F,
    position: ActivePosition,
    requests: RequestTracker,
    /// Key of the outstanding asynchronous request
    pending_key: Option<ResourceKey>,
    pagination: PaginationTrigger,
    prefetch_ahead: usize,
    muted: bool,
    /// Diagnostic touch counter
    tick: u64,
}

impl<S, P, F> VisibilityCoordinator<S, P, F>
where
    S: DecoderSession,
    P: FeedProvider,
    F: ResourceFactory<S>,
{
    /// Create a coordinator around an explicitly constructed cache
    pub fn new(cache: ResourceCache<S>, feed: P, factory: F) -> Self {
        Self {
            cache,
            reactor: MemoryPressureReactor::default(),
            feed,
            factory,
            position: ActivePosition::Idle,
            requests: RequestTracker::new(),
            pending_key: None,
            pagination: PaginationTrigger::default(),
            prefetch_ahead: 0,
            muted: false,
            tick: 0,
        }
    }

    /// Create a coordinator and its cache from configuration
    pub fn from_config(
        cache_config: &CacheConfig,
        config: CoordinatorConfig,
        feed: P,
        factory: F,
    ) -> Self {
        Self::new(ResourceCache::from_config(cache_config), feed, factory)
            .with_config(config)
            .with_pressure_policy(cache_config.pressure_policy)
    }

    /// Apply coordinator tuning
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.pagination = PaginationTrigger::new(config.trailing_window);
        self.prefetch_ahead = config.prefetch_ahead;
        self.muted = config.start_muted;
        self
    }

    /// Set how many resources a memory pressure signal sheds
    pub fn with_pressure_policy(mut self, policy: PressurePolicy) -> Self {
        self.reactor = MemoryPressureReactor::new(policy);
        self
    }

    /// Make the item at `index` the single playing item
    ///
    /// Re-activating the active item is a no-op. Otherwise the previous
    /// resource is paused (it stays cached), the item's resource is fetched
    /// from the cache or opened through the factory, and then played. A
    /// previous resource whose decoder refuses to pause is torn down instead.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if `index` is not a known item. `Construction` if the
    /// factory failed; the previous item is resumed and stays active.
    pub fn activate(&mut self, index: usize) -> CoordinatorResult<ActivationOutcome> {
        let item = self.item_at(index)?;
        self.cancel_pending();

        if self.is_active_key(&item.key) {
            self.position = ActivePosition::Active {
                key: item.key.clone(),
                index,
            };
            self.maybe_request_page(index);
            return Ok(ActivationOutcome::Unchanged);
        }

        let previous = self.pause_active();
        let cache_hit = self.cache.contains(&item.key);
        let tick = self.next_tick();
        let muted = self.muted;

        let factory = &mut self.factory;
        let lookup = self.cache.get_or_insert_with(&item.key, |key| {
            factory
                .create(&item)
                .map(|session| Resource::new(key.clone(), item.locator.clone(), session))
        });

        match lookup {
            Ok(resource) => start_playback(resource, muted, tick),
            Err(err) => {
                warn!(key = %item.key, error = %err, "activation failed, keeping previous item");
                if let Some((key, index)) = previous {
                    self.resume(key, index);
                }
                return Err(err.into());
            }
        }

        debug!(key = %item.key, index, cache_hit, "activated feed item");
        self.position = ActivePosition::Active {
            key: item.key.clone(),
            index,
        };
        self.prefetch_after(index);
        self.maybe_request_page(index);

        Ok(ActivationOutcome::Activated {
            key: item.key,
            index,
            cache_hit,
        })
    }

    /// Start activating the item at `index` without opening sessions inline
    ///
    /// Already active and cached items are served immediately. Otherwise a
    /// `PendingActivation` is returned and the currently active item keeps
    /// playing until the matching `complete_activation`. Any earlier pending
    /// activation is superseded.
    pub fn begin_activation(&mut self, index: usize) -> CoordinatorResult<ActivationTicket> {
        let item = self.item_at(index)?;

        if self.is_active_key(&item.key) || self.cache.contains(&item.key) {
            return self.activate(index).map(ActivationTicket::Ready);
        }

        let token = self.requests.issue();
        debug!(key = %item.key, index, request = token.id(), "activation pending construction");
        self.pending_key = Some(item.key.clone());

        Ok(ActivationTicket::Pending(PendingActivation { token, item, index }))
    }

    /// Finish an activation started by `begin_activation`
    ///
    /// A superseded request never plays: a session it produced is paused,
    /// stopped and dropped, and `Stale` is returned whether or not
    /// construction succeeded.
    ///
    /// # Errors
    ///
    /// `Construction` if the current request failed. The previously active
    /// item was never paused and stays active.
    pub fn complete_activation(
        &mut self,
        pending: PendingActivation,
        session: Result<S, ResourceError>,
    ) -> CoordinatorResult<CompletionOutcome> {
        let PendingActivation { token, item, index } = pending;

        if !self.requests.settle(&token) {
            debug!(key = %item.key, request = token.id(), "dropping stale activation");
            if let Ok(mut session) = session {
                discard_session(&item.key, &mut session);
            }
            return Ok(CompletionOutcome::Stale { key: item.key });
        }
        self.pending_key = None;

        let session = session.inspect_err(|err| {
            warn!(key = %item.key, error = %err, "activation failed, keeping previous item");
        })?;

        // items may have shifted while the session was opening
        let index = self.feed.position_of(&item.key).unwrap_or(index);

        self.pause_active();
        let tick = self.next_tick();
        let resource = self.cache.insert(
            item.key.clone(),
            Resource::new(item.key.clone(), item.locator.clone(), session),
        );
        start_playback(resource, self.muted, tick);

        debug!(key = %item.key, index, "activated feed item");
        self.position = ActivePosition::Active {
            key: item.key.clone(),
            index,
        };
        self.maybe_request_page(index);

        Ok(CompletionOutcome::Activated {
            key: item.key,
            index,
        })
    }

    /// Pause the active item and go idle
    ///
    /// Used when the feed surface itself is hidden. Returns `false` if
    /// nothing was active.
    pub fn deactivate(&mut self) -> bool {
        self.cancel_pending();
        self.pause_active().is_some()
    }

    /// Drop the resource for an item removed from the feed
    ///
    /// The coordinator goes idle first if `key` was active, and a pending
    /// activation for `key` is cancelled. Returns whether a resident resource
    /// was torn down.
    pub fn invalidate(&mut self, key: &ResourceKey) -> bool {
        if self.pending_key.as_ref() == Some(key) {
            self.cancel_pending();
        }
        if self.is_active_key(key) {
            self.position = ActivePosition::Idle;
        }
        self.cache.remove(key)
    }

    /// Mute or unmute the feed
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Some(resource) = self.active_resource_mut() {
            if let Err(err) = resource.set_muted(muted) {
                warn!(key = %resource.key(), error = %err, "decoder refused mute change");
            }
        }
    }

    /// Handle a low-memory signal from the host
    ///
    /// Returns the number of resources torn down.
    pub fn on_memory_pressure(&mut self) -> usize {
        let evicted = self.reactor.on_memory_pressure(&mut self.cache);
        self.reconcile_active();
        evicted
    }

    /// Handle a graded memory pressure level from the host
    pub fn on_pressure_level(&mut self, level: MemoryPressure) -> usize {
        let evicted = self.reactor.on_pressure_level(level, &mut self.cache);
        self.reconcile_active();
        evicted
    }

    /// Tear the feed surface down: go idle and release every resource
    ///
    /// The pagination marker is cleared too, so a rebuilt surface can page
    /// from its current tail again.
    pub fn teardown(&mut self) {
        self.cancel_pending();
        self.position = ActivePosition::Idle;
        self.cache.clear();
        self.pagination.reset();
    }

    /// Current active position
    pub fn position(&self) -> &ActivePosition {
        &self.position
    }

    /// Key of the active item
    pub fn active_key(&self) -> Option<&ResourceKey> {
        match &self.position {
            ActivePosition::Active { key, .. } => Some(key),
            ActivePosition::Idle => None,
        }
    }

    /// Feed index of the active item
    pub fn active_index(&self) -> Option<usize> {
        match &self.position {
            ActivePosition::Active { index, .. } => Some(*index),
            ActivePosition::Idle => None,
        }
    }

    /// Borrow the active resource, e.g. to bind it to a cell
    pub fn active_resource_mut(&mut self) -> Option<&mut Resource<S>> {
        match &self.position {
            ActivePosition::Active { key, .. } => self.cache.peek_mut(key),
            ActivePosition::Idle => None,
        }
    }

    /// Borrow a resident resource without changing recency
    pub fn resource(&self, key: &ResourceKey) -> Option<&Resource<S>> {
        self.cache.peek(key)
    }

    /// Number of resident resources currently playing
    pub fn playing_count(&self) -> usize {
        self.cache
            .iter()
            .filter(|(_, resource)| resource.is_playing())
            .count()
    }

    /// Whether the feed is muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Identifier of the outstanding asynchronous request
    pub fn pending_request(&self) -> Option<RequestId> {
        self.requests.pending()
    }

    /// The resource cache
    pub fn cache(&self) -> &ResourceCache<S> {
        &self.cache
    }

    /// The memory pressure reactor
    pub fn reactor(&self) -> &MemoryPressureReactor {
        &self.reactor
    }

    /// The pagination trigger
    pub fn pagination(&self) -> &PaginationTrigger {
        &self.pagination
    }

    /// The feed provider
    pub fn feed(&self) -> &P {
        &self.feed
    }

    /// Mutable access to the feed provider, e.g. to deliver a page
    pub fn feed_mut(&mut self) -> &mut P {
        &mut self.feed
    }

    fn item_at(&self, index: usize) -> CoordinatorResult<FeedItem> {
        self.feed
            .item(index)
            .cloned()
            .ok_or(CoordinatorError::IndexOutOfRange {
                index,
                len: self.feed.item_count(),
            })
    }

    fn is_active_key(&self, key: &ResourceKey) -> bool {
        self.active_key() == Some(key)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn cancel_pending(&mut self) {
        if self.requests.cancel_current() {
            debug!(key = ?self.pending_key, "pending activation superseded");
        }
        self.pending_key = None;
    }

    /// Pause the active resource and go idle, returning what was active
    fn pause_active(&mut self) -> Option<(ResourceKey, usize)> {
        let ActivePosition::Active { key, index } = std::mem::take(&mut self.position) else {
            return None;
        };

        self.cache.touch(&key);
        let refused = match self.cache.peek_mut(&key) {
            Some(resource) => resource.pause().err(),
            None => None,
        };

        // a session that keeps playing must not overlap the next one
        if let Some(err) = refused {
            warn!(key = %key, error = %err, "decoder refused to pause, tearing it down");
            self.cache.remove(&key);
        }
        Some((key, index))
    }

    /// Resume a previously active item after a failed activation
    fn resume(&mut self, key: ResourceKey, index: usize) {
        let tick = self.next_tick();
        let muted = self.muted;
        if !self.cache.touch(&key) {
            return;
        }
        if let Some(resource) = self.cache.peek_mut(&key) {
            start_playback(resource, muted, tick);
            self.position = ActivePosition::Active { key, index };
        }
    }

    /// Warm the items after `index` without playing them
    fn prefetch_after(&mut self, index: usize) {
        // the active entry must stay resident while we insert ahead of it
        let budget = self.prefetch_ahead.min(self.cache.capacity() - 1);
        if budget == 0 {
            return;
        }

        let last = (index + budget).min(self.feed.item_count().saturating_sub(1));
        for ahead in index + 1..=last {
            let Some(item) = self.feed.item(ahead).cloned() else {
                break;
            };
            if self.cache.contains(&item.key) {
                continue;
            }

            let factory = &mut self.factory;
            let warmed = self.cache.get_or_insert_with(&item.key, |key| {
                factory
                    .create(&item)
                    .map(|session| Resource::new(key.clone(), item.locator.clone(), session))
            });
            match warmed {
                Ok(_) => debug!(key = %item.key, index = ahead, "prefetched feed item"),
                Err(err) => warn!(key = %item.key, error = %err, "prefetch failed"),
            }
        }

        if let ActivePosition::Active { key, .. } = &self.position {
            self.cache.touch(key);
        }
    }

    fn maybe_request_page(&mut self, index: usize) {
        let known = self.feed.item_count();
        let has_more = self.feed.has_more_pages();
        if self.pagination.should_request(index, known, has_more) {
            self.feed.request_next_page();
        }
    }

    /// Go idle if memory pressure took the active resource
    fn reconcile_active(&mut self) {
        if let ActivePosition::Active { key, .. } = &self.position {
            if !self.cache.contains(key) {
                warn!(key = %key, "active resource evicted under memory pressure");
                self.position = ActivePosition::Idle;
            }
        }
    }
}

fn start_playback<S: DecoderSession>(resource: &mut Resource<S>, muted: bool, tick: u64) {
    resource.mark_touched(tick);
    if let Err(err) = resource.set_muted(muted) {
        warn!(key = %resource.key(), error = %err, "decoder refused mute change");
    }
    if let Err(err) = resource.play() {
        warn!(key = %resource.key(), error = %err, "decoder refused to play");
    }
}

fn discard_session<S: DecoderSession>(key: &ResourceKey, session: &mut S) {
    if let Err(err) = session.pause() {
        debug!(key = %key, error = %err, "stale session refused to pause");
    }
    if let Err(err) = session.stop() {
        warn!(key = %key, error = %err, "stale session teardown failed");
    }
}
