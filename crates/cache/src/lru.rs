//! Bounded resource cache with LRU eviction
//!
//! Holds decoder-backed playback resources keyed by content id. The cache is
//! the sole owner of every resident resource: callers receive borrows that end
//! at the next mutation, and the cache is the only place a resource is torn
//! down.
//!
//! Recency is kept in an intrusive doubly linked list stored in an arena of
//! slots. Two sentinel slots bracket the list:
//!
//! ```text
//!   HEAD ──► [C] ◄──► [B] ◄──► [A] ◄── TAIL
//!            MRU                LRU
//! ```
//!
//! The MRU entry is always `HEAD.next` and the LRU entry is always `TAIL.prev`,
//! so promotion, insertion and eviction are O(1) relinks and never scan.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use tracing::{debug, warn};

use crate::config::CacheConfig;

/// Error reported by a resource that could not be stopped cleanly.
///
/// Teardown failures are recorded and logged, but the entry is always removed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("teardown failed: {reason}")]
pub struct TeardownError {
    reason: String,
}

impl TeardownError {
    /// Create a teardown error with a human readable reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason reported by the resource
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Mandatory pre-eviction side effect of a cached resource.
///
/// Called exactly once, while the entry is still resident, before the
/// resource is unlinked and dropped. Implementations should stop decoding and
/// release hardware handles. Async cleanup may be started here; the cache
/// treats the resource as freed as soon as this returns.
pub trait Teardown {
    /// Stop the resource ahead of removal
    fn teardown(&mut self) -> Result<(), TeardownError>;
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of resources currently resident
    pub resident: usize,

    /// Maximum number of resident resources
    pub capacity: usize,

    /// Lookups served by a resident resource
    pub hits: u64,

    /// Lookups that had to construct a resource
    pub misses: u64,

    /// Resources inserted (constructed on miss or inserted directly)
    pub insertions: u64,

    /// Resources evicted because the cache overflowed
    pub evictions: u64,

    /// Resources evicted through `evict_least_recently_used`
    pub forced_evictions: u64,

    /// Resources removed explicitly, replaced, or cleared
    pub removals: u64,

    /// Teardown calls that reported a failure
    pub teardown_failures: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate slot utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.resident as f64 / self.capacity as f64
        }
    }
}

/// Why an entry is leaving the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    Overflow,
    Forced,
    Removed,
}

type Slot = usize;

const HEAD: Slot = 0;
const TAIL: Slot = 1;

struct Node<K, R> {
    /// `None` for sentinels and free slots
    entry: Option<(K, R)>,
    prev: Slot,
    next: Slot,
}

impl<K, R> Node<K, R> {
    fn sentinel() -> Self {
        Self {
            entry: None,
            prev: HEAD,
            next: TAIL,
        }
    }
}

/// Fixed-capacity LRU cache of playback resources
///
/// Single-threaded: every mutating method takes `&mut self`, and
/// the host serializes calls on its UI thread. Sharing across threads needs
/// an external mutex.
///
/// # Example
///
/// ```
/// use clipfeed_cache::{BoundedResourceCache, Teardown, TeardownError};
///
/// struct Player {
///     running: bool,
/// }
///
/// impl Teardown for Player {
///     fn teardown(&mut self) -> Result<(), TeardownError> {
///         self.running = false;
///         Ok(())
///     }
/// }
///
/// let mut cache = BoundedResourceCache::new(2);
/// for key in ["a", "b", "c"] {
///     cache
///         .get_or_insert_with(&key, |_| Ok::<_, ()>(Player { running: true }))
///         .unwrap();
/// }
///
/// // "a" was least recently used and has been torn down
/// assert_eq!(cache.resident_keys(), vec!["c", "b"]);
/// assert_eq!(cache.stats().evictions, 1);
/// ```
pub struct BoundedResourceCache<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
    R: Teardown,
{
    /// Key to arena slot
    index: HashMap<K, Slot>,

    /// Arena; slots 0 and 1 are the sentinels
    nodes: Vec<Node<K, R>>,

    /// Vacated slots available for reuse
    free: Vec<Slot>,

    capacity: usize,

    stats: CacheStats,
}

impl<K, R> BoundedResourceCache<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
    R: Teardown,
{
    /// Create a cache holding at most `capacity` resources
    ///
    /// A capacity of 0 is clamped to 1 so that `get_or_insert_with` can always
    /// make progress.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("resource cache capacity 0 is invalid, clamping to 1");
            1
        } else {
            capacity
        };

        let mut nodes = Vec::with_capacity(capacity + 2);
        nodes.push(Node::sentinel());
        nodes.push(Node::sentinel());

        Self {
            index: HashMap::with_capacity(capacity + 1),
            nodes,
            free: Vec::new(),
            capacity,
            stats: CacheStats {
                capacity,
                ..Default::default()
            },
        }
    }

    /// Create a cache sized from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Get the resource for `key`, constructing it on a miss
    ///
    /// A resident resource is promoted to most recently used and returned as
    /// is. Otherwise `factory` is called exactly once; on success the new
    /// resource is inserted as most recently used and, if that overflows the
    /// capacity, the least recently used entry is torn down and evicted
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged. Nothing is inserted and nothing
    /// is evicted in that case.
    pub fn get_or_insert_with<E, F>(&mut self, key: &K, factory: F) -> Result<&mut R, E>
    where
        F: FnOnce(&K) -> Result<R, E>,
    {
        if let Some(&slot) = self.index.get(key) {
            self.promote(slot);
            self.stats.hits += 1;
            return Ok(self.resource_mut(slot));
        }

        self.stats.misses += 1;
        let resource = factory(key)?;
        let slot = self.attach(key.clone(), resource);
        self.shrink_to_capacity();
        Ok(self.resource_mut(slot))
    }

    /// Insert an already constructed resource as most recently used
    ///
    /// Used when construction happened outside the cache (for example an
    /// asynchronous decoder session). If `key` is already resident the old
    /// resource is torn down and replaced, so a key never has two entries.
    pub fn insert(&mut self, key: K, resource: R) -> &mut R {
        if let Some(&slot) = self.index.get(&key) {
            debug!(?key, "replacing resident resource");
            self.destroy(slot, Departure::Removed);
        }

        let slot = self.attach(key, resource);
        self.shrink_to_capacity();
        self.resource_mut(slot)
    }

    /// Promote a resident entry to most recently used
    ///
    /// Returns `false` if `key` is not resident.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(&slot) => {
                self.promote(slot);
                true
            }
            None => false,
        }
    }

    /// Tear down and remove the entry for `key`
    ///
    /// Returns `false` (and does nothing) if `key` is not resident.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(&slot) => {
                self.destroy(slot, Departure::Removed);
                true
            }
            None => false,
        }
    }

    /// Tear down and evict exactly the least recently used entry
    ///
    /// Returns `false` if the cache is empty. The most recently used entry is
    /// only affected when it is the sole resident entry.
    pub fn evict_least_recently_used(&mut self) -> bool {
        let lru = self.nodes[TAIL].prev;
        if lru == HEAD {
            return false;
        }
        self.destroy(lru, Departure::Forced);
        true
    }

    /// Tear down every entry, least recently used first
    pub fn clear(&mut self) {
        while self.nodes[TAIL].prev != HEAD {
            let lru = self.nodes[TAIL].prev;
            self.destroy(lru, Departure::Removed);
        }
    }

    /// Borrow a resident resource without changing recency
    pub fn peek(&self, key: &K) -> Option<&R> {
        let slot = *self.index.get(key)?;
        self.nodes[slot].entry.as_ref().map(|(_, resource)| resource)
    }

    /// Mutably borrow a resident resource without changing recency
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut R> {
        let slot = *self.index.get(key)?;
        self.nodes[slot].entry.as_mut().map(|(_, resource)| resource)
    }

    /// Check if `key` is resident without changing recency
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Snapshot of resident keys ordered most to least recently used
    pub fn resident_keys(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Iterate resident entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, R> {
        Iter {
            nodes: &self.nodes,
            cursor: self.nodes[HEAD].next,
            remaining: self.index.len(),
        }
    }

    /// Key of the most recently used entry
    pub fn most_recently_used(&self) -> Option<&K> {
        self.key_at(self.nodes[HEAD].next)
    }

    /// Key of the least recently used entry (next to be evicted)
    pub fn least_recently_used(&self) -> Option<&K> {
        self.key_at(self.nodes[TAIL].prev)
    }

    /// Number of resident resources
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the cache holds no resources
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum number of resident resources
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident: self.index.len(),
            ..self.stats
        }
    }

    fn key_at(&self, slot: Slot) -> Option<&K> {
        self.nodes[slot].entry.as_ref().map(|(key, _)| key)
    }

    fn resource_mut(&mut self, slot: Slot) -> &mut R {
        self.nodes[slot]
            .entry
            .as_mut()
            .map(|(_, resource)| resource)
            .expect("linked slot holds an entry")
    }

    /// Store an entry in a free slot and link it at the front
    fn attach(&mut self, key: K, resource: R) -> Slot {
        let node = Node {
            entry: Some((key.clone(), resource)),
            prev: HEAD,
            next: TAIL,
        };

        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        self.index.insert(key, slot);
        self.link_front(slot);
        self.stats.insertions += 1;
        slot
    }

    fn shrink_to_capacity(&mut self) {
        while self.index.len() > self.capacity {
            let lru = self.nodes[TAIL].prev;
            self.destroy(lru, Departure::Overflow);
        }
    }

    /// Run teardown, then unlink and drop the entry in `slot`
    fn destroy(&mut self, slot: Slot, departure: Departure) {
        if let Some((key, resource)) = self.nodes[slot].entry.as_mut() {
            if let Err(err) = resource.teardown() {
                self.stats.teardown_failures += 1;
                warn!(?key, error = %err, "resource teardown failed, removing anyway");
            }
        }

        self.unlink(slot);
        let Some((key, resource)) = self.nodes[slot].entry.take() else {
            return;
        };
        self.index.remove(&key);
        self.free.push(slot);

        match departure {
            Departure::Overflow => self.stats.evictions += 1,
            Departure::Forced => self.stats.forced_evictions += 1,
            Departure::Removed => self.stats.removals += 1,
        }
        debug!(?key, ?departure, resident = self.index.len(), "resource left cache");
        drop(resource);
    }

    fn promote(&mut self, slot: Slot) {
        if self.nodes[HEAD].next != slot {
            self.unlink(slot);
            self.link_front(slot);
        }
    }

    fn unlink(&mut self, slot: Slot) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    fn link_front(&mut self, slot: Slot) {
        let first = self.nodes[HEAD].next;
        self.nodes[slot].prev = HEAD;
        self.nodes[slot].next = first;
        self.nodes[first].prev = slot;
        self.nodes[HEAD].next = slot;
    }
}

impl<K, R> Drop for BoundedResourceCache<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
    R: Teardown,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, R> fmt::Debug for BoundedResourceCache<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
    R: Teardown,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedResourceCache")
            .field("resident", &self.resident_keys())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Iterator over resident entries, most recently used first
pub struct Iter<'a, K, R> {
    nodes: &'a [Node<K, R>],
    cursor: Slot,
    remaining: usize,
}

impl<'a, K, R> Iterator for Iter<'a, K, R> {
    type Item = (&'a K, &'a R);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == TAIL {
            return None;
        }
        let node = &self.nodes[self.cursor];
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        node.entry.as_ref().map(|(key, resource)| (key, resource))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::{Cell, RefCell};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Tracked {
        name: &'static str,
        log: Log,
        fail_teardown: bool,
    }

    impl Teardown for Tracked {
        fn teardown(&mut self) -> Result<(), TeardownError> {
            self.log.borrow_mut().push(format!("teardown:{}", self.name));
            if self.fail_teardown {
                Err(TeardownError::new("decoder refused to stop"))
            } else {
                Ok(())
            }
        }
    }

    fn tracked(log: &Log) -> impl FnOnce(&&'static str) -> Result<Tracked, String> + '_ {
        move |name: &&'static str| {
            log.borrow_mut().push(format!("create:{}", name));
            Ok(Tracked {
                name: *name,
                log: log.clone(),
                fail_teardown: false,
            })
        }
    }

    fn entries(log: &Log, prefix: &str) -> Vec<String> {
        log.borrow()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    #[test]
    fn test_miss_constructs_once_and_hit_reuses() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(3);

        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();

        assert_eq!(entries(&log, "create"), vec!["create:a"]);
        assert!(entries(&log, "teardown").is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.resident, 1);
    }

    #[test]
    fn test_lru_order_and_single_teardown() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(2);

        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"b", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"c", tracked(&log)).unwrap();

        assert_eq!(cache.resident_keys(), vec!["c", "b"]);
        assert_eq!(entries(&log, "teardown"), vec!["teardown:a"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_promotion_on_hit() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(2);

        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"b", tracked(&log)).unwrap();
        assert_eq!(cache.resident_keys(), vec!["b", "a"]);

        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        assert_eq!(cache.resident_keys(), vec!["a", "b"]);

        cache.get_or_insert_with(&"c", tracked(&log)).unwrap();
        assert_eq!(cache.resident_keys(), vec!["c", "a"]);
        assert_eq!(entries(&log, "teardown"), vec!["teardown:b"]);
    }

    #[test]
    fn test_teardown_runs_before_entry_is_discarded() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(1);

        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"b", tracked(&log)).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["create:a", "create:b", "teardown:a"]
        );
        assert_eq!(cache.resident_keys(), vec!["b"]);
    }

    /// Panics from its first armed teardown, freezing the cache mid-eviction
    struct Tripwire {
        armed: Rc<Cell<bool>>,
    }

    impl Teardown for Tripwire {
        fn teardown(&mut self) -> Result<(), TeardownError> {
            if self.armed.replace(false) {
                panic!("teardown interrupted");
            }
            Ok(())
        }
    }

    #[test]
    fn test_teardown_sees_entry_still_resident() {
        let armed = Rc::new(Cell::new(false));
        let mut cache = BoundedResourceCache::new(1);
        let tripwire = |armed: &Rc<Cell<bool>>| {
            let armed = Rc::clone(armed);
            move |_: &&str| Ok::<_, ()>(Tripwire { armed })
        };

        cache.get_or_insert_with(&"a", tripwire(&armed)).unwrap();
        armed.set(true);

        let overflow = catch_unwind(AssertUnwindSafe(|| {
            cache.get_or_insert_with(&"b", tripwire(&armed)).map(|_| ())
        }));
        assert!(overflow.is_err());

        // teardown of "a" ran before it was unlinked or unindexed
        assert!(cache.contains(&"a"));
        assert_eq!(cache.least_recently_used(), Some(&"a"));
        assert!(cache.peek(&"a").is_some());
    }

    #[test]
    fn test_factory_failure_leaves_cache_unchanged() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(1);
        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();

        let result = cache.get_or_insert_with(&"b", |_| Err::<Tracked, _>("no network"));
        assert_eq!(result.err(), Some("no network"));

        assert_eq!(cache.resident_keys(), vec!["a"]);
        assert!(entries(&log, "teardown").is_empty());
        assert_eq!(cache.stats().insertions, 1);
    }

    #[test]
    fn test_teardown_failure_still_removes() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(2);

        let failing = log.clone();
        cache
            .get_or_insert_with(&"a", move |_| {
                Ok::<_, ()>(Tracked {
                    name: "a",
                    log: failing,
                    fail_teardown: true,
                })
            })
            .unwrap();

        assert!(cache.remove(&"a"));
        assert!(!cache.contains(&"a"));
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.teardown_failures, 1);
        assert_eq!(stats.removals, 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut cache: BoundedResourceCache<&str, Tracked> = BoundedResourceCache::new(2);
        assert!(!cache.remove(&"ghost"));
        assert_eq!(cache.stats().removals, 0);
    }

    #[test]
    fn test_touch_promotes_without_constructing() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(3);

        for key in ["a", "b", "c"] {
            cache.get_or_insert_with(&key, tracked(&log)).unwrap();
        }
        assert!(cache.touch(&"a"));
        assert!(!cache.touch(&"zzz"));

        assert_eq!(cache.resident_keys(), vec!["a", "c", "b"]);
        assert_eq!(cache.least_recently_used(), Some(&"b"));
        assert_eq!(cache.most_recently_used(), Some(&"a"));
        assert_eq!(entries(&log, "create").len(), 3);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(3);
        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"b", tracked(&log)).unwrap();

        assert_eq!(cache.peek(&"a").map(|p| p.name), Some("a"));
        assert!(cache.peek_mut(&"a").is_some());
        assert!(cache.peek(&"x").is_none());
        assert_eq!(cache.resident_keys(), vec!["b", "a"]);
    }

    #[test]
    fn test_evict_lru_on_empty_cache() {
        let mut cache: BoundedResourceCache<&str, Tracked> = BoundedResourceCache::new(2);
        assert!(!cache.evict_least_recently_used());
    }

    #[test]
    fn test_evict_lru_spares_mru_until_alone() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(4);
        for key in ["a", "b", "c"] {
            cache.get_or_insert_with(&key, tracked(&log)).unwrap();
        }

        assert!(cache.evict_least_recently_used());
        assert!(cache.evict_least_recently_used());
        assert_eq!(cache.resident_keys(), vec!["c"]);

        assert!(cache.evict_least_recently_used());
        assert!(cache.is_empty());
        assert_eq!(
            entries(&log, "teardown"),
            vec!["teardown:a", "teardown:b", "teardown:c"]
        );
        assert_eq!(cache.stats().forced_evictions, 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(0);
        assert_eq!(cache.capacity(), 1);

        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"b", tracked(&log)).unwrap();
        assert_eq!(cache.resident_keys(), vec!["b"]);
    }

    #[test]
    fn test_insert_replaces_resident_key() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(2);
        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"b", tracked(&log)).unwrap();

        let replacement = Tracked {
            name: "a2",
            log: log.clone(),
            fail_teardown: false,
        };
        assert_eq!(cache.insert("a", replacement).name, "a2");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.resident_keys(), vec!["a", "b"]);
        assert_eq!(entries(&log, "teardown"), vec!["teardown:a"]);
    }

    #[test]
    fn test_insert_overflow_evicts_lru() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(1);
        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();

        cache.insert(
            "b",
            Tracked {
                name: "b",
                log: log.clone(),
                fail_teardown: false,
            },
        );
        assert_eq!(cache.resident_keys(), vec!["b"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_clear_tears_down_everything() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(3);
        for key in ["a", "b", "c"] {
            cache.get_or_insert_with(&key, tracked(&log)).unwrap();
        }

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(
            entries(&log, "teardown"),
            vec!["teardown:a", "teardown:b", "teardown:c"]
        );
    }

    #[test]
    fn test_drop_tears_down_resident_resources() {
        let log = Log::default();
        {
            let mut cache = BoundedResourceCache::new(2);
            cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
            cache.get_or_insert_with(&"b", tracked(&log)).unwrap();
        }
        assert_eq!(entries(&log, "teardown").len(), 2);
    }

    #[test]
    fn test_slots_are_reused() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(2);
        let keys = ["a", "b", "c", "d", "e", "f", "g"];
        for key in keys.iter().cycle().take(50) {
            cache.get_or_insert_with(key, tracked(&log)).unwrap();
        }

        // two sentinels plus at most capacity + 1 transient slots
        assert!(cache.nodes.len() <= 2 + cache.capacity() + 1);
    }

    #[test]
    fn test_iter_matches_resident_keys() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(3);
        for key in ["a", "b", "c"] {
            cache.get_or_insert_with(&key, tracked(&log)).unwrap();
        }

        let names: Vec<_> = cache.iter().map(|(_, p)| p.name).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
        assert_eq!(cache.iter().size_hint(), (3, Some(3)));
    }

    #[test]
    fn test_random_operations_respect_capacity() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let log = Log::default();
        let keys = ["a", "b", "c", "d", "e", "f", "g", "h"];

        for capacity in 1..=4 {
            let mut cache = BoundedResourceCache::new(capacity);
            for _ in 0..500 {
                let key = keys[rng.gen_range(0..keys.len())];
                match rng.gen_range(0..4) {
                    0 => {
                        cache.remove(&key);
                    }
                    1 => {
                        cache.touch(&key);
                    }
                    _ => {
                        cache.get_or_insert_with(&key, tracked(&log)).unwrap();
                        assert_eq!(cache.most_recently_used(), Some(&key));
                    }
                }

                assert!(cache.len() <= capacity);
                assert_eq!(cache.resident_keys().len(), cache.len());
            }
        }

        // every constructed resource is torn down once it leaves
        let created = entries(&log, "create").len();
        let torn_down = entries(&log, "teardown").len();
        assert!(torn_down <= created);
    }

    #[test]
    fn test_stats_rates() {
        let log = Log::default();
        let mut cache = BoundedResourceCache::new(4);
        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();
        cache.get_or_insert_with(&"a", tracked(&log)).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!(stats.utilization(), 0.25);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
