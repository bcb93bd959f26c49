//! Memory pressure handling for the resource cache
//!
//! The host delivers low-memory signals; the reactor sheds cached resources
//! from the least recently used end so the active (most recently used)
//! resource keeps playing.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use tracing::info;

use crate::config::ConfigError;
use crate::lru::{BoundedResourceCache, Teardown};

/// Memory pressure level reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressure {
    /// No action needed
    Low,
    /// Host is tightening; still no action
    Moderate,
    /// Shed according to the configured policy
    High,
    /// Shed everything but the most recently used resource
    Critical,
}

impl MemoryPressure {
    /// Returns true if memory pressure requires action (High or Critical)
    pub fn needs_eviction(&self) -> bool {
        matches!(self, MemoryPressure::High | MemoryPressure::Critical)
    }
}

/// How many resources one pressure signal sheds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressurePolicy {
    /// Evict exactly one LRU entry per signal. The host re-signals on
    /// escalating pressure.
    #[default]
    Single,

    /// Evict up to `n` LRU entries per signal. Only the first eviction may
    /// take the last remaining entry.
    Count(usize),

    /// Evict everything except the most recently used entry
    AllButMostRecent,
}

impl fmt::Display for PressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressurePolicy::Single => write!(f, "single"),
            PressurePolicy::Count(n) => write!(f, "count:{}", n),
            PressurePolicy::AllButMostRecent => write!(f, "all-but-mru"),
        }
    }
}

impl FromStr for PressurePolicy {
    type Err = ConfigError;

    /// Parses `single`, `count:N` or `all-but-mru`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidValue("pressure_policy".to_string());

        match s.trim() {
            "single" => Ok(PressurePolicy::Single),
            "all-but-mru" => Ok(PressurePolicy::AllButMostRecent),
            other => {
                let count = other.strip_prefix("count:").ok_or_else(invalid)?;
                let n = count.trim().parse::<usize>().map_err(|_| invalid())?;
                if n == 0 {
                    return Err(invalid());
                }
                Ok(PressurePolicy::Count(n))
            }
        }
    }
}

/// Sheds cached resources in response to low-memory signals
///
/// The reactor never scans for the active resource. It relies on the
/// coordinator keeping the active key most recently used, so shedding from
/// the LRU end reaches it last.
///
/// # Example
///
/// ```
/// use clipfeed_cache::{
///     BoundedResourceCache, MemoryPressureReactor, PressurePolicy, Teardown, TeardownError,
/// };
///
/// struct Session;
///
/// impl Teardown for Session {
///     fn teardown(&mut self) -> Result<(), TeardownError> {
///         Ok(())
///     }
/// }
///
/// let mut cache = BoundedResourceCache::new(4);
/// for key in [1, 2, 3] {
///     cache.get_or_insert_with(&key, |_| Ok::<_, ()>(Session)).unwrap();
/// }
///
/// let mut reactor = MemoryPressureReactor::new(PressurePolicy::Single);
/// assert_eq!(reactor.on_memory_pressure(&mut cache), 1);
/// assert_eq!(cache.resident_keys(), vec![3, 2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryPressureReactor {
    policy: PressurePolicy,
    signals: u64,
    shed: u64,
}

impl MemoryPressureReactor {
    /// Create a reactor applying `policy` on every signal
    pub fn new(policy: PressurePolicy) -> Self {
        Self {
            policy,
            signals: 0,
            shed: 0,
        }
    }

    /// Handle one low-memory signal
    ///
    /// Returns the number of resources evicted.
    pub fn on_memory_pressure<K, R>(&mut self, cache: &mut BoundedResourceCache<K, R>) -> usize
    where
        K: Eq + Hash + Clone + fmt::Debug,
        R: Teardown,
    {
        self.shed_with(self.policy, cache)
    }

    /// Handle a graded pressure level
    ///
    /// Low and Moderate are ignored, High applies the configured policy and
    /// Critical sheds everything but the most recently used resource.
    pub fn on_pressure_level<K, R>(
        &mut self,
        level: MemoryPressure,
        cache: &mut BoundedResourceCache<K, R>,
    ) -> usize
    where
        K: Eq + Hash + Clone + fmt::Debug,
        R: Teardown,
    {
        if !level.needs_eviction() {
            return 0;
        }

        let policy = match level {
            MemoryPressure::Critical => PressurePolicy::AllButMostRecent,
            _ => self.policy,
        };
        self.shed_with(policy, cache)
    }

    /// Policy applied to plain signals
    pub fn policy(&self) -> PressurePolicy {
        self.policy
    }

    /// Number of signals handled so far
    pub fn signals(&self) -> u64 {
        self.signals
    }

    /// Total resources shed so far
    pub fn shed(&self) -> u64 {
        self.shed
    }

    fn shed_with<K, R>(
        &mut self,
        policy: PressurePolicy,
        cache: &mut BoundedResourceCache<K, R>,
    ) -> usize
    where
        K: Eq + Hash + Clone + fmt::Debug,
        R: Teardown,
    {
        self.signals += 1;

        let evicted = match policy {
            PressurePolicy::Single => usize::from(cache.evict_least_recently_used()),
            PressurePolicy::Count(n) => {
                let mut evicted = 0;
                while evicted < n && (evicted == 0 || cache.len() > 1) {
                    if !cache.evict_least_recently_used() {
                        break;
                    }
                    evicted += 1;
                }
                evicted
            }
            PressurePolicy::AllButMostRecent => {
                let mut evicted = 0;
                while cache.len() > 1 && cache.evict_least_recently_used() {
                    evicted += 1;
                }
                evicted
            }
        };

        self.shed += evicted as u64;
        info!(
            %policy,
            evicted,
            resident = cache.len(),
            "memory pressure shed cached resources"
        );
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lru::TeardownError;

    struct Session;

    impl Teardown for Session {
        fn teardown(&mut self) -> Result<(), TeardownError> {
            Ok(())
        }
    }

    fn filled(keys: &[u32]) -> BoundedResourceCache<u32, Session> {
        let mut cache = BoundedResourceCache::new(keys.len().max(1));
        for key in keys {
            cache
                .get_or_insert_with(key, |_| Ok::<_, ()>(Session))
                .unwrap();
        }
        cache
    }

    #[test]
    fn test_pressure_needs_eviction() {
        assert!(!MemoryPressure::Low.needs_eviction());
        assert!(!MemoryPressure::Moderate.needs_eviction());
        assert!(MemoryPressure::High.needs_eviction());
        assert!(MemoryPressure::Critical.needs_eviction());
    }

    #[test]
    fn test_single_policy_evicts_one_per_signal() {
        let mut cache = filled(&[1, 2, 3]);
        let mut reactor = MemoryPressureReactor::default();

        assert_eq!(reactor.on_memory_pressure(&mut cache), 1);
        assert_eq!(cache.resident_keys(), vec![3, 2]);
        assert_eq!(reactor.on_memory_pressure(&mut cache), 1);
        assert_eq!(cache.resident_keys(), vec![3]);
        assert_eq!(reactor.signals(), 2);
        assert_eq!(reactor.shed(), 2);
    }

    #[test]
    fn test_single_policy_on_empty_cache() {
        let mut cache = filled(&[]);
        let mut reactor = MemoryPressureReactor::new(PressurePolicy::Single);
        assert_eq!(reactor.on_memory_pressure(&mut cache), 0);
        assert_eq!(reactor.signals(), 1);
    }

    #[test]
    fn test_most_recent_survives_repeated_signals() {
        let mut cache = filled(&[1, 2, 3, 4]);
        cache.touch(&2);
        let mut reactor = MemoryPressureReactor::default();

        for _ in 0..3 {
            reactor.on_memory_pressure(&mut cache);
            assert!(cache.contains(&2));
        }
        assert_eq!(cache.resident_keys(), vec![2]);
    }

    #[test]
    fn test_count_policy_keeps_last_entry() {
        let mut cache = filled(&[1, 2, 3]);
        let mut reactor = MemoryPressureReactor::new(PressurePolicy::Count(5));
        assert_eq!(reactor.on_memory_pressure(&mut cache), 2);
        assert_eq!(cache.resident_keys(), vec![3]);

        // a lone entry is shed by the first eviction only
        assert_eq!(reactor.on_memory_pressure(&mut cache), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_all_but_most_recent_policy() {
        let mut cache = filled(&[1, 2, 3, 4]);
        let mut reactor = MemoryPressureReactor::new(PressurePolicy::AllButMostRecent);
        assert_eq!(reactor.on_memory_pressure(&mut cache), 3);
        assert_eq!(cache.resident_keys(), vec![4]);
        assert_eq!(reactor.on_memory_pressure(&mut cache), 0);
    }

    #[test]
    fn test_pressure_levels_drive_shedding() {
        let mut cache = filled(&[1, 2, 3, 4]);
        let mut reactor = MemoryPressureReactor::default();

        assert_eq!(reactor.on_pressure_level(MemoryPressure::Low, &mut cache), 0);
        assert_eq!(
            reactor.on_pressure_level(MemoryPressure::Moderate, &mut cache),
            0
        );
        assert_eq!(reactor.on_pressure_level(MemoryPressure::High, &mut cache), 1);
        assert_eq!(
            reactor.on_pressure_level(MemoryPressure::Critical, &mut cache),
            2
        );
        assert_eq!(cache.resident_keys(), vec![4]);
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!("single".parse::<PressurePolicy>().unwrap(), PressurePolicy::Single);
        assert_eq!(
            "count:3".parse::<PressurePolicy>().unwrap(),
            PressurePolicy::Count(3)
        );
        assert_eq!(
            " all-but-mru ".parse::<PressurePolicy>().unwrap(),
            PressurePolicy::AllButMostRecent
        );
        assert!("count:0".parse::<PressurePolicy>().is_err());
        assert!("count:x".parse::<PressurePolicy>().is_err());
        assert!("flush".parse::<PressurePolicy>().is_err());

        for policy in [
            PressurePolicy::Single,
            PressurePolicy::Count(2),
            PressurePolicy::AllButMostRecent,
        ] {
            assert_eq!(policy.to_string().parse::<PressurePolicy>().unwrap(), policy);
        }
    }
}
