//! clipfeed Cache Library
//!
//! Bounded LRU cache of decoder-backed playback resources, with a mandatory
//! teardown hook and memory pressure shedding.

pub mod config;
pub mod lru;
pub mod pressure;

pub use config::{CacheConfig, ConfigError, DEFAULT_CAPACITY};
pub use lru::{BoundedResourceCache, CacheStats, Iter, Teardown, TeardownError};
pub use pressure::{MemoryPressure, MemoryPressureReactor, PressurePolicy};
