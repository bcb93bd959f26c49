//! In-process stand-ins for the platform decoder and feed backend
//!
//! Used by tests and by the CLI simulator. Every decoder command is appended
//! to a shared `EventLog` so callers can check ordering, e.g. that the
//! previous item paused before the next one played.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::error::{PlaybackError, ResourceError};
use crate::feed::{FeedItem, FeedProvider, ResourceFactory};
use crate::resource::{DecoderSession, MediaLocator, ResourceKey};

/// One decoder command, as observed by the simulated backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DecoderEvent {
    Open { key: ResourceKey },
    Play { key: ResourceKey },
    Pause { key: ResourceKey },
    Mute { key: ResourceKey, muted: bool },
    Seek { key: ResourceKey, position_ms: u64 },
    Stop { key: ResourceKey },
}

/// Shared, append-only record of decoder commands
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<DecoderEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: DecoderEvent) {
        self.events.borrow_mut().push(event);
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<DecoderEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Number of events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&DecoderEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| predicate(e)).count()
    }

    /// Largest number of sessions that were playing at the same time
    pub fn max_concurrent_playing(&self) -> usize {
        let mut playing = HashSet::new();
        let mut max = 0;
        for event in self.events.borrow().iter() {
            match event {
                DecoderEvent::Play { key } => {
                    playing.insert(key.clone());
                }
                DecoderEvent::Pause { key } | DecoderEvent::Stop { key } => {
                    playing.remove(key);
                }
                _ => {}
            }
            max = max.max(playing.len());
        }
        max
    }
}

/// Decoder session that records its commands
#[derive(Debug)]
pub struct SimulatedSession {
    key: ResourceKey,
    log: EventLog,
    stopped: bool,
}

impl SimulatedSession {
    pub fn new(key: ResourceKey, log: EventLog) -> Self {
        log.record(DecoderEvent::Open { key: key.clone() });
        Self {
            key,
            log,
            stopped: false,
        }
    }

    fn command(&self, event: DecoderEvent) -> Result<(), PlaybackError> {
        if self.stopped {
            return Err(PlaybackError::Closed);
        }
        self.log.record(event);
        Ok(())
    }
}

impl DecoderSession for SimulatedSession {
    fn play(&mut self) -> Result<(), PlaybackError> {
        self.command(DecoderEvent::Play {
            key: self.key.clone(),
        })
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        self.command(DecoderEvent::Pause {
            key: self.key.clone(),
        })
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), PlaybackError> {
        self.command(DecoderEvent::Mute {
            key: self.key.clone(),
            muted,
        })
    }

    fn seek(&mut self, position: Duration) -> Result<(), PlaybackError> {
        self.command(DecoderEvent::Seek {
            key: self.key.clone(),
            position_ms: u64::try_from(position.as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn stop(&mut self) -> Result<(), PlaybackError> {
        self.command(DecoderEvent::Stop {
            key: self.key.clone(),
        })?;
        self.stopped = true;
        Ok(())
    }
}

/// Factory opening `SimulatedSession`s, optionally failing for some keys
#[derive(Debug, Clone)]
pub struct SimulatedFactory {
    log: EventLog,
    failing: HashSet<ResourceKey>,
}

impl SimulatedFactory {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            failing: HashSet::new(),
        }
    }

    /// Make construction fail for the given keys
    pub fn failing_on<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        self.failing.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Open a session for `item` without going through a coordinator
    pub fn open(&self, item: &FeedItem) -> Result<SimulatedSession, ResourceError> {
        if self.failing.contains(&item.key) {
            debug!(key = %item.key, "simulated construction failure");
            return Err(ResourceError::construction(&item.key, "simulated failure"));
        }
        Ok(SimulatedSession::new(item.key.clone(), self.log.clone()))
    }
}

impl ResourceFactory<SimulatedSession> for SimulatedFactory {
    fn create(&mut self, item: &FeedItem) -> Result<SimulatedSession, ResourceError> {
        self.open(item)
    }
}

/// In-memory feed with queued pages
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    items: Vec<FeedItem>,
    pages: VecDeque<Vec<FeedItem>>,
    page_requests: usize,
    auto_deliver: bool,
}

impl StaticFeed {
    /// Feed whose first page holds `keys`
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        Self {
            items: keys.into_iter().map(|key| item_for(key.into())).collect(),
            ..Default::default()
        }
    }

    /// Queue a further page, delivered on request
    pub fn with_page<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        self.pages
            .push_back(keys.into_iter().map(|key| item_for(key.into())).collect());
        self
    }

    /// Append pages as soon as they are requested
    pub fn with_auto_deliver(mut self, auto_deliver: bool) -> Self {
        self.auto_deliver = auto_deliver;
        self
    }

    /// Number of next-page requests received
    pub fn page_requests(&self) -> usize {
        self.page_requests
    }

    /// Append the next queued page; returns the number of items added
    pub fn deliver_next_page(&mut self) -> usize {
        match self.pages.pop_front() {
            Some(page) => {
                let added = page.len();
                self.items.extend(page);
                added
            }
            None => 0,
        }
    }

    /// Remove an item from the known sequence
    pub fn remove(&mut self, key: &ResourceKey) -> Option<FeedItem> {
        let index = self.position_of(key)?;
        Some(self.items.remove(index))
    }
}

impl FeedProvider for StaticFeed {
    fn items(&self) -> &[FeedItem] {
        &self.items
    }

    fn has_more_pages(&self) -> bool {
        !self.pages.is_empty()
    }

    fn request_next_page(&mut self) {
        self.page_requests += 1;
        if self.auto_deliver {
            self.deliver_next_page();
        }
    }
}

fn item_for(key: ResourceKey) -> FeedItem {
    let locator = MediaLocator::new(format!("sim://{key}"));
    FeedItem::new(key, locator)
}
