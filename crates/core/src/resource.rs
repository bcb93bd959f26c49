//! Playback resource model
//!
//! A `Resource` binds one feed item to one decoder session for as long as it
//! is resident in the cache. The decoder itself lives in the platform media
//! stack and is reached through the `DecoderSession` trait.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use clipfeed_cache::{Teardown, TeardownError};
use serde::{Deserialize, Serialize};

use crate::error::PlaybackError;

/// Identifier of one playable feed item (post or content id)
///
/// One key per item; a key is never reused for different content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Create a key from a content id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The underlying content id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ResourceKey {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where the media lives and which headers the request needs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaLocator {
    /// Stream or file URL
    pub url: String,

    /// Request headers, typically authorization supplied by the host
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl MediaLocator {
    /// Create a locator without headers
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Playback state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Opened or torn down, not decoding
    #[default]
    Stopped,
    /// Actively decoding and rendering
    Playing,
    /// Kept warm for instant resume
    Paused,
}

/// Control surface of a platform decoder session
pub trait DecoderSession {
    /// Start or resume decoding
    fn play(&mut self) -> Result<(), PlaybackError>;

    /// Suspend decoding, keeping the session warm
    fn pause(&mut self) -> Result<(), PlaybackError>;

    /// Mute or unmute audio output
    fn set_muted(&mut self, muted: bool) -> Result<(), PlaybackError>;

    /// Move the playhead
    fn seek(&mut self, position: Duration) -> Result<(), PlaybackError>;

    /// Stop decoding and release the hardware session
    fn stop(&mut self) -> Result<(), PlaybackError>;
}

/// Decoder-backed handle for one feed item
///
/// Tracks the state it last successfully drove the session into. A failed
/// command leaves the recorded state unchanged.
#[derive(Debug)]
pub struct Resource<S> {
    key: ResourceKey,
    locator: MediaLocator,
    session: S,
    state: PlaybackState,
    muted: bool,

    /// Diagnostics only; recency is kept by the cache
    last_touched: u64,
}

impl<S: DecoderSession> Resource<S> {
    /// Wrap an opened decoder session
    pub fn new(key: ResourceKey, locator: MediaLocator, session: S) -> Self {
        Self {
            key,
            locator,
            session,
            state: PlaybackState::Stopped,
            muted: false,
            last_touched: 0,
        }
    }

    /// Start or resume playback
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        if self.state == PlaybackState::Playing {
            return Ok(());
        }
        self.session.play()?;
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Pause playback; a resource that is not playing is left alone
    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Playing {
            return Ok(());
        }
        self.session.pause()?;
        self.state = PlaybackState::Paused;
        Ok(())
    }

    /// Mute or unmute
    pub fn set_muted(&mut self, muted: bool) -> Result<(), PlaybackError> {
        self.session.set_muted(muted)?;
        self.muted = muted;
        Ok(())
    }

    /// Move the playhead
    pub fn seek(&mut self, position: Duration) -> Result<(), PlaybackError> {
        self.session.seek(position)
    }

    /// Record a diagnostic touch marker; markers only grow
    pub fn mark_touched(&mut self, tick: u64) {
        self.last_touched = self.last_touched.max(tick);
    }

    /// Key this resource is bound to
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Media locator the session was opened against
    pub fn locator(&self) -> &MediaLocator {
        &self.locator
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Whether the resource is decoding
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Whether audio is muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Last diagnostic touch marker
    pub fn last_touched(&self) -> u64 {
        self.last_touched
    }

    /// Borrow the decoder session
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Mutably borrow the decoder session
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: DecoderSession> Teardown for Resource<S> {
    fn teardown(&mut self) -> Result<(), TeardownError> {
        let result = self.session.stop();
        self.state = PlaybackState::Stopped;
        result.map_err(|err| TeardownError::new(format!("{}: {}", self.key, err)))
    }
}
