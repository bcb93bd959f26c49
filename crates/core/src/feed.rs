//! Feed provider and resource factory seams
//!
//! Both are owned by the host: the feed provider fetches and paginates items,
//! the factory opens decoder sessions (attaching whatever credentials the
//! media requests need).

use serde::{Deserialize, Serialize};

use crate::error::ResourceError;
use crate::resource::{MediaLocator, ResourceKey};

/// Presentation metadata carried alongside a feed item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Author display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Caption text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Clip length in milliseconds, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// One playable entry of the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub key: ResourceKey,
    pub locator: MediaLocator,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

impl FeedItem {
    /// Create an item without metadata
    pub fn new(key: impl Into<ResourceKey>, locator: MediaLocator) -> Self {
        Self {
            key: key.into(),
            locator,
            metadata: ItemMetadata::default(),
        }
    }
}

/// Ordered, paginated source of feed items
pub trait FeedProvider {
    /// Items known so far, in feed order
    fn items(&self) -> &[FeedItem];

    /// Whether another page can be requested
    fn has_more_pages(&self) -> bool;

    /// Ask for the next page; items may arrive later
    fn request_next_page(&mut self);

    /// Item at `index`, if known
    fn item(&self, index: usize) -> Option<&FeedItem> {
        self.items().get(index)
    }

    /// Number of known items
    fn item_count(&self) -> usize {
        self.items().len()
    }

    /// Position of `key` in the known sequence
    fn position_of(&self, key: &ResourceKey) -> Option<usize> {
        self.items().iter().position(|item| &item.key == key)
    }
}

/// Opens decoder sessions for feed items
///
/// Called once per cache miss. Must not call back into the coordinator or
/// its cache.
pub trait ResourceFactory<S> {
    /// Open a decoder session for `item`
    fn create(&mut self, item: &FeedItem) -> Result<S, ResourceError>;
}

impl<S, F> ResourceFactory<S> for F
where
    F: FnMut(&FeedItem) -> Result<S, ResourceError>,
{
    fn create(&mut self, item: &FeedItem) -> Result<S, ResourceError> {
        self(item)
    }
}
