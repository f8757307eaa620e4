//! Per-conversation window selections.
//!
//! A `windows` reply stores the listed windows here; button callbacks resolve
//! an index against the most recent list for the same conversation.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::channel::ConversationId;
use crate::window::WindowDescriptor;

/// Maximum windows kept per conversation (10 keyboard rows of 2 buttons).
pub const MAX_SESSION_ENTRIES: usize = 20;

#[derive(Debug)]
struct SessionEntry {
    windows: Vec<WindowDescriptor>,
    stored_at: Instant,
}

/// Session map keyed by conversation. Each put replaces the previous list.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: DashMap<ConversationId, SessionEntry>,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `ttl` resolve as stale.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Store `windows` for `conversation`, truncated to
    /// [`MAX_SESSION_ENTRIES`]. Returns the number stored.
    ///
    /// Expired selections of other conversations are dropped on the way.
    pub fn put(&self, conversation: ConversationId, mut windows: Vec<WindowDescriptor>) -> usize {
        let purged = self.purge_expired();
        if purged > 0 {
            debug!(purged, "expired window selections dropped");
        }
        windows.truncate(MAX_SESSION_ENTRIES);
        let stored = windows.len();
        self.entries.insert(
            conversation,
            SessionEntry {
                windows,
                stored_at: Instant::now(),
            },
        );
        stored
    }

    /// Look up `index` in the latest list for `conversation`.
    pub fn resolve(&self, conversation: ConversationId, index: usize) -> Option<WindowDescriptor> {
        let entry = self.entries.get(&conversation)?;
        if self.is_expired(&entry) {
            drop(entry);
            self.entries.remove(&conversation);
            return None;
        }
        entry.windows.get(index).cloned()
    }

    pub fn len(&self, conversation: ConversationId) -> usize {
        self.entries
            .get(&conversation)
            .map_or(0, |entry| entry.windows.len())
    }

    pub fn clear(&self, conversation: ConversationId) {
        self.entries.remove(&conversation);
    }

    /// Drop expired entries. No-op without a TTL.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry));
        before - self.entries.len()
    }

    fn is_expired(&self, entry: &SessionEntry) -> bool {
        self.ttl
            .map_or(false, |ttl| entry.stored_at.elapsed() >= ttl)
    }
}
