//! Which identities are already participants.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory index of accepted identities and when they were first seen.
///
/// This only accelerates lookups on the hot path. The durable store stays
/// authoritative, and a miss here doesn't prove an identity is unknown.
#[derive(Debug, Default)]
pub struct PresenceCache {
    index: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl PresenceCache {
    /// An empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `identity` is known
    pub fn is_present(&self, identity: &str) -> bool {
        self.index.read().contains_key(identity)
    }

    /// When `identity` was first seen, if known
    pub fn first_seen(&self, identity: &str) -> Option<DateTime<Utc>> {
        self.index.read().get(identity).copied()
    }

    /// Insert or overwrite a single identity
    pub fn add(&self, identity: impl Into<String>, first_seen: DateTime<Utc>) {
        self.index.write().insert(identity.into(), first_seen);
    }

    /// Swap in `entries` as the entire index.
    ///
    /// Readers see either the old index or the new one, never a mix. An empty
    /// map clears the cache.
    pub fn replace_all(&self, entries: HashMap<String, DateTime<Utc>>) {
        let previous = std::mem::replace(&mut *self.index.write(), entries);
        // the old map is freed outside the lock
        drop(previous);
    }

    /// Number of known identities
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Whether no identity is known
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}
