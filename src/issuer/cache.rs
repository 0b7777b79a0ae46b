//! Reuse of still-valid issued sessions.
//!
//! Re-opening the QR screen for the same class occurrence should show the
//! token that is already live instead of minting another one. Entries die
//! exactly at the token's expiry instant: expiry is the only deactivation
//! mechanism, and a new mint never invalidates tokens issued earlier for
//! the same slot.

use super::IssuedSession;
use chrono::NaiveDate;
use dashmap::DashMap;

/// One class occurrence: a token is valid for exactly one of these.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct SessionSlot {
    pub course_id: i64,
    pub schedule_id: i64,
    pub date: NaiveDate,
}

/// Thread-safe map of live issued sessions per slot.
pub struct IssuedSessionCache {
    entries: DashMap<SessionSlot, IssuedSession>,
}

impl IssuedSessionCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the live session for a slot, evicting it when expired.
    pub fn get(&self, slot: &SessionSlot, now: i64) -> Option<IssuedSession> {
        self.entries.get(slot).and_then(|entry| {
            if !entry.token().is_expired(now) {
                Some(entry.value().clone())
            } else {
                drop(entry);
                self.entries.remove(slot);
                None
            }
        })
    }

    pub fn insert(&self, slot: SessionSlot, session: IssuedSession) {
        self.entries.insert(slot, session);
    }

    pub fn invalidate(&self, slot: &SessionSlot) {
        self.entries.remove(slot);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries, including any that expired but were not yet
    /// evicted by a lookup.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry whose token has expired.
    pub fn evict_expired(&self, now: i64) {
        self.entries
            .retain(|_, session| !session.token().is_expired(now));
    }
}

impl Default for IssuedSessionCache {
    fn default() -> Self {
        Self::new()
    }
}
