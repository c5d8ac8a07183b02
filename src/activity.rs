// ============================================================================
// CALLER ACTIVITY TRACKER
// ============================================================================
// Last-seen timestamp per caller key. Written on every authorized analysis
// request (at receipt, before admission) and read by the stats endpoint.
//
// Entries are never evicted: the map grows with the number of distinct keys
// ever seen, which is bounded by the allow-list size.
// ============================================================================

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Caller Identity
// ----------------------------------------------------------------------------

/// Opaque shared-secret token presented by a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(CompactString);

impl CallerId {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(CompactString::new(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for CallerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CallerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CallerId {
    fn from(s: String) -> Self {
        Self(CompactString::from(s))
    }
}

// ----------------------------------------------------------------------------
// Tracker
// ----------------------------------------------------------------------------

/// Concurrent caller -> last request timestamp map.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    last_seen: DashMap<CallerId, DateTime<Utc>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the caller's last-seen time.
    pub fn record_activity(&self, caller: &CallerId, at: DateTime<Utc>) {
        self.last_seen.insert(caller.clone(), at);
    }

    /// Record activity stamped with the current time.
    pub fn touch(&self, caller: &CallerId) {
        self.record_activity(caller, Utc::now());
    }

    pub fn last_seen(&self, caller: &CallerId) -> Option<DateTime<Utc>> {
        self.last_seen.get(caller).map(|entry| *entry.value())
    }

    /// Distinct callers recorded so far, sorted for stable output.
    ///
    /// Shards are read one at a time, so an insert racing with this call may
    /// or may not show up, but never corrupts the result.
    pub fn known_callers(&self) -> Vec<CallerId> {
        let mut callers: Vec<CallerId> = self
            .last_seen
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        callers.sort_unstable();
        callers
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
