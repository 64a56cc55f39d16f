//! In-memory key→value store with a fixed time-to-live per entry.
//!
//! Expiry is checked at read time; there is no background sweep. Entries
//! are only removed by an overwriting `set`, a prefix invalidation, or
//! `clear`. All time-sensitive operations have `_at` variants taking an
//! explicit clock so tests never depend on wall time.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Default entry lifetime in minutes.
pub const CACHE_TTL_MINUTES: i64 = 5;

struct Entry<V> {
  value: V,
  stored_at: DateTime<Utc>,
}

/// Time-boxed cache over remote query results.
///
/// Interior mutability behind a `Mutex` so one instance can be shared by
/// every in-flight fetch; access is effectively single-threaded (one
/// cooperative task queue), the lock only guards against interleaving.
/// A `set` racing a `get` for the same key is benign: last `set` wins and
/// a miss merely costs a redundant remote fetch.
pub struct TtlCache<V> {
  entries: Mutex<HashMap<String, Entry<V>>>,
  ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
  pub fn new() -> Self {
    Self::with_ttl(Duration::minutes(CACHE_TTL_MINUTES))
  }

  pub fn with_ttl(ttl: Duration) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      ttl,
    }
  }

  /// Look up a value. Absent if never set or if the entry's age has
  /// reached the TTL. Never evicts; a later `set` simply overwrites.
  pub fn get(&self, key: &str) -> Option<V> {
    self.get_at(key, Utc::now())
  }

  /// `get` against an explicit clock.
  pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
    let entries = self.entries.lock().expect("cache lock poisoned");
    entries
      .get(key)
      .filter(|entry| now - entry.stored_at < self.ttl)
      .map(|entry| entry.value.clone())
  }

  /// Store a value, unconditionally overwriting any prior entry.
  pub fn set(&self, key: &str, value: V) {
    self.set_at(key, value, Utc::now());
  }

  /// `set` against an explicit clock.
  pub fn set_at(&self, key: &str, value: V, now: DateTime<Utc>) {
    let mut entries = self.entries.lock().expect("cache lock poisoned");
    entries.insert(key.to_string(), Entry { value, stored_at: now });
  }

  /// Drop every entry whose key starts with any of the given prefixes.
  /// Returns the number of entries removed.
  pub fn invalidate_by_prefix(&self, prefixes: &[&str]) -> usize {
    let mut entries = self.entries.lock().expect("cache lock poisoned");
    let before = entries.len();
    entries.retain(|key, _| !prefixes.iter().any(|p| key.starts_with(p)));
    let removed = before - entries.len();
    if removed > 0 {
      debug!(removed, ?prefixes, "invalidated cache entries by prefix");
    }
    removed
  }

  /// Drop everything.
  pub fn clear(&self) {
    let mut entries = self.entries.lock().expect("cache lock poisoned");
    let dropped = entries.len();
    entries.clear();
    debug!(dropped, "cleared cache");
  }

  pub fn len(&self) -> usize {
    self.entries.lock().expect("cache lock poisoned").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<V: Clone> Default for TtlCache<V> {
  fn default() -> Self {
    Self::new()
  }
}
