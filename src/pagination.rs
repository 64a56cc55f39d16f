//! Per-parent incremental disclosure ("load more") counters.
//!
//! Counters live for the in-memory session only and are never reset by
//! filter changes: a changed filter produces a different data set under a
//! different cache key, so counts for the old key become orphaned and
//! harmless.

use std::collections::HashMap;
use std::sync::Mutex;

/// Number of children disclosed per "load more" step.
pub const PAGE_SIZE: usize = 50;

/// Tracks how many items have been revealed under each parent key.
pub struct PaginationTracker {
  revealed: Mutex<HashMap<String, usize>>,
}

impl PaginationTracker {
  pub fn new() -> Self {
    Self {
      revealed: Mutex::new(HashMap::new()),
    }
  }

  /// Current disclosed count for a parent key; a key never seen before
  /// starts at one page.
  pub fn reveal(&self, parent_key: &str) -> usize {
    let mut revealed = self.revealed.lock().expect("pagination lock poisoned");
    *revealed.entry(parent_key.to_string()).or_insert(PAGE_SIZE)
  }

  /// Disclose one more page for a parent key.
  pub fn advance(&self, parent_key: &str) {
    let mut revealed = self.revealed.lock().expect("pagination lock poisoned");
    *revealed.entry(parent_key.to_string()).or_insert(PAGE_SIZE) += PAGE_SIZE;
  }

  /// Prefix-slice the full (filtered, sorted) result list down to the
  /// revealed count, returning the visible items and how many remain.
  pub fn slice<T: Clone>(&self, parent_key: &str, items: &[T]) -> (Vec<T>, usize) {
    let revealed = self.reveal(parent_key);
    let visible = items.iter().take(revealed).cloned().collect();
    let remaining = items.len().saturating_sub(revealed);
    (visible, remaining)
  }
}

impl Default for PaginationTracker {
  fn default() -> Self {
    Self::new()
  }
}
