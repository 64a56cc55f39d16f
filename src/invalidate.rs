//! Maps mutations to the cache keys that must be dropped.
//!
//! Invalidation is deliberately coarse: the cache does not track which
//! cached children-list a given item belongs to, so any item mutation
//! drops every `children_*` and `epics_*` entry. Team membership and type
//! metadata are untouched by item mutations.

use std::sync::Arc;
use tracing::debug;

use crate::cache::{CachePayload, TtlCache, CHILDREN_PREFIX, EPICS_PREFIX};

/// A completed mutation against the remote tracking system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
  /// Partial field patch on an existing item.
  Update { id: i32 },
  Delete { id: i32 },
  /// Newly created item, possibly linked under a parent.
  Create { parent_id: Option<i32> },
  /// Parent link (or area path) changed.
  Reparent { id: i32 },
}

/// Purges the cache entries a mutation may have made stale.
pub struct MutationInvalidator {
  cache: Arc<TtlCache<CachePayload>>,
}

impl MutationInvalidator {
  pub fn new(cache: Arc<TtlCache<CachePayload>>) -> Self {
    Self { cache }
  }

  /// Drop every cached query result the mutation could have affected. The
  /// next fetch under any of these keys observes current remote truth.
  pub fn invalidate(&self, mutation: Mutation) -> usize {
    let removed = self
      .cache
      .invalidate_by_prefix(&[CHILDREN_PREFIX, EPICS_PREFIX]);
    debug!(?mutation, removed, "invalidated query caches after mutation");
    removed
  }

  /// A changed organization/project/token invalidates every prior result.
  pub fn on_config_change(&self) {
    self.cache.clear();
  }
}
