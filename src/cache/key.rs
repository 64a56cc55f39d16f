//! Cache key derivation for remote query results.
//!
//! Keys are plain composed strings rather than hashes so that mutation
//! invalidation can sweep whole families of entries by prefix
//! (`children_*`, `epics_*`).

use crate::filter::FilterState;

/// Prefix shared by all cached children-of-parent query results.
pub const CHILDREN_PREFIX: &str = "children_";
/// Prefix shared by all cached area-level epic query results.
pub const EPICS_PREFIX: &str = "epics_";
/// Key for the cached team membership list.
pub const ALL_TEAM_MEMBERS_KEY: &str = "allTeamMembers";
/// Prefix for cached per-type field/state metadata.
pub const WIT_FIELDS_PREFIX: &str = "witFields_";

/// An entity scope that query results are cached under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
  /// Epics directly under an area path.
  Epics { area_path: String },
  /// Children linked under a parent work item.
  Children { parent_id: i32 },
  /// Team membership list for the configured team.
  AllTeamMembers,
  /// Field/state metadata for one work item type.
  WitFields { wit: String },
}

impl Scope {
  /// Derive the cache key for this scope under the given filters.
  ///
  /// Same (scope, filters) always yields the same key; any differing filter
  /// dimension yields a different key. Scopes without a filter surface
  /// (team members, type metadata) ignore the filter state entirely, so an
  /// active filter never splits their cache.
  pub fn key(&self, filters: &FilterState) -> String {
    match self {
      Scope::Epics { area_path } => {
        format!("{}{}_{}", EPICS_PREFIX, area_path, filters.key_suffix())
      }
      Scope::Children { parent_id } => {
        format!("{}{}_{}", CHILDREN_PREFIX, parent_id, filters.key_suffix())
      }
      Scope::AllTeamMembers => ALL_TEAM_MEMBERS_KEY.to_string(),
      Scope::WitFields { wit } => format!("{}{}", WIT_FIELDS_PREFIX, wit),
    }
  }
}
