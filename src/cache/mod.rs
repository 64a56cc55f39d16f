//! Time-boxed in-memory caching for remote query results.
//!
//! One [`TtlCache`] instance backs every query surface (epic lists,
//! children lists, team membership, type metadata), so mutation
//! invalidation can sweep related families of keys in one pass while
//! leaving unrelated entries warm.

mod key;
mod ttl;

pub use key::{Scope, ALL_TEAM_MEMBERS_KEY, CHILDREN_PREFIX, EPICS_PREFIX, WIT_FIELDS_PREFIX};
pub use ttl::{TtlCache, CACHE_TTL_MINUTES};

use crate::ado::types::{TeamMember, WorkItem, WorkItemTypeInfo};

/// The payloads stored in the shared query cache, one variant per scope
/// family. A key only ever maps to the variant its scope produces.
#[derive(Debug, Clone)]
pub enum CachePayload {
  /// Work item lists from epic/children queries.
  Items(Vec<WorkItem>),
  /// Team membership list.
  Members(Vec<TeamMember>),
  /// Per-type state and field metadata.
  TypeInfo(WorkItemTypeInfo),
}

impl CachePayload {
  pub fn into_items(self) -> Option<Vec<WorkItem>> {
    match self {
      CachePayload::Items(items) => Some(items),
      _ => None,
    }
  }

  pub fn into_members(self) -> Option<Vec<TeamMember>> {
    match self {
      CachePayload::Members(members) => Some(members),
      _ => None,
    }
  }

  pub fn into_type_info(self) -> Option<WorkItemTypeInfo> {
    match self {
      CachePayload::TypeInfo(info) => Some(info),
      _ => None,
    }
  }
}
