//! Domain types for Azure DevOps work items and related entities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Work item type names the backlog hierarchy is built from.
pub const WIT_EPIC: &str = "Epic";
pub const WIT_FEATURE: &str = "Feature";
pub const WIT_USER_STORY: &str = "User Story";
pub const WIT_BUG: &str = "Bug";

/// The four backlog types, in hierarchy order.
pub const BACKLOG_TYPES: [&str; 4] = [WIT_EPIC, WIT_FEATURE, WIT_USER_STORY, WIT_BUG];

/// Forward (parent→child) hierarchy link type.
pub const HIERARCHY_FORWARD: &str = "System.LinkTypes.Hierarchy-Forward";
/// Reverse (child→parent) hierarchy link type.
pub const HIERARCHY_REVERSE: &str = "System.LinkTypes.Hierarchy-Reverse";

/// Field reference names, shared by query projection and wire decoding.
pub mod field {
  pub const ID: &str = "System.Id";
  pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
  pub const STATE: &str = "System.State";
  pub const TITLE: &str = "System.Title";
  pub const AREA_PATH: &str = "System.AreaPath";
  pub const ITERATION_PATH: &str = "System.IterationPath";
  pub const ASSIGNED_TO: &str = "System.AssignedTo";
  pub const TAGS: &str = "System.Tags";
  pub const DESCRIPTION: &str = "System.Description";
  pub const ACCEPTANCE_CRITERIA: &str = "Microsoft.VSTS.Common.AcceptanceCriteria";
  pub const STORY_POINTS: &str = "Microsoft.VSTS.Scheduling.StoryPoints";
}

/// An identity reference (assignee, member).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub display_name: String,
  pub unique_name: String,
}

/// A single backlog entity as the client sees it. Ids are assigned by the
/// remote system on create and never reused by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
  pub id: i32,
  /// Work item type name ("Epic", "Feature", "User Story", "Bug", ...).
  pub wit: String,
  /// Current state; valid values are type-dependent, see [`WorkItemTypeInfo`].
  pub state: String,
  pub title: String,
  pub area_path: String,
  pub iteration_path: String,
  pub assigned_to: Option<Identity>,
  /// Ordered tag set; semicolon-joined on the wire.
  pub tags: Vec<String>,
  /// Sanitized HTML fragment.
  pub description: Option<String>,
  /// Sanitized HTML fragment (User Story / Bug).
  pub acceptance_criteria: Option<String>,
  /// User Story only.
  pub story_points: Option<f64>,
  /// Configured custom fields, keyed by field reference name.
  pub custom: BTreeMap<String, serde_json::Value>,
}

/// A member of the configured team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMember {
  pub id: String,
  pub display_name: String,
  pub unique_name: String,
}

/// Definition of one field on a work item type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
  pub reference_name: String,
  pub name: String,
  pub allowed_values: Vec<String>,
  pub always_required: bool,
}

/// Valid states and field definitions for one work item type.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemTypeInfo {
  pub name: String,
  pub states: Vec<String>,
  pub fields: Vec<FieldDef>,
}

/// One relation on a work item, as returned by the expanded get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
  pub rel: String,
  pub url: String,
}

/// A single JSON-patch style field operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOp {
  pub op: &'static str,
  pub path: String,
  pub value: serde_json::Value,
}

impl PatchOp {
  pub fn add(path: impl Into<String>, value: serde_json::Value) -> Self {
    Self {
      op: "add",
      path: path.into(),
      value,
    }
  }

  pub fn replace(path: impl Into<String>, value: serde_json::Value) -> Self {
    Self {
      op: "replace",
      path: path.into(),
      value,
    }
  }

  pub fn remove(path: impl Into<String>) -> Self {
    Self {
      op: "remove",
      path: path.into(),
      value: serde_json::Value::Null,
    }
  }
}

/// Join tags for the wire: the value is always the complete desired set.
pub fn join_tags(tags: &[String]) -> String {
  tags.join("; ")
}

/// Split the wire form back into the ordered tag set.
pub fn split_tags(raw: &str) -> Vec<String> {
  raw
    .split(';')
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .map(String::from)
    .collect()
}
