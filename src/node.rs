//! Backlog tree nodes as a closed tagged variant.
//!
//! Each variant's behavior (expandability, valid drop targets, pagination
//! identity) is a pure function of the tag, so consumers match instead of
//! dispatching through a hierarchy.

use crate::ado::types::{WorkItem, WIT_BUG, WIT_EPIC, WIT_FEATURE, WIT_USER_STORY};

/// One node of the backlog view.
#[derive(Debug, Clone, PartialEq)]
pub enum BacklogNode {
  /// A configured area path; the root level of the tree.
  Area { path: String },
  Epic { item: WorkItem },
  Feature { item: WorkItem },
  Story { item: WorkItem },
  Bug { item: WorkItem },
  /// Trailing sentinel shown while more items remain undisclosed.
  LoadMore { parent_key: String, remaining: usize },
}

/// Discriminant of [`BacklogNode`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
  Area,
  Epic,
  Feature,
  Story,
  Bug,
  LoadMore,
}

impl BacklogNode {
  /// Wrap a fetched work item in its node variant. Items of types outside
  /// the backlog hierarchy have no place in the tree.
  pub fn from_item(item: WorkItem) -> Option<Self> {
    match item.wit.as_str() {
      WIT_EPIC => Some(BacklogNode::Epic { item }),
      WIT_FEATURE => Some(BacklogNode::Feature { item }),
      WIT_USER_STORY => Some(BacklogNode::Story { item }),
      WIT_BUG => Some(BacklogNode::Bug { item }),
      _ => None,
    }
  }

  pub fn kind(&self) -> NodeKind {
    match self {
      BacklogNode::Area { .. } => NodeKind::Area,
      BacklogNode::Epic { .. } => NodeKind::Epic,
      BacklogNode::Feature { .. } => NodeKind::Feature,
      BacklogNode::Story { .. } => NodeKind::Story,
      BacklogNode::Bug { .. } => NodeKind::Bug,
      BacklogNode::LoadMore { .. } => NodeKind::LoadMore,
    }
  }

  pub fn work_item(&self) -> Option<&WorkItem> {
    match self {
      BacklogNode::Epic { item }
      | BacklogNode::Feature { item }
      | BacklogNode::Story { item }
      | BacklogNode::Bug { item } => Some(item),
      _ => None,
    }
  }

  /// Whether expanding this node can yield children.
  pub fn is_expandable(&self) -> bool {
    matches!(
      self.kind(),
      NodeKind::Area | NodeKind::Epic | NodeKind::Feature
    )
  }

  /// Whether an item of `child` kind may be dropped onto this node.
  pub fn accepts_drop(&self, child: NodeKind) -> bool {
    matches!(
      (self.kind(), child),
      (NodeKind::Area, NodeKind::Epic)
        | (NodeKind::Epic, NodeKind::Feature)
        | (NodeKind::Feature, NodeKind::Story)
        | (NodeKind::Feature, NodeKind::Bug)
    )
  }

  /// Display glyph for the node kind.
  pub fn icon(&self) -> &'static str {
    match self.kind() {
      NodeKind::Area => "🗂",
      NodeKind::Epic => "👑",
      NodeKind::Feature => "🏆",
      NodeKind::Story => "📖",
      NodeKind::Bug => "🐞",
      NodeKind::LoadMore => "⋯",
    }
  }

  /// Pagination identity of the parent: per id and per node kind, so an
  /// epic's disclosure count never collides with a feature's. The service
  /// appends the active filter descriptor before tracking counts, giving
  /// each filtered data set its own counter.
  pub fn pagination_key(&self) -> Option<String> {
    match self {
      BacklogNode::Area { path } => Some(format!("area_{}", path)),
      BacklogNode::Epic { item } => Some(format!("epic_{}", item.id)),
      BacklogNode::Feature { item } => Some(format!("feature_{}", item.id)),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(id: i32, wit: &str) -> WorkItem {
    WorkItem {
      id,
      wit: wit.to_string(),
      state: "New".into(),
      title: format!("Item {}", id),
      area_path: "ProjA".into(),
      iteration_path: "ProjA".into(),
      assigned_to: None,
      tags: Vec::new(),
      description: None,
      acceptance_criteria: None,
      story_points: None,
      custom: Default::default(),
    }
  }

  #[test]
  fn test_from_item_maps_backlog_types() {
    assert_eq!(
      BacklogNode::from_item(item(1, "Epic")).unwrap().kind(),
      NodeKind::Epic
    );
    assert_eq!(
      BacklogNode::from_item(item(2, "User Story")).unwrap().kind(),
      NodeKind::Story
    );
    assert!(BacklogNode::from_item(item(3, "Test Case")).is_none());
  }

  #[test]
  fn test_leaves_are_not_expandable() {
    assert!(!BacklogNode::from_item(item(1, "Bug")).unwrap().is_expandable());
    assert!(BacklogNode::from_item(item(2, "Feature")).unwrap().is_expandable());
  }

  #[test]
  fn test_drop_targets_follow_the_hierarchy() {
    let feature = BacklogNode::from_item(item(1, "Feature")).unwrap();
    assert!(feature.accepts_drop(NodeKind::Story));
    assert!(feature.accepts_drop(NodeKind::Bug));
    assert!(!feature.accepts_drop(NodeKind::Epic));

    let area = BacklogNode::Area {
      path: "ProjA".into(),
    };
    assert!(area.accepts_drop(NodeKind::Epic));
    assert!(!area.accepts_drop(NodeKind::Story));
  }

  #[test]
  fn test_pagination_keys_differ_by_kind() {
    let epic = BacklogNode::from_item(item(9, "Epic")).unwrap();
    let feature = BacklogNode::from_item(item(9, "Feature")).unwrap();
    assert_ne!(epic.pagination_key(), feature.pagination_key());
    assert!(BacklogNode::LoadMore {
      parent_key: "epic_9".into(),
      remaining: 3
    }
    .pagination_key()
    .is_none());
  }
}
