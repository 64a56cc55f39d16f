//! Backlog filter state: four orthogonal, AND-combined dimensions.
//!
//! The canonical serialization of the active dimensions is part of every
//! filtered cache key, so two views with different filters can never be
//! served each other's cached results.

use serde::Serialize;

/// The four filter dimensions, AND-combined. `None` means "no constraint".
///
/// Field order is fixed (search, iteration, tags, assignedTo) because the
/// serialized form doubles as a cache-key component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterState {
  /// Free text; a pure-digit string is treated as an exact id match.
  #[serde(rename = "searchText", skip_serializing_if = "Option::is_none")]
  pub search_text: Option<String>,
  /// Iteration path constraint (item's iteration under this path).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub iteration: Option<String>,
  /// Item must carry *all* of these tags. Non-empty or absent.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
  /// Substring match on the assignee display name.
  #[serde(rename = "assignedTo", skip_serializing_if = "Option::is_none")]
  pub assigned_to: Option<String>,
}

/// A single filter edit, applied through [`FilterState::apply`].
#[derive(Debug, Clone)]
pub enum FilterUpdate {
  Search(Option<String>),
  Iteration(Option<String>),
  /// An empty vec clears the tag constraint.
  Tags(Vec<String>),
  AssignedTo(Option<String>),
}

impl FilterState {
  /// Apply one edit, normalizing blank strings and empty tag lists to
  /// "no constraint".
  pub fn apply(&mut self, update: FilterUpdate) {
    match update {
      FilterUpdate::Search(v) => self.search_text = normalize(v),
      FilterUpdate::Iteration(v) => self.iteration = normalize(v),
      FilterUpdate::Tags(tags) => {
        let tags: Vec<String> = tags
          .into_iter()
          .map(|t| t.trim().to_string())
          .filter(|t| !t.is_empty())
          .collect();
        self.tags = if tags.is_empty() { None } else { Some(tags) };
      }
      FilterUpdate::AssignedTo(v) => self.assigned_to = normalize(v),
    }
  }

  /// Reset all four dimensions at once.
  pub fn clear(&mut self) {
    *self = FilterState::default();
  }

  pub fn is_empty(&self) -> bool {
    self.search_text.is_none()
      && self.iteration.is_none()
      && self.tags.is_none()
      && self.assigned_to.is_none()
  }

  /// Cache-key suffix: `nofilters` when nothing is set, otherwise the
  /// compact JSON of the set dimensions in declaration order.
  pub fn key_suffix(&self) -> String {
    if self.is_empty() {
      "nofilters".to_string()
    } else {
      // FilterState only holds strings; serialization cannot fail, and a
      // fallback here would alias a filtered view with the unfiltered key.
      serde_json::to_string(self).expect("filter state serializes")
    }
  }

  /// Human-readable summary of the set dimensions, e.g.
  /// `Search: "foo" | Tags: bug, urgent`.
  pub fn describe(&self) -> String {
    let mut parts = Vec::new();
    if let Some(text) = &self.search_text {
      parts.push(format!("Search: \"{}\"", text));
    }
    if let Some(iteration) = &self.iteration {
      parts.push(format!("Iteration: {}", iteration));
    }
    if let Some(tags) = &self.tags {
      parts.push(format!("Tags: {}", tags.join(", ")));
    }
    if let Some(assignee) = &self.assigned_to {
      parts.push(format!("AssignedTo: {}", assignee));
    }
    parts.join(" | ")
  }
}

fn normalize(value: Option<String>) -> Option<String> {
  value.and_then(|v| {
    let v = v.trim().to_string();
    if v.is_empty() {
      None
    } else {
      Some(v)
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_state_has_nofilters_suffix() {
    assert_eq!(FilterState::default().key_suffix(), "nofilters");
  }

  #[test]
  fn test_blank_values_normalize_to_empty() {
    let mut filters = FilterState::default();
    filters.apply(FilterUpdate::Search(Some("   ".into())));
    filters.apply(FilterUpdate::Tags(vec!["".into(), "  ".into()]));
    assert!(filters.is_empty());
    assert_eq!(filters.key_suffix(), "nofilters");
  }

  #[test]
  fn test_suffix_is_deterministic_and_field_sensitive() {
    let mut a = FilterState::default();
    a.apply(FilterUpdate::Tags(vec!["urgent".into()]));
    let mut b = FilterState::default();
    b.apply(FilterUpdate::Tags(vec!["urgent".into()]));
    assert_eq!(a.key_suffix(), b.key_suffix());
    assert_eq!(a.key_suffix(), r#"{"tags":["urgent"]}"#);

    b.apply(FilterUpdate::Search(Some("login".into())));
    assert_ne!(a.key_suffix(), b.key_suffix());
  }

  #[test]
  fn test_set_dimensions_never_yield_the_unfiltered_suffix() {
    let mut filters = FilterState::default();
    filters.apply(FilterUpdate::AssignedTo(Some("ann".into())));
    assert_ne!(filters.key_suffix(), "nofilters");
  }

  #[test]
  fn test_clear_resets_all_dimensions() {
    let mut filters = FilterState {
      search_text: Some("foo".into()),
      iteration: Some("ProjA\\Sprint 1".into()),
      tags: Some(vec!["bug".into()]),
      assigned_to: Some("ann".into()),
    };
    filters.clear();
    assert!(filters.is_empty());
  }

  #[test]
  fn test_describe_joins_set_fields_in_fixed_order() {
    let mut filters = FilterState::default();
    filters.apply(FilterUpdate::Tags(vec!["bug".into(), "urgent".into()]));
    filters.apply(FilterUpdate::Search(Some("foo".into())));
    assert_eq!(filters.describe(), "Search: \"foo\" | Tags: bug, urgent");
  }
}
