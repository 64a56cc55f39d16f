//! Serde-deserializable types matching Azure DevOps REST payloads.
//!
//! Wire types are kept separate from domain types so deserialization stays
//! mechanical and the domain structs stay focused on what the backlog view
//! needs.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::{field, split_tags, Identity, Relation, TeamMember, WorkItem};

/// Reference to a work item by id, as WIQL results return them.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WiqlRef {
  pub id: i32,
}

/// Response of a flat (`FROM WorkItems`) WIQL query.
#[derive(Debug, Deserialize)]
pub struct WiqlFlatResponse {
  #[serde(rename = "workItems", default)]
  pub work_items: Vec<WiqlRef>,
}

/// One row of a link-typed (`FROM WorkItemLinks`) WIQL result. The first
/// row carries the source node itself; subsequent rows its linked targets.
#[derive(Debug, Deserialize)]
pub struct WiqlRelationRow {
  #[serde(default)]
  pub rel: Option<String>,
  #[serde(default)]
  pub source: Option<WiqlRef>,
  #[serde(default)]
  pub target: Option<WiqlRef>,
}

/// Response of a link-typed WIQL query.
#[derive(Debug, Deserialize)]
pub struct WiqlLinkResponse {
  #[serde(rename = "workItemRelations", default)]
  pub work_item_relations: Vec<WiqlRelationRow>,
}

#[derive(Debug, Deserialize)]
pub struct ApiIdentity {
  #[serde(rename = "displayName", default)]
  pub display_name: String,
  #[serde(rename = "uniqueName", default)]
  pub unique_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiRelation {
  pub rel: String,
  pub url: String,
}

/// A work item as returned by the batch get / single get endpoints:
/// an id plus an open field map keyed by reference name.
#[derive(Debug, Deserialize)]
pub struct ApiWorkItem {
  pub id: i32,
  #[serde(default)]
  pub fields: BTreeMap<String, Value>,
  #[serde(default)]
  pub relations: Option<Vec<ApiRelation>>,
}

impl ApiWorkItem {
  /// Convert into the domain shape, pulling the configured custom fields
  /// out of the open field map. Unknown fields are dropped.
  pub fn into_work_item(mut self, custom_fields: &[String]) -> WorkItem {
    let assigned_to = self.fields.remove(field::ASSIGNED_TO).and_then(|v| {
      serde_json::from_value::<ApiIdentity>(v).ok().map(|id| Identity {
        display_name: id.display_name,
        unique_name: id.unique_name,
      })
    });
    let tags = self
      .fields
      .get(field::TAGS)
      .and_then(Value::as_str)
      .map(split_tags)
      .unwrap_or_default();
    let custom = custom_fields
      .iter()
      .filter_map(|name| self.fields.get(name).map(|v| (name.clone(), v.clone())))
      .collect();

    WorkItem {
      id: self.id,
      wit: take_string(&mut self.fields, field::WORK_ITEM_TYPE),
      state: take_string(&mut self.fields, field::STATE),
      title: take_string(&mut self.fields, field::TITLE),
      area_path: take_string(&mut self.fields, field::AREA_PATH),
      iteration_path: take_string(&mut self.fields, field::ITERATION_PATH),
      assigned_to,
      tags,
      description: take_opt_string(&mut self.fields, field::DESCRIPTION),
      acceptance_criteria: take_opt_string(&mut self.fields, field::ACCEPTANCE_CRITERIA),
      story_points: self.fields.get(field::STORY_POINTS).and_then(Value::as_f64),
      custom,
    }
  }

  pub fn relations(&self) -> Vec<Relation> {
    self
      .relations
      .as_deref()
      .unwrap_or_default()
      .iter()
      .map(|r| Relation {
        rel: r.rel.clone(),
        url: r.url.clone(),
      })
      .collect()
  }
}

fn take_string(fields: &mut BTreeMap<String, Value>, key: &str) -> String {
  take_opt_string(fields, key).unwrap_or_default()
}

fn take_opt_string(fields: &mut BTreeMap<String, Value>, key: &str) -> Option<String> {
  fields
    .remove(key)
    .and_then(|v| v.as_str().map(String::from))
}

/// Envelope used by batch get and most collection endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiCollection<T> {
  #[serde(default = "Vec::new")]
  pub value: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct ApiStateDef {
  pub name: String,
}

/// A field definition on a work item type.
#[derive(Debug, Deserialize)]
pub struct ApiTypeField {
  #[serde(rename = "referenceName")]
  pub reference_name: String,
  #[serde(default)]
  pub name: String,
  #[serde(rename = "alwaysRequired", default)]
  pub always_required: bool,
  #[serde(rename = "allowedValues", default)]
  pub allowed_values: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTeamMemberRow {
  pub identity: ApiTeamMemberIdentity,
}

#[derive(Debug, Deserialize)]
pub struct ApiTeamMemberIdentity {
  #[serde(default)]
  pub id: String,
  #[serde(rename = "displayName", default)]
  pub display_name: String,
  #[serde(rename = "uniqueName", default)]
  pub unique_name: String,
}

impl From<ApiTeamMemberRow> for TeamMember {
  fn from(row: ApiTeamMemberRow) -> Self {
    TeamMember {
      id: row.identity.id,
      display_name: row.identity.display_name,
      unique_name: row.identity.unique_name,
    }
  }
}
