//! Azure DevOps REST client: WIQL queries, batch gets, patch mutations,
//! type metadata, and team membership.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::wiql;

use super::api_types::{
  ApiCollection, ApiStateDef, ApiTeamMemberRow, ApiTypeField, ApiWorkItem, WiqlFlatResponse,
  WiqlLinkResponse, WiqlRelationRow,
};
use super::types::{FieldDef, PatchOp, Relation, TeamMember, WorkItem, WorkItemTypeInfo};

const API_VERSION: &str = "7.0";
/// Batch get accepts at most 200 ids per call.
const BATCH_GET_LIMIT: usize = 200;

/// Azure DevOps API client wrapper. Cheap to clone; concurrent in-flight
/// requests share one connection pool.
#[derive(Clone)]
pub struct AdoClient {
  http: reqwest::Client,
  organization: Url,
  project: String,
  team: String,
  pat: String,
  custom_fields: Vec<String>,
}

impl AdoClient {
  pub fn new(config: &Config) -> Result<Self> {
    let pat = Config::get_pat()?;
    let organization = Url::parse(&config.devops.organization_url)
      .map_err(|e| eyre!("Invalid organization URL {}: {}", config.devops.organization_url, e))?;

    Ok(Self {
      http: reqwest::Client::new(),
      organization,
      project: config.devops.project.clone(),
      team: config.team_name(),
      pat,
      custom_fields: config.custom_field_names(),
    })
  }

  /// Run a flat WIQL query, returning matching ids in result order.
  pub async fn run_flat_query(&self, query: &str) -> Result<Vec<i32>> {
    debug!(query, "running flat WIQL query");
    let url = self.project_api_url(&["wit", "wiql"])?;
    let response: WiqlFlatResponse = self.post_json(url, &json!({ "query": query })).await?;
    Ok(response.work_items.iter().map(|r| r.id).collect())
  }

  /// Run a link-typed WIQL query, returning the raw relation rows
  /// (source row first, see [`wiql::child_ids`]).
  pub async fn run_link_query(&self, query: &str) -> Result<Vec<WiqlRelationRow>> {
    debug!(query, "running link WIQL query");
    let url = self.project_api_url(&["wit", "wiql"])?;
    let response: WiqlLinkResponse = self.post_json(url, &json!({ "query": query })).await?;
    Ok(response.work_item_relations)
  }

  /// Batch get full field payloads, preserving the requested id order.
  /// The projection covers the standard set plus configured custom fields.
  pub async fn get_items(&self, ids: &[i32]) -> Result<Vec<WorkItem>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let fields = wiql::projection(&self.custom_fields);
    let url = self.project_api_url(&["wit", "workitemsbatch"])?;

    let mut by_id: HashMap<i32, WorkItem> = HashMap::new();
    for chunk in ids.chunks(BATCH_GET_LIMIT) {
      let body = json!({ "ids": chunk, "fields": &fields });
      let response: ApiCollection<ApiWorkItem> = self.post_json(url.clone(), &body).await?;
      for api_item in response.value {
        let item = api_item.into_work_item(&self.custom_fields);
        by_id.insert(item.id, item);
      }
    }

    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
  }

  /// Fetch the current relation list for one item. Required before any
  /// remove-by-index relation patch; relation order is only knowable from
  /// the remote's current copy.
  pub async fn get_item_relations(&self, id: i32) -> Result<Vec<Relation>> {
    let mut url = self.project_api_url(&["wit", "workitems", &id.to_string()])?;
    url.query_pairs_mut().append_pair("$expand", "relations");
    let response = self
      .http
      .get(url)
      .basic_auth("", Some(&self.pat))
      .send()
      .await
      .map_err(|e| eyre!("Failed to get work item {}: {}", id, e))?;
    let api_item: ApiWorkItem = Self::parse_checked(response).await?;
    Ok(api_item.relations())
  }

  /// Create a work item of the given type from a patch document. The id is
  /// assigned by the remote system and returned on the created item.
  pub async fn create_item(&self, wit: &str, ops: &[PatchOp]) -> Result<WorkItem> {
    let url = self.project_api_url(&["wit", "workitems", &format!("${}", wit)])?;
    let response = self
      .http
      .post(url)
      .basic_auth("", Some(&self.pat))
      .header(CONTENT_TYPE, "application/json-patch+json")
      .body(serde_json::to_vec(ops)?)
      .send()
      .await
      .map_err(|e| eyre!("Failed to create {}: {}", wit, e))?;
    let api_item: ApiWorkItem = Self::parse_checked(response).await?;
    Ok(api_item.into_work_item(&self.custom_fields))
  }

  /// Apply a partial field patch to an existing item.
  pub async fn update_item(&self, id: i32, ops: &[PatchOp]) -> Result<WorkItem> {
    let url = self.project_api_url(&["wit", "workitems", &id.to_string()])?;
    let response = self
      .http
      .patch(url)
      .basic_auth("", Some(&self.pat))
      .header(CONTENT_TYPE, "application/json-patch+json")
      .body(serde_json::to_vec(ops)?)
      .send()
      .await
      .map_err(|e| eyre!("Failed to update work item {}: {}", id, e))?;
    let api_item: ApiWorkItem = Self::parse_checked(response).await?;
    Ok(api_item.into_work_item(&self.custom_fields))
  }

  pub async fn delete_item(&self, id: i32) -> Result<()> {
    let url = self.project_api_url(&["wit", "workitems", &id.to_string()])?;
    let response = self
      .http
      .delete(url)
      .basic_auth("", Some(&self.pat))
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete work item {}: {}", id, e))?;
    Self::check_status(response).await?;
    Ok(())
  }

  /// Valid states plus field definitions for one work item type.
  pub async fn type_info(&self, wit: &str) -> Result<WorkItemTypeInfo> {
    let states_url = self.project_api_url(&["wit", "workitemtypes", wit, "states"])?;
    let states: ApiCollection<ApiStateDef> = self.get_json(states_url).await?;

    let mut fields_url = self.project_api_url(&["wit", "workitemtypes", wit, "fields"])?;
    fields_url
      .query_pairs_mut()
      .append_pair("$expand", "allowedValues");
    let fields: ApiCollection<ApiTypeField> = self.get_json(fields_url).await?;

    Ok(WorkItemTypeInfo {
      name: wit.to_string(),
      states: states.value.into_iter().map(|s| s.name).collect(),
      fields: fields
        .value
        .into_iter()
        .map(|f| FieldDef {
          reference_name: f.reference_name,
          name: f.name,
          allowed_values: f
            .allowed_values
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
          always_required: f.always_required,
        })
        .collect(),
    })
  }

  /// Canonical URL of a work item, as used in relation links.
  pub fn item_url(&self, id: i32) -> Result<String> {
    let mut url = self.organization.clone();
    let id = id.to_string();
    {
      let mut path = url
        .path_segments_mut()
        .map_err(|_| eyre!("Organization URL cannot be a base: {}", self.organization))?;
      path.pop_if_empty().push(&self.project);
      path.extend(["_apis", "wit", "workItems", id.as_str()]);
    }
    Ok(url.to_string())
  }

  /// Members of the configured team.
  pub async fn team_members(&self) -> Result<Vec<TeamMember>> {
    let url = self.organization_api_url(&["projects", &self.project, "teams", &self.team, "members"])?;
    let response: ApiCollection<ApiTeamMemberRow> = self.get_json(url).await?;
    Ok(response.value.into_iter().map(TeamMember::from).collect())
  }

  fn project_api_url(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.organization.clone();
    {
      let mut path = url
        .path_segments_mut()
        .map_err(|_| eyre!("Organization URL cannot be a base: {}", self.organization))?;
      path.pop_if_empty().push(&self.project).push("_apis");
      for segment in segments {
        path.push(segment);
      }
    }
    url
      .query_pairs_mut()
      .append_pair("api-version", API_VERSION);
    Ok(url)
  }

  fn organization_api_url(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.organization.clone();
    {
      let mut path = url
        .path_segments_mut()
        .map_err(|_| eyre!("Organization URL cannot be a base: {}", self.organization))?;
      path.pop_if_empty().push("_apis");
      for segment in segments {
        path.push(segment);
      }
    }
    url
      .query_pairs_mut()
      .append_pair("api-version", API_VERSION);
    Ok(url)
  }

  async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
    let response = self
      .http
      .get(url)
      .basic_auth("", Some(&self.pat))
      .send()
      .await
      .map_err(|e| eyre!("Azure DevOps request failed: {}", e))?;
    Self::parse_checked(response).await
  }

  async fn post_json<T: serde::de::DeserializeOwned>(
    &self,
    url: Url,
    body: &serde_json::Value,
  ) -> Result<T> {
    let response = self
      .http
      .post(url)
      .basic_auth("", Some(&self.pat))
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("Azure DevOps request failed: {}", e))?;
    Self::parse_checked(response).await
  }

  async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(eyre!("Azure DevOps returned {}: {}", status, detail))
  }

  async fn parse_checked<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = Self::check_status(response).await?;
    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse Azure DevOps response: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(organization_url: &str) -> AdoClient {
    std::env::set_var("ADOLENS_PAT", "test-pat");
    let config: Config = serde_yaml::from_str(&format!(
      r#"
devops:
  organization_url: "{}"
  project: "ProjA"
"#,
      organization_url
    ))
    .unwrap();
    AdoClient::new(&config).unwrap()
  }

  #[test]
  fn test_item_url_joins_under_the_project() {
    let url = client("https://dev.azure.com/contoso").item_url(42).unwrap();
    assert_eq!(url, "https://dev.azure.com/contoso/ProjA/_apis/wit/workItems/42");
  }

  #[test]
  fn test_item_url_tolerates_a_trailing_slash() {
    let url = client("https://dev.azure.com/contoso/").item_url(42).unwrap();
    assert_eq!(url, "https://dev.azure.com/contoso/ProjA/_apis/wit/workItems/42");
  }

  #[test]
  fn test_item_url_rejects_a_non_base_url() {
    let err = client("mailto:dev@contoso.example").item_url(42).unwrap_err();
    assert!(err.to_string().contains("cannot be a base"));
  }
}
