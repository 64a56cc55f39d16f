//! The backlog service: the surface the presentation layer talks to.
//!
//! Owns the single cache, pagination tracker, and filter state instances
//! and passes them to the components that need them. Read operations
//! degrade to empty results while unconfigured; mutations resolve only
//! after both the remote call and the matching cache invalidation, so a
//! refresh fired right afterwards observes fresh data.

use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ado::types::{
  field, join_tags, PatchOp, Relation, TeamMember, WorkItem, WorkItemTypeInfo, BACKLOG_TYPES,
  HIERARCHY_REVERSE,
};
use crate::ado::AdoClient;
use crate::cache::{CachePayload, Scope, TtlCache};
use crate::config::Config;
use crate::debounce::{Debouncer, DEBOUNCE_QUIET_PERIOD};
use crate::filter::{FilterState, FilterUpdate};
use crate::hierarchy::HierarchyFetcher;
use crate::invalidate::{Mutation, MutationInvalidator};
use crate::node::BacklogNode;
use crate::pagination::PaginationTracker;

/// Notification to the presentation collaborator that the visible tree
/// should be re-requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshEvent {
  Refresh,
}

/// Field changes for a partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct FieldChanges {
  pub title: Option<String>,
  pub state: Option<String>,
  pub iteration_path: Option<String>,
  /// Unique name of the new assignee.
  pub assigned_to: Option<String>,
  pub description: Option<String>,
  pub acceptance_criteria: Option<String>,
  pub story_points: Option<f64>,
  /// The complete desired tag set. Always patched as a full replace;
  /// anything else resurrects previously removed tags.
  pub tags: Option<Vec<String>>,
  /// Custom field values keyed by reference name.
  pub custom: BTreeMap<String, serde_json::Value>,
}

impl FieldChanges {
  pub fn into_patch_ops(self) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    if let Some(title) = self.title {
      ops.push(PatchOp::add(field_path(field::TITLE), json!(title)));
    }
    if let Some(state) = self.state {
      ops.push(PatchOp::add(field_path(field::STATE), json!(state)));
    }
    if let Some(iteration) = self.iteration_path {
      ops.push(PatchOp::add(field_path(field::ITERATION_PATH), json!(iteration)));
    }
    if let Some(assignee) = self.assigned_to {
      ops.push(PatchOp::add(field_path(field::ASSIGNED_TO), json!(assignee)));
    }
    if let Some(description) = self.description {
      ops.push(PatchOp::add(field_path(field::DESCRIPTION), json!(description)));
    }
    if let Some(criteria) = self.acceptance_criteria {
      ops.push(PatchOp::add(
        field_path(field::ACCEPTANCE_CRITERIA),
        json!(criteria),
      ));
    }
    if let Some(points) = self.story_points {
      ops.push(PatchOp::add(field_path(field::STORY_POINTS), json!(points)));
    }
    if let Some(tags) = self.tags {
      ops.push(PatchOp::replace(
        field_path(field::TAGS),
        json!(join_tags(&tags)),
      ));
    }
    for (name, value) in self.custom {
      ops.push(PatchOp::add(field_path(&name), value));
    }
    ops
  }
}

/// Payload for a create operation.
#[derive(Debug, Clone)]
pub struct NewWorkItem {
  pub wit: String,
  pub title: String,
  pub area_path: Option<String>,
  pub parent_id: Option<i32>,
  pub description: Option<String>,
}

/// Where a reparented item should end up.
#[derive(Debug, Clone)]
pub enum ReparentTarget {
  /// Link under a new parent item.
  Parent(i32),
  /// Top-level move: change the area path instead.
  Area(String),
}

/// [`ReparentTarget`] with the parent id resolved to its relation URL.
enum ReparentLink {
  Parent { url: String },
  Area { path: String },
}

struct Remote {
  client: AdoClient,
  fetcher: HierarchyFetcher,
}

/// Cache-and-query layer over the remote tracking API.
pub struct BacklogService {
  cache: Arc<TtlCache<CachePayload>>,
  pagination: Arc<PaginationTracker>,
  filters: Mutex<FilterState>,
  invalidator: MutationInvalidator,
  debouncer: Arc<Debouncer>,
  refresh_tx: mpsc::UnboundedSender<RefreshEvent>,
  area_paths: Vec<String>,
  remote: Option<Remote>,
}

impl BacklogService {
  /// Build the service plus the refresh-event receiver the presentation
  /// layer listens on. A missing or incomplete configuration is not an
  /// error: the service comes up unconfigured and serves empty results.
  pub fn new(config: Option<Config>) -> (Self, mpsc::UnboundedReceiver<RefreshEvent>) {
    let cache = Arc::new(TtlCache::new());
    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

    let mut service = Self {
      pagination: Arc::new(PaginationTracker::new()),
      filters: Mutex::new(FilterState::default()),
      invalidator: MutationInvalidator::new(Arc::clone(&cache)),
      debouncer: Arc::new(Debouncer::new(DEBOUNCE_QUIET_PERIOD)),
      refresh_tx,
      area_paths: Vec::new(),
      remote: None,
      cache,
    };
    service.install_config(config);
    (service, refresh_rx)
  }

  /// Swap in a new configuration (organization, project, token, fields).
  /// Everything derived from the old endpoint is stale, so the whole
  /// cache is dropped.
  pub fn apply_config(&mut self, config: Option<Config>) {
    self.install_config(config);
    self.invalidator.on_config_change();
    self.send_refresh();
  }

  fn install_config(&mut self, config: Option<Config>) {
    self.area_paths = config
      .as_ref()
      .map(|c| c.area_paths.clone())
      .unwrap_or_default();
    self.remote = config.and_then(|c| match AdoClient::new(&c) {
      Ok(client) => {
        let fetcher = HierarchyFetcher::new(client.clone(), Arc::clone(&self.cache));
        Some(Remote { client, fetcher })
      }
      Err(err) => {
        warn!(%err, "Azure DevOps client unavailable; browsing with empty results");
        None
      }
    });
  }

  /// Root nodes: one per configured area path.
  pub fn roots(&self) -> Vec<BacklogNode> {
    self
      .area_paths
      .iter()
      .map(|path| BacklogNode::Area { path: path.clone() })
      .collect()
  }

  /// Ordered children for a node: work items under the active filters,
  /// sliced to the revealed count, plus at most one trailing load-more
  /// sentinel. Unconfigured service yields empty lists.
  pub async fn get_children(&self, node: &BacklogNode) -> Result<Vec<BacklogNode>> {
    let Some(remote) = &self.remote else {
      return Ok(Vec::new());
    };
    let Some(parent_key) = node.pagination_key() else {
      return Ok(Vec::new());
    };

    let filters = self.filters.lock().expect("filter lock poisoned").clone();
    // Disclosure counts are kept per data set, not per parent: a filter
    // change starts from a fresh first page, and the counters advanced
    // under the previous filters sit orphaned until they reapply.
    let page_key = format!("{}_{}", parent_key, filters.key_suffix());
    let items = remote.fetcher.fetch_children(node, &filters).await?;
    let (visible, remaining) = self.pagination.slice(&page_key, &items);

    let mut nodes: Vec<BacklogNode> = visible
      .into_iter()
      .filter_map(BacklogNode::from_item)
      .collect();
    if remaining > 0 {
      nodes.push(BacklogNode::LoadMore {
        parent_key: page_key,
        remaining,
      });
    }
    Ok(nodes)
  }

  /// Update one filter dimension and schedule a debounced refresh.
  pub fn set_filter(&self, update: FilterUpdate) {
    self
      .filters
      .lock()
      .expect("filter lock poisoned")
      .apply(update);
    self.schedule_debounced_refresh();
  }

  /// Reset all filter dimensions and schedule a debounced refresh.
  pub fn clear_filters(&self) {
    self.filters.lock().expect("filter lock poisoned").clear();
    self.schedule_debounced_refresh();
  }

  /// Snapshot of the active filters.
  pub fn filters(&self) -> FilterState {
    self.filters.lock().expect("filter lock poisoned").clone()
  }

  /// Human-readable summary of the active filters.
  pub fn describe_filters(&self) -> String {
    self.filters.lock().expect("filter lock poisoned").describe()
  }

  /// Disclose one more page under a parent key and refresh immediately
  /// (no debounce: this is a deliberate click, not typing).
  pub fn load_more(&self, parent_key: &str) {
    self.pagination.advance(parent_key);
    self.send_refresh();
  }

  /// Debounced, cache-preserving refresh.
  pub fn refresh(&self) {
    self.schedule_debounced_refresh();
  }

  /// Immediate refresh that guarantees fresh data: drops the whole cache
  /// first, bypassing both the debounce and any unexpired TTLs.
  pub fn refresh_now(&self) {
    self.cache.clear();
    self.send_refresh();
  }

  /// Create a work item, optionally linked under a parent.
  pub async fn create_item(&self, new: NewWorkItem) -> Result<WorkItem> {
    let remote = self.configured()?;
    let parent_url = new
      .parent_id
      .map(|id| remote.client.item_url(id))
      .transpose()?;
    let ops = create_ops(&new, parent_url);
    let created = remote.client.create_item(&new.wit, &ops).await?;
    self.invalidator.invalidate(Mutation::Create {
      parent_id: new.parent_id,
    });
    debug!(id = created.id, wit = %created.wit, "created work item");
    Ok(created)
  }

  /// Apply a partial field patch.
  pub async fn update_item(&self, id: i32, changes: FieldChanges) -> Result<WorkItem> {
    let remote = self.configured()?;
    let ops = changes.into_patch_ops();
    if ops.is_empty() {
      return Err(eyre!("No field changes to apply to work item {}", id));
    }
    let updated = remote.client.update_item(id, &ops).await?;
    self.invalidator.invalidate(Mutation::Update { id });
    Ok(updated)
  }

  pub async fn delete_item(&self, id: i32) -> Result<()> {
    let remote = self.configured()?;
    remote.client.delete_item(id).await?;
    self.invalidator.invalidate(Mutation::Delete { id });
    Ok(())
  }

  /// Move an item under a new parent (or to a new area path for top-level
  /// items): unlink, then relink.
  pub async fn reparent(&self, id: i32, target: ReparentTarget) -> Result<()> {
    let remote = self.configured()?;
    let link = match target {
      ReparentTarget::Parent(parent_id) => ReparentLink::Parent {
        url: remote.client.item_url(parent_id)?,
      },
      ReparentTarget::Area(path) => ReparentLink::Area { path },
    };

    // Relation removal is by index, and the index is only knowable from
    // the remote's current relation list; a stale or absent copy here
    // would unlink the wrong relation.
    let relations = remote.client.get_item_relations(id).await?;
    remote
      .client
      .update_item(id, &reparent_ops(&relations, link))
      .await?;
    self.invalidator.invalidate(Mutation::Reparent { id });
    Ok(())
  }

  /// Team membership, cached under its own key (item mutations leave it
  /// warm). Empty while unconfigured.
  pub async fn team_members(&self) -> Result<Vec<TeamMember>> {
    let Some(remote) = &self.remote else {
      return Ok(Vec::new());
    };
    let key = Scope::AllTeamMembers.key(&FilterState::default());
    if let Some(members) = self.cache.get(&key).and_then(CachePayload::into_members) {
      return Ok(members);
    }
    let members = remote.client.team_members().await?;
    self.cache.set(&key, CachePayload::Members(members.clone()));
    Ok(members)
  }

  /// State and field metadata for the backlog types. A failure for one
  /// type is logged and skipped; the remaining types still come back.
  pub async fn field_catalog(&self) -> Result<Vec<WorkItemTypeInfo>> {
    let Some(remote) = &self.remote else {
      return Ok(Vec::new());
    };
    let no_filters = FilterState::default();
    let mut catalog = Vec::new();
    for wit in BACKLOG_TYPES {
      let key = Scope::WitFields {
        wit: wit.to_string(),
      }
      .key(&no_filters);
      if let Some(info) = self.cache.get(&key).and_then(CachePayload::into_type_info) {
        catalog.push(info);
        continue;
      }
      match remote.client.type_info(wit).await {
        Ok(info) => {
          self.cache.set(&key, CachePayload::TypeInfo(info.clone()));
          catalog.push(info);
        }
        Err(err) => warn!(wit, %err, "skipping type metadata"),
      }
    }
    Ok(catalog)
  }

  fn configured(&self) -> Result<&Remote> {
    self
      .remote
      .as_ref()
      .ok_or_else(|| eyre!("Azure DevOps is not configured; set the endpoint and token first"))
  }

  fn schedule_debounced_refresh(&self) {
    let tx = self.refresh_tx.clone();
    self.debouncer.arm(move || {
      let _ = tx.send(RefreshEvent::Refresh);
    });
  }

  fn send_refresh(&self) {
    let _ = self.refresh_tx.send(RefreshEvent::Refresh);
  }

  #[cfg(test)]
  fn cache(&self) -> &Arc<TtlCache<CachePayload>> {
    &self.cache
  }
}

fn field_path(reference_name: &str) -> String {
  format!("/fields/{}", reference_name)
}

fn create_ops(new: &NewWorkItem, parent_url: Option<String>) -> Vec<PatchOp> {
  let mut ops = vec![PatchOp::add(field_path(field::TITLE), json!(new.title))];
  if let Some(area) = &new.area_path {
    ops.push(PatchOp::add(field_path(field::AREA_PATH), json!(area)));
  }
  if let Some(description) = &new.description {
    ops.push(PatchOp::add(field_path(field::DESCRIPTION), json!(description)));
  }
  if let Some(url) = parent_url {
    ops.push(PatchOp::add(
      "/relations/-",
      json!({ "rel": HIERARCHY_REVERSE, "url": url }),
    ));
  }
  ops
}

fn reparent_ops(relations: &[Relation], link: ReparentLink) -> Vec<PatchOp> {
  let mut ops = Vec::new();
  if let Some(idx) = relations.iter().position(|r| r.rel == HIERARCHY_REVERSE) {
    ops.push(PatchOp::remove(format!("/relations/{}", idx)));
  }
  match link {
    ReparentLink::Parent { url } => ops.push(PatchOp::add(
      "/relations/-",
      json!({ "rel": HIERARCHY_REVERSE, "url": url }),
    )),
    ReparentLink::Area { path } => {
      ops.push(PatchOp::add(field_path(field::AREA_PATH), json!(path)))
    }
  }
  ops
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tags_patch_is_a_full_replace() {
    let changes = FieldChanges {
      tags: Some(vec!["a".into()]),
      ..Default::default()
    };
    let ops = changes.into_patch_ops();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].op, "replace");
    assert_eq!(ops[0].path, "/fields/System.Tags");
    // The value is the complete desired set, so a removed tag ("b")
    // cannot reappear on save.
    assert_eq!(ops[0].value, json!("a"));
  }

  #[test]
  fn test_field_changes_map_to_field_paths() {
    let changes = FieldChanges {
      title: Some("New title".into()),
      story_points: Some(8.0),
      ..Default::default()
    };
    let ops = changes.into_patch_ops();
    let paths: Vec<&str> = ops.iter().map(|op| op.path.as_str()).collect();
    assert_eq!(
      paths,
      vec![
        "/fields/System.Title",
        "/fields/Microsoft.VSTS.Scheduling.StoryPoints"
      ]
    );
  }

  #[test]
  fn test_create_ops_link_parent_via_reverse_hierarchy() {
    let new = NewWorkItem {
      wit: "Feature".into(),
      title: "Child".into(),
      area_path: None,
      parent_id: Some(42),
      description: None,
    };
    let ops = create_ops(&new, Some("https://dev.azure.com/c/_apis/wit/workItems/42".into()));
    let relation = ops.last().unwrap();
    assert_eq!(relation.path, "/relations/-");
    assert_eq!(relation.value["rel"], HIERARCHY_REVERSE);
  }

  #[tokio::test]
  async fn test_unconfigured_reads_degrade_to_empty() {
    let (service, _rx) = BacklogService::new(None);
    assert!(service.roots().is_empty());
    let area = BacklogNode::Area {
      path: "ProjA".into(),
    };
    assert!(service.get_children(&area).await.unwrap().is_empty());
    assert!(service.team_members().await.unwrap().is_empty());
    assert!(service.field_catalog().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_unconfigured_mutations_error() {
    let (service, _rx) = BacklogService::new(None);
    let err = service.delete_item(1).await.unwrap_err();
    assert!(err.to_string().contains("not configured"));
  }

  #[tokio::test]
  async fn test_load_more_refreshes_immediately() {
    let (service, mut rx) = BacklogService::new(None);
    service.load_more("epic_1");
    assert_eq!(rx.try_recv().unwrap(), RefreshEvent::Refresh);
  }

  #[tokio::test]
  async fn test_refresh_now_clears_cache_and_fires_immediately() {
    let (service, mut rx) = BacklogService::new(None);
    service
      .cache()
      .set("epics_ProjA_nofilters", CachePayload::Items(Vec::new()));
    service.refresh_now();
    assert!(service.cache().is_empty());
    assert_eq!(rx.try_recv().unwrap(), RefreshEvent::Refresh);
  }

  #[tokio::test(start_paused = true)]
  async fn test_filter_edits_collapse_into_one_refresh() {
    let (service, mut rx) = BacklogService::new(None);
    service.set_filter(FilterUpdate::Search(Some("a".into())));
    service.set_filter(FilterUpdate::Search(Some("ab".into())));
    service.set_filter(FilterUpdate::Search(Some("abc".into())));
    assert!(rx.try_recv().is_err());

    tokio::time::sleep(DEBOUNCE_QUIET_PERIOD * 2).await;
    assert_eq!(rx.try_recv().unwrap(), RefreshEvent::Refresh);
    assert!(rx.try_recv().is_err());
    assert_eq!(service.filters().search_text.as_deref(), Some("abc"));
  }

  fn configured_service() -> BacklogService {
    std::env::set_var("ADOLENS_PAT", "test-pat");
    let config: Config = serde_yaml::from_str(
      r#"
devops:
  organization_url: "https://dev.azure.com/contoso"
  project: "ProjA"
area_paths:
  - "ProjA\\TeamX"
"#,
    )
    .unwrap();
    BacklogService::new(Some(config)).0
  }

  fn epics(count: i32) -> Vec<WorkItem> {
    (0..count)
      .map(|id| WorkItem {
        id,
        wit: "Epic".into(),
        state: "New".into(),
        title: format!("Epic {:03}", id),
        area_path: "ProjA\\TeamX".into(),
        iteration_path: "ProjA".into(),
        assigned_to: None,
        tags: Vec::new(),
        description: None,
        acceptance_criteria: None,
        story_points: None,
        custom: Default::default(),
      })
      .collect()
  }

  #[tokio::test]
  async fn test_get_children_slices_and_appends_one_sentinel() {
    let service = configured_service();
    service
      .cache()
      .set("epics_ProjA\\TeamX_nofilters", CachePayload::Items(epics(60)));

    let roots = service.roots();
    let area = &roots[0];
    let nodes = service.get_children(area).await.unwrap();
    assert_eq!(nodes.len(), 51);
    assert_eq!(
      nodes.last(),
      Some(&BacklogNode::LoadMore {
        parent_key: "area_ProjA\\TeamX_nofilters".into(),
        remaining: 10,
      })
    );

    service.load_more("area_ProjA\\TeamX_nofilters");
    let nodes = service.get_children(area).await.unwrap();
    assert_eq!(nodes.len(), 60);
    assert!(matches!(nodes.last(), Some(BacklogNode::Epic { .. })));
  }

  #[tokio::test]
  async fn test_filter_change_starts_from_a_fresh_first_page() {
    let service = configured_service();
    service
      .cache()
      .set("epics_ProjA\\TeamX_nofilters", CachePayload::Items(epics(150)));
    service.cache().set(
      r#"epics_ProjA\TeamX_{"tags":["urgent"]}"#,
      CachePayload::Items(epics(150)),
    );

    let roots = service.roots();
    let area = &roots[0];
    service.load_more("area_ProjA\\TeamX_nofilters");
    service.load_more("area_ProjA\\TeamX_nofilters");
    let nodes = service.get_children(area).await.unwrap();
    assert_eq!(nodes.len(), 150);

    // The counter advanced above belongs to the unfiltered data set; the
    // filtered view starts back at one page.
    service.set_filter(FilterUpdate::Tags(vec!["urgent".into()]));
    let nodes = service.get_children(area).await.unwrap();
    assert_eq!(nodes.len(), 51);
    assert_eq!(
      nodes.last(),
      Some(&BacklogNode::LoadMore {
        parent_key: r#"area_ProjA\TeamX_{"tags":["urgent"]}"#.into(),
        remaining: 100,
      })
    );

    // Clearing the filters reapplies the orphaned unfiltered counter.
    service.clear_filters();
    let nodes = service.get_children(area).await.unwrap();
    assert_eq!(nodes.len(), 150);
  }

  #[test]
  fn test_reparent_remove_index_comes_from_the_fetched_relations() {
    let relations = vec![
      Relation {
        rel: "System.LinkTypes.Related".into(),
        url: "https://dev.azure.com/c/_apis/wit/workItems/7".into(),
      },
      Relation {
        rel: "AttachedFile".into(),
        url: "https://dev.azure.com/c/_apis/wit/attachments/1".into(),
      },
      Relation {
        rel: HIERARCHY_REVERSE.into(),
        url: "https://dev.azure.com/c/_apis/wit/workItems/41".into(),
      },
    ];
    let ops = reparent_ops(
      &relations,
      ReparentLink::Parent {
        url: "https://dev.azure.com/c/_apis/wit/workItems/42".into(),
      },
    );
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].op, "remove");
    assert_eq!(ops[0].path, "/relations/2");
    assert_eq!(ops[1].path, "/relations/-");
    assert_eq!(
      ops[1].value["url"],
      "https://dev.azure.com/c/_apis/wit/workItems/42"
    );
  }

  #[test]
  fn test_reparent_without_a_parent_link_only_relinks() {
    let ops = reparent_ops(
      &[],
      ReparentLink::Area {
        path: "ProjA\\TeamY".into(),
      },
    );
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].op, "add");
    assert_eq!(ops[0].path, "/fields/System.AreaPath");
    assert_eq!(ops[0].value, json!("ProjA\\TeamY"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_refresh_is_debounced_and_cache_preserving() {
    let (service, mut rx) = BacklogService::new(None);
    service
      .cache()
      .set("epics_ProjA_nofilters", CachePayload::Items(Vec::new()));
    service.refresh();
    assert!(rx.try_recv().is_err());
    tokio::time::sleep(DEBOUNCE_QUIET_PERIOD * 2).await;
    assert_eq!(rx.try_recv().unwrap(), RefreshEvent::Refresh);
    assert_eq!(service.cache().len(), 1);
  }
}
