//! Three-level backlog fetch: area→epics, epic→features,
//! feature→{stories, bugs}.
//!
//! Every fetch is cache-first under a key derived from (scope, filters).
//! Small area results additionally schedule a detached pre-fetch of the
//! epics' children to warm the cache before the user expands a node.

use color_eyre::Result;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::ado::types::{WorkItem, WIT_BUG, WIT_FEATURE, WIT_USER_STORY};
use crate::ado::AdoClient;
use crate::cache::{CachePayload, Scope, TtlCache};
use crate::filter::FilterState;
use crate::node::BacklogNode;
use crate::wiql;

/// Area results at or below this size get their children pre-fetched.
pub const PREFETCH_EPIC_LIMIT: usize = 10;
/// Quiet delay before the background pre-fetch fires.
const PREFETCH_DELAY: Duration = Duration::from_millis(500);

/// Cache-aware fetcher for the backlog hierarchy. Cheap to clone; all
/// clones share the client pool and the cache.
#[derive(Clone)]
pub struct HierarchyFetcher {
  client: AdoClient,
  cache: Arc<TtlCache<CachePayload>>,
}

impl HierarchyFetcher {
  pub fn new(client: AdoClient, cache: Arc<TtlCache<CachePayload>>) -> Self {
    Self { client, cache }
  }

  /// Fetch the full (unpaginated) child list for a node under the active
  /// filters. Leaf nodes have no children.
  pub async fn fetch_children(
    &self,
    node: &BacklogNode,
    filters: &FilterState,
  ) -> Result<Vec<WorkItem>> {
    match node {
      BacklogNode::Area { path } => {
        let epics = self.epics(path, filters).await?;
        if should_prefetch(epics.len(), filters) {
          self.spawn_prefetch(epics.iter().map(|e| e.id).collect());
        }
        Ok(epics)
      }
      BacklogNode::Epic { item } => {
        self
          .children_of(item.id, &[WIT_FEATURE], filters)
          .await
      }
      BacklogNode::Feature { item } => {
        let children = self
          .children_of(item.id, &[WIT_USER_STORY, WIT_BUG], filters)
          .await?;
        Ok(stories_before_bugs(children))
      }
      _ => Ok(Vec::new()),
    }
  }

  /// Batch form: children for many parents at once, partitioned into
  /// already-cached vs. not, with the uncached fetches issued
  /// concurrently. Consults only the *unfiltered* cache key, so this path
  /// must not be used while filters are active.
  pub async fn fetch_many_children(
    &self,
    parent_ids: &[i32],
    child_types: &[&str],
  ) -> Result<HashMap<i32, Vec<WorkItem>>> {
    let no_filters = FilterState::default();
    let mut result = HashMap::new();
    let mut uncached = Vec::new();

    for &parent_id in parent_ids {
      let key = Scope::Children { parent_id }.key(&no_filters);
      match self.cache.get(&key).and_then(CachePayload::into_items) {
        Some(items) => {
          result.insert(parent_id, items);
        }
        None => uncached.push(parent_id),
      }
    }

    let fetched = try_join_all(
      uncached
        .iter()
        .map(|&parent_id| self.children_of(parent_id, child_types, &no_filters)),
    )
    .await?;
    for (parent_id, items) in uncached.into_iter().zip(fetched) {
      result.insert(parent_id, items);
    }

    Ok(result)
  }

  async fn epics(&self, area_path: &str, filters: &FilterState) -> Result<Vec<WorkItem>> {
    let key = Scope::Epics {
      area_path: area_path.to_string(),
    }
    .key(filters);
    if let Some(items) = self.cache.get(&key).and_then(CachePayload::into_items) {
      debug!(%key, "epics served from cache");
      return Ok(items);
    }

    let ids = self
      .client
      .run_flat_query(&wiql::epics_query(area_path, filters))
      .await?;
    let items = self.client.get_items(&ids).await?;
    // Stored under the same key the lookup used, so interleaved fetches
    // can never corrupt each other's entries.
    self.cache.set(&key, CachePayload::Items(items.clone()));
    Ok(items)
  }

  async fn children_of(
    &self,
    parent_id: i32,
    child_types: &[&str],
    filters: &FilterState,
  ) -> Result<Vec<WorkItem>> {
    let key = Scope::Children { parent_id }.key(filters);
    if let Some(items) = self.cache.get(&key).and_then(CachePayload::into_items) {
      debug!(%key, "children served from cache");
      return Ok(items);
    }

    let rows = self
      .client
      .run_link_query(&wiql::children_query(parent_id, child_types, filters))
      .await?;
    let ids = wiql::child_ids(&rows);
    let items = self.client.get_items(&ids).await?;
    self.cache.set(&key, CachePayload::Items(items.clone()));
    Ok(items)
  }

  /// Detached cache-warming task. Its result is discarded and any failure
  /// is logged and dropped at this boundary; it never shares an error
  /// channel with the primary fetch path.
  fn spawn_prefetch(&self, epic_ids: Vec<i32>) {
    let fetcher = self.clone();
    tokio::spawn(async move {
      tokio::time::sleep(PREFETCH_DELAY).await;
      match fetcher.fetch_many_children(&epic_ids, &[WIT_FEATURE]).await {
        Ok(children) => debug!(parents = children.len(), "pre-fetched epic children"),
        Err(err) => debug!(%err, "background children pre-fetch failed"),
      }
    });
  }
}

fn should_prefetch(epic_count: usize, filters: &FilterState) -> bool {
  // The batch path only understands unfiltered keys.
  filters.is_empty() && epic_count > 0 && epic_count <= PREFETCH_EPIC_LIMIT
}

/// Partition a feature's children client-side: stories first, then bugs,
/// each group keeping its query order.
fn stories_before_bugs(children: Vec<WorkItem>) -> Vec<WorkItem> {
  let (stories, rest): (Vec<_>, Vec<_>) = children
    .into_iter()
    .partition(|item| item.wit == WIT_USER_STORY);
  stories.into_iter().chain(rest).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::filter::FilterUpdate;

  fn item(id: i32, wit: &str, title: &str) -> WorkItem {
    WorkItem {
      id,
      wit: wit.to_string(),
      state: "New".into(),
      title: title.to_string(),
      area_path: "ProjA\\TeamX".into(),
      iteration_path: "ProjA".into(),
      assigned_to: None,
      tags: Vec::new(),
      description: None,
      acceptance_criteria: None,
      story_points: None,
      custom: Default::default(),
    }
  }

  fn fetcher_with_cache() -> (HierarchyFetcher, Arc<TtlCache<CachePayload>>) {
    std::env::set_var("ADOLENS_PAT", "test-pat");
    let config: Config = serde_yaml::from_str(
      r#"
devops:
  organization_url: "https://dev.azure.com/contoso"
  project: "ProjA"
"#,
    )
    .unwrap();
    let client = AdoClient::new(&config).unwrap();
    let cache = Arc::new(TtlCache::new());
    (HierarchyFetcher::new(client, Arc::clone(&cache)), cache)
  }

  #[test]
  fn test_stories_sort_before_bugs_preserving_order() {
    let ordered = stories_before_bugs(vec![
      item(1, WIT_BUG, "A broken thing"),
      item(2, WIT_USER_STORY, "B story"),
      item(3, WIT_BUG, "C broken thing"),
      item(4, WIT_USER_STORY, "D story"),
    ]);
    let ids: Vec<i32> = ordered.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![2, 4, 1, 3]);
  }

  #[test]
  fn test_prefetch_only_for_small_unfiltered_results() {
    let empty = FilterState::default();
    assert!(should_prefetch(3, &empty));
    assert!(should_prefetch(PREFETCH_EPIC_LIMIT, &empty));
    assert!(!should_prefetch(PREFETCH_EPIC_LIMIT + 1, &empty));
    assert!(!should_prefetch(0, &empty));

    let mut filtered = FilterState::default();
    filtered.apply(FilterUpdate::Tags(vec!["urgent".into()]));
    assert!(!should_prefetch(3, &filtered));
  }

  #[tokio::test]
  async fn test_warm_cache_serves_without_network() {
    let (fetcher, cache) = fetcher_with_cache();
    let area = BacklogNode::Area {
      path: "ProjA\\TeamX".into(),
    };
    let epics = vec![
      item(1, "Epic", "Alpha"),
      item(2, "Epic", "Beta"),
      item(3, "Epic", "Gamma"),
    ];
    cache.set(
      "epics_ProjA\\TeamX_nofilters",
      CachePayload::Items(epics.clone()),
    );

    // No remote endpoint exists; a cache miss would error out.
    let served = fetcher
      .fetch_children(&area, &FilterState::default())
      .await
      .unwrap();
    assert_eq!(served, epics);
  }

  #[tokio::test]
  async fn test_filter_change_misses_then_clearing_returns_to_warm_key() {
    let (fetcher, cache) = fetcher_with_cache();
    let epics = vec![item(1, "Epic", "Alpha")];
    cache.set(
      "epics_ProjA\\TeamX_nofilters",
      CachePayload::Items(epics.clone()),
    );

    let mut filters = FilterState::default();
    filters.apply(FilterUpdate::Tags(vec!["urgent".into()]));
    let filtered_key = Scope::Epics {
      area_path: "ProjA\\TeamX".into(),
    }
    .key(&filters);
    assert_eq!(filtered_key, r#"epics_ProjA\TeamX_{"tags":["urgent"]}"#);
    // The filtered view does not collide with the warm unfiltered entry.
    assert!(cache.get(&filtered_key).is_none());

    // Clearing filters serves the original cached epics, no remote call.
    filters.clear();
    let area = BacklogNode::Area {
      path: "ProjA\\TeamX".into(),
    };
    assert_eq!(fetcher.fetch_children(&area, &filters).await.unwrap(), epics);
  }

  #[tokio::test]
  async fn test_batch_fetch_serves_cached_parents_without_network() {
    let (fetcher, cache) = fetcher_with_cache();
    cache.set(
      "children_1_nofilters",
      CachePayload::Items(vec![item(10, "Feature", "F1")]),
    );
    cache.set(
      "children_2_nofilters",
      CachePayload::Items(vec![item(20, "Feature", "F2")]),
    );

    let children = fetcher
      .fetch_many_children(&[1, 2], &[WIT_FEATURE])
      .await
      .unwrap();
    assert_eq!(children[&1][0].id, 10);
    assert_eq!(children[&2][0].id, 20);
  }
}
