//! WIQL query construction for the backlog hierarchy.
//!
//! All user-supplied literals are escaped before interpolation (WIQL string
//! literals double the quote character), and every result set is ordered by
//! title so the rendered tree is deterministic.

use crate::ado::api_types::WiqlRelationRow;
use crate::ado::types::{field, HIERARCHY_FORWARD};
use crate::filter::FilterState;

/// Escape a literal for interpolation into a WIQL string: `'` → `''`.
/// These literals come from free-text user input, so skipping this is a
/// query-injection-class bug.
pub fn escape(literal: &str) -> String {
  literal.replace('\'', "''")
}

/// Flat query: epics directly under an area path, honoring active filters.
pub fn epics_query(area_path: &str, filters: &FilterState) -> String {
  let mut conditions = vec![
    format!("[{}] = 'Epic'", field::WORK_ITEM_TYPE),
    format!("[{}] UNDER '{}'", field::AREA_PATH, escape(area_path)),
  ];
  conditions.extend(filter_conditions(filters, ""));
  format!(
    "SELECT [{}] FROM WorkItems WHERE {} ORDER BY [{}]",
    field::ID,
    conditions.join(" AND "),
    field::TITLE
  )
}

/// Link query: children of a parent, restricted to the given child types.
///
/// The MustContain result layout returns the source node as the first row;
/// callers must pass the rows through [`child_ids`] to drop it.
pub fn children_query(parent_id: i32, child_types: &[&str], filters: &FilterState) -> String {
  let type_list = child_types
    .iter()
    .map(|t| format!("'{}'", escape(t)))
    .collect::<Vec<_>>()
    .join(", ");
  let mut conditions = vec![
    format!("([Source].[{}] = {})", field::ID, parent_id),
    format!("([System.Links.LinkType] = '{}')", HIERARCHY_FORWARD),
    format!("([Target].[{}] IN ({}))", field::WORK_ITEM_TYPE, type_list),
  ];
  conditions.extend(
    filter_conditions(filters, "[Target].")
      .into_iter()
      .map(|c| format!("({})", c)),
  );
  format!(
    "SELECT [{}] FROM WorkItemLinks WHERE {} ORDER BY [{}] MODE (MustContain)",
    field::ID,
    conditions.join(" AND "),
    field::TITLE
  )
}

/// AND-combined conditions for the active filter dimensions. `qualifier`
/// is empty for flat queries, `"[Target]."` for link queries.
fn filter_conditions(filters: &FilterState, qualifier: &str) -> Vec<String> {
  let mut conditions = Vec::new();
  if let Some(text) = &filters.search_text {
    // Pure-digit input searches by id; anything else by title substring.
    // A purely numeric title is unreachable by title search under this
    // heuristic, which matches how the view has always behaved.
    if is_pure_digits(text) {
      conditions.push(format!("{}[{}] = {}", qualifier, field::ID, text));
    } else {
      conditions.push(format!(
        "{}[{}] CONTAINS '{}'",
        qualifier,
        field::TITLE,
        escape(text)
      ));
    }
  }
  if let Some(iteration) = &filters.iteration {
    conditions.push(format!(
      "{}[{}] UNDER '{}'",
      qualifier,
      field::ITERATION_PATH,
      escape(iteration)
    ));
  }
  if let Some(tags) = &filters.tags {
    // Each tag is its own CONTAINS predicate: the item must carry all of
    // them, not match the set exactly.
    for tag in tags {
      conditions.push(format!(
        "{}[{}] CONTAINS '{}'",
        qualifier,
        field::TAGS,
        escape(tag)
      ));
    }
  }
  if let Some(assignee) = &filters.assigned_to {
    conditions.push(format!(
      "{}[{}] CONTAINS '{}'",
      qualifier,
      field::ASSIGNED_TO,
      escape(assignee)
    ));
  }
  conditions
}

fn is_pure_digits(text: &str) -> bool {
  !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// Field projection for the batch get: the fixed standard set plus the
/// configured custom field reference names. Anything the view displays
/// must appear here or it silently comes back absent.
pub fn projection(custom_fields: &[String]) -> Vec<String> {
  let mut fields: Vec<String> = [
    field::WORK_ITEM_TYPE,
    field::STATE,
    field::TITLE,
    field::AREA_PATH,
    field::ITERATION_PATH,
    field::ASSIGNED_TO,
    field::TAGS,
    field::DESCRIPTION,
    field::ACCEPTANCE_CRITERIA,
    field::STORY_POINTS,
  ]
  .iter()
  .map(|f| f.to_string())
  .collect();
  for name in custom_fields {
    if !fields.iter().any(|f| f == name) {
      fields.push(name.clone());
    }
  }
  fields
}

/// Extract child ids from a link-query result. The first row is the source
/// node itself and is skipped; a result of length ≤ 1 has no children.
pub fn child_ids(rows: &[WiqlRelationRow]) -> Vec<i32> {
  if rows.len() <= 1 {
    return Vec::new();
  }
  rows[1..]
    .iter()
    .filter_map(|row| row.target.map(|t| t.id))
    .collect()
}
