//! adolens: a client-side cache-and-query layer for hierarchical Azure
//! DevOps backlogs (Epic → Feature → User Story / Bug).
//!
//! The core of the crate is a time-boxed, key-derived cache over the
//! remote WIQL query surface, combined with per-parent incremental
//! disclosure and explicit invalidation rules tied to mutations. The
//! presentation layer (tree rendering, dialogs, drag gestures) sits on
//! top of [`BacklogService`] and is out of scope here.

pub mod ado;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod filter;
pub mod hierarchy;
pub mod invalidate;
pub mod logging;
pub mod node;
pub mod pagination;
pub mod service;
pub mod wiql;

pub use ado::types::{TeamMember, WorkItem, WorkItemTypeInfo};
pub use ado::AdoClient;
pub use config::Config;
pub use filter::{FilterState, FilterUpdate};
pub use node::{BacklogNode, NodeKind};
pub use service::{
  BacklogService, FieldChanges, NewWorkItem, RefreshEvent, ReparentTarget,
};
