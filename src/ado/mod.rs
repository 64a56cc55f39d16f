//! Azure DevOps integration: domain types, wire types, and the REST client.

pub mod api_types;
pub mod client;
pub mod types;

pub use client::AdoClient;
