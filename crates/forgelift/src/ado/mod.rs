//! Azure DevOps: cloud-hosted source, PAT-bearer REST.

mod client;
mod types;

pub use client::AdoClient;
pub use types::{AdoProject, AdoRepo, ListResponse};
