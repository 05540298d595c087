//! GitHub-flavored platforms: the migration target and Enterprise Server
//! sources.

mod client;
mod pagination;
mod types;

pub use client::{DOTCOM_API_URL, EnterpriseExporter, GitHubClient, graphql_url_for};
pub use pagination::next_link;
pub use types::StartMigrationArgs;
