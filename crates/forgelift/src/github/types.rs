//! Typed request/response structures for the GitHub-flavored API.

use serde::Deserialize;

/// Envelope of every GraphQL response.
#[derive(Debug, Deserialize)]
pub struct GraphResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorEntry {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrganizationData {
    pub organization: NodeId,
}

#[derive(Debug, Deserialize)]
pub struct NodeId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMigrationSourceData {
    #[serde(rename = "createMigrationSource")]
    pub create_migration_source: MigrationSourcePayload,
}

#[derive(Debug, Deserialize)]
pub struct MigrationSourcePayload {
    #[serde(rename = "migrationSource")]
    pub migration_source: NodeId,
}

#[derive(Debug, Deserialize)]
pub struct MigrationSourcesData {
    pub organization: MigrationSourcesOrg,
}

#[derive(Debug, Deserialize)]
pub struct MigrationSourcesOrg {
    #[serde(rename = "migrationSources")]
    pub migration_sources: MigrationSourceNodes,
}

#[derive(Debug, Deserialize)]
pub struct MigrationSourceNodes {
    pub nodes: Vec<MigrationSourceNode>,
}

#[derive(Debug, Deserialize)]
pub struct MigrationSourceNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct StartMigrationData {
    #[serde(rename = "startRepositoryMigration")]
    pub start_repository_migration: StartMigrationPayload,
}

#[derive(Debug, Deserialize)]
pub struct StartMigrationPayload {
    #[serde(rename = "repositoryMigration")]
    pub repository_migration: MigrationNode,
}

#[derive(Debug, Deserialize)]
pub struct MigrationNodeData {
    pub node: Option<MigrationNode>,
}

/// One `RepositoryMigration` node as reported by the target platform.
#[derive(Debug, Deserialize)]
pub struct MigrationNode {
    pub id: String,
    pub state: String,
    #[serde(rename = "failureReason")]
    pub failure_reason: Option<String>,
}

/// REST representation of an archive generation job.
#[derive(Debug, Deserialize)]
pub struct RestMigration {
    pub id: u64,
    pub state: String,
}

/// REST repository listing entry. Only the fields the engine consumes.
#[derive(Debug, Deserialize)]
pub struct RestRepo {
    pub name: String,
    pub clone_url: Option<String>,
    pub html_url: Option<String>,
}

/// Arguments for starting a repository migration on the target org.
#[derive(Debug, Clone)]
pub struct StartMigrationArgs {
    pub source_id: String,
    pub owner_id: String,
    pub source_repository_url: String,
    pub repository_name: String,
    pub git_archive_url: Option<String>,
    pub metadata_archive_url: Option<String>,
    pub access_token: Option<String>,
    pub skip_releases: bool,
    pub lock_source: bool,
    pub target_repo_visibility: Option<String>,
}
