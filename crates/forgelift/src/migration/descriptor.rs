//! The input contract for one repository migration.
//!
//! The CLI layer assembles and hands over a [`MigrationDescriptor`]; the
//! engine validates it before touching the network.

use std::path::PathBuf;

use super::MigrateError;

/// Which platform the repository comes from, with instance coordinates.
#[derive(Debug, Clone)]
pub enum MigrationSource {
    /// Legacy on-prem GitHub-flavored instance. `api_url` is the REST root
    /// (usually `https://host/api/v3`).
    EnterpriseServer { api_url: String, org: String },
    /// Azure DevOps organization (`https://dev.azure.com/<org>`).
    AzureDevOps { org_url: String, project: String },
    /// Bitbucket Server instance base URL plus project key.
    BitbucketServer { base_url: String, project: String },
}

impl MigrationSource {
    /// Instance-level URL registered on the migration source object.
    #[must_use]
    pub fn instance_url(&self) -> String {
        match self {
            Self::EnterpriseServer { api_url, .. } => {
                let api_url = api_url.trim_end_matches('/');
                api_url
                    .strip_suffix("/api/v3")
                    .unwrap_or(api_url)
                    .to_string()
            }
            Self::AzureDevOps { org_url, .. } => org_url.trim_end_matches('/').to_string(),
            Self::BitbucketServer { base_url, .. } => base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Canonical URL of one repository on this source.
    #[must_use]
    pub fn repo_url(&self, repo: &str) -> String {
        let base = self.instance_url();
        match self {
            Self::EnterpriseServer { org, .. } => format!("{base}/{org}/{repo}"),
            Self::AzureDevOps { project, .. } => format!("{base}/{project}/_git/{repo}"),
            Self::BitbucketServer { project, .. } => {
                format!("{base}/projects/{project}/repos/{repo}")
            }
        }
    }

    /// Name under which the migration source is registered at the target,
    /// stable per source instance/org pair so re-runs reuse it.
    #[must_use]
    pub fn source_name(&self) -> String {
        match self {
            Self::EnterpriseServer { org, .. } => format!("ghes-{org}"),
            Self::AzureDevOps { project, .. } => format!("ado-{project}"),
            Self::BitbucketServer { project, .. } => format!("bitbucket-{project}"),
        }
    }

    /// Platform-defined migration source type literal.
    #[must_use]
    pub fn source_type(&self) -> &'static str {
        match self {
            Self::EnterpriseServer { .. } => "GITHUB_ARCHIVE",
            Self::AzureDevOps { .. } => "AZURE_DEVOPS",
            Self::BitbucketServer { .. } => "BITBUCKET_SERVER",
        }
    }

    /// Whether migrating from this source goes through archive transfer.
    #[must_use]
    pub fn uses_archives(&self) -> bool {
        !matches!(self, Self::AzureDevOps { .. })
    }
}

/// A pre-supplied archive: either a local file to upload or a URL the
/// target can already fetch.
#[derive(Debug, Clone)]
pub enum ArchiveInput {
    Path(PathBuf),
    Url(String),
}

/// Azure Blob Storage coordinates.
#[derive(Debug, Clone)]
pub struct AzureStorageConfig {
    pub account_url: String,
    pub sas_token: String,
}

/// S3 coordinates.
#[derive(Debug, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Which blob backend receives the archives. The backends are mutually
/// exclusive; selecting more than one is a validation error.
#[derive(Debug, Clone, Default)]
pub struct StorageSelection {
    pub azure: Option<AzureStorageConfig>,
    pub s3: Option<S3StorageConfig>,
    pub github_native: bool,
}

impl StorageSelection {
    #[must_use]
    pub fn selected_count(&self) -> usize {
        usize::from(self.azure.is_some())
            + usize::from(self.s3.is_some())
            + usize::from(self.github_native)
    }
}

/// Behavioral flags for one migration.
#[derive(Debug, Clone, Default)]
pub struct MigrationFlags {
    pub skip_releases: bool,
    pub lock_source: bool,
    /// Poll the migration to a terminal state instead of returning Queued.
    pub wait_for_completion: bool,
    /// Target repository visibility override (platform literal, e.g.
    /// "private" or "internal").
    pub visibility: Option<String>,
    /// Keep archive staging files and log their paths.
    pub retain_archives: bool,
}

#[derive(Debug, Clone)]
pub struct MigrationDescriptor {
    pub source: MigrationSource,
    /// Repository name/slug on the source.
    pub source_repo: String,
    /// Credential the target uses to pull from the source; also used for
    /// archive export on Enterprise Server sources.
    pub source_token: Option<String>,
    pub target_org: String,
    pub target_repo: String,
    pub storage: StorageSelection,
    pub git_archive: Option<ArchiveInput>,
    pub metadata_archive: Option<ArchiveInput>,
    pub flags: MigrationFlags,
}

impl MigrationDescriptor {
    /// Check the descriptor for self-contradictions. Runs before any
    /// network call; failures are never retried.
    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.source_repo.is_empty() || self.target_org.is_empty() || self.target_repo.is_empty()
        {
            return Err(MigrateError::Validation(
                "source repository, target organization and target repository are required"
                    .to_string(),
            ));
        }

        if self.storage.selected_count() > 1 {
            return Err(MigrateError::Validation(
                "storage backends are mutually exclusive, select exactly one".to_string(),
            ));
        }

        match &self.source {
            MigrationSource::EnterpriseServer { .. } => {
                if self.source_token.is_none() {
                    return Err(MigrateError::Validation(
                        "an Enterprise Server source requires a source token".to_string(),
                    ));
                }
                if self.git_archive.is_some() || self.metadata_archive.is_some() {
                    return Err(MigrateError::Validation(
                        "Enterprise Server sources export their own archives, remove the supplied archive inputs"
                            .to_string(),
                    ));
                }
                if self.storage.selected_count() == 0 {
                    return Err(MigrateError::Validation(
                        "archive transfer requires a storage backend".to_string(),
                    ));
                }
            }
            MigrationSource::BitbucketServer { .. } => {
                if self.git_archive.is_none() || self.metadata_archive.is_none() {
                    return Err(MigrateError::Validation(
                        "Bitbucket Server sources require both git and metadata archive inputs"
                            .to_string(),
                    ));
                }
                let needs_upload = matches!(self.git_archive, Some(ArchiveInput::Path(_)))
                    || matches!(self.metadata_archive, Some(ArchiveInput::Path(_)));
                if needs_upload && self.storage.selected_count() == 0 {
                    return Err(MigrateError::Validation(
                        "local archive files require a storage backend to upload to".to_string(),
                    ));
                }
            }
            MigrationSource::AzureDevOps { .. } => {
                if self.source_token.is_none() {
                    return Err(MigrateError::Validation(
                        "an Azure DevOps source requires a source token".to_string(),
                    ));
                }
                if self.git_archive.is_some() || self.metadata_archive.is_some() {
                    return Err(MigrateError::Validation(
                        "Azure DevOps migrations are direct and take no archive inputs".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ghes_descriptor() -> MigrationDescriptor {
        MigrationDescriptor {
            source: MigrationSource::EnterpriseServer {
                api_url: "https://ghes.example.com/api/v3".to_string(),
                org: "acme".to_string(),
            },
            source_repo: "widgets".to_string(),
            source_token: Some("source-token".to_string()),
            target_org: "acme-cloud".to_string(),
            target_repo: "widgets".to_string(),
            storage: StorageSelection {
                azure: Some(AzureStorageConfig {
                    account_url: "https://acmestore.blob.core.windows.net".to_string(),
                    sas_token: "sv=1&sig=x".to_string(),
                }),
                ..StorageSelection::default()
            },
            git_archive: None,
            metadata_archive: None,
            flags: MigrationFlags::default(),
        }
    }

    #[test]
    fn valid_descriptor_passes() {
        ghes_descriptor().validate().unwrap();
    }

    #[test]
    fn two_storage_backends_are_rejected() {
        let mut d = ghes_descriptor();
        d.storage.github_native = true;
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn enterprise_source_requires_storage() {
        let mut d = ghes_descriptor();
        d.storage = StorageSelection::default();
        assert!(d.validate().is_err());
    }

    #[test]
    fn bitbucket_source_requires_both_archives() {
        let mut d = ghes_descriptor();
        d.source = MigrationSource::BitbucketServer {
            base_url: "https://bitbucket.example.com".to_string(),
            project: "OPS".to_string(),
        };
        d.git_archive = Some(ArchiveInput::Url("https://blobs/x-git.tar.gz".to_string()));
        assert!(d.validate().is_err());

        d.metadata_archive = Some(ArchiveInput::Url(
            "https://blobs/x-metadata.tar.gz".to_string(),
        ));
        d.validate().unwrap();
    }

    #[test]
    fn bitbucket_url_archives_need_no_storage() {
        let mut d = ghes_descriptor();
        d.source = MigrationSource::BitbucketServer {
            base_url: "https://bitbucket.example.com".to_string(),
            project: "OPS".to_string(),
        };
        d.storage = StorageSelection::default();
        d.git_archive = Some(ArchiveInput::Url("https://blobs/x-git.tar.gz".to_string()));
        d.metadata_archive = Some(ArchiveInput::Url(
            "https://blobs/x-metadata.tar.gz".to_string(),
        ));
        d.validate().unwrap();

        d.git_archive = Some(ArchiveInput::Path("/tmp/x-git.tar.gz".into()));
        assert!(d.validate().is_err(), "local files need an upload target");
    }

    #[test]
    fn source_urls() {
        let ghes = MigrationSource::EnterpriseServer {
            api_url: "https://ghes.example.com/api/v3".to_string(),
            org: "acme".to_string(),
        };
        assert_eq!(ghes.instance_url(), "https://ghes.example.com");
        assert_eq!(ghes.repo_url("widgets"), "https://ghes.example.com/acme/widgets");

        let ado = MigrationSource::AzureDevOps {
            org_url: "https://dev.azure.com/acme".to_string(),
            project: "Ops".to_string(),
        };
        assert_eq!(ado.repo_url("tools"), "https://dev.azure.com/acme/Ops/_git/tools");
        assert!(!ado.uses_archives());

        let bb = MigrationSource::BitbucketServer {
            base_url: "https://bitbucket.example.com/".to_string(),
            project: "OPS".to_string(),
        };
        assert_eq!(
            bb.repo_url("tools"),
            "https://bitbucket.example.com/projects/OPS/repos/tools"
        );
    }
}
