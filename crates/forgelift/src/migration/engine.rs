//! The per-repository migration state machine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::archive::{ArchiveExporter, ArchivePipeline, GenerationOptions};
use crate::github::{EnterpriseExporter, GitHubClient, StartMigrationArgs};
use crate::http::HttpTransport;
use crate::platform::{ApiError, ApiResult, ArchiveKind, JobState, RemoteJob};
use crate::redact::Redactor;
use crate::retry::{RetryPolicy, retry_on_result};
use crate::storage::{AzureBlobStore, BlobStore, GitHubNativeStore, S3BlobStore};

use super::descriptor::{ArchiveInput, MigrationDescriptor, MigrationSource};
use super::{MigrateError, MigrationOutcome, remediation};

/// Repository migrations routinely run for hours; poll every half minute
/// for up to twelve hours before handing the job id back to the caller.
const DEFAULT_MIGRATION_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MIGRATION_POLL_ATTEMPTS: u32 = 1440;

/// Drives repository migrations against one target organization's control
/// plane. Holds no per-migration state, so one engine can serve many
/// concurrent [`migrate_repository`](Self::migrate_repository) calls.
pub struct MigrationEngine {
    target: GitHubClient,
    transport: Arc<dyn HttpTransport>,
    redactor: Redactor,
    migration_poll: RetryPolicy,
    archive_poll: Option<RetryPolicy>,
    staging_dir: PathBuf,
}

impl MigrationEngine {
    /// `transport` is shared with every client and storage backend the
    /// engine constructs, so tests can drive the whole flow through a mock.
    pub fn new(target: GitHubClient, transport: Arc<dyn HttpTransport>, redactor: Redactor) -> Self {
        Self {
            target,
            transport,
            redactor,
            migration_poll: RetryPolicy::polling(
                DEFAULT_MIGRATION_POLL_INTERVAL,
                DEFAULT_MIGRATION_POLL_ATTEMPTS,
            ),
            archive_poll: None,
            staging_dir: std::env::temp_dir(),
        }
    }

    #[must_use]
    pub fn with_migration_poll(mut self, poll: RetryPolicy) -> Self {
        self.migration_poll = poll;
        self
    }

    #[must_use]
    pub fn with_archive_poll(mut self, poll: RetryPolicy) -> Self {
        self.archive_poll = Some(poll);
        self
    }

    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Migrate one repository according to its descriptor.
    ///
    /// Permission decoration happens here and only here: inner layers
    /// surface errors verbatim.
    pub async fn migrate_repository(
        &self,
        descriptor: &MigrationDescriptor,
    ) -> Result<MigrationOutcome, MigrateError> {
        self.run(descriptor).await.map_err(remediation::decorate)
    }

    /// Status of a previously queued migration, for the check-later workflow.
    pub async fn get_migration_status(&self, migration_id: &str) -> Result<RemoteJob, MigrateError> {
        self.target
            .migration_status(migration_id)
            .await
            .map_err(MigrateError::from)
            .map_err(remediation::decorate)
    }

    async fn run(&self, d: &MigrationDescriptor) -> Result<MigrationOutcome, MigrateError> {
        d.validate()?;

        if self.target.repo_exists(&d.target_org, &d.target_repo).await? {
            let reason = format!(
                "repository {}/{} already exists at the target",
                d.target_org, d.target_repo
            );
            tracing::warn!(org = %d.target_org, repo = %d.target_repo, "target exists, skipping migration");
            return Ok(MigrationOutcome::Skipped { reason });
        }

        let owner_id = self.target.org_id(&d.target_org).await?;
        let source_id = self.resolve_source_id(d, &owner_id).await?;
        let (git_archive_url, metadata_archive_url) = self.archive_urls(d).await?;

        let args = StartMigrationArgs {
            source_id,
            owner_id,
            source_repository_url: d.source.repo_url(&d.source_repo),
            repository_name: d.target_repo.clone(),
            git_archive_url,
            metadata_archive_url,
            access_token: d.source_token.clone(),
            skip_releases: d.flags.skip_releases,
            lock_source: d.flags.lock_source,
            target_repo_visibility: d.flags.visibility.clone(),
        };
        let migration_id = self.target.start_repository_migration(&args).await?;
        tracing::info!(
            migration_id = %migration_id,
            repo = %d.target_repo,
            "repository migration started"
        );

        if !d.flags.wait_for_completion {
            return Ok(MigrationOutcome::Queued { migration_id });
        }

        let job = retry_on_result(
            self.migration_poll,
            || self.target.migration_status(&migration_id),
            |job| !job.state.is_terminal(),
        )
        .await?;

        match job.state {
            JobState::Succeeded => {
                tracing::info!(migration_id = %migration_id, "migration succeeded");
                Ok(MigrationOutcome::Succeeded)
            }
            JobState::Failed => Ok(MigrationOutcome::Failed {
                reason: job
                    .failure_reason
                    .unwrap_or_else(|| "no failure reason reported".to_string()),
            }),
            JobState::Pending | JobState::Running => {
                tracing::warn!(
                    migration_id = %migration_id,
                    "migration still in progress after the polling budget"
                );
                Ok(MigrationOutcome::Queued { migration_id })
            }
        }
    }

    /// Register the migration source, falling back to a lookup when the
    /// platform rejects the name as already taken.
    async fn resolve_source_id(
        &self,
        d: &MigrationDescriptor,
        owner_id: &str,
    ) -> Result<String, MigrateError> {
        let name = d.source.source_name();
        let create = self
            .target
            .create_migration_source(
                &name,
                &d.source.instance_url(),
                owner_id,
                d.source.source_type(),
            )
            .await;

        match create {
            Ok(id) => Ok(id),
            Err(ApiError::Graph { message }) if message.contains("already") => {
                tracing::debug!(name = %name, "migration source already registered, reusing it");
                let existing = self
                    .target
                    .find_migration_source(&d.target_org, &name)
                    .await?;
                existing.ok_or(MigrateError::Api(ApiError::Graph { message }))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Produce the archive URLs the migration start call needs, if the
    /// source requires out-of-band archive transfer.
    async fn archive_urls(
        &self,
        d: &MigrationDescriptor,
    ) -> Result<(Option<String>, Option<String>), MigrateError> {
        match &d.source {
            MigrationSource::AzureDevOps { .. } => Ok((None, None)),
            MigrationSource::EnterpriseServer { api_url, org } => {
                // validate() guarantees the token is present.
                let token = d.source_token.as_deref().unwrap_or_default();
                let source = GitHubClient::new(
                    api_url,
                    token,
                    self.redactor.clone(),
                    None,
                    self.transport.clone(),
                );
                let exporter = EnterpriseExporter::new(source, org.clone());
                let pipeline = self.pipeline(Arc::new(exporter), self.storage_backend(d)?, d);

                let opts = GenerationOptions {
                    lock_source: d.flags.lock_source,
                    skip_releases: d.flags.skip_releases,
                };
                let (git, metadata) = tokio::try_join!(
                    pipeline.transfer(&d.source_repo, ArchiveKind::Git, &opts),
                    pipeline.transfer(&d.source_repo, ArchiveKind::Metadata, &opts),
                )?;
                Ok((Some(git), Some(metadata)))
            }
            MigrationSource::BitbucketServer { .. } => {
                let needs_upload = matches!(d.git_archive, Some(ArchiveInput::Path(_)))
                    || matches!(d.metadata_archive, Some(ArchiveInput::Path(_)));
                let pipeline = if needs_upload {
                    Some(self.pipeline(Arc::new(NoExporter), self.storage_backend(d)?, d))
                } else {
                    None
                };

                let git = self.supplied_url(d.git_archive.as_ref(), pipeline.as_ref()).await?;
                let metadata = self
                    .supplied_url(d.metadata_archive.as_ref(), pipeline.as_ref())
                    .await?;
                Ok((git, metadata))
            }
        }
    }

    async fn supplied_url(
        &self,
        input: Option<&ArchiveInput>,
        pipeline: Option<&ArchivePipeline>,
    ) -> Result<Option<String>, MigrateError> {
        match input {
            None => Ok(None),
            Some(ArchiveInput::Url(url)) => Ok(Some(url.clone())),
            Some(ArchiveInput::Path(path)) => match pipeline {
                Some(pipeline) => Ok(Some(pipeline.upload_local(path).await?)),
                // validate() requires a storage backend for local files.
                None => Err(MigrateError::Validation(
                    "local archive files require a storage backend to upload to".to_string(),
                )),
            },
        }
    }

    fn pipeline(
        &self,
        exporter: Arc<dyn ArchiveExporter>,
        store: Arc<dyn BlobStore>,
        d: &MigrationDescriptor,
    ) -> ArchivePipeline {
        let mut pipeline = ArchivePipeline::new(exporter, store, self.transport.clone())
            .with_staging_dir(&self.staging_dir)
            .with_retention(d.flags.retain_archives);
        if let Some(poll) = self.archive_poll {
            pipeline = pipeline.with_poll_policy(poll);
        }
        pipeline
    }

    fn storage_backend(&self, d: &MigrationDescriptor) -> Result<Arc<dyn BlobStore>, MigrateError> {
        if let Some(azure) = &d.storage.azure {
            return Ok(Arc::new(AzureBlobStore::new(
                &azure.account_url,
                &azure.sas_token,
                self.redactor.clone(),
                self.transport.clone(),
            )));
        }
        if let Some(s3) = &d.storage.s3 {
            return Ok(Arc::new(S3BlobStore::new(
                &s3.bucket,
                &s3.region,
                &s3.access_key,
                &s3.secret_key,
                self.redactor.clone(),
                self.transport.clone(),
            )));
        }
        if d.storage.github_native {
            return Ok(Arc::new(GitHubNativeStore::new(
                self.target.api_url(),
                &d.target_org,
                self.target.token(),
                self.redactor.clone(),
                self.transport.clone(),
            )));
        }
        Err(MigrateError::Validation(
            "archive transfer requires a storage backend".to_string(),
        ))
    }
}

/// Placeholder exporter for sources whose archives are supplied by the
/// operator. [`ArchivePipeline::upload_local`] never calls it.
struct NoExporter;

#[async_trait]
impl ArchiveExporter for NoExporter {
    async fn begin(
        &self,
        _repo: &str,
        _kind: ArchiveKind,
        _opts: &GenerationOptions,
    ) -> ApiResult<String> {
        Err(ApiError::decode("this source does not generate archives"))
    }

    async fn status(&self, _job_id: &str) -> ApiResult<RemoteJob> {
        Err(ApiError::decode("this source does not generate archives"))
    }

    async fn download_url(&self, _job_id: &str) -> ApiResult<String> {
        Err(ApiError::decode("this source does not generate archives"))
    }
}
