//! Archive export and transfer.
//!
//! A repository migrated through archives has two independent sides: the git
//! data archive and the metadata archive (issues, pull requests, releases).
//! [`ArchiveExporter`] abstracts the platform that generates them;
//! [`ArchivePipeline`] drives one side from generation request to an
//! authenticated URL the target platform can ingest.

mod pipeline;

pub use pipeline::ArchivePipeline;

use async_trait::async_trait;
use thiserror::Error;

use crate::platform::{ApiError, ApiResult, ArchiveKind, RemoteJob};
use crate::storage::StorageError;

/// Options applied when requesting archive generation on a source org.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOptions {
    pub lock_source: bool,
    pub skip_releases: bool,
}

/// Archive generation capability of a source platform.
#[async_trait]
pub trait ArchiveExporter: Send + Sync {
    /// Request generation of one archive side; returns the job id.
    async fn begin(
        &self,
        repo: &str,
        kind: ArchiveKind,
        opts: &GenerationOptions,
    ) -> ApiResult<String>;

    /// Current state of a generation job.
    async fn status(&self, job_id: &str) -> ApiResult<RemoteJob>;

    /// Fetch a (time-limited) download URL for a finished job.
    async fn download_url(&self, job_id: &str) -> ApiResult<String>;
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The source platform reported the generation job as failed. Not
    /// transient: the whole repository migration aborts.
    #[error("{kind} archive generation failed: {reason}")]
    GenerationFailed { kind: ArchiveKind, reason: String },

    /// The job was still not terminal after the polling budget.
    #[error("{kind} archive generation did not finish within the polling budget")]
    GenerationTimedOut { kind: ArchiveKind },

    /// The download kept failing after the one allowed link reissue.
    #[error("archive download failed with HTTP {status}: {body}")]
    DownloadFailed { status: u16, body: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("archive staging: {0}")]
    Staging(#[from] std::io::Error),
}
