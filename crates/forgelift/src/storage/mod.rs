//! Blob-storage backends for archive hand-off.
//!
//! The target platform ingests archives by fetching them from a URL, so an
//! uploaded archive must come back as a time-limited authenticated fetch URL.
//! Three interchangeable backends implement [`BlobStore`]: Azure Blob
//! Storage (SAS token), S3 (SigV4 presigned URLs), and the target platform's
//! own archive storage. Exactly one backend is active per migration.

mod azure;
mod github_native;
mod s3;

pub use azure::AzureBlobStore;
pub use github_native::GitHubNativeStore;
pub use s3::S3BlobStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::HttpError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload rejected with HTTP {status}: {body}")]
    UploadFailed { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] HttpError),

    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("unexpected storage response: {0}")]
    Decode(String),
}

impl StorageError {
    #[must_use]
    pub fn upload_failed(status: u16, body: impl Into<String>) -> Self {
        Self::UploadFailed {
            status,
            body: body.into(),
        }
    }

    /// Whether the upload is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::UploadFailed { status, .. } => *status >= 500 || *status == 429,
            Self::Transport(_) => true,
            Self::Config(_) | Self::Decode(_) => false,
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Upload bytes under a name, producing an authenticated fetch URL the
/// target platform can use (typical validity: tens of hours).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> StorageResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StorageError::upload_failed(500, "").is_transient());
        assert!(StorageError::upload_failed(429, "").is_transient());
        assert!(StorageError::Transport(HttpError::Transport("reset".into())).is_transient());
        assert!(!StorageError::upload_failed(403, "").is_transient());
        assert!(!StorageError::Config("no backend".into()).is_transient());
    }
}
