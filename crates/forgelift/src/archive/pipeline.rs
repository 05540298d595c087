//! The transfer pipeline for one archive side.
//!
//! Requested -> Generating -> Ready -> Downloaded -> Uploaded, with Failed
//! absorbing from Generating. Generation failures are fatal for the whole
//! repository migration; download-link staleness gets exactly one reissue
//! per failure status; the staging file is removed on every exit path unless
//! the operator asked for retention.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::platform::{ApiError, ApiResult, ArchiveKind, JobState, PRODUCT_ID};
use crate::retry::{RetryPolicy, retry_on_http_error, retry_on_result};
use crate::storage::BlobStore;

use super::{ArchiveError, ArchiveExporter, GenerationOptions};

/// Generation can take a long time on large repositories; an hour of
/// ten-second polls before giving up.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_POLL_ATTEMPTS: u32 = 360;

/// Removes the staging file when dropped. `transfer` can be cancelled at
/// any await point once the archive is on disk, so deletion cannot live in
/// straight-line code after the upload.
struct StagingGuard {
    path: PathBuf,
    retain: bool,
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if self.retain {
            tracing::info!(path = %self.path.display(), "archive retention requested, keeping staging file");
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                // Never mask the original failure with a cleanup failure.
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove staging file");
            }
        }
    }
}

pub struct ArchivePipeline {
    exporter: Arc<dyn ArchiveExporter>,
    store: Arc<dyn BlobStore>,
    transport: Arc<dyn HttpTransport>,
    poll: RetryPolicy,
    staging_dir: PathBuf,
    retain: bool,
}

impl ArchivePipeline {
    pub fn new(
        exporter: Arc<dyn ArchiveExporter>,
        store: Arc<dyn BlobStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            exporter,
            store,
            transport,
            poll: RetryPolicy::polling(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_ATTEMPTS),
            staging_dir: std::env::temp_dir(),
            retain: false,
        }
    }

    #[must_use]
    pub fn with_poll_policy(mut self, poll: RetryPolicy) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Keep staging files instead of deleting them, logging their paths.
    #[must_use]
    pub fn with_retention(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Drive one archive side end to end; returns the URL the target
    /// platform can fetch the archive from.
    pub async fn transfer(
        &self,
        repo: &str,
        kind: ArchiveKind,
        opts: &GenerationOptions,
    ) -> Result<String, ArchiveError> {
        let job_id = self.exporter.begin(repo, kind, opts).await?;
        tracing::info!(repo, kind = %kind, job_id = %job_id, "archive generation requested");

        let job = retry_on_result(
            self.poll,
            || self.exporter.status(&job_id),
            |job| !job.state.is_terminal(),
        )
        .await?;

        match job.state {
            JobState::Succeeded => {}
            JobState::Failed => {
                return Err(ArchiveError::GenerationFailed {
                    kind,
                    reason: job
                        .failure_reason
                        .unwrap_or_else(|| "no reason reported".to_string()),
                });
            }
            JobState::Pending | JobState::Running => {
                return Err(ArchiveError::GenerationTimedOut { kind });
            }
        }

        let bytes = self.download(&job_id).await?;

        let file_name = format!("{repo}-{kind}-{}.tar.gz", Uuid::new_v4());
        let path = self.staging_dir.join(&file_name);
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "archive staged");

        // The guard deletes the file whether the upload succeeds, fails, or
        // never resolves because this future was dropped mid-flight.
        let staging = StagingGuard {
            path,
            retain: self.retain,
        };
        let uploaded = self.store.upload(&file_name, bytes).await;
        drop(staging);

        let url = uploaded.map_err(ArchiveError::from)?;
        tracing::info!(repo, kind = %kind, "archive transferred");
        Ok(url)
    }

    /// Upload an operator-supplied archive file as-is.
    ///
    /// The file belongs to the operator and is never deleted here.
    pub async fn upload_local(&self, path: &Path) -> Result<String, ArchiveError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("archive-{}.tar.gz", Uuid::new_v4()));
        let bytes = tokio::fs::read(path).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "uploading supplied archive");
        Ok(self.store.upload(&name, bytes).await?)
    }

    /// Download the archive, reissuing a stale link at most once per failure
    /// status.
    async fn download(&self, job_id: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut url = self.exporter.download_url(job_id).await?;
        let mut reissued_forbidden = false;
        let mut reissued_missing = false;

        loop {
            let resp = self.fetch(&url).await?;
            if resp.is_success() {
                return Ok(resp.body);
            }

            let reissued = match resp.status {
                403 => &mut reissued_forbidden,
                404 => &mut reissued_missing,
                _ => {
                    return Err(ArchiveError::DownloadFailed {
                        status: resp.status,
                        body: String::from_utf8_lossy(&resp.body).into_owned(),
                    });
                }
            };
            if *reissued {
                return Err(ArchiveError::DownloadFailed {
                    status: resp.status,
                    body: String::from_utf8_lossy(&resp.body).into_owned(),
                });
            }
            *reissued = true;

            tracing::warn!(
                job_id,
                status = resp.status,
                "archive link stale, reissuing download URL"
            );
            url = self.exporter.download_url(job_id).await?;
        }
    }

    /// Plain GET with transient retries. The link is self-authenticating,
    /// so no credentials are attached.
    async fn fetch(&self, url: &str) -> ApiResult<HttpResponse> {
        retry_on_http_error(
            || async {
                let resp = self
                    .transport
                    .send(HttpRequest {
                        method: HttpMethod::Get,
                        url: url.to_string(),
                        headers: vec![("user-agent".to_string(), PRODUCT_ID.to_string())],
                        body: Vec::new(),
                    })
                    .await?;
                if resp.status >= 500 {
                    return Err(ApiError::http(
                        resp.status,
                        String::from_utf8_lossy(&resp.body),
                    ));
                }
                Ok(resp)
            },
            ApiError::is_transient,
        )
        .await
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use crate::http::MockTransport;
    use crate::platform::RemoteJob;
    use crate::storage::{StorageError, StorageResult};

    struct ScriptedExporter {
        statuses: Mutex<VecDeque<RemoteJob>>,
        urls: Mutex<VecDeque<String>>,
        url_issues: AtomicU32,
    }

    impl ScriptedExporter {
        fn new(statuses: Vec<RemoteJob>, urls: Vec<&str>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                urls: Mutex::new(urls.into_iter().map(str::to_string).collect()),
                url_issues: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ArchiveExporter for ScriptedExporter {
        async fn begin(
            &self,
            _repo: &str,
            _kind: ArchiveKind,
            _opts: &GenerationOptions,
        ) -> ApiResult<String> {
            Ok("job-1".to_string())
        }

        async fn status(&self, _job_id: &str) -> ApiResult<RemoteJob> {
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| RemoteJob::new("job-1", JobState::Succeeded)))
        }

        async fn download_url(&self, _job_id: &str) -> ApiResult<String> {
            self.url_issues.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .urls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "https://links.example.com/fallback".to_string()))
        }
    }

    struct MemoryStore {
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl BlobStore for MemoryStore {
        async fn upload(&self, name: &str, bytes: Vec<u8>) -> StorageResult<String> {
            if self.fail {
                return Err(StorageError::upload_failed(403, "denied"));
            }
            self.uploads.lock().unwrap().push((name.to_string(), bytes));
            Ok(format!("https://blobs.example.com/{name}"))
        }
    }

    fn staging_dir() -> PathBuf {
        std::env::temp_dir().join(format!("forgelift-test-{}", Uuid::new_v4()))
    }

    fn staged_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
            .unwrap_or_default()
    }

    fn job(state: JobState) -> RemoteJob {
        RemoteJob::new("job-1", state)
    }

    fn fast_poll() -> RetryPolicy {
        RetryPolicy::polling(Duration::from_millis(10), 5)
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_polls_to_success_and_cleans_up() {
        let transport = MockTransport::new();
        let url = "https://links.example.com/archive/1";
        transport.push_response(
            HttpMethod::Get,
            url,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"tarball".to_vec(),
            },
        );

        let exporter = Arc::new(ScriptedExporter::new(
            vec![job(JobState::Pending), job(JobState::Running), job(JobState::Succeeded)],
            vec![url],
        ));
        let store = Arc::new(MemoryStore::new());
        let dir = staging_dir();
        let pipeline = ArchivePipeline::new(exporter, store.clone(), Arc::new(transport))
            .with_poll_policy(fast_poll())
            .with_staging_dir(&dir);

        let uploaded = pipeline
            .transfer("widgets", ArchiveKind::Git, &GenerationOptions::default())
            .await
            .unwrap();

        assert!(uploaded.starts_with("https://blobs.example.com/widgets-git-"));
        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, b"tarball");
        assert!(staged_files(&dir).is_empty(), "staging file must be deleted");
    }

    #[tokio::test]
    async fn failed_generation_is_fatal_without_downloading() {
        let transport = MockTransport::new();
        let mut failed = job(JobState::Failed);
        failed.failure_reason = Some("repository is locked".to_string());

        let exporter = Arc::new(ScriptedExporter::new(vec![failed], vec![]));
        let pipeline = ArchivePipeline::new(
            exporter,
            Arc::new(MemoryStore::new()),
            Arc::new(transport.clone()),
        )
        .with_poll_policy(fast_poll());

        let err = pipeline
            .transfer("widgets", ArchiveKind::Metadata, &GenerationOptions::default())
            .await
            .unwrap_err();
        match err {
            ArchiveError::GenerationFailed { kind, reason } => {
                assert_eq!(kind, ArchiveKind::Metadata);
                assert_eq!(reason, "repository is locked");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.request_count(), 0, "no download may be attempted");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_polling_budget_times_out() {
        let exporter = Arc::new(ScriptedExporter::new(
            vec![job(JobState::Running); 10],
            vec![],
        ));
        let pipeline = ArchivePipeline::new(
            exporter,
            Arc::new(MemoryStore::new()),
            Arc::new(MockTransport::new()),
        )
        .with_poll_policy(fast_poll());

        let err = pipeline
            .transfer("widgets", ArchiveKind::Git, &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::GenerationTimedOut { kind: ArchiveKind::Git }
        ));
    }

    #[tokio::test]
    async fn stale_link_is_reissued_once_and_recovers() {
        let transport = MockTransport::new();
        let stale = "https://links.example.com/archive/stale";
        let fresh = "https://links.example.com/archive/fresh";
        transport.push_response(
            HttpMethod::Get,
            stale,
            HttpResponse {
                status: 404,
                headers: Vec::new(),
                body: Vec::new(),
            },
        );
        transport.push_response(
            HttpMethod::Get,
            fresh,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"tarball".to_vec(),
            },
        );

        let exporter = Arc::new(ScriptedExporter::new(
            vec![job(JobState::Succeeded)],
            vec![stale, fresh],
        ));
        let dir = staging_dir();
        let pipeline = ArchivePipeline::new(
            exporter.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(transport),
        )
        .with_poll_policy(fast_poll())
        .with_staging_dir(&dir);

        pipeline
            .transfer("widgets", ArchiveKind::Git, &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(exporter.url_issues.load(Ordering::SeqCst), 2);
        assert!(staged_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn second_consecutive_stale_link_is_fatal() {
        let transport = MockTransport::new();
        for url in [
            "https://links.example.com/archive/one",
            "https://links.example.com/archive/two",
        ] {
            transport.push_response(
                HttpMethod::Get,
                url,
                HttpResponse {
                    status: 404,
                    headers: Vec::new(),
                    body: b"gone".to_vec(),
                },
            );
        }

        let exporter = Arc::new(ScriptedExporter::new(
            vec![job(JobState::Succeeded)],
            vec![
                "https://links.example.com/archive/one",
                "https://links.example.com/archive/two",
            ],
        ));
        let pipeline = ArchivePipeline::new(
            exporter,
            Arc::new(MemoryStore::new()),
            Arc::new(transport),
        )
        .with_poll_policy(fast_poll());

        let err = pipeline
            .transfer("widgets", ArchiveKind::Git, &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::DownloadFailed { status: 404, .. }));
    }

    #[tokio::test]
    async fn staging_file_is_deleted_even_when_the_upload_fails() {
        let transport = MockTransport::new();
        let url = "https://links.example.com/archive/1";
        transport.push_response(
            HttpMethod::Get,
            url,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"tarball".to_vec(),
            },
        );

        let exporter = Arc::new(ScriptedExporter::new(vec![job(JobState::Succeeded)], vec![url]));
        let dir = staging_dir();
        let pipeline = ArchivePipeline::new(
            exporter,
            Arc::new(MemoryStore::failing()),
            Arc::new(transport),
        )
        .with_poll_policy(fast_poll())
        .with_staging_dir(&dir);

        let err = pipeline
            .transfer("widgets", ArchiveKind::Git, &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Storage(_)));
        assert!(staged_files(&dir).is_empty(), "staging file must be deleted");
    }

    struct HangingStore;

    #[async_trait]
    impl BlobStore for HangingStore {
        async fn upload(&self, _name: &str, _bytes: Vec<u8>) -> StorageResult<String> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_transfer_mid_upload_removes_the_staging_file() {
        let transport = MockTransport::new();
        let url = "https://links.example.com/archive/1";
        transport.push_response(
            HttpMethod::Get,
            url,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"tarball".to_vec(),
            },
        );

        let exporter = Arc::new(ScriptedExporter::new(vec![job(JobState::Succeeded)], vec![url]));
        let dir = staging_dir();
        let pipeline = ArchivePipeline::new(exporter, Arc::new(HangingStore), Arc::new(transport))
            .with_poll_policy(fast_poll())
            .with_staging_dir(&dir);

        let options = GenerationOptions::default();
        let mut transfer =
            Box::pin(pipeline.transfer("widgets", ArchiveKind::Git, &options));
        let pending = tokio::time::timeout(Duration::from_secs(5), transfer.as_mut()).await;
        assert!(pending.is_err(), "upload should still be in flight");
        assert_eq!(
            staged_files(&dir).len(),
            1,
            "archive is staged while the upload waits"
        );

        // Abandoning the transfer, as a failed sibling in a joined pair does,
        // must not leave the staging file behind.
        drop(transfer);
        assert!(staged_files(&dir).is_empty(), "staging file must be deleted");
    }

    #[tokio::test]
    async fn retention_keeps_the_staging_file() {
        let transport = MockTransport::new();
        let url = "https://links.example.com/archive/1";
        transport.push_response(
            HttpMethod::Get,
            url,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"tarball".to_vec(),
            },
        );

        let exporter = Arc::new(ScriptedExporter::new(vec![job(JobState::Succeeded)], vec![url]));
        let dir = staging_dir();
        let pipeline = ArchivePipeline::new(
            exporter,
            Arc::new(MemoryStore::new()),
            Arc::new(transport),
        )
        .with_poll_policy(fast_poll())
        .with_staging_dir(&dir)
        .with_retention(true);

        pipeline
            .transfer("widgets", ArchiveKind::Git, &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(staged_files(&dir).len(), 1, "retained file must be present");
    }

    #[tokio::test]
    async fn upload_local_does_not_delete_the_operator_file() {
        let dir = staging_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("supplied-git.tar.gz");
        std::fs::write(&path, b"supplied").unwrap();

        let store = Arc::new(MemoryStore::new());
        let pipeline = ArchivePipeline::new(
            Arc::new(ScriptedExporter::new(vec![], vec![])),
            store.clone(),
            Arc::new(MockTransport::new()),
        );

        let url = pipeline.upload_local(&path).await.unwrap();
        assert_eq!(url, "https://blobs.example.com/supplied-git.tar.gz");
        assert!(path.exists(), "operator-supplied archives are kept");
        assert_eq!(store.uploads.lock().unwrap()[0].1, b"supplied");
    }
}
