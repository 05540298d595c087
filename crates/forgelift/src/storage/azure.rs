//! Azure Blob Storage backend.
//!
//! Authenticates with an operator-supplied account SAS token over plain
//! HTTP: no SDK, just `PUT` against the blob endpoint. Every upload goes
//! into a freshly created, uniquely named container, so concurrent uploads
//! can never collide.

use std::sync::Arc;

use async_trait::async_trait;
use backon::Retryable;
use uuid::Uuid;

use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::redact::Redactor;
use crate::retry::transfer_backoff;

use super::{BlobStore, StorageError, StorageResult};

pub struct AzureBlobStore {
    transport: Arc<dyn HttpTransport>,
    account_url: String,
    sas_token: String,
    redactor: Redactor,
}

impl AzureBlobStore {
    /// `account_url` is the blob endpoint
    /// (`https://<account>.blob.core.windows.net`); `sas_token` is the query
    /// fragment without a leading `?`.
    pub fn new(
        account_url: &str,
        sas_token: &str,
        redactor: Redactor,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let sas_token = sas_token.trim_start_matches('?').to_string();
        redactor.register(&sas_token);
        Self {
            transport,
            account_url: account_url.trim_end_matches('/').to_string(),
            sas_token,
            redactor,
        }
    }

    async fn put(&self, url: &str, headers: Vec<(String, String)>, body: Vec<u8>) -> StorageResult<()> {
        let send = || async {
            let request = HttpRequest {
                method: HttpMethod::Put,
                url: url.to_string(),
                headers: headers.clone(),
                body: body.clone(),
            };
            let resp = self.transport.send(request).await?;
            if !resp.is_success() {
                return Err(StorageError::upload_failed(
                    resp.status,
                    String::from_utf8_lossy(&resp.body),
                ));
            }
            Ok(())
        };

        send.retry(transfer_backoff())
            .when(StorageError::is_transient)
            .notify(|err, dur| {
                tracing::debug!(delay_ms = dur.as_millis() as u64, error = %err, "retrying blob upload");
            })
            .await
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> StorageResult<String> {
        let container = format!("migration-archives-{}", Uuid::new_v4());
        let container_url = format!("{}/{container}", self.account_url);
        let blob_url = format!("{container_url}/{name}");

        tracing::debug!(
            container = %container,
            name,
            size = bytes.len(),
            "uploading archive to azure blob storage"
        );

        self.put(
            &format!("{container_url}?restype=container&{}", self.sas_token),
            Vec::new(),
            Vec::new(),
        )
        .await?;

        self.put(
            &format!("{blob_url}?{}", self.sas_token),
            vec![
                ("x-ms-blob-type".to_string(), "BlockBlob".to_string()),
                (
                    "content-length".to_string(),
                    bytes.len().to_string(),
                ),
            ],
            bytes,
        )
        .await?;

        let url = format!("{blob_url}?{}", self.sas_token);
        tracing::info!(url = %self.redactor.mask(&url), "archive uploaded");
        Ok(url)
    }
}
