//! Target-platform-native archive storage.
//!
//! Instead of an external blob store, the archive is pushed straight into
//! the target platform's migration storage, which answers with an opaque
//! `gei://` URI the migration start call accepts in place of an HTTPS URL.

use std::sync::Arc;

use async_trait::async_trait;
use backon::Retryable;
use serde::Deserialize;

use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::platform::PRODUCT_ID;
use crate::redact::Redactor;
use crate::retry::transfer_backoff;

use super::{BlobStore, StorageError, StorageResult};

#[derive(Debug, Deserialize)]
struct ArchiveUploadResponse {
    uri: String,
}

pub struct GitHubNativeStore {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    org: String,
    token: String,
    redactor: Redactor,
}

impl GitHubNativeStore {
    pub fn new(
        api_url: &str,
        org: &str,
        token: &str,
        redactor: Redactor,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        redactor.register(token);
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            org: org.to_string(),
            token: token.to_string(),
            redactor,
        }
    }
}

#[async_trait]
impl BlobStore for GitHubNativeStore {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> StorageResult<String> {
        let url = format!(
            "{}/organizations/{}/gei/archive?name={name}",
            self.api_url, self.org
        );

        tracing::debug!(name, size = bytes.len(), "uploading archive to target-native storage");

        let send = || async {
            let request = HttpRequest {
                method: HttpMethod::Post,
                url: url.clone(),
                headers: vec![
                    ("authorization".to_string(), format!("Bearer {}", self.token)),
                    ("user-agent".to_string(), PRODUCT_ID.to_string()),
                    (
                        "content-type".to_string(),
                        "application/octet-stream".to_string(),
                    ),
                ],
                body: bytes.clone(),
            };
            let resp = self.transport.send(request).await?;
            if !resp.is_success() {
                return Err(StorageError::upload_failed(
                    resp.status,
                    String::from_utf8_lossy(&resp.body),
                ));
            }
            let parsed: ArchiveUploadResponse = serde_json::from_slice(&resp.body)
                .map_err(|e| StorageError::Decode(e.to_string()))?;
            Ok(parsed.uri)
        };

        let uri = send
            .retry(transfer_backoff())
            .when(StorageError::is_transient)
            .notify(|err, dur| {
                tracing::debug!(delay_ms = dur.as_millis() as u64, error = %err, "retrying blob upload");
            })
            .await?;

        tracing::info!(uri = %self.redactor.mask(&uri), "archive uploaded");
        Ok(uri)
    }
}
