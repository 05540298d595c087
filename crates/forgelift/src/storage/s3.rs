//! S3 backend.
//!
//! Uploads through presigned URLs (SigV4 query authentication), built by
//! hand: the PUT request itself then carries no credentials, and the
//! returned GET URL can be handed to the target platform as-is.

use std::sync::Arc;

use async_trait::async_trait;
use backon::Retryable;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::redact::Redactor;
use crate::retry::transfer_backoff;

use super::{BlobStore, StorageError, StorageResult};

/// Validity of the URL handed to the target platform: the remote ingestion
/// can lag the upload by many hours.
const DOWNLOAD_URL_TTL_SECS: u64 = 48 * 3600;

/// Validity of the upload URL itself.
const UPLOAD_URL_TTL_SECS: u64 = 3600;

// SigV4 unreserved characters; everything else is percent-encoded.
const SIGV4_QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
const SIGV4_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

pub struct S3BlobStore {
    transport: Arc<dyn HttpTransport>,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: String,
    redactor: Redactor,
}

impl S3BlobStore {
    pub fn new(
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        redactor: Redactor,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        redactor.register(secret_key);
        Self {
            transport,
            bucket: bucket.to_string(),
            region: region.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            redactor,
        }
    }

    fn host(&self) -> String {
        format!("{}.s3.{}.amazonaws.com", self.bucket, self.region)
    }

    /// Build a presigned URL for `method` on `key`, valid for `expires` seconds.
    fn presign(&self, method: &str, key: &str, expires: u64, now: DateTime<Utc>) -> String {
        let host = self.host();
        let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/s3/aws4_request", self.region);

        let credential = format!("{}/{scope}", self.access_key);
        let path = format!("/{}", utf8_percent_encode(key, SIGV4_PATH));

        // Already in canonical (byte-sorted) parameter order.
        let query = format!(
            "X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Credential={}&X-Amz-Date={datetime}&X-Amz-Expires={expires}&X-Amz-SignedHeaders=host",
            utf8_percent_encode(&credential, SIGV4_QUERY),
        );

        let canonical_request = format!(
            "{method}\n{path}\n{query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD"
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{datetime}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let mut signing_key = hmac_sha256(
            format!("AWS4{}", self.secret_key).as_bytes(),
            date.as_bytes(),
        );
        for part in [self.region.as_bytes(), b"s3", b"aws4_request"] {
            signing_key = hmac_sha256(&signing_key, part);
        }
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!("https://{host}{path}?{query}&X-Amz-Signature={signature}")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> StorageResult<String> {
        let key = format!("migration-archives/{}/{name}", Uuid::new_v4());
        let put_url = self.presign("PUT", &key, UPLOAD_URL_TTL_SECS, Utc::now());

        tracing::debug!(key = %key, size = bytes.len(), "uploading archive to s3");

        let send = || async {
            let request = HttpRequest {
                method: HttpMethod::Put,
                url: put_url.clone(),
                headers: vec![("content-length".to_string(), bytes.len().to_string())],
                body: bytes.clone(),
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
            .await?;

        let url = self.presign("GET", &key, DOWNLOAD_URL_TTL_SECS, Utc::now());
        tracing::info!(url = %self.redactor.mask(&url), "archive uploaded");
        Ok(url)
    }
}
