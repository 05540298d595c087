//! Azure DevOps client.
//!
//! PAT-bearer REST variant. Two pagination shapes coexist here: collection
//! endpoints hand back an `x-ms-continuationtoken` header to resume from,
//! and a few endpoints expose no count or cursor at all, only `$top/$skip`
//! paging, which [`AdoClient::probe_count`] turns into a count via
//! exponential probing plus binary search.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::platform::{
    ApiError, ApiRateLimiter, ApiResult, PRODUCT_ID, RateLimitGate, RateLimitInfo, RepoSummary,
};
use crate::redact::Redactor;
use crate::retry::retry_on_http_error;

use super::types::{AdoProject, AdoRepo, ListResponse};

const API_VERSION: &str = "7.1";

#[derive(Clone)]
pub struct AdoClient {
    transport: Arc<dyn HttpTransport>,
    org_url: String,
    token: String,
    redactor: Redactor,
    gate: RateLimitGate,
    limiter: Option<ApiRateLimiter>,
}

impl AdoClient {
    pub fn new(
        org_url: &str,
        token: &str,
        redactor: Redactor,
        limiter: Option<ApiRateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        redactor.register(token);
        Self {
            transport,
            org_url: org_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            redactor,
            gate: RateLimitGate::new(),
            limiter,
        }
    }

    /// Create a client backed by the default reqwest transport.
    pub fn connect(
        org_url: &str,
        token: &str,
        redactor: Redactor,
        limiter: Option<ApiRateLimiter>,
    ) -> ApiResult<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(org_url, token, redactor, limiter, Arc::new(transport)))
    }

    #[must_use]
    pub fn org_url(&self) -> &str {
        &self.org_url
    }

    fn versioned(&self, route: &str) -> String {
        let sep = if route.contains('?') { '&' } else { '?' };
        format!("{}{route}{sep}api-version={API_VERSION}", self.org_url)
    }

    async fn send(&self, method: HttpMethod, url: &str) -> ApiResult<HttpResponse> {
        retry_on_http_error(|| self.send_once(method, url), ApiError::is_transient).await
    }

    async fn send_once(&self, method: HttpMethod, url: &str) -> ApiResult<HttpResponse> {
        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }
        self.gate.wait().await;

        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers: vec![
                ("authorization".to_string(), format!("Bearer {}", self.token)),
                ("user-agent".to_string(), PRODUCT_ID.to_string()),
                ("accept".to_string(), "application/json".to_string()),
            ],
            body: Vec::new(),
        };
        tracing::debug!(method = method.as_str(), url = %self.redactor.mask(url), "ado request");

        let mut resp = self.transport.send(request.clone()).await?;
        self.note_rate_limit(&resp).await;

        if resp.status == 403 && self.gate.is_pending().await {
            tracing::debug!(url = %self.redactor.mask(url), "403 with pending rate-limit delay, retrying once");
            self.gate.wait().await;
            resp = self.transport.send(request).await?;
            self.note_rate_limit(&resp).await;
        }

        tracing::debug!(
            status = resp.status,
            body = %self.redactor.mask(&String::from_utf8_lossy(&resp.body)),
            "ado response"
        );

        if resp.status >= 500 || resp.status == 429 {
            return Err(ApiError::http(
                resp.status,
                String::from_utf8_lossy(&resp.body),
            ));
        }

        Ok(resp)
    }

    /// Throttled responses carry `Retry-After` seconds; quota headers use
    /// the `x-ratelimit-*` names when present.
    async fn note_rate_limit(&self, resp: &HttpResponse) {
        if let (Some(remaining), Some(reset)) = (
            resp.header("x-ratelimit-remaining"),
            resp.header("x-ratelimit-reset"),
        ) {
            if let (Ok(remaining), Ok(epoch)) = (remaining.parse::<u64>(), reset.parse::<i64>()) {
                let reset_at = DateTime::from_timestamp(epoch, 0).unwrap_or_else(Utc::now);
                self.gate.record(&RateLimitInfo { remaining, reset_at }).await;
                return;
            }
        }
        if matches!(resp.status, 429 | 403) {
            if let Some(retry_after) = resp.header("retry-after") {
                if let Ok(secs) = retry_after.parse::<u64>() {
                    self.gate.record_delay(Duration::from_secs(secs)).await;
                }
            }
        }
    }

    async fn get_checked(&self, url: &str) -> ApiResult<HttpResponse> {
        let resp = self.send(HttpMethod::Get, url).await?;
        if !resp.is_success() {
            return Err(ApiError::http(
                resp.status,
                String::from_utf8_lossy(&resp.body),
            ));
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let resp = self.get_checked(url).await?;
        serde_json::from_slice(&resp.body).map_err(|e| ApiError::decode(e.to_string()))
    }

    /// All projects of the organization, following the continuation-token
    /// header until the server stops returning one.
    pub async fn list_projects(&self) -> ApiResult<Vec<AdoProject>> {
        let mut projects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let route = match &token {
                Some(token) => format!("/_apis/projects?continuationToken={token}"),
                None => "/_apis/projects".to_string(),
            };
            let resp = self.get_checked(&self.versioned(&route)).await?;
            let next = resp
                .header("x-ms-continuationtoken")
                .map(str::to_string);
            let page: ListResponse<AdoProject> =
                serde_json::from_slice(&resp.body).map_err(|e| ApiError::decode(e.to_string()))?;
            projects.extend(page.value);

            match next {
                Some(next) => token = Some(next),
                None => return Ok(projects),
            }
        }
    }

    /// Git repositories of one project. Disabled repositories are skipped.
    pub async fn list_repos(&self, project: &str) -> ApiResult<Vec<RepoSummary>> {
        let page: ListResponse<AdoRepo> = self
            .get_json(&self.versioned(&format!("/{project}/_apis/git/repositories")))
            .await?;
        Ok(page
            .value
            .into_iter()
            .filter(|r| !r.is_disabled)
            .map(|r| RepoSummary {
                name: r.name,
                url: r.remote_url,
            })
            .collect())
    }

    /// Browse URL of a repository, used as the migration's source URL.
    pub async fn repo_url(&self, project: &str, repo: &str) -> ApiResult<String> {
        let repo: AdoRepo = self
            .get_json(&self.versioned(&format!("/{project}/_apis/git/repositories/{repo}")))
            .await?;
        Ok(repo.remote_url)
    }

    /// Number of pull requests a repository has ever had, across all states.
    ///
    /// There is no count endpoint for this, so the total comes from
    /// [`probe_count`](Self::probe_count).
    pub async fn pull_request_count(&self, project: &str, repo: &str) -> ApiResult<u64> {
        self.probe_count(&format!(
            "/{project}/_apis/git/repositories/{repo}/pullrequests?searchCriteria.status=all"
        ))
        .await
    }

    /// Count records behind an endpoint that only supports `$top/$skip`
    /// paging.
    ///
    /// Doubles the probe offset until a record is absent, then binary-searches
    /// the boundary: O(log n) requests instead of a linear page walk. The
    /// count is the first offset with no record.
    pub async fn probe_count(&self, route: &str) -> ApiResult<u64> {
        if !self.record_exists_at(route, 0).await? {
            return Ok(0);
        }

        let mut hi = 1u64;
        while self.record_exists_at(route, hi).await? {
            hi = hi.saturating_mul(2);
        }
        let mut lo = hi / 2;

        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.record_exists_at(route, mid).await? {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(hi)
    }

    async fn record_exists_at(&self, route: &str, skip: u64) -> ApiResult<bool> {
        let sep = if route.contains('?') { '&' } else { '?' };
        let url = self.versioned(&format!("{route}{sep}$top=1&$skip={skip}"));
        let page: ListResponse<serde_json::Value> = self.get_json(&url).await?;
        Ok(!page.value.is_empty())
    }
}
