//! Bitbucket Server client.
//!
//! Basic-auth REST variant. Bitbucket Server has no native archive export;
//! migrations from it consume operator-supplied archives, so this client
//! only covers source discovery: listing project repositories and resolving
//! clone URLs.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;

use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::platform::{ApiError, ApiRateLimiter, ApiResult, PRODUCT_ID, RateLimitGate, RepoSummary};
use crate::redact::Redactor;
use crate::retry::retry_on_http_error;

use super::types::{BitbucketRepo, PagedResponse};

/// Page size for repository listings.
const PAGE_LIMIT: u64 = 100;

#[derive(Clone)]
pub struct BitbucketClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    auth_header: String,
    redactor: Redactor,
    gate: RateLimitGate,
    limiter: Option<ApiRateLimiter>,
}

impl BitbucketClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        redactor: Redactor,
        limiter: Option<ApiRateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        redactor.register(password);
        let credentials = BASE64.encode(format!("{username}:{password}"));
        redactor.register(&credentials);
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {credentials}"),
            redactor,
            gate: RateLimitGate::new(),
            limiter,
        }
    }

    /// Create a client backed by the default reqwest transport.
    pub fn connect(
        base_url: &str,
        username: &str,
        password: &str,
        redactor: Redactor,
        limiter: Option<ApiRateLimiter>,
    ) -> ApiResult<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(
            base_url,
            username,
            password,
            redactor,
            limiter,
            Arc::new(transport),
        ))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Canonical browse URL for a repository, used as the migration's source
    /// repository URL.
    #[must_use]
    pub fn repo_url(&self, project: &str, slug: &str) -> String {
        format!("{}/projects/{project}/repos/{slug}", self.base_url)
    }

    fn api_url(&self, route: &str) -> String {
        format!("{}/rest/api/1.0{}", self.base_url, route)
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
                ("authorization".to_string(), self.auth_header.clone()),
                ("user-agent".to_string(), PRODUCT_ID.to_string()),
                ("accept".to_string(), "application/json".to_string()),
            ],
            body: Vec::new(),
        };
        tracing::debug!(method = method.as_str(), url = %self.redactor.mask(url), "bitbucket request");

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
            "bitbucket response"
        );

        if resp.status >= 500 || resp.status == 429 {
            return Err(ApiError::http(
                resp.status,
                String::from_utf8_lossy(&resp.body),
            ));
        }

        Ok(resp)
    }

    /// Bitbucket Server signals throttling with a `Retry-After` header.
    async fn note_rate_limit(&self, resp: &HttpResponse) {
        if !matches!(resp.status, 429 | 403) {
            return;
        }
        if let Some(retry_after) = resp.header("retry-after") {
            if let Ok(secs) = retry_after.parse::<u64>() {
                self.gate.record_delay(Duration::from_secs(secs)).await;
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, route: &str) -> ApiResult<T> {
        let resp = self.send(HttpMethod::Get, &self.api_url(route)).await?;
        if !resp.is_success() {
            return Err(ApiError::http(
                resp.status,
                String::from_utf8_lossy(&resp.body),
            ));
        }
        serde_json::from_slice(&resp.body).map_err(|e| ApiError::decode(e.to_string()))
    }

    /// All repositories of a project, following the continuation cursor
    /// until the server reports the last page.
    pub async fn list_project_repos(&self, project: &str) -> ApiResult<Vec<RepoSummary>> {
        let mut repos = Vec::new();
        let mut start: Option<u64> = None;

        loop {
            let route = match start {
                Some(start) => {
                    format!("/projects/{project}/repos?limit={PAGE_LIMIT}&start={start}")
                }
                None => format!("/projects/{project}/repos?limit={PAGE_LIMIT}"),
            };
            let page: PagedResponse<BitbucketRepo> = self.get_json(&route).await?;

            for repo in &page.values {
                repos.push(RepoSummary {
                    name: repo.slug.clone(),
                    url: repo
                        .clone_url()
                        .map(str::to_string)
                        .unwrap_or_else(|| self.repo_url(project, &repo.slug)),
                });
            }

            if page.is_last_page {
                return Ok(repos);
            }
            match page.next_page_start {
                Some(next) => start = Some(next),
                // Defensive: a non-last page without a cursor cannot advance.
                None => return Ok(repos),
            }
        }
    }

    /// HTTP clone URL of a single repository.
    pub async fn repo_clone_url(&self, project: &str, slug: &str) -> ApiResult<String> {
        let repo: BitbucketRepo = self
            .get_json(&format!("/projects/{project}/repos/{slug}"))
            .await?;
        repo.clone_url()
            .map(str::to_string)
            .ok_or_else(|| ApiError::decode(format!("repository {project}/{slug} has no clone links")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    const BASE: &str = "https://bitbucket.example.com";

    fn client_with(transport: &MockTransport) -> BitbucketClient {
        BitbucketClient::new(
            BASE,
            "svc-migration",
            "hunter2",
            Redactor::new(),
            None,
            Arc::new(transport.clone()),
        )
    }

    fn repo_json(slug: &str) -> serde_json::Value {
        json!({
            "slug": slug,
            "name": slug,
            "links": { "clone": [
                { "href": format!("https://bitbucket.example.com/scm/ops/{slug}.git"), "name": "http" },
                { "href": format!("ssh://git@bitbucket.example.com/ops/{slug}.git"), "name": "ssh" }
            ]}
        })
    }

    #[tokio::test]
    async fn requests_carry_basic_auth() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{BASE}/rest/api/1.0/projects/OPS/repos/tools"),
            200,
            &repo_json("tools"),
        );

        let client = client_with(&transport);
        client.repo_clone_url("OPS", "tools").await.unwrap();

        let req = &transport.requests()[0];
        let auth = crate::http::header_get(&req.headers, "authorization").unwrap();
        let expected = BASE64.encode("svc-migration:hunter2");
        assert_eq!(auth, format!("Basic {expected}"));
    }

    #[tokio::test]
    async fn list_follows_the_continuation_cursor_to_the_last_page() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{BASE}/rest/api/1.0/projects/OPS/repos?limit=100"),
            200,
            &json!({
                "values": [repo_json("alpha"), repo_json("beta")],
                "isLastPage": false,
                "nextPageStart": 2
            }),
        );
        transport.push_json(
            HttpMethod::Get,
            format!("{BASE}/rest/api/1.0/projects/OPS/repos?limit=100&start=2"),
            200,
            &json!({
                "values": [repo_json("gamma")],
                "isLastPage": true
            }),
        );

        let client = client_with(&transport);
        let repos = client.list_project_repos("OPS").await.unwrap();

        let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(
            repos[0].url,
            "https://bitbucket.example.com/scm/ops/alpha.git"
        );
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn clone_url_prefers_the_http_link() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{BASE}/rest/api/1.0/projects/OPS/repos/tools"),
            200,
            &json!({
                "slug": "tools",
                "name": "tools",
                "links": { "clone": [
                    { "href": "ssh://git@bitbucket.example.com/ops/tools.git", "name": "ssh" },
                    { "href": "https://bitbucket.example.com/scm/ops/tools.git", "name": "http" }
                ]}
            }),
        );

        let client = client_with(&transport);
        assert_eq!(
            client.repo_clone_url("OPS", "tools").await.unwrap(),
            "https://bitbucket.example.com/scm/ops/tools.git"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_header_delays_the_next_call() {
        let transport = MockTransport::new();
        let url = format!("{BASE}/rest/api/1.0/projects/OPS/repos/tools");

        transport.push_response(
            HttpMethod::Get,
            url.clone(),
            HttpResponse {
                status: 403,
                headers: vec![("retry-after".to_string(), "12".to_string())],
                body: b"throttled".to_vec(),
            },
        );
        transport.push_json(HttpMethod::Get, url.clone(), 200, &repo_json("tools"));

        let client = client_with(&transport);

        // The 403 carries Retry-After, so the same request is replayed once
        // after the delay.
        let before = Instant::now();
        client.repo_clone_url("OPS", "tools").await.unwrap();
        assert!(before.elapsed() >= Duration::from_secs(12));
        assert_eq!(transport.request_count(), 2);
    }
}
