//! GitHub-flavored API client.
//!
//! One client type serves two roles: the target control plane (migration
//! sources, repository migrations) and Enterprise Server sources (archive
//! export). Both speak the same REST + GraphQL dialect with bearer PAT
//! authentication, Link-header pagination, and `x-ratelimit-*` quota
//! headers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::archive::{ArchiveExporter, GenerationOptions};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::platform::{
    ApiError, ApiRateLimiter, ApiResult, ArchiveKind, JobState, PRODUCT_ID, RateLimitGate,
    RateLimitInfo, RemoteJob, RepoSummary,
};
use crate::redact::Redactor;
use crate::retry::retry_on_http_error;

use super::pagination::paged;
use super::types::{
    CreateMigrationSourceData, GraphResponse, MigrationNode, MigrationNodeData,
    MigrationSourcesData, OrganizationData, RestMigration, RestRepo, StartMigrationArgs,
    StartMigrationData,
};

/// Public API root; anything else is treated as an Enterprise Server.
pub const DOTCOM_API_URL: &str = "https://api.github.com";

/// Applied when a response signals quota exhaustion through a body marker
/// without usable reset headers.
const SECONDARY_LIMIT_DELAY: Duration = Duration::from_secs(60);

const ORG_ID_QUERY: &str = "query($login: String!) { organization(login: $login) { id } }";

const CREATE_MIGRATION_SOURCE_MUTATION: &str = "\
mutation($name: String!, $url: String!, $ownerId: ID!, $type: MigrationSourceType!) {
  createMigrationSource(input: { name: $name, url: $url, ownerId: $ownerId, type: $type }) {
    migrationSource { id }
  }
}";

const START_MIGRATION_MUTATION: &str = "\
mutation(
  $sourceId: ID!, $ownerId: ID!, $sourceRepositoryUrl: URI!, $repositoryName: String!,
  $continueOnError: Boolean!, $gitArchiveUrl: String, $metadataArchiveUrl: String,
  $accessToken: String, $skipReleases: Boolean, $lockSource: Boolean,
  $targetRepoVisibility: String
) {
  startRepositoryMigration(input: {
    sourceId: $sourceId, ownerId: $ownerId, sourceRepositoryUrl: $sourceRepositoryUrl,
    repositoryName: $repositoryName, continueOnError: $continueOnError,
    gitArchiveUrl: $gitArchiveUrl, metadataArchiveUrl: $metadataArchiveUrl,
    accessToken: $accessToken, skipReleases: $skipReleases, lockSource: $lockSource,
    targetRepoVisibility: $targetRepoVisibility
  }) {
    repositoryMigration { id state failureReason }
  }
}";

const MIGRATION_STATUS_QUERY: &str =
    "query($id: ID!) { node(id: $id) { ... on Migration { id state failureReason } } }";

const MIGRATION_SOURCES_QUERY: &str = "\
query($login: String!) {
  organization(login: $login) {
    migrationSources(first: 100) { nodes { id name } }
  }
}";

/// Derive the GraphQL endpoint from the REST API root.
///
/// The public API exposes `/graphql` under the API host; Enterprise Server
/// mounts REST under `/api/v3` and GraphQL under `/api/graphql`.
#[must_use]
pub fn graphql_url_for(api_url: &str) -> String {
    let api_url = api_url.trim_end_matches('/');
    if api_url == DOTCOM_API_URL {
        format!("{api_url}/graphql")
    } else if let Some(base) = api_url.strip_suffix("/api/v3") {
        format!("{base}/api/graphql")
    } else {
        format!("{api_url}/api/graphql")
    }
}

#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    graphql_url: String,
    token: String,
    redactor: Redactor,
    gate: RateLimitGate,
    limiter: Option<ApiRateLimiter>,
}

impl GitHubClient {
    /// Create a client over an explicit transport.
    ///
    /// The token is registered with the redactor so it never appears in log
    /// output.
    pub fn new(
        api_url: &str,
        token: &str,
        redactor: Redactor,
        limiter: Option<ApiRateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let api_url = api_url.trim_end_matches('/').to_string();
        let graphql_url = graphql_url_for(&api_url);
        redactor.register(token);
        Self {
            transport,
            api_url,
            graphql_url,
            token: token.to_string(),
            redactor,
            gate: RateLimitGate::new(),
            limiter,
        }
    }

    /// Create a client backed by the default reqwest transport.
    pub fn connect(
        api_url: &str,
        token: &str,
        redactor: Redactor,
        limiter: Option<ApiRateLimiter>,
    ) -> ApiResult<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(
            api_url,
            token,
            redactor,
            limiter,
            Arc::new(transport),
        ))
    }

    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    fn rest_url(&self, route: &str) -> String {
        format!("{}{}", self.api_url, route)
    }

    /// Send a request, retrying transient failures.
    ///
    /// 5xx and 429 responses are surfaced as errors so the transient retry
    /// policy sees them; all other statuses are returned to the caller, which
    /// knows which ones it expects.
    pub(crate) async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
    ) -> ApiResult<HttpResponse> {
        retry_on_http_error(|| self.send_once(method, url, body), ApiError::is_transient).await
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
    ) -> ApiResult<HttpResponse> {
        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }
        self.gate.wait().await;

        let request = self.build_request(method, url, body);
        tracing::debug!(
            method = method.as_str(),
            url = %self.redactor.mask(url),
            body = %self.redactor.mask(&String::from_utf8_lossy(&request.body)),
            "api request"
        );

        let mut resp = self.transport.send(request.clone()).await?;
        self.note_rate_limit(&resp).await;
        self.log_response(&resp);

        // A 403 while a delay is pending is a rate-limit symptom, not a
        // permission failure: retry the same request once after the delay,
        // without consuming a retry-policy attempt.
        if resp.status == 403 && self.gate.is_pending().await {
            tracing::debug!(url = %self.redactor.mask(url), "403 with pending rate-limit delay, retrying once");
            self.gate.wait().await;
            resp = self.transport.send(request).await?;
            self.note_rate_limit(&resp).await;
            self.log_response(&resp);
        }

        if resp.status >= 500 || resp.status == 429 {
            return Err(ApiError::http(
                resp.status,
                String::from_utf8_lossy(&resp.body),
            ));
        }

        Ok(resp)
    }

    fn build_request(&self, method: HttpMethod, url: &str, body: Option<&Value>) -> HttpRequest {
        let mut headers = vec![
            ("authorization".to_string(), format!("Bearer {}", self.token)),
            ("user-agent".to_string(), PRODUCT_ID.to_string()),
            (
                "accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
        ];
        let body = match body {
            Some(value) => {
                headers.push(("content-type".to_string(), "application/json".to_string()));
                value.to_string().into_bytes()
            }
            None => Vec::new(),
        };
        HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        }
    }

    fn log_response(&self, resp: &HttpResponse) {
        tracing::debug!(
            status = resp.status,
            body = %self.redactor.mask(&String::from_utf8_lossy(&resp.body)),
            "api response"
        );
    }

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

        // Body marker fallback for responses without usable quota headers.
        if matches!(resp.status, 403 | 429) {
            let body = String::from_utf8_lossy(&resp.body);
            if body.contains("rate limit") || body.contains("RATE_LIMITED") {
                self.gate.record_delay(SECONDARY_LIMIT_DELAY).await;
            }
        }
    }

    fn error_for(resp: &HttpResponse) -> ApiError {
        ApiError::http(resp.status, String::from_utf8_lossy(&resp.body))
    }

    async fn rest_json<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        route: &str,
        body: Option<&Value>,
    ) -> ApiResult<T> {
        let resp = self.send(method, &self.rest_url(route), body).await?;
        if !resp.is_success() {
            return Err(Self::error_for(&resp));
        }
        serde_json::from_slice(&resp.body).map_err(|e| ApiError::decode(e.to_string()))
    }

    /// Run a GraphQL operation and unwrap its `data` payload.
    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> ApiResult<T> {
        let payload = json!({ "query": query, "variables": variables });
        let resp = self
            .send(HttpMethod::Post, &self.graphql_url, Some(&payload))
            .await?;
        if !resp.is_success() {
            return Err(Self::error_for(&resp));
        }

        let envelope: GraphResponse<T> =
            serde_json::from_slice(&resp.body).map_err(|e| ApiError::decode(e.to_string()))?;

        if let Some(err) = envelope.errors.first() {
            if err.error_type.as_deref() == Some("RATE_LIMITED") {
                self.gate.record_delay(SECONDARY_LIMIT_DELAY).await;
                return Err(ApiError::RateLimited {
                    reset_at: Utc::now() + chrono::Duration::from_std(SECONDARY_LIMIT_DELAY)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60)),
                });
            }
            return Err(ApiError::graph(err.message.clone()));
        }

        envelope
            .data
            .ok_or_else(|| ApiError::decode("GraphQL response without data"))
    }

    /// Whether a repository already exists under `org`.
    pub async fn repo_exists(&self, org: &str, name: &str) -> ApiResult<bool> {
        let url = self.rest_url(&format!("/repos/{org}/{name}"));
        let resp = self.send(HttpMethod::Get, &url, None).await?;
        match resp.status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::error_for(&resp)),
        }
    }

    /// Resolve the GraphQL node id of an organization.
    pub async fn org_id(&self, login: &str) -> ApiResult<String> {
        let data: OrganizationData = self
            .graphql(ORG_ID_QUERY, json!({ "login": login }))
            .await?;
        Ok(data.organization.id)
    }

    /// Register a migration source on the target org; returns its id.
    pub async fn create_migration_source(
        &self,
        name: &str,
        url: &str,
        owner_id: &str,
        source_type: &str,
    ) -> ApiResult<String> {
        let data: CreateMigrationSourceData = self
            .graphql(
                CREATE_MIGRATION_SOURCE_MUTATION,
                json!({ "name": name, "url": url, "ownerId": owner_id, "type": source_type }),
            )
            .await?;
        Ok(data.create_migration_source.migration_source.id)
    }

    /// Find an already-registered migration source by name.
    pub async fn find_migration_source(
        &self,
        login: &str,
        name: &str,
    ) -> ApiResult<Option<String>> {
        let data: MigrationSourcesData = self
            .graphql(MIGRATION_SOURCES_QUERY, json!({ "login": login }))
            .await?;
        Ok(data
            .organization
            .migration_sources
            .nodes
            .into_iter()
            .find(|node| node.name == name)
            .map(|node| node.id))
    }

    /// Start a repository migration; returns the migration id.
    pub async fn start_repository_migration(
        &self,
        args: &StartMigrationArgs,
    ) -> ApiResult<String> {
        if let Some(token) = &args.access_token {
            self.redactor.register(token.clone());
        }
        let data: StartMigrationData = self
            .graphql(
                START_MIGRATION_MUTATION,
                json!({
                    "sourceId": args.source_id,
                    "ownerId": args.owner_id,
                    "sourceRepositoryUrl": args.source_repository_url,
                    "repositoryName": args.repository_name,
                    "continueOnError": true,
                    "gitArchiveUrl": args.git_archive_url,
                    "metadataArchiveUrl": args.metadata_archive_url,
                    "accessToken": args.access_token,
                    "skipReleases": args.skip_releases,
                    "lockSource": args.lock_source,
                    "targetRepoVisibility": args.target_repo_visibility,
                }),
            )
            .await?;
        Ok(data.start_repository_migration.repository_migration.id)
    }

    /// Current state of a repository migration.
    pub async fn migration_status(&self, id: &str) -> ApiResult<RemoteJob> {
        let data: MigrationNodeData = self
            .graphql(MIGRATION_STATUS_QUERY, json!({ "id": id }))
            .await?;
        let node = data
            .node
            .ok_or_else(|| ApiError::decode(format!("no migration with id {id}")))?;
        Ok(migration_job(&node))
    }

    /// Request archive generation for one side of a repository export.
    ///
    /// Returns the generation job id.
    pub async fn start_archive_generation(
        &self,
        org: &str,
        repo: &str,
        kind: ArchiveKind,
        opts: &GenerationOptions,
    ) -> ApiResult<String> {
        let body = match kind {
            ArchiveKind::Git => json!({
                "repositories": [repo],
                "lock_repositories": opts.lock_source,
                "exclude_metadata": true,
                "exclude_releases": true,
                "exclude_owner_projects": true,
            }),
            ArchiveKind::Metadata => json!({
                "repositories": [repo],
                "lock_repositories": opts.lock_source,
                "exclude_git_data": true,
                "exclude_releases": opts.skip_releases,
                "exclude_owner_projects": true,
            }),
        };
        let migration: RestMigration = self
            .rest_json(
                HttpMethod::Post,
                &format!("/orgs/{org}/migrations"),
                Some(&body),
            )
            .await?;
        Ok(migration.id.to_string())
    }

    /// Current state of an archive generation job.
    pub async fn archive_generation_status(&self, org: &str, id: &str) -> ApiResult<RemoteJob> {
        let migration: RestMigration = self
            .rest_json(
                HttpMethod::Get,
                &format!("/orgs/{org}/migrations/{id}"),
                None,
            )
            .await?;
        let state = export_state(&migration.state);
        let mut job = RemoteJob::new(migration.id.to_string(), state);
        if state == JobState::Failed {
            job.failure_reason = Some(format!("archive generation reported '{}'", migration.state));
        }
        Ok(job)
    }

    /// Fetch the one-time download URL for a generated archive.
    ///
    /// The endpoint answers with a 302 whose `Location` is a time-limited
    /// link; the transport does not follow redirects, so the link is
    /// captured here.
    pub async fn archive_download_url(&self, org: &str, id: &str) -> ApiResult<String> {
        let url = self.rest_url(&format!("/orgs/{org}/migrations/{id}/archive"));
        let resp = self.send(HttpMethod::Get, &url, None).await?;
        if resp.status != 302 {
            return Err(Self::error_for(&resp));
        }
        resp.header("location")
            .map(str::to_string)
            .ok_or_else(|| ApiError::decode("302 without a Location header"))
    }

    /// Stream all repositories of an organization, page by page.
    pub fn list_org_repos(&self, org: &str) -> impl Stream<Item = ApiResult<RepoSummary>> + Send {
        let first = self.rest_url(&format!("/orgs/{org}/repos?per_page=100"));
        paged::<RestRepo>(self.clone(), first).map_ok(|repo| RepoSummary {
            url: repo
                .clone_url
                .or(repo.html_url)
                .unwrap_or_default(),
            name: repo.name,
        })
    }
}

fn migration_job(node: &MigrationNode) -> RemoteJob {
    let state = match node.state.as_str() {
        "QUEUED" | "NOT_STARTED" | "PENDING_VALIDATION" => JobState::Pending,
        "IN_PROGRESS" => JobState::Running,
        "SUCCEEDED" => JobState::Succeeded,
        "FAILED" | "FAILED_VALIDATION" => JobState::Failed,
        other => {
            tracing::debug!(state = other, "unrecognized migration state, treating as running");
            JobState::Running
        }
    };
    let mut job = RemoteJob::new(node.id.clone(), state);
    job.failure_reason = node.failure_reason.clone();
    job
}

fn export_state(state: &str) -> JobState {
    match state {
        "pending" => JobState::Pending,
        "exporting" => JobState::Running,
        "exported" => JobState::Succeeded,
        "failed" => JobState::Failed,
        other => {
            tracing::debug!(state = other, "unrecognized export state, treating as running");
            JobState::Running
        }
    }
}

/// Archive export capability of an Enterprise Server organization.
///
/// Thin binding of a [`GitHubClient`] to one source org, so the archive
/// pipeline stays protocol-agnostic.
#[derive(Clone)]
pub struct EnterpriseExporter {
    client: GitHubClient,
    org: String,
}

impl EnterpriseExporter {
    #[must_use]
    pub fn new(client: GitHubClient, org: impl Into<String>) -> Self {
        Self {
            client,
            org: org.into(),
        }
    }
}

#[async_trait]
impl ArchiveExporter for EnterpriseExporter {
    async fn begin(
        &self,
        repo: &str,
        kind: ArchiveKind,
        opts: &GenerationOptions,
    ) -> ApiResult<String> {
        self.client
            .start_archive_generation(&self.org, repo, kind, opts)
            .await
    }

    async fn status(&self, job_id: &str) -> ApiResult<RemoteJob> {
        self.client
            .archive_generation_status(&self.org, job_id)
            .await
    }

    async fn download_url(&self, job_id: &str) -> ApiResult<String> {
        self.client.archive_download_url(&self.org, job_id).await
    }
}
