use chrono::{DateTime, Utc};

/// Normalized lifecycle state of a long-running remote operation.
///
/// Every platform reports job state with its own vocabulary; clients map it
/// into this enum so the engine and the archive pipeline can reason about
/// one set of states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// A terminal state is one from which no further transition occurs.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// A long-running asynchronous operation on a remote platform.
///
/// Reconstructed from every status response, never mutated locally; the
/// remote platform is the source of truth.
#[derive(Debug, Clone)]
pub struct RemoteJob {
    /// Platform-defined opaque identifier.
    pub id: String,
    pub state: JobState,
    /// Platform-reported failure text, verbatim.
    pub failure_reason: Option<String>,
    /// Progress counters, when the platform reports them.
    pub remaining_repositories: Option<u64>,
    pub total_repositories: Option<u64>,
}

impl RemoteJob {
    #[must_use]
    pub fn new(id: impl Into<String>, state: JobState) -> Self {
        Self {
            id: id.into(),
            state,
            failure_reason: None,
            remaining_repositories: None,
            total_repositories: None,
        }
    }
}

/// Rate-limit budget derived from a single response.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    /// Remaining call budget in the current window.
    pub remaining: u64,
    /// When the budget resets.
    pub reset_at: DateTime<Utc>,
}

/// Which side of a repository export an archive carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Git data: refs, objects, packfiles.
    Git,
    /// Metadata: issues, pull requests, releases, and so on.
    Metadata,
}

impl ArchiveKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveKind::Git => "git",
            ArchiveKind::Metadata => "metadata",
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal description of a repository on a source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSummary {
    pub name: String,
    /// HTTP clone URL, used as the canonical source locator.
    pub url: String,
}
