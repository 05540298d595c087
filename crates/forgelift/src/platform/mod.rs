//! Types and plumbing shared by all platform API clients.
//!
//! - [`types`] — normalized job model, rate-limit budget, archive kinds
//! - [`gate`] — reactive rate-limit delay, applied to the *next* call
//! - [`limiter`] — proactive request pacing (governor)
//! - [`errors`] — the typed HTTP/API error every client raises

mod errors;
mod gate;
mod limiter;
mod types;

pub use errors::{ApiError, ApiResult};
pub use gate::RateLimitGate;
pub use limiter::{ApiRateLimiter, rates};
pub use types::{ArchiveKind, JobState, RateLimitInfo, RemoteJob, RepoSummary};

/// Product identifier sent with every request, as some platforms reject
/// requests without a user agent.
pub const PRODUCT_ID: &str = concat!("forgelift/", env!("CARGO_PKG_VERSION"));
