//! Proactive request pacing using the governor crate.
//!
//! The [`RateLimitGate`](super::RateLimitGate) reacts to exhausted quotas;
//! this limiter spreads requests out in the first place so the gate rarely
//! has to engage.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default pacing per platform (requests per second).
pub mod rates {
    /// GitHub-flavored APIs: 5000 requests/hour core budget; 10/sec allows
    /// bursts without draining the window.
    pub const GITHUB_DEFAULT_RPS: u32 = 10;
    /// Azure DevOps: throttled by consumed TSTUs rather than a fixed count,
    /// conservative default.
    pub const ADO_DEFAULT_RPS: u32 = 5;
    /// Bitbucket Server: varies by instance configuration.
    pub const BITBUCKET_DEFAULT_RPS: u32 = 5;
}

/// A standalone API rate limiter.
///
/// Cheap to clone; clones share the same token bucket.
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a limiter allowing `requests_per_second` requests (minimum 1).
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until a request is allowed.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}
