//! Reactive rate-limit gate shared by all API clients.
//!
//! When a response reports an exhausted quota, the delay until the reset
//! instant is stored here. The *next* request through the same client takes
//! the stored delay (clearing it) and sleeps before sending; the request
//! that produced the headers is never delayed itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::types::RateLimitInfo;

/// Mutex-guarded pending delay.
///
/// The read-compute-clear sequence runs under one lock acquisition, so
/// concurrent callers sharing a client cannot both observe a stale delay or
/// both clear it without waiting: exactly one caller takes the delay and
/// sleeps, the rest proceed.
#[derive(Clone, Default)]
pub struct RateLimitGate {
    pending: Arc<Mutex<Option<Duration>>>,
}

impl RateLimitGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the budget reported by a response.
    ///
    /// Stores `reset_at - now` (floored at zero) when the remaining budget is
    /// exhausted. Does nothing when budget remains.
    pub async fn record(&self, info: &RateLimitInfo) {
        if info.remaining > 0 {
            return;
        }
        let delay = (info.reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            "rate limit exhausted, deferring next call"
        );
        *self.pending.lock().await = Some(delay);
    }

    /// Record an explicit delay (e.g. from a `Retry-After` header).
    pub async fn record_delay(&self, delay: Duration) {
        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            "rate limit delay recorded"
        );
        *self.pending.lock().await = Some(delay);
    }

    /// Consume the stored delay, sleeping for it if one is pending.
    ///
    /// Returns `true` if a sleep was performed.
    pub async fn wait(&self) -> bool {
        let delay = self.pending.lock().await.take();
        match delay {
            Some(delay) if !delay.is_zero() => {
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    "waiting for rate limit reset"
                );
                tokio::time::sleep(delay).await;
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Whether a delay is currently stored.
    pub async fn is_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }
}
