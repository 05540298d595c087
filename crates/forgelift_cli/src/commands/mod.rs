//! Command handlers.

pub(crate) mod migrate;
pub(crate) mod status;

use std::sync::Arc;

use forgelift::github::GitHubClient;
use forgelift::http::ReqwestTransport;
use forgelift::migration::MigrationEngine;
use forgelift::platform::{rates, ApiRateLimiter};
use forgelift::redact::Redactor;

use crate::config::Config;

/// Build a migration engine against the configured target.
pub(crate) fn build_engine(config: &Config) -> Result<MigrationEngine, Box<dyn std::error::Error>> {
    let token = config
        .target
        .token
        .as_deref()
        .ok_or("a target token is required (set FORGELIFT_TARGET__TOKEN or [target] token)")?;

    let redactor = Redactor::new();
    let transport = Arc::new(ReqwestTransport::new()?);
    let target = GitHubClient::new(
        config.target.api_url(),
        token,
        redactor.clone(),
        Some(ApiRateLimiter::new(rates::GITHUB_DEFAULT_RPS)),
        transport.clone(),
    );

    Ok(MigrationEngine::new(target, transport, redactor))
}
