//! Secret masking for logged request and response payloads.
//!
//! Every client logs the requests it sends and the responses it receives at
//! debug level. Tokens, SAS fragments, and signed URLs must never reach the
//! log output, so all payloads pass through a [`Redactor`] first.

use std::sync::{Arc, RwLock};

const MASK: &str = "***";

/// Replaces registered secret values with `***` in arbitrary text.
///
/// Cheap to clone; clones share the same secret set, so a secret registered
/// on one handle is masked by all of them.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Arc<RwLock<Vec<String>>>,
}

impl Redactor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret value. Empty values are ignored.
    pub fn register(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.is_empty() {
            return;
        }
        let mut secrets = self
            .secrets
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if !secrets.contains(&secret) {
            secrets.push(secret);
        }
    }

    /// Return `text` with every registered secret replaced by `***`.
    #[must_use]
    pub fn mask(&self, text: &str) -> String {
        let secrets = self
            .secrets
            .read()
            .unwrap_or_else(|e| e.into_inner());
        let mut out = text.to_string();
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }
        out
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .secrets
            .read()
            .map(|s| s.len())
            .unwrap_or_default();
        f.debug_struct("Redactor").field("secrets", &count).finish()
    }
}
