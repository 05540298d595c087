//! Central trigger table for permission-error decoration.
//!
//! Remote platforms report missing permissions as free-text messages. When a
//! migration fails with one of the known phrases, a standard remediation
//! hint is appended exactly once, here and nowhere else; outer layers must
//! pass the error through untouched.

use super::MigrateError;

/// Standard guidance appended to recognized permission failures.
pub const REMEDIATION: &str = "Check that the token belongs to an organization owner \
or a user granted the migrator role, and that it carries the repo and admin:org scopes.";

/// Substrings of platform error messages that indicate missing permissions.
const TRIGGERS: &[&str] = &[
    "Resource not accessible by personal access token",
    "Resource not accessible by integration",
    "does not have the correct permissions to execute",
    "must have admin rights",
    "insufficient permission",
];

/// Remediation text for `message`, if it matches a known trigger.
#[must_use]
pub fn remediation_for(message: &str) -> Option<&'static str> {
    TRIGGERS
        .iter()
        .any(|trigger| message.contains(trigger))
        .then_some(REMEDIATION)
}

/// Decorate a recognized permission error, leaving everything else alone.
///
/// Idempotent: an already-decorated error passes through unchanged, so the
/// remediation text can never appear twice.
#[must_use]
pub fn decorate(err: MigrateError) -> MigrateError {
    if matches!(err, MigrateError::Permission { .. }) {
        return err;
    }
    let message = err.to_string();
    match remediation_for(&message) {
        Some(remediation) => MigrateError::Permission {
            message,
            remediation: remediation.to_string(),
        },
        None => err,
    }
}
