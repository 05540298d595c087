//! Migration orchestration.
//!
//! [`MigrationDescriptor`] says what to migrate and how; [`MigrationEngine`]
//! drives one repository migration to an outcome. Errors that look like
//! missing permissions are decorated with remediation guidance in
//! [`remediation`], exactly once.

mod descriptor;
mod engine;
pub mod remediation;

pub use descriptor::{
    ArchiveInput, AzureStorageConfig, MigrationDescriptor, MigrationFlags, MigrationSource,
    S3StorageConfig, StorageSelection,
};
pub use engine::MigrationEngine;

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::platform::ApiError;
use crate::storage::StorageError;

/// What one repository migration amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Started in fire-and-forget mode, or still running after the polling
    /// budget; check later with the migration id.
    Queued { migration_id: String },
    Succeeded,
    /// The platform reported the migration failed; `reason` is verbatim.
    Failed { reason: String },
    /// Nothing to do, e.g. the target repository already exists.
    Skipped { reason: String },
}

#[derive(Debug, Error)]
pub enum MigrateError {
    /// The descriptor is self-contradictory. Raised before any network call.
    #[error("invalid migration descriptor: {0}")]
    Validation(String),

    /// A permission failure, decorated with remediation guidance.
    #[error("{message}\n{remediation}")]
    Permission { message: String, remediation: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
