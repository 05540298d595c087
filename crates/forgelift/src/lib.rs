//! Forgelift - repository migration between source control platforms.
//!
//! This library moves repositories and their metadata from Enterprise Server,
//! Azure DevOps, and Bitbucket Server sources into a target hosted
//! organization, driving the remote migration APIs to a terminal state.
//!
//! # Example
//!
//! ```ignore
//! use forgelift::{MigrationDescriptor, MigrationEngine, MigrationOutcome};
//! use forgelift::github::GitHubClient;
//! use forgelift::redact::Redactor;
//!
//! let redactor = Redactor::new();
//! let target = GitHubClient::connect("https://api.github.com", &token, redactor.clone(), None)?;
//! let engine = MigrationEngine::new(target, transport, redactor);
//!
//! match engine.migrate_repository(&descriptor).await? {
//!     MigrationOutcome::Succeeded => println!("done"),
//!     MigrationOutcome::Queued { migration_id } => println!("check later: {migration_id}"),
//!     MigrationOutcome::Failed { reason } => eprintln!("failed: {reason}"),
//!     MigrationOutcome::Skipped { reason } => println!("skipped: {reason}"),
//! }
//! ```

pub mod ado;
pub mod archive;
pub mod bitbucket;
pub mod github;
pub mod http;
pub mod migration;
pub mod platform;
pub mod redact;
pub mod retry;
pub mod storage;

pub use migration::{
    ArchiveInput, AzureStorageConfig, MigrateError, MigrationDescriptor, MigrationEngine,
    MigrationFlags, MigrationOutcome, MigrationSource, S3StorageConfig, StorageSelection,
};
pub use platform::{ApiError, ApiRateLimiter, JobState, RemoteJob, rates};
pub use redact::Redactor;
pub use retry::{Backoff, RetryPolicy};
