//! Forgelift CLI - command-line interface for repository migrations.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forgelift")]
#[command(version)]
#[command(about = "Migrate repositories between code hosting platforms")]
#[command(
    long_about = "Forgelift moves repositories from Enterprise Server, Azure DevOps or \
Bitbucket Server instances to a cloud target organization. Enterprise Server \
sources are exported as archives, relayed through blob storage and imported; \
Azure DevOps migrations are direct; Bitbucket Server migrations consume \
archives you supply."
)]
#[command(after_long_help = r#"EXAMPLES
    Migrate a repository from an Enterprise Server instance via Azure storage:
        $ forgelift migrate ghes widgets --org acme --target-org acme-cloud --azure-storage --wait

    Migrate several Azure DevOps repositories and check back later:
        $ forgelift migrate ado tools pipelines --project Ops --target-org acme-cloud
        $ forgelift status RM_kgDaACQxOTY

    Migrate from Bitbucket Server with pre-exported archives:
        $ forgelift migrate bitbucket tools --project OPS --target-org acme-cloud \
              --git-archive ./tools-git.tar.gz --metadata-archive ./tools-metadata.tar.gz \
              --azure-storage

CONFIGURATION
    Forgelift reads configuration from:
      1. ~/.config/forgelift/config.toml (or $XDG_CONFIG_HOME/forgelift/config.toml)
      2. ./forgelift.toml in the current directory
      3. Environment variables (FORGELIFT_* prefix)
      4. .env file in the current directory

ENVIRONMENT VARIABLES
    FORGELIFT_TARGET__TOKEN        Target personal access token
    FORGELIFT_GHES__TOKEN          Enterprise Server personal access token
    FORGELIFT_ADO__TOKEN           Azure DevOps personal access token
    FORGELIFT_BITBUCKET__PASSWORD  Bitbucket Server password or token
    FORGELIFT_AZURE__SAS_TOKEN     Azure Blob Storage SAS token
    FORGELIFT_S3__SECRET_KEY       S3 secret access key
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate repositories from a source platform
    Migrate {
        #[command(subcommand)]
        source: MigrateSource,
    },
    /// Show the status of a previously queued migration
    Status {
        /// Migration identifier printed when the migration was queued
        migration_id: String,
    },
}

#[derive(Subcommand)]
enum MigrateSource {
    /// From an Enterprise Server instance (archive-based)
    Ghes {
        /// Repository name(s) on the source organization
        #[arg(required = true)]
        repos: Vec<String>,

        /// Source organization
        #[arg(short = 'o', long)]
        org: String,

        /// REST API root, usually https://host/api/v3 (or from config/env)
        #[arg(long)]
        api_url: Option<String>,

        #[command(flatten)]
        target: TargetOptions,

        #[command(flatten)]
        storage: StorageOptions,
    },
    /// From an Azure DevOps organization (direct)
    Ado {
        /// Repository name(s) in the source project
        #[arg(required = true)]
        repos: Vec<String>,

        /// Source project
        #[arg(short = 'p', long)]
        project: String,

        /// Organization URL, e.g. https://dev.azure.com/my-org (or from config/env)
        #[arg(long)]
        org_url: Option<String>,

        #[command(flatten)]
        target: TargetOptions,
    },
    /// From a Bitbucket Server instance (supplied archives)
    Bitbucket {
        /// Repository slug on the source project
        repo: String,

        /// Source project key
        #[arg(short = 'p', long)]
        project: String,

        /// Instance base URL (or from config/env)
        #[arg(long)]
        base_url: Option<String>,

        /// Git archive: a local tarball path or a URL the target can fetch
        #[arg(long)]
        git_archive: String,

        /// Metadata archive: a local tarball path or a URL the target can fetch
        #[arg(long)]
        metadata_archive: String,

        #[command(flatten)]
        target: TargetOptions,

        #[command(flatten)]
        storage: StorageOptions,
    },
}

/// Target-side options shared by every source platform.
#[derive(Debug, Clone, clap::Args)]
struct TargetOptions {
    /// Target organization
    #[arg(short = 't', long)]
    target_org: String,

    /// Target repository name (defaults to the source name; single repo only)
    #[arg(long)]
    target_repo: Option<String>,

    /// Target repository visibility (private, internal, public)
    #[arg(long)]
    visibility: Option<String>,

    /// Skip migrating release data
    #[arg(long)]
    skip_releases: bool,

    /// Lock the source repository for the duration of the migration
    #[arg(long)]
    lock_source: bool,

    /// Wait for each migration to reach a terminal state
    #[arg(short = 'w', long)]
    wait: bool,

    /// Keep downloaded archive staging files instead of deleting them
    #[arg(long)]
    keep_archives: bool,
}

/// Blob storage backend selection. The backends are mutually exclusive;
/// their coordinates come from config or FORGELIFT_* environment variables.
#[derive(Debug, Clone, clap::Args)]
struct StorageOptions {
    /// Upload archives to Azure Blob Storage ([azure] config section)
    #[arg(long)]
    azure_storage: bool,

    /// Upload archives to S3 via presigned URLs ([s3] config section)
    #[arg(long)]
    s3_storage: bool,

    /// Upload archives to the target platform's own archive store
    #[arg(long)]
    github_storage: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("forgelift=info,forgelift_cli=info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate { source } => {
            commands::migrate::handle_migrate(source, &config).await?;
        }
        Commands::Status { migration_id } => {
            commands::status::handle_status(&migration_id, &config).await?;
        }
    }

    Ok(())
}
