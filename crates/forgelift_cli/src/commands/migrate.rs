//! The migrate command: assemble descriptors from flags and config, run
//! them one at a time, and report per-repository outcomes.

use std::path::PathBuf;

use forgelift::migration::{
    ArchiveInput, AzureStorageConfig, MigrationDescriptor, MigrationFlags, MigrationOutcome,
    MigrationSource, S3StorageConfig, StorageSelection,
};

use crate::config::Config;
use crate::{MigrateSource, StorageOptions, TargetOptions};

pub(crate) async fn handle_migrate(
    source: MigrateSource,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let descriptors = descriptors_for(source, config)?;
    let engine = super::build_engine(config)?;

    let total = descriptors.len();
    let mut failures = 0usize;
    for descriptor in &descriptors {
        let repo = &descriptor.source_repo;
        match engine.migrate_repository(descriptor).await {
            Ok(MigrationOutcome::Succeeded) => println!("{repo}: migrated"),
            Ok(MigrationOutcome::Queued { migration_id }) => {
                println!(
                    "{repo}: queued as {migration_id}, check on it with `forgelift status {migration_id}`"
                );
            }
            Ok(MigrationOutcome::Skipped { reason }) => println!("{repo}: skipped, {reason}"),
            Ok(MigrationOutcome::Failed { reason }) => {
                eprintln!("{repo}: failed, {reason}");
                failures += 1;
            }
            Err(e) => {
                eprintln!("{repo}: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} of {total} migrations failed").into());
    }
    Ok(())
}

fn descriptors_for(
    source: MigrateSource,
    config: &Config,
) -> Result<Vec<MigrationDescriptor>, Box<dyn std::error::Error>> {
    match source {
        MigrateSource::Ghes {
            repos,
            org,
            api_url,
            target,
            storage,
        } => {
            let api_url = api_url.or_else(|| config.ghes.api_url.clone()).ok_or(
                "an Enterprise Server API URL is required (--api-url or [ghes] api_url)",
            )?;
            let source = MigrationSource::EnterpriseServer { api_url, org };
            let storage = storage_selection(&storage, config)?;
            build(
                repos,
                source,
                config.ghes.token.clone(),
                storage,
                None,
                None,
                &target,
            )
        }
        MigrateSource::Ado {
            repos,
            project,
            org_url,
            target,
        } => {
            let org_url = org_url.or_else(|| config.ado.org_url.clone()).ok_or(
                "an Azure DevOps organization URL is required (--org-url or [ado] org_url)",
            )?;
            let source = MigrationSource::AzureDevOps { org_url, project };
            build(
                repos,
                source,
                config.ado.token.clone(),
                StorageSelection::default(),
                None,
                None,
                &target,
            )
        }
        MigrateSource::Bitbucket {
            repo,
            project,
            base_url,
            git_archive,
            metadata_archive,
            target,
            storage,
        } => {
            let base_url = base_url.or_else(|| config.bitbucket.base_url.clone()).ok_or(
                "a Bitbucket Server base URL is required (--base-url or [bitbucket] base_url)",
            )?;
            let source = MigrationSource::BitbucketServer { base_url, project };
            let storage = storage_selection(&storage, config)?;
            build(
                vec![repo],
                source,
                config.bitbucket.password.clone(),
                storage,
                Some(archive_input(&git_archive)),
                Some(archive_input(&metadata_archive)),
                &target,
            )
        }
    }
}

fn build(
    repos: Vec<String>,
    source: MigrationSource,
    source_token: Option<String>,
    storage: StorageSelection,
    git_archive: Option<ArchiveInput>,
    metadata_archive: Option<ArchiveInput>,
    target: &TargetOptions,
) -> Result<Vec<MigrationDescriptor>, Box<dyn std::error::Error>> {
    if target.target_repo.is_some() && repos.len() > 1 {
        return Err("--target-repo only applies when migrating a single repository".into());
    }

    let flags = MigrationFlags {
        skip_releases: target.skip_releases,
        lock_source: target.lock_source,
        wait_for_completion: target.wait,
        visibility: target.visibility.clone(),
        retain_archives: target.keep_archives,
    };

    Ok(repos
        .into_iter()
        .map(|repo| {
            let target_repo = target.target_repo.clone().unwrap_or_else(|| repo.clone());
            MigrationDescriptor {
                source: source.clone(),
                source_repo: repo,
                source_token: source_token.clone(),
                target_org: target.target_org.clone(),
                target_repo,
                storage: storage.clone(),
                git_archive: git_archive.clone(),
                metadata_archive: metadata_archive.clone(),
                flags: flags.clone(),
            }
        })
        .collect())
}

/// Resolve the storage flags against configured backend coordinates.
fn storage_selection(
    opts: &StorageOptions,
    config: &Config,
) -> Result<StorageSelection, Box<dyn std::error::Error>> {
    let mut selection = StorageSelection::default();

    if opts.azure_storage {
        selection.azure = Some(AzureStorageConfig {
            account_url: config
                .azure
                .account_url
                .clone()
                .ok_or("--azure-storage needs [azure] account_url")?,
            sas_token: config
                .azure
                .sas_token
                .clone()
                .ok_or("--azure-storage needs a SAS token (FORGELIFT_AZURE__SAS_TOKEN)")?,
        });
    }

    if opts.s3_storage {
        selection.s3 = Some(S3StorageConfig {
            bucket: config
                .s3
                .bucket
                .clone()
                .ok_or("--s3-storage needs [s3] bucket")?,
            region: config
                .s3
                .region
                .clone()
                .ok_or("--s3-storage needs [s3] region")?,
            access_key: config
                .s3
                .access_key
                .clone()
                .ok_or("--s3-storage needs [s3] access_key")?,
            secret_key: config
                .s3
                .secret_key
                .clone()
                .ok_or("--s3-storage needs a secret key (FORGELIFT_S3__SECRET_KEY)")?,
        });
    }

    selection.github_native = opts.github_storage;

    Ok(selection)
}

/// A supplied archive is a URL when it looks like one, a local path
/// otherwise.
fn archive_input(raw: &str) -> ArchiveInput {
    if raw.starts_with("https://") || raw.starts_with("http://") {
        ArchiveInput::Url(raw.to_string())
    } else {
        ArchiveInput::Path(PathBuf::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_inputs_are_classified_by_scheme() {
        assert!(matches!(
            archive_input("https://blobs.example.com/x.tar.gz"),
            ArchiveInput::Url(_)
        ));
        assert!(matches!(
            archive_input("./exports/x.tar.gz"),
            ArchiveInput::Path(_)
        ));
    }

    #[test]
    fn storage_flags_require_configured_coordinates() {
        let opts = StorageOptions {
            azure_storage: true,
            s3_storage: false,
            github_storage: false,
        };
        let err = storage_selection(&opts, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("account_url"));
    }

    #[test]
    fn target_repo_override_is_single_repo_only() {
        let target = TargetOptions {
            target_org: "acme-cloud".to_string(),
            target_repo: Some("renamed".to_string()),
            visibility: None,
            skip_releases: false,
            lock_source: false,
            wait: false,
            keep_archives: false,
        };
        let source = MigrationSource::EnterpriseServer {
            api_url: "https://ghes.example.com/api/v3".to_string(),
            org: "acme".to_string(),
        };
        let err = build(
            vec!["a".to_string(), "b".to_string()],
            source,
            Some("token".to_string()),
            StorageSelection::default(),
            None,
            None,
            &target,
        )
        .unwrap_err();
        assert!(err.to_string().contains("--target-repo"));
    }
}
