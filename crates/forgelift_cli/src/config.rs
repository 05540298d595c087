//! Configuration file support for forgelift.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `FORGELIFT_`, with `__` between
//!    section and field, e.g., `FORGELIFT_TARGET__TOKEN`; the double
//!    underscore keeps snake_case field names like `sas_token` intact)
//! 3. Config file (~/.config/forgelift/config.toml or ./forgelift.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [target]
//! api_url = "https://api.github.com"  # optional, this is the default
//! token = "ghp_..."                    # or FORGELIFT_TARGET__TOKEN
//!
//! [ghes]
//! api_url = "https://ghes.example.com/api/v3"
//! token = "..."                        # or FORGELIFT_GHES__TOKEN
//!
//! [ado]
//! org_url = "https://dev.azure.com/my-org"
//! token = "..."                        # or FORGELIFT_ADO__TOKEN
//!
//! [bitbucket]
//! base_url = "https://bitbucket.example.com"
//! username = "svc-migration"
//! password = "..."                     # or FORGELIFT_BITBUCKET__PASSWORD
//!
//! [azure]
//! account_url = "https://myaccount.blob.core.windows.net"
//! sas_token = "sv=..."                 # or FORGELIFT_AZURE__SAS_TOKEN
//!
//! [s3]
//! bucket = "my-migration-bucket"
//! region = "eu-west-1"
//! access_key = "AKIA..."
//! secret_key = "..."                   # or FORGELIFT_S3__SECRET_KEY
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target platform (migration destination).
    pub target: TargetConfig,
    /// Enterprise Server source.
    pub ghes: GhesConfig,
    /// Azure DevOps source.
    pub ado: AdoConfig,
    /// Bitbucket Server source.
    pub bitbucket: BitbucketConfig,
    /// Azure Blob Storage backend.
    pub azure: AzureConfig,
    /// S3 storage backend.
    pub s3: S3Config,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Target API root. Defaults to the public API.
    pub api_url: Option<String>,
    /// Target personal access token.
    /// Can also be set via FORGELIFT_TARGET__TOKEN.
    pub token: Option<String>,
}

impl TargetConfig {
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or(forgelift::github::DOTCOM_API_URL)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GhesConfig {
    /// REST API root, usually `https://host/api/v3`.
    pub api_url: Option<String>,
    /// Can also be set via FORGELIFT_GHES__TOKEN.
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdoConfig {
    /// Organization URL, e.g. `https://dev.azure.com/my-org`.
    pub org_url: Option<String>,
    /// Can also be set via FORGELIFT_ADO__TOKEN.
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BitbucketConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    /// Can also be set via FORGELIFT_BITBUCKET__PASSWORD.
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub account_url: Option<String>,
    /// Can also be set via FORGELIFT_AZURE__SAS_TOKEN.
    pub sas_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    /// Can also be set via FORGELIFT_S3__SECRET_KEY.
    pub secret_key: Option<String>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/forgelift/config.toml)
    /// 3. Local config file (./forgelift.toml)
    /// 4. Environment variables with FORGELIFT_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "forgelift") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("forgelift.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./forgelift.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(env_source());

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }
}

/// `FORGELIFT_` prefixed environment variables. The section/field separator
/// is a double underscore so snake_case fields survive the split:
/// `FORGELIFT_AZURE__SAS_TOKEN` maps to `azure.sas_token`.
fn env_source() -> Environment {
    Environment::with_prefix("FORGELIFT")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_fields_bind_from_the_environment() {
        std::env::set_var("FORGELIFT_TARGET__TOKEN", "ghp_from_env");
        std::env::set_var("FORGELIFT_AZURE__SAS_TOKEN", "sv=from_env");
        std::env::set_var("FORGELIFT_S3__SECRET_KEY", "s3_from_env");

        let settings = ConfigBuilder::builder()
            .add_source(env_source())
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.target.token.as_deref(), Some("ghp_from_env"));
        assert_eq!(config.azure.sas_token.as_deref(), Some("sv=from_env"));
        assert_eq!(config.s3.secret_key.as_deref(), Some("s3_from_env"));

        std::env::remove_var("FORGELIFT_TARGET__TOKEN");
        std::env::remove_var("FORGELIFT_AZURE__SAS_TOKEN");
        std::env::remove_var("FORGELIFT_S3__SECRET_KEY");
    }
}
