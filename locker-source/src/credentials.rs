use std::path::PathBuf;

use crate::error::SourceError;

/// Credentials and endpoint configuration for the catalog API.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub host: String,
    pub api_key: String,
    /// Optional per-user token for endpoints that require one.
    pub user_token: Option<String>,
}

/// Where a credential field's value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from an environment variable.
    EnvVar(&'static str),
    /// Loaded from the config file.
    ConfigFile,
    /// Hard-coded default value.
    Default,
    /// Not set anywhere.
    Missing,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnvVar(var) => write!(f, "env ${}", var),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
            Self::Missing => write!(f, "not set"),
        }
    }
}

/// Provenance of each credential field.
#[derive(Debug)]
pub struct CredentialSources {
    pub host: CredentialSource,
    pub api_key: CredentialSource,
    pub user_token: CredentialSource,
}

/// TOML config file format.
#[derive(Debug, serde::Deserialize, serde::Serialize)]
struct ConfigFile {
    catalog: Option<CatalogConfig>,
}

#[derive(Debug, serde::Deserialize, serde::Serialize)]
struct CatalogConfig {
    host: Option<String>,
    api_key: Option<String>,
    user_token: Option<String>,
}

const DEFAULT_HOST: &str = "https://catalog.example.invalid";

impl Credentials {
    /// Load credentials from environment variables or the config file.
    ///
    /// Priority: env vars > config file > default (host only).
    /// Required: api_key. Optional: host, user_token.
    pub fn load() -> Result<Self, SourceError> {
        let config = load_config_file();

        let host = std::env::var("LOCKER_CATALOG_HOST")
            .ok()
            .or_else(|| config.as_ref().and_then(|c| c.host.clone()))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let api_key = std::env::var("LOCKER_CATALOG_KEY")
            .ok()
            .or_else(|| config.as_ref().and_then(|c| c.api_key.clone()))
            .ok_or_else(|| {
                SourceError::Config(
                    "Missing api_key. Set LOCKER_CATALOG_KEY env var or add to config file"
                        .to_string(),
                )
            })?;

        let user_token = std::env::var("LOCKER_CATALOG_TOKEN")
            .ok()
            .or_else(|| config.as_ref().and_then(|c| c.user_token.clone()));

        Ok(Self {
            host,
            api_key,
            user_token,
        })
    }

    /// Report where each field's value would come from, for logging.
    pub fn sources() -> CredentialSources {
        let config = load_config_file();
        let from = |var: &'static str, in_config: bool, default: bool| {
            if std::env::var(var).is_ok() {
                CredentialSource::EnvVar(var)
            } else if in_config {
                CredentialSource::ConfigFile
            } else if default {
                CredentialSource::Default
            } else {
                CredentialSource::Missing
            }
        };
        CredentialSources {
            host: from(
                "LOCKER_CATALOG_HOST",
                config.as_ref().is_some_and(|c| c.host.is_some()),
                true,
            ),
            api_key: from(
                "LOCKER_CATALOG_KEY",
                config.as_ref().is_some_and(|c| c.api_key.is_some()),
                false,
            ),
            user_token: from(
                "LOCKER_CATALOG_TOKEN",
                config.as_ref().is_some_and(|c| c.user_token.is_some()),
                false,
            ),
        }
    }
}

/// Path of the TOML config file.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("locker").join("config.toml"))
}

fn load_config_file() -> Option<CatalogConfig> {
    let path = config_path()?;
    let contents = std::fs::read_to_string(path).ok()?;
    let parsed: ConfigFile = toml::from_str(&contents).ok()?;
    parsed.catalog
}
