use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::{
    AppConfig, ENV_CLIENT_ID, ENV_REDIRECT_URI, RawConfig, callback_timeout, non_empty,
};

/// Location of `config.toml` inside the platform config directory
#[instrument(level = "debug")]
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs = ProjectDirs::from("", "", "halo-stats").ok_or_else(|| {
        error!(
            "Failed to determine project directories - this usually indicates an unsupported OS or missing home directory"
        );
        ConfigError::ProjectDirectoriesUnavailable
    })?;

    let path = proj_dirs.config_dir().join("config.toml");
    debug!("Config path resolved to: {}", path.display());
    Ok(path)
}

/// Load the configuration from `path` (or the default location),
/// applying overrides from the process environment
pub async fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok()).await
}

#[instrument(skip(lookup), level = "info")]
pub async fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_file = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if (tokio::fs::metadata(&config_file).await).is_err() {
        error!("Config file does not exist: {}", config_file.display());
        return Err(ConfigError::ConfigFileNotFound { path: config_file });
    }

    let content = tokio::fs::read_to_string(&config_file)
        .await
        .context("Failed to read config.toml file")
        .map_err(|e| {
            error!("Failed to read config file {}: {}", config_file.display(), e);
            ConfigError::ConfigFileReadFailed {
                path: config_file.clone(),
                source: e,
            }
        })?;

    debug!(
        "Successfully read {} bytes from {}",
        content.len(),
        config_file.display()
    );

    let config = parse(&content, &config_file, lookup)?;
    info!("Loaded configuration from {}", config_file.display());
    Ok(config)
}

/// Parse and validate TOML content; `path` is only used in error messages
pub fn parse<F>(content: &str, path: &Path, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw: RawConfig = toml::from_str(content)
        .context("Failed to parse config.toml file")
        .map_err(|e| {
            error!("Failed to parse config file {}: {}", path.display(), e);
            ConfigError::ConfigParsingFailed {
                path: path.to_path_buf(),
                source: e,
            }
        })?;

    validate(raw.with_env(lookup), path)
}

fn validate(raw: RawConfig, path: &Path) -> Result<AppConfig, ConfigError> {
    let client_id = non_empty(raw.client_id).ok_or_else(|| ConfigError::MissingField {
        path: path.to_path_buf(),
        field: "client_id",
        env: ENV_CLIENT_ID,
    })?;

    let redirect = non_empty(raw.redirect_uri).ok_or_else(|| ConfigError::MissingField {
        path: path.to_path_buf(),
        field: "redirect_uri",
        env: ENV_REDIRECT_URI,
    })?;

    let redirect_uri = Url::parse(&redirect)
        .with_context(|| format!("'{}' is not a valid URL", redirect))
        .map_err(|e| ConfigError::InvalidRedirectUri {
            path: path.to_path_buf(),
            source: e,
        })?;

    if redirect_uri.port_or_known_default().is_none() || redirect_uri.host_str().is_none() {
        return Err(ConfigError::InvalidRedirectUri {
            path: path.to_path_buf(),
            source: anyhow::anyhow!("'{}' has no host or port to listen on", redirect_uri),
        });
    }

    Ok(AppConfig {
        client_id,
        redirect_uri,
        token_path: raw.token_path,
        callback_timeout: callback_timeout(raw.callback_timeout_secs),
        user_agent: non_empty(raw.user_agent),
    })
}


#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Project directories are unavailable - this usually indicates an unsupported OS or missing home directory"
    )]
    ProjectDirectoriesUnavailable,

    #[error("Config file not found: '{path}'")]
    ConfigFileNotFound { path: PathBuf },

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileReadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParsingFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Missing required setting '{field}' in '{path}' (or set {env})")]
    MissingField {
        path: PathBuf,
        field: &'static str,
        env: &'static str,
    },

    #[error("Invalid redirect_uri in '{path}': {source}")]
    InvalidRedirectUri {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
