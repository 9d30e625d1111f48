use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Seconds to wait for the sign-in redirect when the file does not say
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

pub const ENV_CLIENT_ID: &str = "HALO_STATS_CLIENT_ID";
pub const ENV_REDIRECT_URI: &str = "HALO_STATS_REDIRECT_URI";

/// On-disk shape of `config.toml`; every field is optional until validated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfig {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub token_path: Option<PathBuf>,
    pub callback_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

/// Validated application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub client_id: String,
    pub redirect_uri: Url,
    /// `None` means the default data directory location
    pub token_path: Option<PathBuf>,
    /// `None` waits for the sign-in redirect forever
    pub callback_timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl RawConfig {
    /// Apply environment overrides on top of the file values
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            self.client_id = Some(client_id);
        }
        if let Some(redirect_uri) = lookup(ENV_REDIRECT_URI) {
            self.redirect_uri = Some(redirect_uri);
        }
        self
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn callback_timeout(secs: Option<u64>) -> Option<Duration> {
    match secs.unwrap_or(DEFAULT_CALLBACK_TIMEOUT_SECS) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}
