pub mod config;
mod loader;

pub use config::{AppConfig, RawConfig};
pub use loader::{ConfigError, default_config_path, load, load_with_env, parse};
