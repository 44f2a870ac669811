//! Configuration loading.
//!
//! Settings come from an optional config file, then `RELAY_`-prefixed
//! environment variables (`__` separates nested keys, so
//! `RELAY_SERVER__HTTP_PORT=8081` sets `server.http_port`), and finally the
//! bare `PORT` / `HTTP_PORT` variables understood by older deployments.
//! Anything left unset falls back to [`Settings::default`].

mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{LoggingSettings, RelaySettings, ServerSettings, Settings, StorageSettings};

pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Loads the configuration from `config/default` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from `path` (extension optional) and the environment,
/// merged with default values.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("server.ws_port", std::env::var("PORT").ok())?
        .set_override_option("server.http_port", std::env::var("HTTP_PORT").ok())?
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
