//! Settings loading.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If a JSON file is given, merge its values over the defaults
//! 3. Merge `RELAY_`-prefixed environment variables (highest priority)
//! 4. Validate the result

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::RelaySettings;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RELAY_";

/// Load settings from defaults and the environment only.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from(None)
}

/// Load settings, layering an optional JSON file between the defaults and
/// the environment.
///
/// A missing file is an error when a path is given explicitly.
pub fn load_settings_from(path: Option<&Path>) -> Result<RelaySettings> {
    let mut figment = Figment::new().merge(Serialized::defaults(RelaySettings::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(SettingsError::InvalidValue(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        debug!(?path, "loading settings from file");
        figment = figment.merge(Json::file(path));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let settings: RelaySettings = figment.extract()?;
    validate(&settings)?;
    Ok(settings)
}

/// Routes served regardless of configuration.
const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

fn validate(settings: &RelaySettings) -> Result<()> {
    let server = &settings.server;
    for (name, path) in [
        ("server.sse_path", &server.sse_path),
        ("server.message_path", &server.message_path),
    ] {
        if !path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "{name} must start with '/': {path:?}"
            )));
        }
        if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(SettingsError::InvalidValue(format!(
                "{name} must not contain whitespace or control characters: {path:?}"
            )));
        }
        if RESERVED_PATHS.contains(&path.as_str()) {
            return Err(SettingsError::InvalidValue(format!(
                "{name} collides with a built-in route: {path:?}"
            )));
        }
    }
    if server.sse_path == server.message_path {
        return Err(SettingsError::InvalidValue(
            "server.sse_path and server.message_path must differ".into(),
        ));
    }
    if server.stream_buffer == 0 {
        return Err(SettingsError::InvalidValue(
            "server.stream_buffer must be at least 1".into(),
        ));
    }
    if server.max_body_bytes == 0 {
        return Err(SettingsError::InvalidValue(
            "server.max_body_bytes must be at least 1".into(),
        ));
    }

    let url = settings.broker.url.as_str();
    if !(url.starts_with("memory://") || url.starts_with("redis://") || url.starts_with("rediss://"))
    {
        return Err(SettingsError::InvalidValue(format!(
            "broker.url has unsupported scheme: {url:?}"
        )));
    }

    if settings
        .auth
        .bearer_token
        .as_deref()
        .is_some_and(str::is_empty)
    {
        return Err(SettingsError::InvalidValue(
            "auth.bearer_token must not be empty".into(),
        ));
    }
    Ok(())
}
