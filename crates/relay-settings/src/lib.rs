//! # relay-settings
//!
//! Configuration for the relay, loaded in layers:
//!
//! 1. Compiled [`RelaySettings::default()`]
//! 2. Optional JSON file
//! 3. `RELAY_`-prefixed environment variables (`__` separates nested keys,
//!    e.g. `RELAY_SERVER__PORT=8080`)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{ENV_PREFIX, load_settings, load_settings_from};
pub use types::{
    AuthSettings, BrokerSettings, ImageSettings, LoggingSettings, RelaySettings, ServerSettings,
};
