//! Environment-driven configuration.
//!
//! Supported variables:
//!
//! - `PINSYNC_STORE`: store root (default `./pinsync-store`)
//! - `PINSYNC_SOURCE`: source root locator, required by `update`
//! - `PINSYNC_RAW_NAME`: mutable name of the raw tree (default `raw`)
//! - `PINSYNC_PRODUCTION_NAME`: mutable name of the production tree (default `production`)
//! - `PINSYNC_VERIFY`: fetch nodes back after submitting them (default false)
//! - `PINSYNC_GATEWAY`: prefix for printed locators (default `gateway`)
//! - `PINSYNC_TIMEOUT_MS`: short timeout in milliseconds (default 2000, long is 30x)
//! - `PINSYNC_RECORD`: build record path (default `./current/build.json`)
//!
//! Blank values count as unset.

use crate::client::Timeouts;
use crate::error::{Error, Result};
use crate::locator::{Locator, non_blank};
use crate::record::DEFAULT_RECORD_PATH;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORE_PATH: &str = "./pinsync-store";
pub const DEFAULT_RAW_NAME: &str = "raw";
pub const DEFAULT_PRODUCTION_NAME: &str = "production";
pub const DEFAULT_GATEWAY: &str = "gateway";
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub store: PathBuf,
    pub source: Option<Locator>,
    pub raw_name: String,
    pub production_name: String,
    pub verify: bool,
    pub gateway: String,
    pub timeouts: Timeouts,
    pub record: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: PathBuf::from(DEFAULT_STORE_PATH),
            source: None,
            raw_name: DEFAULT_RAW_NAME.to_string(),
            production_name: DEFAULT_PRODUCTION_NAME.to_string(),
            verify: false,
            gateway: DEFAULT_GATEWAY.to_string(),
            timeouts: Timeouts::from_short(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            record: PathBuf::from(DEFAULT_RECORD_PATH),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a variable is set but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_blank(lookup(key));
        let mut config = Config::default();

        if let Some(store) = get("PINSYNC_STORE") {
            config.store = PathBuf::from(store);
        }
        if let Some(source) = get("PINSYNC_SOURCE") {
            let locator = Locator::parse(&source)
                .map_err(|e| Error::invalid_config("PINSYNC_SOURCE", e.to_string()))?;
            config.source = Some(locator);
        }
        if let Some(name) = get("PINSYNC_RAW_NAME") {
            config.raw_name = name;
        }
        if let Some(name) = get("PINSYNC_PRODUCTION_NAME") {
            config.production_name = name;
        }
        if let Some(verify) = get("PINSYNC_VERIFY") {
            config.verify = parse_bool("PINSYNC_VERIFY", &verify)?;
        }
        if let Some(gateway) = get("PINSYNC_GATEWAY") {
            config.gateway = gateway;
        }
        if let Some(timeout) = get("PINSYNC_TIMEOUT_MS") {
            let ms = timeout.parse::<u64>().map_err(|e| {
                Error::invalid_config("PINSYNC_TIMEOUT_MS", format!("must be milliseconds: {}", e))
            })?;
            if ms == 0 {
                return Err(Error::invalid_config("PINSYNC_TIMEOUT_MS", "must be positive"));
            }
            config.timeouts = Timeouts::from_short(Duration::from_millis(ms));
        }
        if let Some(record) = get("PINSYNC_RECORD") {
            config.record = PathBuf::from(record);
        }

        Ok(config)
    }

    /// The source locator, or an error naming the variable to set.
    pub fn require_source(&self) -> Result<&Locator> {
        self.source
            .as_ref()
            .ok_or_else(|| Error::invalid_config("PINSYNC_SOURCE", "a source locator is required"))
    }
}

/// Parse a boolean setting.
pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::invalid_config(
            key,
            format!("expected a boolean (true/false/1/0/yes/no/on/off), got {}", other),
        )),
    }
}
