//! Station configuration.
//!
//! Loaded from environment variables, with a `.env` file honoured when present.

use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable required by the chosen setup is unset.
    #[error("Missing required variable {0}")]
    MissingVar(&'static str),

    /// A variable is set but does not parse.
    #[error("Invalid value for {name}: {value:?}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Station configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Local ticket database (`sqlite://...`).
    pub database_url: String,

    /// Remote authority settings; `None` runs the station fully offline.
    pub sync: Option<SyncConfig>,
}

/// Settings for pulling tickets from the ticket authority.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Authority endpoint (`https://...`).
    pub url: String,

    /// Plaintext station identifier sent with every request.
    pub client_id: String,

    /// Base64 station secret key (32 bytes).
    pub client_secret_key: String,

    /// Base64 authority public key (32 bytes).
    pub server_public_key: String,

    /// Period of the background refresher.
    pub interval: Duration,

    /// HTTP request timeout.
    pub timeout: Duration,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret_key", &"<redacted>")
            .field("server_public_key", &self.server_public_key)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

const DEFAULT_DATABASE_URL: &str = "sqlite://gatecheck.db";
const DEFAULT_CLIENT_ID: &str = "station";
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `GATECHECK_DATABASE_URL`: local store (default: `sqlite://gatecheck.db`)
    /// - `GATECHECK_SYNC_URL`: authority endpoint; sync is disabled when unset
    /// - `GATECHECK_CLIENT_ID`: station identifier (default: `station`)
    /// - `GATECHECK_CLIENT_SECRET_KEY`: base64 station secret key (required with sync)
    /// - `GATECHECK_SERVER_PUBLIC_KEY`: base64 authority public key (required with sync)
    /// - `GATECHECK_SYNC_INTERVAL_SECS`: refresh period (default: 300)
    /// - `GATECHECK_HTTP_TIMEOUT_SECS`: request timeout (default: 30)
    ///
    /// # Errors
    ///
    /// See [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingVar`]: sync URL set without both keys
    /// - [`ConfigError::Invalid`]: a numeric variable does not parse
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url =
            get("GATECHECK_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let sync = match get("GATECHECK_SYNC_URL") {
            None => None,
            Some(url) => Some(SyncConfig {
                url,
                client_id: get("GATECHECK_CLIENT_ID")
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                client_secret_key: get("GATECHECK_CLIENT_SECRET_KEY")
                    .ok_or(ConfigError::MissingVar("GATECHECK_CLIENT_SECRET_KEY"))?,
                server_public_key: get("GATECHECK_SERVER_PUBLIC_KEY")
                    .ok_or(ConfigError::MissingVar("GATECHECK_SERVER_PUBLIC_KEY"))?,
                interval: seconds(
                    "GATECHECK_SYNC_INTERVAL_SECS",
                    get("GATECHECK_SYNC_INTERVAL_SECS"),
                    DEFAULT_SYNC_INTERVAL_SECS,
                )?,
                timeout: seconds(
                    "GATECHECK_HTTP_TIMEOUT_SECS",
                    get("GATECHECK_HTTP_TIMEOUT_SECS"),
                    DEFAULT_HTTP_TIMEOUT_SECS,
                )?,
            }),
        };

        Ok(Self { database_url, sync })
    }
}

fn seconds(name: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::Invalid { name, value: raw }),
    }
}
