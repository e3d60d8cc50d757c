use std::path::PathBuf;
use std::time::Duration;

use comic_core::CachePolicy;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate_limit::{RateLimit, RateLimitParseError};

/// Environment variable naming the optional TOML settings file.
pub const CONFIG_PATH_VAR: &str = "COMICS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "comics.toml";

const ENV_KEYS: &[&str] = &[
    "host_address",
    "info",
    "images",
    "rate_limit",
    "bind",
    "cache_max_entries",
    "cache_ttl_secs",
    "request_timeout_secs",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Upstream base URL, prefixed verbatim to `{id}/{info}`.
    pub host_address: String,
    /// Metadata suffix, e.g. `info.0.json`.
    pub info: String,
    /// Directory images are downloaded into.
    pub images: PathBuf,
    /// Per-route, per-client limit such as `5/minute`.
    pub rate_limit: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub cache_max_entries: Option<usize>,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    /// Upstream request timeout; 0 disables it.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Serialize)]
struct Defaults {
    bind: String,
    request_timeout_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid rate_limit: {0}")]
    RateLimit(#[from] RateLimitParseError),
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

impl Settings {
    /// Defaults, then the TOML file, then environment variables.
    pub fn figment() -> Figment {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Figment::from(Serialized::defaults(Defaults {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
        }))
        .merge(Toml::file(path))
        .merge(Env::raw().only(ENV_KEYS))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host_address.trim().is_empty() {
            return Err(ConfigError::Empty("host_address"));
        }
        if self.info.trim().is_empty() {
            return Err(ConfigError::Empty("info"));
        }
        if self.images.as_os_str().is_empty() {
            return Err(ConfigError::Empty("images"));
        }
        self.parsed_rate_limit()?;
        Ok(())
    }

    pub fn parsed_rate_limit(&self) -> Result<RateLimit, RateLimitParseError> {
        self.rate_limit.parse()
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            max_entries: self.cache_max_entries,
            ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
