//! MongoDB connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the MongoDB backend.
///
/// Numeric settings of `0` leave the driver default in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection string.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// User name, when the URI carries no credentials.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for `username`.
    #[serde(default)]
    pub password: Option<String>,

    /// Database holding the user's credentials.
    #[serde(default)]
    pub auth_source: Option<String>,

    /// Maximum number of pooled connections per server.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,

    /// Minimum number of pooled connections per server.
    #[serde(default)]
    pub min_pool_size: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Server selection timeout in milliseconds.
    #[serde(default = "default_server_selection_timeout_ms")]
    pub server_selection_timeout_ms: u64,

    /// Latency window for choosing among suitable servers, in milliseconds.
    #[serde(default)]
    pub local_threshold_ms: u64,

    /// Interval between server monitoring checks, in milliseconds.
    #[serde(default)]
    pub heartbeat_interval_ms: u64,

    /// Application name reported to the server.
    #[serde(default)]
    pub app_name: Option<String>,
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "docmap".to_string()
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_server_selection_timeout_ms() -> u64 {
    30_000
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            username: None,
            password: None,
            auth_source: None,
            max_pool_size: default_max_pool_size(),
            min_pool_size: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
            server_selection_timeout_ms: default_server_selection_timeout_ms(),
            local_threshold_ms: 0,
            heartbeat_interval_ms: 0,
            app_name: None,
        }
    }
}

impl MongoConfig {
    /// Creates a configuration for `uri` and `database` with default settings.
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Reads the configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `DOCMAP_MONGO_URI` (default: "mongodb://localhost:27017")
    /// - `DOCMAP_MONGO_DATABASE` (default: "docmap")
    /// - `DOCMAP_MONGO_USERNAME`, `DOCMAP_MONGO_PASSWORD`, `DOCMAP_MONGO_AUTH_SOURCE`
    /// - `DOCMAP_MONGO_MAX_POOL_SIZE` (default: 10)
    /// - `DOCMAP_MONGO_MIN_POOL_SIZE`
    /// - `DOCMAP_MONGO_CONNECT_TIMEOUT` (default: 10s)
    /// - `DOCMAP_MONGO_SERVER_SELECTION_TIMEOUT` (default: 30s)
    /// - `DOCMAP_MONGO_LOCAL_THRESHOLD`
    /// - `DOCMAP_MONGO_HEARTBEAT_INTERVAL`
    /// - `DOCMAP_MONGO_APP_NAME`
    ///
    /// Durations accept `humantime` strings such as `5s` or `250ms`; a bare
    /// number is taken as milliseconds. Unparseable values fall back to the
    /// default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("DOCMAP_MONGO_{suffix}"));
        let millis = |suffix: &str, default: u64| {
            get(suffix)
                .and_then(|value| parse_millis(&value))
                .unwrap_or(default)
        };
        let defaults = Self::default();

        Self {
            uri: get("URI").unwrap_or(defaults.uri),
            database: get("DATABASE").unwrap_or(defaults.database),
            username: get("USERNAME"),
            password: get("PASSWORD"),
            auth_source: get("AUTH_SOURCE"),
            max_pool_size: get("MAX_POOL_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_pool_size),
            min_pool_size: get("MIN_POOL_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.min_pool_size),
            connect_timeout_ms: millis("CONNECT_TIMEOUT", defaults.connect_timeout_ms),
            server_selection_timeout_ms: millis(
                "SERVER_SELECTION_TIMEOUT",
                defaults.server_selection_timeout_ms,
            ),
            local_threshold_ms: millis("LOCAL_THRESHOLD", defaults.local_threshold_ms),
            heartbeat_interval_ms: millis("HEARTBEAT_INTERVAL", defaults.heartbeat_interval_ms),
            app_name: get("APP_NAME"),
        }
    }

    pub(crate) fn connect_timeout(&self) -> Option<Duration> {
        non_zero(self.connect_timeout_ms)
    }

    pub(crate) fn server_selection_timeout(&self) -> Option<Duration> {
        non_zero(self.server_selection_timeout_ms)
    }

    pub(crate) fn local_threshold(&self) -> Option<Duration> {
        non_zero(self.local_threshold_ms)
    }

    pub(crate) fn heartbeat_interval(&self) -> Option<Duration> {
        non_zero(self.heartbeat_interval_ms)
    }
}

fn non_zero(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse_millis(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(ms) = value.parse::<u64>() {
        return Some(ms);
    }
    humantime::parse_duration(value)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
}
