//! Health check for a document store.
//!
//! [`HealthChecker`] pings the store under a timeout and turns the result
//! into a serializable [`HealthReport`]:
//!
//! ```json
//! { "name": "mongo", "status": "down", "data": { "error": "timeout after 5000ms waiting for mongodb" } }
//! ```
//!
//! [`ServerInfoChecker`] does the same with the server status and reports
//! the server version under `data.version`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::DocumentStore;
use crate::error::BackendError;

/// Default name reported by a checker.
pub const DEFAULT_NAME: &str = "mongo";

/// Default time allowed for the ping.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The store answered in time.
    Up,
    /// The store failed or timed out.
    Down,
}

/// Outcome of one health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Name of the checked dependency.
    pub name: String,
    /// Overall status.
    pub status: HealthStatus,
    /// Details; holds `error` when the check failed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl HealthReport {
    /// Returns `true` if the status is [`HealthStatus::Up`].
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

/// Pings a store with a timeout.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    name: String,
    timeout: Duration,
    store: Arc<dyn DocumentStore>,
}

impl HealthChecker {
    /// Creates a checker named `"mongo"` with a 5 second timeout.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            store,
        }
    }

    /// Sets the reported name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the ping timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reported name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ping timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pings the store, failing with [`BackendError::Timeout`] when it does
    /// not answer in time.
    pub async fn check(&self) -> Result<(), BackendError> {
        within(self.store.as_ref(), self.timeout, self.store.ping()).await
    }

    /// Runs [`check`](Self::check) and builds a report.
    pub async fn build(&self) -> HealthReport {
        let mut data = BTreeMap::new();
        let status = match self.check().await {
            Ok(()) => {
                debug!(name = %self.name, "health check passed");
                HealthStatus::Up
            }
            Err(err) => {
                warn!(name = %self.name, error = %err, "health check failed");
                data.insert(
                    "error".to_string(),
                    serde_json::Value::String(err.to_string()),
                );
                HealthStatus::Down
            }
        };
        HealthReport {
            name: self.name.clone(),
            status,
            data,
        }
    }
}

/// Reads the server version with a timeout.
#[derive(Debug, Clone)]
pub struct ServerInfoChecker {
    name: String,
    timeout: Duration,
    store: Arc<dyn DocumentStore>,
}

impl ServerInfoChecker {
    /// Creates a checker named `"mongo"` with a 5 second timeout.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            store,
        }
    }

    /// Sets the reported name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `{"version": ...}`; empty when the backend reports no version.
    pub async fn check(&self) -> Result<BTreeMap<String, serde_json::Value>, BackendError> {
        let version = within(
            self.store.as_ref(),
            self.timeout,
            self.store.server_version(),
        )
        .await?;
        let mut data = BTreeMap::new();
        if let Some(version) = version {
            data.insert("version".to_string(), serde_json::Value::String(version));
        }
        Ok(data)
    }

    /// Runs [`check`](Self::check) and builds a report.
    pub async fn build(&self) -> HealthReport {
        match self.check().await {
            Ok(data) => HealthReport {
                name: self.name.clone(),
                status: HealthStatus::Up,
                data,
            },
            Err(err) => {
                warn!(name = %self.name, error = %err, "server info check failed");
                let mut data = BTreeMap::new();
                data.insert(
                    "error".to_string(),
                    serde_json::Value::String(err.to_string()),
                );
                HealthReport {
                    name: self.name.clone(),
                    status: HealthStatus::Down,
                    data,
                }
            }
        }
    }
}

async fn within<T, F>(
    store: &dyn DocumentStore,
    timeout: Duration,
    call: F,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout {
            backend_name: store.name().to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
