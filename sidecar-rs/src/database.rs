//! Database connection health checks
//!
//! Connections are registered by the host application and re-checked on
//! demand. Only Qdrant is understood; it is probed through its REST API
//! (`GET /collections`). Every failure is folded into an unhealthy
//! [`DatabaseHealth`] rather than an error, since these reports are advisory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::errors::{Result, SidecarError};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_QDRANT_PORT: u16 = 6333;
const QDRANT: &str = "qdrant";

fn default_connection_type() -> String {
    QDRANT.to_string()
}

fn default_timeout() -> Option<u64> {
    Some(DEFAULT_TIMEOUT_SECONDS)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConnectionConfig {
    pub connection_string: String,
    #[serde(default = "default_connection_type")]
    pub connection_type: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: Option<u64>,
}

impl DatabaseConnectionConfig {
    pub fn qdrant(connection_string: impl Into<String>) -> Self {
        DatabaseConnectionConfig {
            connection_string: connection_string.into(),
            connection_type: default_connection_type(),
            timeout_seconds: default_timeout(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    fn is_qdrant(&self) -> bool {
        self.connection_type.eq_ignore_ascii_case(QDRANT)
    }

    /// Registry key: `qdrant_<last path segment>` or `qdrant_default`
    pub fn connection_name(&self) -> String {
        if !self.is_qdrant() {
            return format!("unknown_{}", self.connection_type);
        }
        match self.connection_string.rsplit_once('/') {
            Some((_, last)) => format!("{}_{}", QDRANT, last),
            None => format!("{}_default", QDRANT),
        }
    }
}

/// Outcome of one health check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseHealth {
    pub connection_name: String,
    pub is_healthy: bool,
    pub response_time_ms: f64,
    pub last_check: DateTime<Utc>,
    pub error_message: Option<String>,
    pub details: Option<Value>,
}

impl DatabaseHealth {
    fn unhealthy(connection_name: String, started: Option<Instant>, message: String) -> Self {
        DatabaseHealth {
            connection_name,
            is_healthy: false,
            response_time_ms: started.map(elapsed_ms).unwrap_or(0.0),
            last_check: Utc::now(),
            error_message: Some(message),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseHealthSummary {
    pub overall_healthy: bool,
    pub total_connections: usize,
    pub healthy_connections: usize,
    pub unhealthy_connections: usize,
    pub connections: Vec<DatabaseHealth>,
    pub last_check: DateTime<Utc>,
}

impl DatabaseHealthSummary {
    fn from_checks(connections: Vec<DatabaseHealth>) -> Self {
        let healthy = connections.iter().filter(|c| c.is_healthy).count();
        let total = connections.len();
        DatabaseHealthSummary {
            overall_healthy: healthy == total,
            total_connections: total,
            healthy_connections: healthy,
            unhealthy_connections: total - healthy,
            connections,
            last_check: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredConnection {
    pub config: DatabaseConnectionConfig,
    pub last_health_check: DatabaseHealth,
    pub registered_at: DateTime<Utc>,
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Base URL of a Qdrant REST endpoint
///
/// `http(s)://...` strings are used as-is; anything else is `host[:port]`.
pub fn qdrant_base_url(connection_string: &str) -> Result<String> {
    if connection_string.starts_with("http") {
        return Ok(connection_string.trim_end_matches('/').to_string());
    }

    let mut parts = connection_string.splitn(2, ':');
    let host = parts.next().filter(|h| !h.is_empty()).unwrap_or("localhost");
    let port = match parts.next() {
        Some(port) => port.parse::<u16>().map_err(|e| {
            SidecarError::Database(format!("Invalid port in {:?}: {}", connection_string, e))
        })?,
        None => DEFAULT_QDRANT_PORT,
    };
    Ok(format!("http://{}:{}", host, port))
}

/// Registered connections and the HTTP client used to check them
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    client: reqwest::Client,
    connections: RwLock<BTreeMap<String, RegisteredConnection>>,
    last_check: RwLock<Option<DateTime<Utc>>>,
}

impl DatabaseRegistry {
    pub fn new(client: reqwest::Client) -> Self {
        DatabaseRegistry {
            client,
            connections: RwLock::new(BTreeMap::new()),
            last_check: RwLock::new(None),
        }
    }

    /// Check one connection config without registering it
    pub async fn check(&self, config: &DatabaseConnectionConfig) -> DatabaseHealth {
        let name = config.connection_name();
        if !config.is_qdrant() {
            return DatabaseHealth::unhealthy(
                name,
                None,
                format!("Unsupported connection type: {}", config.connection_type),
            );
        }
        self.check_qdrant(name, config).await
    }

    async fn check_qdrant(&self, name: String, config: &DatabaseConnectionConfig) -> DatabaseHealth {
        let started = Instant::now();
        let timeout = config.timeout();

        let base_url = match qdrant_base_url(&config.connection_string) {
            Ok(url) => url,
            Err(e) => return DatabaseHealth::unhealthy(name, Some(started), e.to_string()),
        };

        let response = self
            .client
            .get(format!("{}/collections", base_url))
            .timeout(timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        let body: Value = match response {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(e) => return DatabaseHealth::unhealthy(name, Some(started), e.to_string()),
            },
            Err(e) if e.is_timeout() => {
                return DatabaseHealth::unhealthy(
                    name,
                    Some(started),
                    format!("Connection timeout after {} seconds", timeout.as_secs()),
                );
            }
            Err(e) => return DatabaseHealth::unhealthy(name, Some(started), e.to_string()),
        };

        let collections_count = body
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);

        DatabaseHealth {
            connection_name: name,
            is_healthy: true,
            response_time_ms: elapsed_ms(started),
            last_check: Utc::now(),
            error_message: None,
            details: Some(json!({
                "collections_count": collections_count,
                "connection_type": QDRANT,
                "connection_string": config.connection_string,
            })),
        }
    }

    /// Check and store a connection; unhealthy connections are stored too
    pub async fn register(&self, config: DatabaseConnectionConfig) -> DatabaseHealth {
        let health = self.check(&config).await;
        let name = health.connection_name.clone();

        self.connections.write().await.insert(
            name.clone(),
            RegisteredConnection {
                config,
                last_health_check: health.clone(),
                registered_at: Utc::now(),
            },
        );
        info!(connection = %name, healthy = health.is_healthy, "Registered database connection");

        health
    }

    pub async fn unregister(&self, name: &str) -> Result<()> {
        match self.connections.write().await.remove(name) {
            Some(_) => {
                info!(connection = %name, "Unregistered database connection");
                Ok(())
            }
            None => Err(SidecarError::ConnectionNotFound(name.to_string())),
        }
    }

    /// Re-check one registered connection
    pub async fn check_one(&self, name: &str) -> Result<DatabaseHealth> {
        let config = self
            .connections
            .read()
            .await
            .get(name)
            .map(|c| c.config.clone())
            .ok_or_else(|| SidecarError::ConnectionNotFound(name.to_string()))?;

        let mut health = self.check(&config).await;
        // Keep the registry key even if the config would now derive another name
        health.connection_name = name.to_string();
        self.store_result(name, &health).await;
        Ok(health)
    }

    /// Re-check every registered connection
    ///
    /// An empty registry is reported as healthy.
    pub async fn check_all(&self) -> DatabaseHealthSummary {
        let configs: Vec<(String, DatabaseConnectionConfig)> = self
            .connections
            .read()
            .await
            .iter()
            .map(|(name, c)| (name.clone(), c.config.clone()))
            .collect();

        let mut checks = Vec::with_capacity(configs.len());
        for (name, config) in configs {
            let mut health = self.check(&config).await;
            health.connection_name = name.clone();
            if !health.is_healthy {
                warn!(connection = %name, error = ?health.error_message, "Database connection unhealthy");
            }
            self.store_result(&name, &health).await;
            checks.push(health);
        }

        *self.last_check.write().await = Some(Utc::now());
        DatabaseHealthSummary::from_checks(checks)
    }

    async fn store_result(&self, name: &str, health: &DatabaseHealth) {
        if let Some(entry) = self.connections.write().await.get_mut(name) {
            entry.last_health_check = health.clone();
        }
    }

    pub async fn names(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub async fn last_check(&self) -> Option<DateTime<Utc>> {
        *self.last_check.read().await
    }
}
