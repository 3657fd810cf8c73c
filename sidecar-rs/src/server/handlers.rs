//! Request handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use crate::database::{DatabaseConnectionConfig, DatabaseHealth, DatabaseHealthSummary};
use crate::port::{OccupancyRecord, PortRange};
use crate::server::error::ApiError;
use crate::state::SharedState;
use crate::system::{self, ProcessInfo, SystemInfo};

pub const SERVICE_NAME: &str = "Code Context Engine Sidecar";

pub const CAPABILITIES: &[&str] = &[
    "health_monitoring",
    "dynamic_port_discovery",
    "port_diagnostics",
    "graceful_shutdown",
    "system_metrics",
    "request_tracking",
    "database_health_checks",
    "qdrant_connectivity",
];

pub const ENDPOINTS: &[&str] = &[
    "/health",
    "/health/detailed",
    "/health/database",
    "/health/database/{connection_name}",
    "/database/register",
    "/database/unregister/{connection_name}",
    "/ports/available",
    "/ports/in-use",
    "/ports/{port}/process",
    "/info",
    "/shutdown",
];

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub port: Option<u16>,
    pub process_info: ProcessInfo,
    pub system_info: SystemInfo,
    pub request_count: u64,
    pub error_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShutdownRequest {
    #[serde(default = "default_shutdown_reason")]
    pub reason: String,
    #[serde(default)]
    pub delay_seconds: u64,
}

fn default_shutdown_reason() -> String {
    "Manual shutdown".to_string()
}

impl Default for ShutdownRequest {
    fn default() -> Self {
        ShutdownRequest {
            reason: default_shutdown_reason(),
            delay_seconds: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailablePortQuery {
    pub preferred: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct AvailablePortResponse {
    pub port: Option<u16>,
    pub range: PortRange,
}

#[derive(Debug, Serialize)]
pub struct PortsInUseResponse {
    pub range: PortRange,
    pub ports: Vec<u16>,
    pub occupancy: Vec<OccupancyRecord>,
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
    })
}

pub async fn detailed_health(State(state): State<SharedState>) -> Result<Json<DetailedHealthResponse>, ApiError> {
    let (process_info, system_info) =
        tokio::task::spawn_blocking(|| (system::process_info(), system::system_info())).await?;

    Ok(Json(DetailedHealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        port: state.port(),
        process_info,
        system_info,
        request_count: state.request_count(),
        error_count: state.error_count(),
    }))
}

pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Sidecar service providing health, metadata, lifecycle and port diagnostics for the Code Context Engine host application".to_string(),
        capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    })
}

pub async fn shutdown(
    State(state): State<SharedState>,
    request: Option<Json<ShutdownRequest>>,
) -> Json<Value> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    info!(reason = %request.reason, delay_seconds = request.delay_seconds, "Shutdown requested");

    let delay = Duration::from_secs(request.delay_seconds);
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        info!("Initiating shutdown");
        state.request_shutdown();
    });

    Json(json!({
        "message": "Shutdown initiated",
        "delay_seconds": request.delay_seconds,
    }))
}

pub async fn register_database(
    State(state): State<SharedState>,
    Json(config): Json<DatabaseConnectionConfig>,
) -> Json<Value> {
    let health = state.databases().register(config).await;
    let name = health.connection_name.clone();

    Json(json!({
        "message": format!("Database connection '{}' registered successfully", name),
        "connection_name": name,
        "initial_health_check": health,
    }))
}

pub async fn unregister_database(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.databases().unregister(&name).await?;
    Ok(Json(json!({
        "message": format!("Database connection '{}' unregistered successfully", name),
    })))
}

pub async fn all_database_health(State(state): State<SharedState>) -> Json<DatabaseHealthSummary> {
    Json(state.databases().check_all().await)
}

pub async fn database_health(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<DatabaseHealth>, ApiError> {
    Ok(Json(state.databases().check_one(&name).await?))
}

pub async fn available_port(
    State(state): State<SharedState>,
    Query(query): Query<AvailablePortQuery>,
) -> Result<Json<AvailablePortResponse>, ApiError> {
    let allocator = state.allocator().clone();
    let range = *allocator.range();
    let port = tokio::task::spawn_blocking(move || allocator.find_available_port(query.preferred)).await?;

    Ok(Json(AvailablePortResponse { port, range }))
}

pub async fn ports_in_use(State(state): State<SharedState>) -> Result<Json<PortsInUseResponse>, ApiError> {
    let allocator = state.allocator().clone();
    let range = *allocator.range();
    let occupancy = tokio::task::spawn_blocking(move || allocator.occupancy_report()).await?;

    Ok(Json(PortsInUseResponse {
        range,
        ports: occupancy.iter().map(|record| record.port).collect(),
        occupancy,
    }))
}

pub async fn process_using_port(
    State(state): State<SharedState>,
    Path(port): Path<u16>,
) -> Result<Json<OccupancyRecord>, ApiError> {
    let allocator = state.allocator().clone();
    tokio::task::spawn_blocking(move || allocator.get_process_using_port(port))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No process found using port {}", port)))
}
