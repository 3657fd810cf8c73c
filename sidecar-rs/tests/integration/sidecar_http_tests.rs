//! Sidecar HTTP Integration Tests
//!
//! Drives the full router (middleware included) in-process with
//! `tower::ServiceExt::oneshot`. Port discovery and occupancy are backed by
//! scripted probes and connection tables so results do not depend on the
//! host's real sockets.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use ctx_sidecar::errors::Result;
use ctx_sidecar::port::{
    ConnectionEntry, ConnectionTable, PortProbe, ProcessDetails, ProcessInspector, TransportProtocol,
};
use ctx_sidecar::server;
use ctx_sidecar::{AppState, PortAllocator, SharedState};

/// Probe reporting only the listed ports as free
struct FreePorts(HashSet<u16>);

impl PortProbe for FreePorts {
    fn probe(&self, _host: &str, port: u16) -> bool {
        self.0.contains(&port)
    }
}

struct FixedTable(Vec<ConnectionEntry>);

impl ConnectionTable for FixedTable {
    fn connections(&self) -> Result<Vec<ConnectionEntry>> {
        Ok(self.0.clone())
    }
}

struct FixedInspector;

impl ProcessInspector for FixedInspector {
    fn inspect(&self, pid: i32) -> Option<ProcessDetails> {
        (pid == 4242).then(|| ProcessDetails {
            name: "qdrant".to_string(),
            command_line: vec!["qdrant".to_string(), "--config".to_string(), "q.yaml".to_string()],
            status: "running".to_string(),
        })
    }
}

fn listening(port: u16, pid: Option<i32>) -> ConnectionEntry {
    ConnectionEntry {
        protocol: TransportProtocol::Tcp,
        local_port: port,
        state: "LISTEN".to_string(),
        pid,
    }
}

/// Helper: state over 8000-8010 where 8003 and 8007 are free and
/// 8001 (pid 4242) and 8005 (hidden owner) are held
fn test_state() -> SharedState {
    let allocator = PortAllocator::new(8000, 8010)
        .unwrap()
        .with_probe(Arc::new(FreePorts([8003, 8007].into_iter().collect())))
        .with_connection_table(Arc::new(FixedTable(vec![
            listening(8001, Some(4242)),
            listening(8005, None),
            listening(22, Some(1)),
        ])))
        .with_process_inspector(Arc::new(FixedInspector));

    AppState::new(allocator, Some(8003)).shared()
}

async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(state: &SharedState, uri: &str) -> (StatusCode, Value) {
    send(server::router(state.clone()), Method::GET, uri, None).await
}

#[tokio::test]
async fn test_health_reports_healthy() {
    let state = test_state();
    let (status, body) = get(&state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["uptime_seconds"].as_f64().unwrap() >= 0.0);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_detailed_health_includes_port_and_counters() {
    let state = test_state();
    get(&state, "/health").await;

    let (status, body) = get(&state, "/health/detailed").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], 8003);
    assert_eq!(body["process_info"]["pid"], std::process::id());
    assert!(body["system_info"]["cpu_count"].as_u64().unwrap() >= 1);
    // The detailed request itself is counted before the handler runs
    assert_eq!(body["request_count"], 2);
    assert_eq!(body["error_count"], 0);
}

#[tokio::test]
async fn test_info_lists_capabilities_and_endpoints() {
    let state = test_state();
    let (status, body) = get(&state, "/info").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Code Context Engine Sidecar");
    assert_eq!(body["version"], ctx_sidecar::VERSION);

    let capabilities: Vec<&str> = body["capabilities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    assert!(capabilities.contains(&"dynamic_port_discovery"));

    let endpoints = body["endpoints"].as_array().unwrap();
    assert!(endpoints.iter().any(|e| e == "/ports/available"));
    assert!(endpoints.iter().any(|e| e == "/shutdown"));
}

#[tokio::test]
async fn test_available_port_without_preference() {
    let state = test_state();
    let (status, body) = get(&state, "/ports/available").await;

    assert_eq!(status, StatusCode::OK);
    let port = body["port"].as_u64().unwrap();
    assert!(port == 8003 || port == 8007, "unexpected port {}", port);
    assert_eq!(body["range"]["start"], 8000);
    assert_eq!(body["range"]["end"], 8010);
}

#[tokio::test]
async fn test_available_port_honours_free_preference() {
    let state = test_state();
    let (_, body) = get(&state, "/ports/available?preferred=8007").await;
    assert_eq!(body["port"], 8007);
}

#[tokio::test]
async fn test_available_port_falls_back_from_taken_preference() {
    let state = test_state();
    for _ in 0..10 {
        let (_, body) = get(&state, "/ports/available?preferred=8001").await;
        let port = body["port"].as_u64().unwrap();
        assert!(port == 8003 || port == 8007);
    }
}

#[tokio::test]
async fn test_available_port_exhausted_is_null() {
    let allocator = PortAllocator::new(8000, 8002)
        .unwrap()
        .with_probe(Arc::new(FreePorts(HashSet::new())));
    let state = AppState::new(allocator, None).shared();

    let (status, body) = get(&state, "/ports/available").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["port"].is_null());
}

#[tokio::test]
async fn test_ports_in_use_only_reports_range() {
    let state = test_state();
    let (status, body) = get(&state, "/ports/in-use").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ports"], serde_json::json!([8001, 8005]));

    let occupancy = body["occupancy"].as_array().unwrap();
    assert_eq!(occupancy.len(), 2);
    assert_eq!(occupancy[0]["process_name"], "qdrant");
    assert_eq!(occupancy[1]["pid"], Value::Null);
    assert_eq!(occupancy[1]["status"], "unknown");
}

#[tokio::test]
async fn test_process_using_port_found() {
    let state = test_state();
    let (status, body) = get(&state, "/ports/8001/process").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], 8001);
    assert_eq!(body["pid"], 4242);
    assert_eq!(body["process_name"], "qdrant");
    assert_eq!(body["command_line"][1], "--config");
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_process_using_port_outside_range_still_answered() {
    let state = test_state();
    let (status, body) = get(&state, "/ports/22/process").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pid"], 1);
    assert_eq!(body["status"], "unknown");
}

#[tokio::test]
async fn test_process_using_free_port_is_not_found() {
    let state = test_state();
    let (status, body) = get(&state, "/ports/8003/process").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
    assert!(body["message"].as_str().unwrap().contains("8003"));
    assert_eq!(state.error_count(), 1);
}

#[tokio::test]
async fn test_invalid_port_path_is_client_error() {
    let state = test_state();
    let (status, _) = get(&state, "/ports/notaport/process").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(state.error_count(), 1);
}

#[tokio::test]
async fn test_database_health_empty_registry() {
    let state = test_state();
    let (status, body) = get(&state, "/health/database").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_healthy"], true);
    assert_eq!(body["total_connections"], 0);
}

#[tokio::test]
async fn test_register_unsupported_database_is_unhealthy() {
    let state = test_state();
    let (status, body) = send(
        server::router(state.clone()),
        Method::POST,
        "/database/register",
        Some(r#"{"connection_string": "postgres://localhost/db", "connection_type": "postgres"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connection_name"], "unknown_postgres");
    assert_eq!(body["initial_health_check"]["is_healthy"], false);

    let (status, body) = get(&state, "/health/database/unknown_postgres").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connection_name"], "unknown_postgres");

    let (status, _) = send(
        server::router(state.clone()),
        Method::DELETE,
        "/database/unregister/unknown_postgres",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_database_is_not_found() {
    let state = test_state();

    let (status, _) = get(&state, "/health/database/qdrant_missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        server::router(state.clone()),
        Method::DELETE,
        "/database/unregister/qdrant_missing",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(state.error_count(), 2);
}

#[tokio::test]
async fn test_unknown_route_counts_as_error() {
    let state = test_state();
    let (status, _) = get(&state, "/does-not-exist").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(state.request_count(), 1);
    assert_eq!(state.error_count(), 1);
}

#[tokio::test]
async fn test_shutdown_without_body() {
    let state = test_state();
    let (status, body) = send(server::router(state.clone()), Method::POST, "/shutdown", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Shutdown initiated");
    assert_eq!(body["delay_seconds"], 0);

    tokio::time::timeout(Duration::from_secs(5), state.shutdown_signal())
        .await
        .unwrap();
    assert!(state.shutdown_requested());
}

#[tokio::test]
async fn test_shutdown_with_reason_and_delay() {
    let state = test_state();
    let (status, body) = send(
        server::router(state.clone()),
        Method::POST,
        "/shutdown",
        Some(r#"{"reason": "host exiting", "delay_seconds": 1}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delay_seconds"], 1);
    assert!(!state.shutdown_requested());

    tokio::time::timeout(Duration::from_secs(5), state.shutdown_signal())
        .await
        .unwrap();
    assert!(state.shutdown_requested());
}
