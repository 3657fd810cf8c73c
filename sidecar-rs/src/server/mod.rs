// Server Module - HTTP surface of the sidecar
//
// Routes:
// - /health, /health/detailed, /info        - liveness and metadata
// - /shutdown                               - lifecycle
// - /database/*, /health/database*          - registered database checks
// - /ports/*                                - port discovery diagnostics

pub mod error;
pub mod handlers;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::errors::{Result, SidecarError};
use crate::port::PortAllocator;
use crate::state::SharedState;

pub use error::ApiError;

/// Bind attempts before giving up when discovered ports keep getting taken
pub const DEFAULT_BIND_ATTEMPTS: usize = 3;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/detailed", get(handlers::detailed_health))
        .route("/health/database", get(handlers::all_database_health))
        .route("/health/database/:connection_name", get(handlers::database_health))
        .route("/database/register", post(handlers::register_database))
        .route("/database/unregister/:connection_name", delete(handlers::unregister_database))
        .route("/ports/available", get(handlers::available_port))
        .route("/ports/in-use", get(handlers::ports_in_use))
        .route("/ports/:port/process", get(handlers::process_using_port))
        .route("/info", get(handlers::service_info))
        .route("/shutdown", post(handlers::shutdown))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Count every request, and every response with status >= 400 as an error
async fn track_requests(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    state.record_request();
    let response = next.run(request).await;
    if response.status().is_client_error() || response.status().is_server_error() {
        state.record_error();
    }
    response
}

/// Discover a port and bind it
///
/// A discovered port can be taken between the probe and our bind. On
/// `AddrInUse` discovery runs again, without the preferred port, up to
/// `attempts` times. Exhaustion of the range is returned as `Ok(None)`.
pub async fn bind_discovered(
    allocator: &PortAllocator,
    host: &str,
    preferred_port: Option<u16>,
    attempts: usize,
) -> Result<Option<(TcpListener, u16)>> {
    let mut preferred = preferred_port;

    for attempt in 1..=attempts.max(1) {
        let discovery = allocator.clone();
        let candidate = tokio::task::spawn_blocking(move || discovery.find_available_port(preferred))
            .await
            .map_err(|e| SidecarError::Server(e.to_string()))?;

        let Some(port) = candidate else {
            return Ok(None);
        };

        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok(Some((listener, port))),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                warn!(port, attempt, "Discovered port was taken before bind, retrying");
                preferred = None;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(SidecarError::Server(format!(
        "Could not bind a discovered port after {} attempts",
        attempts.max(1)
    )))
}

/// Serve until shutdown is requested through the state
pub async fn serve(listener: TcpListener, state: SharedState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Sidecar listening");

    let shutdown = state.shutdown_signal();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| SidecarError::Server(e.to_string()))?;

    info!("Sidecar stopped");
    Ok(())
}
