//! Sidecar runtime state
//!
//! Built once at startup and shared with every request handler. Nothing
//! here is process-global, so several sidecars can coexist in one test.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::database::DatabaseRegistry;
use crate::port::PortAllocator;

pub type SharedState = Arc<AppState>;

#[derive(Debug)]
pub struct AppState {
    started_at: DateTime<Utc>,
    port: Option<u16>,
    allocator: PortAllocator,
    databases: DatabaseRegistry,
    request_count: AtomicU64,
    error_count: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(allocator: PortAllocator, port: Option<u16>) -> Self {
        let (shutdown, _) = watch::channel(false);
        AppState {
            started_at: Utc::now(),
            port,
            allocator,
            databases: DatabaseRegistry::default(),
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            shutdown,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Port the server was bound to
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn allocator(&self) -> &PortAllocator {
        &self.allocator
    }

    pub fn databases(&self) -> &DatabaseRegistry {
        &self.databases
    }

    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Ask the server to stop; idempotent
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown has been requested
    pub fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut receiver = self.shutdown.subscribe();
        async move {
            // An error means the sender is gone, which also ends the server
            let _ = receiver.wait_for(|requested| *requested).await;
        }
    }
}
