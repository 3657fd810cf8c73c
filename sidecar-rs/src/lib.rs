//! # ctx-sidecar - Code Context Engine sidecar
//!
//! A local sidecar process that exposes health, metadata and lifecycle
//! endpoints for the Code Context Engine host application, and finds itself
//! a free TCP port to listen on.
//!
//! ## Core Principle
//!
//! **The OS is the arbiter of port ownership**: the allocator never keeps a
//! list of "its" ports. Availability is a fresh bind probe every time, and a
//! successful probe is advice, not a reservation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │   host application (editor)  │
//! └──────────────┬───────────────┘
//!        reads   │   HTTP
//!   sidecar_port │
//!       .txt     ▼
//! ┌──────────────────────────────┐
//! │  server (axum)               │
//! │   /health /info /shutdown    │
//! │   /database/* /ports/*       │
//! └──────────────┬───────────────┘
//!                │
//!     ┌──────────┴───────────┐
//!     ▼                      ▼
//! ┌────────────────┐  ┌───────────────┐
//! │ PortAllocator  │  │ Database      │
//! │ probe / scan   │  │ Registry      │
//! │ occupancy      │  │ (Qdrant REST) │
//! └────────────────┘  └───────────────┘
//! ```

pub mod config;
pub mod database;
pub mod errors;
pub mod port;
pub mod server;
pub mod state;
pub mod system;
pub mod telemetry;

pub use config::{LogLevel, SidecarConfig};
pub use database::{DatabaseConnectionConfig, DatabaseHealth, DatabaseHealthSummary, DatabaseRegistry};
pub use errors::SidecarError;
pub use port::{OccupancyRecord, PortAllocator, PortFile, PortRange};
pub use state::{AppState, SharedState};

/// Version of the sidecar service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
