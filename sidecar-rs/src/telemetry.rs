//! Logging setup
//!
//! Human-readable output on the console, optionally mirrored to an
//! append-mode log file. `RUST_LOG` takes precedence over the configured level.
//!
//! Commands whose stdout is machine-readable log to stderr instead.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogLevel;
use crate::errors::{Result, SidecarError};

/// Build the filter for `level`, unless `RUST_LOG` is set
pub fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()))
}

/// Stream console log lines are written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Console {
    #[default]
    Stdout,
    Stderr,
}

impl Console {
    fn writer(self) -> BoxMakeWriter {
        match self {
            Console::Stdout => BoxMakeWriter::new(std::io::stdout),
            Console::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Install the global subscriber
///
/// # Errors
/// Fails when the log file cannot be opened or a subscriber is already set.
pub fn init(level: LogLevel, console: Console, log_file: Option<&Path>) -> Result<()> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(console.writer());

    let file = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter(level))
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| SidecarError::Config(format!("Failed to initialise logging: {}", e)))
}
