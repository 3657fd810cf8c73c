/**
 * config.rs
 * Sidecar configuration (YAML file, overridden by CLI flags)
 *
 * Format:
 * ```yaml
 * host: 127.0.0.1
 * port: 8765          # preferred port, optional
 * portStart: 8000
 * portEnd: 9000
 * logLevel: info      # debug | info | warning | error
 * portFile: sidecar_port.txt
 * logFile: sidecar.log
 * ```
 */

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SidecarError};
use crate::port::{PortRange, DEFAULT_END_PORT, DEFAULT_PORT_FILE, DEFAULT_PROBE_HOST, DEFAULT_START_PORT};

pub const DEFAULT_LOG_FILE: &str = "sidecar.log";

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        })
    }
}

/// Sidecar configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SidecarConfig {
    /// Host to bind to
    pub host: String,
    /// Preferred port; tried before scanning the range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub port_start: u16,
    pub port_end: u16,
    pub log_level: LogLevel,
    /// Where the bound port is published for the host application
    pub port_file: PathBuf,
    /// Append-mode log file; `None` logs to stdout only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        SidecarConfig {
            host: DEFAULT_PROBE_HOST.to_string(),
            port: None,
            port_start: DEFAULT_START_PORT,
            port_end: DEFAULT_END_PORT,
            log_level: LogLevel::default(),
            port_file: PathBuf::from(DEFAULT_PORT_FILE),
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}

impl SidecarConfig {
    /// Load configuration from a YAML file
    ///
    /// Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SidecarError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validated port range
    ///
    /// # Errors
    /// `InvalidRange` when `port_start > port_end`
    pub fn port_range(&self) -> Result<PortRange> {
        PortRange::new(self.port_start, self.port_end)
    }
}
