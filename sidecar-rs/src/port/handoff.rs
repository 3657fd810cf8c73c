//! Port file hand-off to the host application
//!
//! The bound port is written as a single decimal integer so an external
//! controller can discover it. The file lives exactly as long as the
//! [`PortFile`] guard.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{Result, SidecarError};

pub const DEFAULT_PORT_FILE: &str = "sidecar_port.txt";

/// Port file guard
#[derive(Debug)]
pub struct PortFile {
    path: PathBuf,
    port: u16,
}

impl PortFile {
    /// Write `port` to `path`, replacing whatever was there
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ctx_sidecar::port::PortFile;
    /// use std::path::Path;
    ///
    /// let port_file = PortFile::create(Path::new("sidecar_port.txt"), 8123).unwrap();
    /// // Server runs...
    /// // Port file automatically deleted on drop
    /// ```
    pub fn create(path: &Path, port: u16) -> Result<Self> {
        if port == 0 {
            return Err(SidecarError::InvalidPort(0));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, port.to_string())?;
        debug!(path = %path.display(), port, "Wrote port file");

        Ok(Self {
            path: path.to_path_buf(),
            port,
        })
    }

    /// Read a port previously written by [`PortFile::create`]
    pub fn read(path: &Path) -> Result<u16> {
        let content = fs::read_to_string(path)?;
        content
            .trim()
            .parse()
            .map_err(|e| SidecarError::Config(format!("Invalid port file {}: {}", path.display(), e)))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PortFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed port file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove port file"),
        }
    }
}
