//! Port Hand-off Contract Tests
//!
//! The port file is the only channel through which the host application
//! learns where the sidecar listens. Its format and lifetime are protocol.
//!
//! Uses tempfile for isolation - NO working directory pollution

use std::fs;
use tempfile::TempDir;

use ctx_sidecar::port::DEFAULT_PORT_FILE;
use ctx_sidecar::{PortFile, SidecarError};

/// WHY: The port file holds the decimal port and nothing else
/// REASON: Hosts read it with a plain integer parse
/// BREAKS: Every host application reader if a newline, label or JSON is added
/// SACRIFICES: If this fails, the host cannot find the sidecar
#[test]
fn port_file_contains_only_the_port() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DEFAULT_PORT_FILE);

    let _guard = PortFile::create(&path, 8437).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "8437");
}

/// WHY: The default file name is fixed
/// REASON: Hosts look for `sidecar_port.txt` when no path is configured
/// BREAKS: Hosts started without an explicit port-file path
/// SACRIFICES: If this fails, default deployments lose the sidecar
#[test]
fn default_port_file_name_is_protocol_constant() {
    assert_eq!(DEFAULT_PORT_FILE, "sidecar_port.txt");
}

/// WHY: The port file disappears when the sidecar stops
/// REASON: A stale file points the host at a port someone else may own
/// BREAKS: Host restarts after a clean sidecar shutdown
/// SACRIFICES: If this fails, hosts connect to dead or foreign ports
#[test]
fn port_file_removed_when_guard_dropped() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DEFAULT_PORT_FILE);

    {
        let guard = PortFile::create(&path, 8001).unwrap();
        assert_eq!(PortFile::read(guard.path()).unwrap(), 8001);
    }

    assert!(!path.exists());
}

/// WHY: Removal tolerates the file already being gone
/// REASON: The host may delete the file itself after reading it
/// BREAKS: Clean shutdown logging spurious failures
/// SACRIFICES: If this fails, drop started panicking on missing files
#[test]
fn port_file_drop_tolerates_missing_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DEFAULT_PORT_FILE);

    let guard = PortFile::create(&path, 8001).unwrap();
    fs::remove_file(&path).unwrap();
    drop(guard);

    assert!(!path.exists());
}

/// WHY: Port 0 is never handed off
/// REASON: 0 means "any port" to the OS; the host cannot connect to it
/// BREAKS: Hosts that trust the file blindly
/// SACRIFICES: If this fails, a failed discovery looks like success
#[test]
fn port_zero_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DEFAULT_PORT_FILE);

    assert!(matches!(PortFile::create(&path, 0), Err(SidecarError::InvalidPort(0))));
    assert!(!path.exists());
}

/// WHY: Garbage in the port file is an error, not port 0
/// REASON: Readers must distinguish "no sidecar" from "sidecar on port X"
/// BREAKS: Diagnostics that read the file back
/// SACRIFICES: If this fails, corrupt files decode to a bogus port
#[test]
fn unparseable_port_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DEFAULT_PORT_FILE);
    fs::write(&path, "port=8001").unwrap();

    assert!(PortFile::read(&path).is_err());
}
