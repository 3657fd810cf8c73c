/**
 * allocator.rs
 * Port discovery for the sidecar
 *
 * Selection strategy:
 * - Preferred port (if given and non-zero): probed first, returned when free
 * - Otherwise: every port of the range, visited in shuffled order
 * - First port whose probe succeeds wins; exhaustion is `None`
 *
 * The shuffle spreads sidecars that start at the same moment across the
 * range instead of having all of them fight over the lowest free port.
 *
 * Occupancy queries (who holds a port, which ports of the range are held)
 * read the OS connection table. They are diagnostics only and never feed
 * into `find_available_port`, which trusts bind probes alone.
 */

use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::port::connections::{ConnectionEntry, ConnectionSnapshot, ConnectionTable, SystemConnectionTable};
use crate::port::probe::{PortProbe, SocketProbe, DEFAULT_PROBE_HOST};
use crate::port::process::{ProcessInspector, SysinfoInspector};
use crate::port::range::PortRange;

/// Status reported when the owning process cannot be inspected
pub const UNKNOWN_STATUS: &str = "unknown";

/// Best-effort description of the process holding a port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupancyRecord {
    pub port: u16,
    pub pid: Option<i32>,
    pub process_name: Option<String>,
    pub command_line: Vec<String>,
    pub status: String,
}

impl OccupancyRecord {
    /// Record carrying only what the connection table knew
    fn partial(port: u16, pid: Option<i32>) -> Self {
        OccupancyRecord {
            port,
            pid,
            process_name: None,
            command_line: Vec::new(),
            status: UNKNOWN_STATUS.to_string(),
        }
    }
}

/// Port allocator over a fixed, inclusive range
///
/// Holds no mutable state: every call is a fresh query against the OS.
/// Cloning is cheap and clones share the same probe and enumeration backends.
#[derive(Clone)]
pub struct PortAllocator {
    range: PortRange,
    host: String,
    probe: Arc<dyn PortProbe>,
    connections: Arc<dyn ConnectionTable>,
    inspector: Arc<dyn ProcessInspector>,
}

impl fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortAllocator")
            .field("range", &self.range)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::from_range(PortRange::default())
    }
}

impl PortAllocator {
    /// Create an allocator for `[start_port, end_port]`
    ///
    /// # Errors
    /// `InvalidRange` if `start_port > end_port`
    ///
    /// # Example
    /// ```
    /// use ctx_sidecar::PortAllocator;
    ///
    /// let allocator = PortAllocator::new(8000, 9000).unwrap();
    /// assert_eq!(allocator.range().len(), 1001);
    /// assert!(PortAllocator::new(9000, 8000).is_err());
    /// ```
    pub fn new(start_port: u16, end_port: u16) -> Result<Self> {
        Ok(Self::from_range(PortRange::new(start_port, end_port)?))
    }

    /// Allocator with the system backends (socket probe, OS connection table, sysinfo)
    pub fn from_range(range: PortRange) -> Self {
        PortAllocator {
            range,
            host: DEFAULT_PROBE_HOST.to_string(),
            probe: Arc::new(SocketProbe),
            connections: Arc::new(SystemConnectionTable),
            inspector: Arc::new(SysinfoInspector),
        }
    }

    /// Host used by `is_port_available` and `find_available_port`
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_connection_table(mut self, connections: Arc<dyn ConnectionTable>) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_process_inspector(mut self, inspector: Arc<dyn ProcessInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn range(&self) -> &PortRange {
        &self.range
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Probe `port` on the allocator's host
    pub fn is_port_available(&self, port: u16) -> bool {
        self.probe.probe(&self.host, port)
    }

    /// Probe `port` on an explicit host
    ///
    /// Any bind failure is `false`; the reason is only logged.
    pub fn is_port_available_on(&self, port: u16, host: &str) -> bool {
        self.probe.probe(host, port)
    }

    /// Find a port that can be bound right now
    ///
    /// Performs at most `range.len() + 1` probes and never retries. `None`
    /// means every port of the range failed its probe.
    pub fn find_available_port(&self, preferred_port: Option<u16>) -> Option<u16> {
        if let Some(preferred) = preferred_port.filter(|&port| port != 0) {
            if self.is_port_available(preferred) {
                info!(port = preferred, "Using preferred port");
                return Some(preferred);
            }
            debug!(port = preferred, "Preferred port unavailable, scanning range");
        }

        let mut ports: Vec<u16> = self.range.ports().collect();
        ports.shuffle(&mut rand::thread_rng());

        let found = ports.into_iter().find(|&port| self.is_port_available(port));
        match found {
            Some(port) => info!(port, "Found available port"),
            None => error!(range = %self.range, "No available ports found in range"),
        }
        found
    }

    /// Enumerate the connection table once
    ///
    /// Enumeration failure is logged and yields an empty snapshot.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        match self.connections.connections() {
            Ok(entries) => ConnectionSnapshot::new(entries),
            Err(e) => {
                error!(error = %e, "Error enumerating network connections");
                ConnectionSnapshot::default()
            }
        }
    }

    /// Describe the process holding `port`, if any connection uses it
    pub fn get_process_using_port(&self, port: u16) -> Option<OccupancyRecord> {
        let snapshot = self.snapshot();
        let entry = snapshot.entry_for(port)?;
        Some(self.describe(entry))
    }

    /// Ports of the configured range present in the connection table, ascending
    pub fn find_ports_in_use(&self) -> BTreeSet<u16> {
        self.snapshot().ports_in(&self.range)
    }

    /// Occupancy records for every in-use port of the range
    ///
    /// Both views come from a single enumeration.
    pub fn occupancy_report(&self) -> Vec<OccupancyRecord> {
        let snapshot = self.snapshot();
        snapshot
            .ports_in(&self.range)
            .into_iter()
            .filter_map(|port| snapshot.entry_for(port))
            .map(|entry| self.describe(entry))
            .collect()
    }

    fn describe(&self, entry: &ConnectionEntry) -> OccupancyRecord {
        let port = entry.local_port;
        let Some(pid) = entry.pid else {
            return OccupancyRecord::partial(port, None);
        };

        match self.inspector.inspect(pid) {
            Some(details) => OccupancyRecord {
                port,
                pid: Some(pid),
                process_name: Some(details.name),
                command_line: details.command_line,
                status: details.status,
            },
            None => {
                warn!(port, pid, "Process holding port exited or cannot be inspected");
                OccupancyRecord::partial(port, Some(pid))
            }
        }
    }
}
