//! Network connection table enumeration
//!
//! One enumeration produces a [`ConnectionSnapshot`]; both occupancy queries
//! (who holds port X, which ports of a range are held) are views over it.
//!
//! On Linux the system table is read from `/proc/net/{tcp,tcp6,udp,udp6}` and
//! socket inodes are mapped to PIDs through `/proc/<pid>/fd`. Sockets whose
//! owner is hidden from us (another user's process) keep `pid: None`.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::errors::Result;
use crate::port::range::PortRange;

/// State name of a listening TCP socket
pub const LISTEN_STATE: &str = "LISTEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

/// One row of the OS connection table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionEntry {
    pub protocol: TransportProtocol,
    pub local_port: u16,
    /// TCP state name (`LISTEN`, `ESTABLISHED`, ...); `NONE` for UDP
    pub state: String,
    pub pid: Option<i32>,
}

/// Capability to list the host's current connections
pub trait ConnectionTable: Send + Sync {
    fn connections(&self) -> Result<Vec<ConnectionEntry>>;
}

/// Result of a single connection-table enumeration
#[derive(Debug, Clone, Default)]
pub struct ConnectionSnapshot {
    entries: Vec<ConnectionEntry>,
}

impl ConnectionSnapshot {
    pub fn new(entries: Vec<ConnectionEntry>) -> Self {
        ConnectionSnapshot { entries }
    }

    pub fn entries(&self) -> &[ConnectionEntry] {
        &self.entries
    }

    /// Best entry for `port`: one with a known owner, then a `LISTEN` row,
    /// then the first match. Ties keep table order.
    pub fn entry_for(&self, port: u16) -> Option<&ConnectionEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.local_port == port)
            .min_by_key(|entry| (entry.pid.is_none(), entry.state != LISTEN_STATE))
    }

    /// Distinct local ports inside `range`, ascending
    pub fn ports_in(&self, range: &PortRange) -> BTreeSet<u16> {
        self.entries
            .iter()
            .map(|entry| entry.local_port)
            .filter(|port| range.contains(*port))
            .collect()
    }
}

/// The live OS connection table
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConnectionTable;

impl ConnectionTable for SystemConnectionTable {
    #[cfg(target_os = "linux")]
    fn connections(&self) -> Result<Vec<ConnectionEntry>> {
        procfs::connections()
    }

    #[cfg(not(target_os = "linux"))]
    fn connections(&self) -> Result<Vec<ConnectionEntry>> {
        Err(crate::errors::SidecarError::Unsupported(
            "connection enumeration is only implemented for Linux".to_string(),
        ))
    }
}

/// Raw socket row parsed from a `/proc/net/*` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawSocket {
    pub local_port: u16,
    pub state: u8,
    pub inode: u64,
}

/// Parse the body of a `/proc/net/{tcp,udp}[6]` file
///
/// Malformed rows are skipped.
pub(crate) fn parse_proc_net(content: &str) -> Vec<RawSocket> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let (_, port_hex) = fields[1].rsplit_once(':')?;
            let local_port = u16::from_str_radix(port_hex, 16).ok()?;
            let state = u8::from_str_radix(fields[3], 16).ok()?;
            let inode = fields[9].parse().ok()?;
            Some(RawSocket {
                local_port,
                state,
                inode,
            })
        })
        .collect()
}

/// Kernel TCP state code to its conventional name
pub(crate) fn tcp_state_name(state: u8) -> &'static str {
    match state {
        0x01 => "ESTABLISHED",
        0x02 => "SYN_SENT",
        0x03 => "SYN_RECV",
        0x04 => "FIN_WAIT1",
        0x05 => "FIN_WAIT2",
        0x06 => "TIME_WAIT",
        0x07 => "CLOSE",
        0x08 => "CLOSE_WAIT",
        0x09 => "LAST_ACK",
        0x0A => LISTEN_STATE,
        0x0B => "CLOSING",
        _ => "UNKNOWN",
    }
}

/// Extract the inode from a `socket:[12345]` fd link target
pub(crate) fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

#[cfg(target_os = "linux")]
mod procfs {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use tracing::{debug, trace};

    use super::{parse_proc_net, socket_inode, tcp_state_name, ConnectionEntry, TransportProtocol};
    use crate::errors::{Result, SidecarError};

    const TABLES: [(&str, TransportProtocol); 4] = [
        ("/proc/net/tcp", TransportProtocol::Tcp),
        ("/proc/net/tcp6", TransportProtocol::Tcp6),
        ("/proc/net/udp", TransportProtocol::Udp),
        ("/proc/net/udp6", TransportProtocol::Udp6),
    ];

    pub(super) fn connections() -> Result<Vec<ConnectionEntry>> {
        let mut entries = Vec::new();
        let mut read_any = false;

        for (path, protocol) in TABLES {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    // tcp6/udp6 are absent when IPv6 is disabled
                    debug!(path, error = %e, "Skipping connection table");
                    continue;
                }
            };
            read_any = true;

            for socket in parse_proc_net(&content) {
                let state = match protocol {
                    TransportProtocol::Tcp | TransportProtocol::Tcp6 => tcp_state_name(socket.state),
                    TransportProtocol::Udp | TransportProtocol::Udp6 => "NONE",
                };
                entries.push((socket.inode, ConnectionEntry {
                    protocol,
                    local_port: socket.local_port,
                    state: state.to_string(),
                    pid: None,
                }));
            }
        }

        if !read_any {
            return Err(SidecarError::Enumeration(
                "no readable connection table under /proc/net".to_string(),
            ));
        }

        let owners = socket_owners(Path::new("/proc"));
        Ok(entries
            .into_iter()
            .map(|(inode, mut entry)| {
                // inode 0 means the socket is not attached to any process
                if inode != 0 {
                    entry.pid = owners.get(&inode).copied();
                }
                entry
            })
            .collect())
    }

    /// Map socket inode to owning PID by walking `/proc/<pid>/fd`
    ///
    /// Processes we may not inspect, or that exit mid-walk, are skipped.
    fn socket_owners(proc_root: &Path) -> HashMap<u64, i32> {
        let mut owners = HashMap::new();
        let Ok(processes) = fs::read_dir(proc_root) else {
            return owners;
        };

        for process in processes.flatten() {
            let Some(pid) = process.file_name().to_str().and_then(|name| name.parse::<i32>().ok()) else {
                continue;
            };
            let fds = match fs::read_dir(process.path().join("fd")) {
                Ok(fds) => fds,
                Err(e) => {
                    trace!(pid, error = %e, "Cannot list file descriptors");
                    continue;
                }
            };
            for fd in fds.flatten() {
                if let Ok(target) = fs::read_link(fd.path()) {
                    if let Some(inode) = target.to_str().and_then(socket_inode) {
                        owners.entry(inode).or_insert(pid);
                    }
                }
            }
        }

        owners
    }

}
