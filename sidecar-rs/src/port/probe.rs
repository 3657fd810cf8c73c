//! Bind-and-release availability probes
//!
//! A probe opens a fresh TCP socket, sets `SO_REUSEADDR`, binds it to the
//! requested address and drops it. The socket is closed on every path, so a
//! probe leaves nothing behind. A successful probe is advisory only: the port
//! can be taken by someone else before the caller binds it for real.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::debug;

pub const DEFAULT_PROBE_HOST: &str = "127.0.0.1";

/// Capability to test whether `(host, port)` can be bound right now
pub trait PortProbe: Send + Sync {
    fn probe(&self, host: &str, port: u16) -> bool;
}

/// Probe backed by a real OS socket
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketProbe;

impl SocketProbe {
    fn resolve(host: &str, port: u16) -> std::io::Result<SocketAddr> {
        (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", host),
            )
        })
    }

    fn try_bind(host: &str, port: u16) -> std::io::Result<()> {
        let addr = Self::resolve(host, port)?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        Ok(())
    }
}

impl PortProbe for SocketProbe {
    fn probe(&self, host: &str, port: u16) -> bool {
        if port == 0 {
            debug!(port, "Port 0 is never a concrete port");
            return false;
        }
        match Self::try_bind(host, port) {
            Ok(()) => true,
            Err(e) => {
                debug!(port, host, error = %e, "Port is not available");
                false
            }
        }
    }
}
