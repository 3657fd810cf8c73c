/**
 * port module
 * Port discovery, occupancy diagnostics and port hand-off
 */

pub mod allocator;
pub mod connections;
pub mod handoff;
pub mod probe;
pub mod process;
pub mod range;

pub use allocator::{OccupancyRecord, PortAllocator, UNKNOWN_STATUS};
pub use connections::{
    ConnectionEntry, ConnectionSnapshot, ConnectionTable, SystemConnectionTable, TransportProtocol, LISTEN_STATE,
};
pub use handoff::{PortFile, DEFAULT_PORT_FILE};
pub use probe::{PortProbe, SocketProbe, DEFAULT_PROBE_HOST};
pub use process::{ProcessDetails, ProcessInspector, SysinfoInspector};
pub use range::{PortRange, DEFAULT_END_PORT, DEFAULT_START_PORT};
