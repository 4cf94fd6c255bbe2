//! Local access to cluster endpoints.
//!
//! - `conflict` - detection of ports held by other processes
//! - `allocator` - per-run local port assignment
//! - `tracking` - PID records of detached forwarders
//! - `forward` - the port-forward manager

mod allocator;
mod conflict;
mod forward;
mod tracking;

pub use allocator::PortAllocator;
pub use conflict::{is_port_free, scan_ports, PortConflict, ProcessInfo};
pub use forward::{ForwardOptions, ForwardedPort, PortForwardManager, PortMapping};
pub use tracking::{ManagedProcess, TrackingFile};
