//! Host table and port/egress index.

#[allow(clippy::module_inception)]
mod host;
mod port_index;
mod table;

pub use host::{EcmpHost, EcmpHostKey, Host, HostKey, HostStatus};
pub use port_index::{PortEgressIndex, PortEgressMap, ResolutionTransition};
pub use table::{HostTable, HostTableStats};
