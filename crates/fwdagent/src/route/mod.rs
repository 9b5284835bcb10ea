//! Route table and forwarding types.

mod nexthop;
#[allow(clippy::module_inception)]
mod route;
mod table;

pub use nexthop::{ForwardInfo, NextHop, NextHopSet};
pub use route::{Route, RouteEnv, RouteKey};
pub use table::RouteTable;
