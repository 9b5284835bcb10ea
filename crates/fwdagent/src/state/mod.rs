//! The switch-state interface consumed by the forwarding core.
//!
//! The switch-wide state container lives outside this subsystem; what
//! the forwarding core needs from it is a persistent snapshot tree and
//! old/new entry pairs per entity kind. This module carries that
//! minimum surface: interfaces, per-VLAN neighbor tables, and routes,
//! with [`StateDelta`] diffing two snapshots and [`StateHandle`]
//! committing updates synchronously.

mod delta;
mod handle;
mod types;

pub use delta::{Delta, StateDelta};
pub use handle::StateHandle;
pub use types::{Interface, NeighborEntry, RouteFields, SwitchState, Vlan};
