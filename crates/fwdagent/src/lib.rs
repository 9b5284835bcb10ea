//! Layer-3 forwarding object manager.
//!
//! Translates desired routing state (routes, next hops, neighbors)
//! into reference-counted forwarding objects on a programmable
//! switching ASIC driven through the vendor SDK (`fwd-sdk`).
//!
//! # Architecture
//!
//! ```text
//! [state update] ─> [applier] ─> [route table] ─> [host table] ─> [egress objects]
//!                                                      │
//! [ND packets] ──> [ndp handler] ─> neighbor state ────┘
//! [link events] ─────────────────> [host table] ─> ECMP membership
//! ```
//!
//! Three arenas own the hardware objects: hosts, ECMP hosts, and
//! egresses, each reference-counted; routes hold references into the
//! host table and everything drains to empty when the last reference
//! goes. After a warm reboot, surviving hardware entries are cached and
//! claimed as the new state reprograms them (`warmboot`).
//!
//! All table mutation happens on the update thread. Link-state
//! callbacks arrive from SDK context and only mutate ECMP membership,
//! reading the copy-on-write port/egress index published by the host
//! table.

pub mod agent;
pub mod applier;
pub mod config;
pub mod egress;
pub mod error;
pub mod host;
pub mod intf;
pub mod ndp;
pub mod route;
pub mod state;
pub mod warmboot;

pub use agent::L3Agent;
pub use config::AgentConfig;
pub use error::{L3Error, L3Result};
