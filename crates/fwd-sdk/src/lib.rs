//! Typed wrapper over the switch vendor SDK.
//!
//! The vendor SDK is a C library programming L3 objects on the switching
//! ASIC: host entries, LPM routes, egress objects, and ECMP groups. This
//! crate provides:
//!
//! - [`SdkStatus`] / [`SdkError`]: raw status codes converted into Rust
//!   errors at the boundary
//! - Typed identifiers ([`EgressId`], [`IntfId`], [`SdkUnit`]) so object
//!   ids of different kinds cannot be mixed up
//! - The L3 entry structs ([`L3HostEntry`], [`L3RouteEntry`],
//!   [`EgressParams`]) with an explicit [`L3Flags`] word
//! - [`SwitchSdk`], the trait cut at the SDK call surface; production
//!   code binds it to the vendor library, tests bind it to an in-memory
//!   hardware model
//! - [`HwLockToken`] / [`LockContext`], the capability values that thread
//!   hardware-lock ownership through callback-driven call stacks

mod api;
mod error;
mod types;

pub use api::SwitchSdk;
pub use error::{SdkError, SdkResult, SdkStatus, SdkStatusExt};
pub use types::{
    EgressParams, EgressId, HostAddr, HwLockToken, IntfId, IntfParams, L3Flags, L3HostEntry,
    L3RouteEntry, LockContext, PortConfig, RouteDest, SdkUnit,
};
