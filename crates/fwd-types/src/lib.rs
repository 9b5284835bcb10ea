//! Shared network primitives for the forwarding agent.
//!
//! This crate provides type-safe representations of the primitives the
//! forwarding plane is keyed on:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)
//! - [`VrfId`], [`PortId`], [`InterfaceId`]: opaque numeric identifiers
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers

mod ids;
mod ip;
mod mac;
mod vlan;

pub use ids::{InterfaceId, PortId, VrfId};
pub use ip::{IpAddress, IpPrefix, Ipv4Address, Ipv6Address};
pub use mac::MacAddress;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),
}
