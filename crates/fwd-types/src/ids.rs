//! Opaque numeric identifiers used to key forwarding state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A virtual routing and forwarding domain.
///
/// VRFs are an integer namespace for routes and hosts; VRF 0 is the
/// default routing table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct VrfId(u32);

impl VrfId {
    /// The default VRF.
    pub const DEFAULT: VrfId = VrfId(0);

    pub const fn new(id: u32) -> Self {
        VrfId(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub const fn is_default(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VrfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A physical switch port.
///
/// Port 0 is the null port: drop and to-CPU entries, and entries whose
/// neighbor has not resolved yet, carry it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PortId(u32);

impl PortId {
    /// No port associated (unresolved, drop, or to-CPU entries).
    pub const NONE: PortId = PortId(0);

    pub const fn new(id: u32) -> Self {
        PortId(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A router interface as known to the control plane.
///
/// Distinct from the hardware interface id the SDK assigns; the interface
/// table maps between the two.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct InterfaceId(u32);

impl InterfaceId {
    pub const fn new(id: u32) -> Self {
        InterfaceId(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
