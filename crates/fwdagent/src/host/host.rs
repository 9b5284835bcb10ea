//! Host and ECMP host entries.

use crate::route::NextHopSet;
use fwd_sdk::EgressId;
use fwd_types::{IpAddress, PortId, VrfId};
use std::fmt;

/// Key of a host entry: a neighbor (or host-route destination) in a
/// VRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey {
    pub vrf: VrfId,
    pub ip: IpAddress,
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@vrf{}", self.ip, self.vrf)
    }
}

/// Programming state of a host entry.
///
/// `Referenced` holds an egress object but no hardware host entry yet;
/// `Added` means the hardware L3 host entry exists and matches the
/// current payload. Teardown only issues the hardware delete from
/// `Added`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Unprogrammed,
    Referenced(EgressId),
    Added(EgressId),
}

impl HostStatus {
    pub fn egress_id(&self) -> EgressId {
        match self {
            HostStatus::Unprogrammed => EgressId::INVALID,
            HostStatus::Referenced(id) | HostStatus::Added(id) => *id,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, HostStatus::Added(_))
    }
}

/// A host entry: one neighbor the hardware can deliver to directly.
///
/// Holds exactly one reference into the egress arena once programmed.
/// `port` tracks where the neighbor resolved; NONE for drop, to-CPU,
/// and unresolved entries.
#[derive(Debug, Clone, Copy)]
pub struct Host {
    pub(crate) key: HostKey,
    pub(crate) status: HostStatus,
    pub(crate) port: PortId,
}

impl Host {
    pub(crate) fn new(key: HostKey) -> Self {
        Host {
            key,
            status: HostStatus::Unprogrammed,
            port: PortId::NONE,
        }
    }

    pub(crate) fn with_egress(key: HostKey, egress_id: EgressId) -> Self {
        Host {
            key,
            status: HostStatus::Referenced(egress_id),
            port: PortId::NONE,
        }
    }

    pub fn key(&self) -> HostKey {
        self.key
    }

    pub fn egress_id(&self) -> EgressId {
        self.status.egress_id()
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    /// True once the host owns an egress object (even if only punting
    /// to the CPU). ECMP construction uses this to decide whether to
    /// punt an unresolved member.
    pub fn is_programmed(&self) -> bool {
        !matches!(self.status, HostStatus::Unprogrammed)
    }

    /// True once the hardware L3 host entry exists.
    pub fn is_added(&self) -> bool {
        self.status.is_added()
    }
}

/// Key of an ECMP host entry: a VRF plus a canonicalized next-hop set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EcmpHostKey {
    pub vrf: VrfId,
    pub nexthops: NextHopSet,
}

impl fmt::Display for EcmpHostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]@vrf{}", self.nexthops, self.vrf)
    }
}

/// An ECMP host entry: the shared forwarding target for every route
/// naming the same next-hop set.
///
/// Holds one host-table reference per member and, when the member
/// egresses did not collapse to one, one egress reference for the ECMP
/// group. `ecmp_egress_id` is INVALID in the collapsed case and
/// `egress_id` then aliases the single member's egress.
#[derive(Debug, Clone)]
pub struct EcmpHost {
    pub(crate) key: EcmpHostKey,
    pub(crate) egress_id: EgressId,
    pub(crate) ecmp_egress_id: EgressId,
}

impl EcmpHost {
    pub fn key(&self) -> &EcmpHostKey {
        &self.key
    }

    pub fn egress_id(&self) -> EgressId {
        self.egress_id
    }

    pub fn ecmp_egress_id(&self) -> EgressId {
        self.ecmp_egress_id
    }
}
