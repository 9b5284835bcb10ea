//! Typed identifiers and entry structs for the SDK call surface.

use fwd_types::{IpAddress, Ipv4Address, Ipv6Address, MacAddress, PortId, VlanId, VrfId};
use std::fmt;

/// An SDK device unit handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SdkUnit(i32);

impl SdkUnit {
    pub const fn new(unit: i32) -> Self {
        SdkUnit(unit)
    }

    pub const fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for SdkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hardware egress object id.
///
/// Assigned by the SDK when the object is created. Two values are
/// special: [`EgressId::INVALID`] (no object) and the process-wide drop
/// egress id the hardware hands out at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EgressId(u32);

impl EgressId {
    /// No egress object.
    pub const INVALID: EgressId = EgressId(u32::MAX);

    pub const fn new(id: u32) -> Self {
        EgressId(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub const fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for EgressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// A hardware router interface id, as assigned by the SDK when an L3
/// interface is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IntfId(u32);

impl IntfId {
    pub const fn new(id: u32) -> Self {
        IntfId(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IntfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flags carried by L3 host and route entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct L3Flags(u32);

impl L3Flags {
    pub const NONE: Self = Self(0);
    /// Entry keys an IPv6 address.
    pub const IP6: Self = Self(1 << 0);
    /// Entry points at an ECMP group rather than a single egress.
    pub const MULTIPATH: Self = Self(1 << 1);
    /// Overwrite an existing entry with the same key.
    pub const REPLACE: Self = Self(1 << 2);
    /// Matching packets are discarded.
    pub const DST_DISCARD: Self = Self(1 << 3);
    /// Matching packets are punted to the CPU.
    pub const COPY_TO_CPU: Self = Self(1 << 4);

    pub const fn contains(&self, other: L3Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns these flags with `other`'s bits cleared.
    pub const fn without(&self, other: L3Flags) -> L3Flags {
        L3Flags(self.0 & !other.0)
    }

    /// The flag bits that identify what a host entry is, as opposed to
    /// transient programming hints. Hardware reads on a warm boot have
    /// been observed with garbage in the other bits.
    pub fn significant(&self) -> L3Flags {
        L3Flags(self.0 & (Self::IP6.0 | Self::MULTIPATH.0))
    }
}

impl std::ops::BitOr for L3Flags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for L3Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for L3Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Address payload of an L3 host entry: v4 addresses travel as
/// host-order integers, v6 addresses as network-order byte arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostAddr {
    V4(u32),
    V6([u8; 16]),
}

impl HostAddr {
    pub fn from_ip(ip: &IpAddress) -> HostAddr {
        match ip {
            IpAddress::V4(v4) => HostAddr::V4(v4.to_u32()),
            IpAddress::V6(v6) => HostAddr::V6(v6.octets()),
        }
    }

    pub fn to_ip(&self) -> IpAddress {
        match self {
            HostAddr::V4(bits) => IpAddress::V4(Ipv4Address::from(std::net::Ipv4Addr::from(*bits))),
            HostAddr::V6(octets) => IpAddress::V6(Ipv6Address::from(*octets)),
        }
    }
}

/// An L3 host table entry as handed to the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L3HostEntry {
    pub vrf: VrfId,
    pub addr: HostAddr,
    /// The egress object (or ECMP group) the entry points at.
    pub intf: EgressId,
    pub flags: L3Flags,
}

impl L3HostEntry {
    /// Builds an entry for the given key and egress, setting the IP6
    /// flag from the address family.
    pub fn new(vrf: VrfId, ip: &IpAddress, intf: EgressId) -> Self {
        let mut flags = L3Flags::NONE;
        if ip.is_v6() {
            flags |= L3Flags::IP6;
        }
        L3HostEntry {
            vrf,
            addr: HostAddr::from_ip(ip),
            intf,
            flags,
        }
    }
}

/// Destination of an LPM route entry: subnet plus mask, in the same
/// per-family representations as [`HostAddr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteDest {
    V4 { subnet: u32, mask: u32 },
    V6 { subnet: [u8; 16], mask: [u8; 16] },
}

/// An LPM route table entry as handed to the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L3RouteEntry {
    pub vrf: VrfId,
    pub dest: RouteDest,
    /// The egress object (or ECMP group) the route resolves to.
    pub intf: EgressId,
    pub flags: L3Flags,
}

impl L3RouteEntry {
    /// Builds an entry for a prefix, setting the IP6 flag and encoding
    /// the mask for the address family.
    pub fn new(vrf: VrfId, ip: &IpAddress, len: u8, intf: EgressId) -> Self {
        let mut flags = L3Flags::NONE;
        let dest = match ip {
            IpAddress::V4(v4) => RouteDest::V4 {
                subnet: v4.to_u32(),
                mask: Ipv4Address::mask(len),
            },
            IpAddress::V6(v6) => {
                flags |= L3Flags::IP6;
                RouteDest::V6 {
                    subnet: v6.octets(),
                    mask: Ipv6Address::mask(len),
                }
            }
        };
        L3RouteEntry {
            vrf,
            dest,
            intf,
            flags,
        }
    }
}

/// Payload of an L3 router interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntfParams {
    pub vrf: VrfId,
    pub mac: MacAddress,
    pub vlan: VlanId,
    pub mtu: u32,
}

/// Payload of a unicast egress object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EgressParams {
    /// Hardware interface the egress sends out of.
    pub intf: IntfId,
    /// Destination MAC; `None` for drop and to-CPU entries.
    pub mac: Option<MacAddress>,
    /// Resolved port; [`PortId::NONE`] for drop and to-CPU entries.
    pub port: PortId,
    /// `DST_DISCARD` or `COPY_TO_CPU` when the egress is not forwarding.
    pub flags: L3Flags,
}

/// The hardware port bitmap as reported by the port configuration query.
#[derive(Debug, Clone, Default)]
pub struct PortConfig {
    pub ports: Vec<PortId>,
}

/// Witness that the SDK's internal hardware mutex is held by the caller.
///
/// Some ECMP member mutations are only legal from SDK callback context
/// where the hardware lock is already taken; others must not be issued
/// from there. Passing this value instead of a boolean keeps a call site
/// from upgrading an unlocked path by accident: a token can only come
/// from an entry point that actually runs under the lock.
#[derive(Debug, Clone, Copy)]
pub struct HwLockToken(());

impl HwLockToken {
    /// Asserts that the current call stack originates inside an SDK
    /// callback that holds the hardware lock. Only link-state and
    /// port-update entry points invoked by the SDK may call this.
    pub fn assert_held() -> Self {
        HwLockToken(())
    }
}

/// Lock ownership threaded through paths reachable from both the update
/// thread and SDK callbacks.
#[derive(Debug, Clone, Copy)]
pub enum LockContext {
    Held(HwLockToken),
    NotHeld,
}

impl LockContext {
    pub fn held() -> Self {
        LockContext::Held(HwLockToken::assert_held())
    }

    pub fn token(&self) -> Option<HwLockToken> {
        match self {
            LockContext::Held(token) => Some(*token),
            LockContext::NotHeld => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_egress_id_sentinel() {
        assert!(!EgressId::INVALID.is_valid());
        assert!(EgressId::new(100).is_valid());
        assert_eq!(EgressId::INVALID.to_string(), "INVALID");
    }

    #[test]
    fn test_flags() {
        let mut flags = L3Flags::IP6;
        flags |= L3Flags::MULTIPATH;
        assert!(flags.contains(L3Flags::IP6));
        assert!(flags.contains(L3Flags::MULTIPATH));
        assert!(!flags.contains(L3Flags::REPLACE));

        let noisy = flags | L3Flags::REPLACE | L3Flags::COPY_TO_CPU;
        assert_eq!(noisy.significant(), flags.significant());
    }

    #[test]
    fn test_host_entry_v4_host_order() {
        let ip: IpAddress = "10.0.0.1".parse().unwrap();
        let entry = L3HostEntry::new(VrfId::DEFAULT, &ip, EgressId::new(7));
        assert_eq!(entry.addr, HostAddr::V4(0x0a000001));
        assert!(!entry.flags.contains(L3Flags::IP6));
    }

    #[test]
    fn test_host_entry_v6_flag() {
        let ip: IpAddress = "2001:db8::1".parse().unwrap();
        let entry = L3HostEntry::new(VrfId::DEFAULT, &ip, EgressId::new(7));
        assert!(entry.flags.contains(L3Flags::IP6));
        assert_eq!(entry.addr.to_ip(), ip);
    }

    #[test]
    fn test_route_entry_masks() {
        let ip: IpAddress = "10.1.0.0".parse().unwrap();
        let entry = L3RouteEntry::new(VrfId::DEFAULT, &ip, 16, EgressId::new(3));
        match entry.dest {
            RouteDest::V4 { subnet, mask } => {
                assert_eq!(subnet, 0x0a010000);
                assert_eq!(mask, 0xffff0000);
            }
            RouteDest::V6 { .. } => panic!("expected v4 dest"),
        }
    }
}
