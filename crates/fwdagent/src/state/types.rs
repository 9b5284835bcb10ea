//! Switch-state entities.

use crate::route::ForwardInfo;
use fwd_types::{InterfaceId, IpAddress, IpPrefix, Ipv6Address, MacAddress, PortId, VlanId, VrfId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A router interface as desired by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: InterfaceId,
    pub vrf: VrfId,
    pub vlan: VlanId,
    pub mac: MacAddress,
    pub addrs: Vec<IpPrefix>,
    pub mtu: u32,
    pub ra_enabled: bool,
}

impl Interface {
    /// Returns true if `ip` is one of this interface's addresses.
    pub fn has_address(&self, ip: &IpAddress) -> bool {
        self.addrs.iter().any(|p| p.address() == ip)
    }

    /// Returns true if `ip` falls in one of this interface's subnets.
    pub fn covers(&self, ip: &IpAddress) -> bool {
        self.addrs.iter().any(|p| p.contains(ip))
    }

    /// The interface's IPv6 addresses.
    pub fn v6_addrs(&self) -> impl Iterator<Item = Ipv6Address> + '_ {
        self.addrs.iter().filter_map(|p| p.address().as_v6().copied())
    }

    /// Source address for ND emitted on this interface: the link-local
    /// address when one is configured, else the first IPv6 address.
    pub fn nd_source(&self) -> Option<Ipv6Address> {
        self.v6_addrs()
            .find(Ipv6Address::is_link_local)
            .or_else(|| self.v6_addrs().next())
    }
}

/// A neighbor table entry. `mac == None` marks a pending entry: the
/// solicitation went out and the advertisement has not come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub ip: IpAddress,
    pub mac: Option<MacAddress>,
    pub port: PortId,
}

impl NeighborEntry {
    pub fn pending(ip: IpAddress) -> Self {
        NeighborEntry {
            ip,
            mac: None,
            port: PortId::NONE,
        }
    }

    pub fn resolved(ip: IpAddress, mac: MacAddress, port: PortId) -> Self {
        NeighborEntry {
            ip,
            mac: Some(mac),
            port,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.mac.is_none()
    }
}

/// A VLAN and its neighbor table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub id: VlanId,
    pub intf: InterfaceId,
    pub neighbors: BTreeMap<IpAddress, NeighborEntry>,
}

impl Vlan {
    pub fn new(id: VlanId, intf: InterfaceId) -> Self {
        Vlan {
            id,
            intf,
            neighbors: BTreeMap::new(),
        }
    }
}

/// The forwarding decision attached to a route in the state tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteFields {
    pub fwd: ForwardInfo,
}

/// One snapshot of the switch state. Subtrees are `Arc`-shared, so a
/// snapshot clone is cheap and an unchanged subtree compares by
/// pointer in delta computation.
#[derive(Debug, Clone, Default)]
pub struct SwitchState {
    pub interfaces: BTreeMap<InterfaceId, Arc<Interface>>,
    pub vlans: BTreeMap<VlanId, Arc<Vlan>>,
    pub routes: BTreeMap<(VrfId, IpPrefix), Arc<RouteFields>>,
}

impl SwitchState {
    pub fn interface(&self, id: InterfaceId) -> Option<&Arc<Interface>> {
        self.interfaces.get(&id)
    }

    pub fn vlan(&self, id: VlanId) -> Option<&Arc<Vlan>> {
        self.vlans.get(&id)
    }

    /// The interface owning a VLAN, when both exist.
    pub fn vlan_interface(&self, vlan: VlanId) -> Option<&Arc<Interface>> {
        self.vlans.get(&vlan).and_then(|v| self.interfaces.get(&v.intf))
    }

    /// Finds the VLAN whose interface subnet covers `ip`.
    pub fn vlan_for_address(&self, ip: &IpAddress) -> Option<&Arc<Vlan>> {
        self.vlans.values().find(|vlan| {
            self.interfaces
                .get(&vlan.intf)
                .map(|intf| intf.covers(ip))
                .unwrap_or(false)
        })
    }

    /// Returns a new snapshot with the neighbor entry set, or `None`
    /// when the VLAN does not exist or the entry is unchanged.
    pub fn set_neighbor(&self, vlan_id: VlanId, entry: NeighborEntry) -> Option<SwitchState> {
        let vlan = self.vlans.get(&vlan_id)?;
        if vlan.neighbors.get(&entry.ip) == Some(&entry) {
            return None;
        }
        let mut new_vlan = Vlan::clone(vlan);
        new_vlan.neighbors.insert(entry.ip, entry);
        let mut next = self.clone();
        next.vlans.insert(vlan_id, Arc::new(new_vlan));
        Some(next)
    }

    /// Returns a new snapshot without the neighbor entry, or `None`
    /// when there is nothing to remove.
    pub fn remove_neighbor(&self, vlan_id: VlanId, ip: &IpAddress) -> Option<SwitchState> {
        let vlan = self.vlans.get(&vlan_id)?;
        if !vlan.neighbors.contains_key(ip) {
            return None;
        }
        let mut new_vlan = Vlan::clone(vlan);
        new_vlan.neighbors.remove(ip);
        let mut next = self.clone();
        next.vlans.insert(vlan_id, Arc::new(new_vlan));
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intf(id: u32, vlan: u16, addrs: &[&str]) -> Interface {
        Interface {
            id: InterfaceId::new(id),
            vrf: VrfId::DEFAULT,
            vlan: VlanId::new(vlan).unwrap(),
            mac: "02:00:00:00:00:01".parse().unwrap(),
            addrs: addrs.iter().map(|a| a.parse().unwrap()).collect(),
            mtu: 9000,
            ra_enabled: false,
        }
    }

    #[test]
    fn test_interface_address_queries() {
        let i = intf(1, 10, &["2001:db8::1/64", "10.0.0.1/24"]);
        assert!(i.has_address(&"2001:db8::1".parse().unwrap()));
        assert!(!i.has_address(&"2001:db8::2".parse().unwrap()));
        assert!(i.covers(&"2001:db8::2".parse().unwrap()));
        assert!(!i.covers(&"2001:db9::2".parse().unwrap()));
    }

    #[test]
    fn test_nd_source_prefers_link_local() {
        let i = intf(1, 10, &["2001:db8::1/64", "fe80::1/64"]);
        assert_eq!(i.nd_source(), Some("fe80::1".parse().unwrap()));

        let global_only = intf(1, 10, &["2001:db8::1/64"]);
        assert_eq!(global_only.nd_source(), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_set_neighbor_is_persistent() {
        let mut state = SwitchState::default();
        let vlan = VlanId::new(10).unwrap();
        state.interfaces.insert(
            InterfaceId::new(1),
            Arc::new(intf(1, 10, &["2001:db8::1/64"])),
        );
        state
            .vlans
            .insert(vlan, Arc::new(Vlan::new(vlan, InterfaceId::new(1))));

        let ip: IpAddress = "2001:db8::5".parse().unwrap();
        let next = state.set_neighbor(vlan, NeighborEntry::pending(ip)).unwrap();

        // the old snapshot is untouched
        assert!(state.vlan(vlan).unwrap().neighbors.is_empty());
        assert!(next.vlan(vlan).unwrap().neighbors.contains_key(&ip));

        // setting the identical entry reports no change
        assert!(next.set_neighbor(vlan, NeighborEntry::pending(ip)).is_none());
    }

    #[test]
    fn test_vlan_for_address() {
        let mut state = SwitchState::default();
        let vlan = VlanId::new(10).unwrap();
        state.interfaces.insert(
            InterfaceId::new(1),
            Arc::new(intf(1, 10, &["2001:db8::1/64"])),
        );
        state
            .vlans
            .insert(vlan, Arc::new(Vlan::new(vlan, InterfaceId::new(1))));

        assert!(state.vlan_for_address(&"2001:db8::9".parse().unwrap()).is_some());
        assert!(state.vlan_for_address(&"2001:db9::9".parse().unwrap()).is_none());
    }
}
