//! Deltas between two switch-state snapshots.

use crate::state::types::{Interface, NeighborEntry, RouteFields, SwitchState};
use fwd_types::{InterfaceId, IpPrefix, VlanId, VrfId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One entity's change between the old and new snapshot.
#[derive(Debug, Clone)]
pub enum Delta<T> {
    Added(T),
    Removed(T),
    Changed(T, T),
}

fn map_delta<K, V>(
    old: &BTreeMap<K, Arc<V>>,
    new: &BTreeMap<K, Arc<V>>,
) -> Vec<(K, Delta<Arc<V>>)>
where
    K: Ord + Copy,
    V: PartialEq,
{
    let mut out = Vec::new();
    for (k, old_v) in old {
        match new.get(k) {
            None => out.push((*k, Delta::Removed(old_v.clone()))),
            Some(new_v) => {
                if !Arc::ptr_eq(old_v, new_v) && **old_v != **new_v {
                    out.push((*k, Delta::Changed(old_v.clone(), new_v.clone())));
                }
            }
        }
    }
    for (k, new_v) in new {
        if !old.contains_key(k) {
            out.push((*k, Delta::Added(new_v.clone())));
        }
    }
    out
}

/// Old/new pair of switch-state snapshots, with per-entity diffing.
#[derive(Debug, Clone)]
pub struct StateDelta {
    old: Arc<SwitchState>,
    new: Arc<SwitchState>,
}

impl StateDelta {
    pub fn new(old: Arc<SwitchState>, new: Arc<SwitchState>) -> Self {
        StateDelta { old, new }
    }

    pub fn old_state(&self) -> &Arc<SwitchState> {
        &self.old
    }

    pub fn new_state(&self) -> &Arc<SwitchState> {
        &self.new
    }

    pub fn interface_deltas(&self) -> Vec<(InterfaceId, Delta<Arc<Interface>>)> {
        map_delta(&self.old.interfaces, &self.new.interfaces)
    }

    /// Neighbor changes across all VLANs. VLAN subtrees unchanged by
    /// pointer are skipped wholesale.
    pub fn neighbor_deltas(&self) -> Vec<(VlanId, Delta<NeighborEntry>)> {
        let mut out = Vec::new();
        for (vlan_id, old_vlan) in &self.old.vlans {
            match self.new.vlans.get(vlan_id) {
                None => {
                    for entry in old_vlan.neighbors.values() {
                        out.push((*vlan_id, Delta::Removed(*entry)));
                    }
                }
                Some(new_vlan) => {
                    if Arc::ptr_eq(old_vlan, new_vlan) {
                        continue;
                    }
                    for (ip, old_entry) in &old_vlan.neighbors {
                        match new_vlan.neighbors.get(ip) {
                            None => out.push((*vlan_id, Delta::Removed(*old_entry))),
                            Some(new_entry) if new_entry != old_entry => {
                                out.push((*vlan_id, Delta::Changed(*old_entry, *new_entry)))
                            }
                            Some(_) => {}
                        }
                    }
                    for (ip, new_entry) in &new_vlan.neighbors {
                        if !old_vlan.neighbors.contains_key(ip) {
                            out.push((*vlan_id, Delta::Added(*new_entry)));
                        }
                    }
                }
            }
        }
        for (vlan_id, new_vlan) in &self.new.vlans {
            if !self.old.vlans.contains_key(vlan_id) {
                for entry in new_vlan.neighbors.values() {
                    out.push((*vlan_id, Delta::Added(*entry)));
                }
            }
        }
        out
    }

    pub fn route_deltas(&self) -> Vec<((VrfId, IpPrefix), Delta<Arc<RouteFields>>)> {
        map_delta(&self.old.routes, &self.new.routes)
    }
}
