//! The state-delta applier.
//!
//! The only mutator of the host and route tables. Walks a delta in
//! dependency order (interfaces, then neighbors, then routes) and
//! issues adds, changes, and deletes against the forwarding tables.
//! Recoverable failures are logged per entity and the walk continues;
//! the applier marks itself dirty so a later delta can converge the
//! missed entities.

use crate::host::HostTable;
use crate::intf::IntfTable;
use crate::route::{RouteEnv, RouteTable};
use crate::state::{Delta, NeighborEntry, StateDelta, SwitchState};
use crate::warmboot::WarmBootCache;
use fwd_sdk::{EgressId, SdkUnit, SwitchSdk};
use fwd_types::VlanId;
use log::{error, info, warn};

/// Shared ids and platform capability the applier threads into route
/// programming.
#[derive(Debug, Clone, Copy)]
pub struct ApplierOptions {
    pub drop_egress_id: EgressId,
    pub to_cpu_egress_id: EgressId,
    pub use_host_table_for_host_routes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ApplierStats {
    pub interfaces_applied: u64,
    pub neighbors_applied: u64,
    pub routes_applied: u64,
    pub errors: u64,
}

pub struct DeltaApplier {
    opts: ApplierOptions,
    stats: ApplierStats,
    dirty: bool,
    initial_synced: bool,
}

impl DeltaApplier {
    pub fn new(opts: ApplierOptions) -> Self {
        DeltaApplier {
            opts,
            stats: ApplierStats::default(),
            dirty: false,
            initial_synced: false,
        }
    }

    pub fn stats(&self) -> &ApplierStats {
        &self.stats
    }

    /// True when some entity in a previous delta failed to apply.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Applies one delta to the forwarding tables.
    pub fn apply(
        &mut self,
        delta: &StateDelta,
        intfs: &mut IntfTable,
        hosts: &mut HostTable,
        routes: &mut RouteTable,
        cache: &mut WarmBootCache,
    ) {
        self.apply_interfaces(delta, intfs);
        self.apply_neighbors(delta, intfs, hosts, cache);
        self.apply_routes(delta, intfs, hosts, routes, cache);
    }

    fn note_error(&mut self, what: &str, err: impl std::fmt::Display) {
        error!("failed to apply {}: {}", what, err);
        self.stats.errors += 1;
        self.dirty = true;
    }

    fn apply_interfaces(&mut self, delta: &StateDelta, intfs: &mut IntfTable) {
        for (id, change) in delta.interface_deltas() {
            self.stats.interfaces_applied += 1;
            let result = match &change {
                Delta::Added(intf) | Delta::Changed(_, intf) => {
                    intfs.add_intf(id, intf.vrf, intf.mac, intf.vlan, intf.mtu)
                }
                Delta::Removed(_) => intfs.remove_intf(id),
            };
            if let Err(e) = result {
                self.note_error(&format!("interface {}", id), e);
            }
        }
    }

    fn apply_neighbors(
        &mut self,
        delta: &StateDelta,
        intfs: &IntfTable,
        hosts: &mut HostTable,
        cache: &mut WarmBootCache,
    ) {
        for (vlan_id, change) in delta.neighbor_deltas() {
            self.stats.neighbors_applied += 1;
            match change {
                Delta::Added(entry) => {
                    if let Err(e) =
                        self.add_neighbor(delta.new_state(), vlan_id, &entry, intfs, hosts, cache)
                    {
                        self.note_error(&format!("neighbor {} on vlan {}", entry.ip, vlan_id), e);
                    }
                }
                Delta::Changed(_, entry) => {
                    if let Err(e) =
                        self.program_neighbor(delta.new_state(), vlan_id, &entry, intfs, hosts, cache)
                    {
                        self.note_error(&format!("neighbor {} on vlan {}", entry.ip, vlan_id), e);
                    }
                }
                Delta::Removed(entry) => {
                    // vrf comes from the old snapshot: the interface may
                    // already be gone from the new one
                    let vrf = delta
                        .old_state()
                        .vlan_interface(vlan_id)
                        .map(|intf| intf.vrf)
                        .unwrap_or_default();
                    hosts.deref_host(cache, vrf, entry.ip);
                }
            }
        }
    }

    fn add_neighbor(
        &mut self,
        state: &SwitchState,
        vlan_id: VlanId,
        entry: &NeighborEntry,
        intfs: &IntfTable,
        hosts: &mut HostTable,
        cache: &mut WarmBootCache,
    ) -> crate::error::L3Result<()> {
        let vrf = state
            .vlan_interface(vlan_id)
            .map(|intf| intf.vrf)
            .unwrap_or_default();
        hosts.inc_ref_or_create_host(vrf, entry.ip);
        self.program_neighbor(state, vlan_id, entry, intfs, hosts, cache)
    }

    fn program_neighbor(
        &mut self,
        state: &SwitchState,
        vlan_id: VlanId,
        entry: &NeighborEntry,
        intfs: &IntfTable,
        hosts: &mut HostTable,
        cache: &mut WarmBootCache,
    ) -> crate::error::L3Result<()> {
        let intf = match state.vlan_interface(vlan_id) {
            Some(intf) => intf.clone(),
            None => {
                warn!("vlan {} has no interface, skipping neighbor {}", vlan_id, entry.ip);
                return Ok(());
            }
        };
        let hw_intf = intfs.hw_intf(intf.id)?;
        match entry.mac {
            Some(mac) => hosts.program_host(cache, intf.vrf, entry.ip, hw_intf, mac, entry.port),
            // Pending entries punt so traffic keeps soliciting.
            None => hosts.program_host_to_cpu(cache, intf.vrf, entry.ip, hw_intf),
        }
    }

    fn apply_routes(
        &mut self,
        delta: &StateDelta,
        intfs: &IntfTable,
        hosts: &mut HostTable,
        routes: &mut RouteTable,
        cache: &mut WarmBootCache,
    ) {
        for ((vrf, prefix), change) in delta.route_deltas() {
            self.stats.routes_applied += 1;
            let mut env = RouteEnv {
                hosts,
                cache,
                intfs,
                drop_egress_id: self.opts.drop_egress_id,
                to_cpu_egress_id: self.opts.to_cpu_egress_id,
                use_host_table_for_host_routes: self.opts.use_host_table_for_host_routes,
            };
            let result = match &change {
                Delta::Added(fields) | Delta::Changed(_, fields) => {
                    routes.add_route(&mut env, vrf, &prefix, &fields.fwd)
                }
                Delta::Removed(_) => routes.delete_route(&mut env, vrf, &prefix),
            };
            if let Err(e) = result {
                self.note_error(&format!("route {} in vrf {}", prefix, vrf), e);
            }
        }
    }

    /// Signals that the initial sync after a warm boot is complete:
    /// replays per-port link state into ECMP membership, then sweeps
    /// whatever the new state never claimed out of hardware. Idempotent
    /// after the first call.
    pub fn set_initial_sync_complete(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        hosts: &mut HostTable,
        cache: &mut WarmBootCache,
    ) {
        if self.initial_synced {
            return;
        }
        self.initial_synced = true;
        info!("initial sync complete");
        if let Err(e) = hosts.warm_boot_host_entries_synced(cache) {
            error!("warm boot link replay failed: {}", e);
        }
        cache.remove_unclaimed_entries(sdk, unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Interface, RouteFields, StateHandle, Vlan};
    use crate::route::{ForwardInfo, NextHop, NextHopSet};
    use fwd_sdk::{EgressParams, L3Flags};
    use fwd_test::FakeSdk;
    use fwd_types::{InterfaceId, IpAddress, IpPrefix, MacAddress, PortId, VrfId};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Fixture {
        sdk: Arc<FakeSdk>,
        intfs: IntfTable,
        hosts: HostTable,
        routes: RouteTable,
        cache: WarmBootCache,
        applier: DeltaApplier,
        handle: StateHandle,
    }

    fn base_state() -> SwitchState {
        let vlan = VlanId::new(10).unwrap();
        let mut state = SwitchState::default();
        state.interfaces.insert(
            InterfaceId::new(1),
            Arc::new(Interface {
                id: InterfaceId::new(1),
                vrf: VrfId::DEFAULT,
                vlan,
                mac: "02:00:00:00:00:01".parse().unwrap(),
                addrs: vec!["2001:db8::1/64".parse().unwrap()],
                mtu: 9000,
                ra_enabled: true,
            }),
        );
        state
            .vlans
            .insert(vlan, Arc::new(Vlan::new(vlan, InterfaceId::new(1))));
        state
    }

    fn fixture() -> Fixture {
        let sdk = Arc::new(FakeSdk::with_ports(&[5, 6]));
        let unit = SdkUnit::default();
        let drop_egress_id = sdk
            .egress_create(
                unit,
                &EgressParams {
                    intf: fwd_sdk::IntfId::new(0),
                    mac: None,
                    port: PortId::NONE,
                    flags: L3Flags::DST_DISCARD,
                },
            )
            .unwrap();
        let to_cpu_egress_id = sdk
            .egress_create(
                unit,
                &EgressParams {
                    intf: fwd_sdk::IntfId::new(0),
                    mac: None,
                    port: PortId::NONE,
                    flags: L3Flags::COPY_TO_CPU,
                },
            )
            .unwrap();
        let mut f = Fixture {
            intfs: IntfTable::new(sdk.clone(), unit),
            hosts: HostTable::new(sdk.clone(), unit, drop_egress_id),
            routes: RouteTable::new(sdk.clone(), unit),
            cache: WarmBootCache::empty(),
            applier: DeltaApplier::new(ApplierOptions {
                drop_egress_id,
                to_cpu_egress_id,
                use_host_table_for_host_routes: false,
            }),
            handle: StateHandle::new(SwitchState::default()),
            sdk,
        };
        // bring up the base interfaces
        let delta = f.handle.update(|_| Some(base_state())).unwrap();
        f.applier
            .apply(&delta, &mut f.intfs, &mut f.hosts, &mut f.routes, &mut f.cache);
        f
    }

    fn apply_update<F>(f: &mut Fixture, update: F)
    where
        F: FnOnce(&SwitchState) -> Option<SwitchState>,
    {
        if let Some(delta) = f.handle.update(update) {
            f.applier
                .apply(&delta, &mut f.intfs, &mut f.hosts, &mut f.routes, &mut f.cache);
        }
    }

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_interface_add_programs_hw_intf() {
        let f = fixture();
        assert_eq!(f.sdk.intf_count(), 1);
        assert!(f.intfs.hw_intf(InterfaceId::new(1)).is_ok());
    }

    #[test]
    fn test_pending_neighbor_punts_to_cpu() {
        let mut f = fixture();
        let vlan = VlanId::new(10).unwrap();
        apply_update(&mut f, |s| {
            s.set_neighbor(vlan, NeighborEntry::pending(ip("2001:db8::5")))
        });

        let host = f.hosts.get_host(VrfId::DEFAULT, &ip("2001:db8::5")).unwrap();
        assert!(host.is_added());
        assert_eq!(host.port(), PortId::NONE);
        let hw = f.sdk.egress(host.egress_id()).unwrap();
        assert!(hw.flags.contains(L3Flags::COPY_TO_CPU));
    }

    #[test]
    fn test_neighbor_resolution_programs_forwarding() {
        let mut f = fixture();
        let vlan = VlanId::new(10).unwrap();
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        apply_update(&mut f, |s| {
            s.set_neighbor(vlan, NeighborEntry::pending(ip("2001:db8::5")))
        });
        apply_update(&mut f, |s| {
            s.set_neighbor(
                vlan,
                NeighborEntry::resolved(ip("2001:db8::5"), mac, PortId::new(5)),
            )
        });

        let host = f.hosts.get_host(VrfId::DEFAULT, &ip("2001:db8::5")).unwrap();
        assert_eq!(host.port(), PortId::new(5));
        let hw = f.sdk.egress(host.egress_id()).unwrap();
        assert_eq!(hw.mac, Some(mac));
        assert_eq!(hw.port, PortId::new(5));
    }

    #[test]
    fn test_neighbor_removal_drains_host() {
        let mut f = fixture();
        let vlan = VlanId::new(10).unwrap();
        apply_update(&mut f, |s| {
            s.set_neighbor(vlan, NeighborEntry::pending(ip("2001:db8::5")))
        });
        assert_eq!(f.hosts.host_count(), 1);

        apply_update(&mut f, |s| s.remove_neighbor(vlan, &ip("2001:db8::5")));
        assert_eq!(f.hosts.host_count(), 0);
        assert_eq!(f.sdk.host_count(), 0);
    }

    #[test]
    fn test_route_add_change_delete() {
        let mut f = fixture();
        let key = (VrfId::DEFAULT, "10.0.0.0/24".parse::<IpPrefix>().unwrap());
        let set: NextHopSet =
            [NextHop::new(InterfaceId::new(1), ip("2001:db8::5"))].into_iter().collect();

        apply_update(&mut f, |s| {
            let mut next = s.clone();
            next.routes.insert(
                key,
                Arc::new(RouteFields {
                    fwd: ForwardInfo::Nexthops(set.clone()),
                }),
            );
            Some(next)
        });
        assert_eq!(f.routes.route_count(), 1);
        assert_eq!(f.sdk.route_count(), 1);
        assert_eq!(f.hosts.ecmp_host_count(), 1);

        apply_update(&mut f, |s| {
            let mut next = s.clone();
            next.routes.insert(
                key,
                Arc::new(RouteFields {
                    fwd: ForwardInfo::Drop,
                }),
            );
            Some(next)
        });
        assert_eq!(f.hosts.ecmp_host_count(), 0);

        apply_update(&mut f, |s| {
            let mut next = s.clone();
            next.routes.remove(&key);
            Some(next)
        });
        assert_eq!(f.routes.route_count(), 0);
        assert_eq!(f.sdk.route_count(), 0);
        assert_eq!(f.hosts.host_count(), 0);
    }

    #[test]
    fn test_failed_route_marks_dirty_and_continues() {
        let mut f = fixture();
        let bad = (VrfId::DEFAULT, "10.0.0.0/24".parse::<IpPrefix>().unwrap());
        let good = (VrfId::DEFAULT, "10.1.0.0/24".parse::<IpPrefix>().unwrap());

        f.sdk.fail_on("l3_route_add");
        apply_update(&mut f, |s| {
            let mut next = s.clone();
            next.routes.insert(
                bad,
                Arc::new(RouteFields {
                    fwd: ForwardInfo::Drop,
                }),
            );
            Some(next)
        });
        assert!(f.applier.is_dirty());
        assert_eq!(f.routes.route_count(), 0);
        f.sdk.clear_failures();

        // the applier keeps working after a failure
        apply_update(&mut f, |s| {
            let mut next = s.clone();
            next.routes.insert(
                good,
                Arc::new(RouteFields {
                    fwd: ForwardInfo::Drop,
                }),
            );
            Some(next)
        });
        assert_eq!(f.routes.route_count(), 1);
    }

    #[test]
    fn test_initial_sync_sweeps_and_bootstraps_once() {
        let mut f = fixture();
        // leftover pre-boot state
        f.sdk.preload_host(fwd_sdk::L3HostEntry::new(
            VrfId::DEFAULT,
            &ip("10.9.9.9"),
            fwd_sdk::EgressId::new(0x42),
        ));
        f.cache = WarmBootCache::collect(f.sdk.as_ref(), SdkUnit::default()).unwrap();

        f.applier.set_initial_sync_complete(
            f.sdk.as_ref(),
            SdkUnit::default(),
            &mut f.hosts,
            &mut f.cache,
        );
        assert!(f.cache.is_empty());
        assert!(f.sdk.host(VrfId::DEFAULT, &ip("10.9.9.9")).is_none());

        // second signal is a no-op
        let calls = f.sdk.calls().len();
        f.applier.set_initial_sync_complete(
            f.sdk.as_ref(),
            SdkUnit::default(),
            &mut f.hosts,
            &mut f.cache,
        );
        assert_eq!(f.sdk.calls().len(), calls);
    }

    #[test]
    fn test_neighbor_vrf_follows_interface() {
        let mut f = fixture();
        // a second interface in a non-default vrf
        let vlan20 = VlanId::new(20).unwrap();
        apply_update(&mut f, |s| {
            let mut next = s.clone();
            next.interfaces.insert(
                InterfaceId::new(2),
                Arc::new(Interface {
                    id: InterfaceId::new(2),
                    vrf: VrfId::new(7),
                    vlan: vlan20,
                    mac: "02:00:00:00:00:02".parse().unwrap(),
                    addrs: vec!["2001:db9::1/64".parse().unwrap()],
                    mtu: 9000,
                    ra_enabled: false,
                }),
            );
            next.vlans
                .insert(vlan20, Arc::new(Vlan::new(vlan20, InterfaceId::new(2))));
            Some(next)
        });
        apply_update(&mut f, |s| {
            s.set_neighbor(vlan20, NeighborEntry::pending(ip("2001:db9::5")))
        });

        assert!(f.hosts.get_host(VrfId::new(7), &ip("2001:db9::5")).is_some());
        assert!(f.hosts.get_host(VrfId::DEFAULT, &ip("2001:db9::5")).is_none());

        apply_update(&mut f, |s| s.remove_neighbor(vlan20, &ip("2001:db9::5")));
        assert_eq!(f.hosts.host_count(), 0);
    }

    #[test]
    fn test_delta_map_uses_btreemap_order() {
        // routes apply in key order; make sure multiple inserts all land
        let mut f = fixture();
        apply_update(&mut f, |s| {
            let mut next = s.clone();
            let mut routes: BTreeMap<_, _> = BTreeMap::new();
            for i in 0..4u8 {
                routes.insert(
                    (
                        VrfId::DEFAULT,
                        format!("10.{}.0.0/16", i).parse::<IpPrefix>().unwrap(),
                    ),
                    Arc::new(RouteFields {
                        fwd: ForwardInfo::Drop,
                    }),
                );
            }
            next.routes = routes;
            Some(next)
        });
        assert_eq!(f.routes.route_count(), 4);
    }
}
