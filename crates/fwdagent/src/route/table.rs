//! The route table (FIB mirror).

use crate::error::{L3Error, L3Result};
use crate::route::nexthop::ForwardInfo;
use crate::route::route::{Route, RouteEnv, RouteKey};
use fwd_sdk::{SdkUnit, SwitchSdk};
use fwd_types::{IpPrefix, VrfId};
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Owner of every route programmed into hardware.
pub struct RouteTable {
    sdk: Arc<dyn SwitchSdk>,
    unit: SdkUnit,
    routes: BTreeMap<RouteKey, Route>,
}

impl RouteTable {
    pub fn new(sdk: Arc<dyn SwitchSdk>, unit: SdkUnit) -> Self {
        RouteTable {
            sdk,
            unit,
            routes: BTreeMap::new(),
        }
    }

    fn key_for(vrf: VrfId, prefix: &IpPrefix) -> RouteKey {
        RouteKey {
            vrf,
            prefix: *prefix.address(),
            len: prefix.prefix_len(),
        }
    }

    pub fn get_route(&self, vrf: VrfId, prefix: &IpPrefix) -> Option<&Route> {
        self.routes.get(&Self::key_for(vrf, prefix))
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Adds or reprograms a route. A route created by this call is
    /// removed again if its first program fails.
    pub fn add_route(
        &mut self,
        env: &mut RouteEnv<'_>,
        vrf: VrfId,
        prefix: &IpPrefix,
        fwd: &ForwardInfo,
    ) -> L3Result<()> {
        let key = Self::key_for(vrf, prefix);
        let inserted = !self.routes.contains_key(&key);
        let sdk = self.sdk.clone();
        let route = self.routes.entry(key).or_insert_with(|| Route::new(key));
        match route.program(sdk.as_ref(), self.unit, env, fwd) {
            Ok(()) => {
                info!("programmed route {} -> {}", key, fwd);
                Ok(())
            }
            Err(e) => {
                if inserted {
                    self.routes.remove(&key);
                }
                Err(e)
            }
        }
    }

    /// Deletes a route, releasing its hardware entry and references.
    pub fn delete_route(
        &mut self,
        env: &mut RouteEnv<'_>,
        vrf: VrfId,
        prefix: &IpPrefix,
    ) -> L3Result<()> {
        let key = Self::key_for(vrf, prefix);
        let mut route = self.routes.remove(&key).ok_or(L3Error::RouteNotFound {
            vrf,
            prefix: key.prefix,
            len: key.len,
        })?;
        let sdk = self.sdk.clone();
        route.destroy(sdk.as_ref(), self.unit, env);
        info!("removed route {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostTable;
    use crate::intf::IntfTable;
    use crate::route::nexthop::{NextHop, NextHopSet};
    use crate::warmboot::WarmBootCache;
    use fwd_sdk::{EgressId, EgressParams, L3Flags, L3RouteEntry};
    use fwd_test::FakeSdk;
    use fwd_types::{InterfaceId, IpAddress, PortId, VlanId};

    struct Fixture {
        sdk: Arc<FakeSdk>,
        hosts: HostTable,
        routes: RouteTable,
        intfs: IntfTable,
        cache: WarmBootCache,
        drop_egress_id: EgressId,
        to_cpu_egress_id: EgressId,
        use_host_table: bool,
    }

    impl Fixture {
        fn new() -> Self {
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
            let mut intfs = IntfTable::new(sdk.clone(), unit);
            for i in 1..=2u32 {
                intfs
                    .add_intf(
                        InterfaceId::new(i),
                        VrfId::DEFAULT,
                        format!("02:00:00:00:00:{:02x}", i).parse().unwrap(),
                        VlanId::new(i as u16).unwrap(),
                        9000,
                    )
                    .unwrap();
            }
            Fixture {
                hosts: HostTable::new(sdk.clone(), unit, drop_egress_id),
                routes: RouteTable::new(sdk.clone(), unit),
                sdk,
                intfs,
                cache: WarmBootCache::empty(),
                drop_egress_id,
                to_cpu_egress_id,
                use_host_table: false,
            }
        }

        fn add(&mut self, prefix: &str, fwd: &ForwardInfo) -> L3Result<()> {
            let prefix: IpPrefix = prefix.parse().unwrap();
            let mut env = RouteEnv {
                hosts: &mut self.hosts,
                cache: &mut self.cache,
                intfs: &self.intfs,
                drop_egress_id: self.drop_egress_id,
                to_cpu_egress_id: self.to_cpu_egress_id,
                use_host_table_for_host_routes: self.use_host_table,
            };
            self.routes.add_route(&mut env, VrfId::DEFAULT, &prefix, fwd)
        }

        fn del(&mut self, prefix: &str) -> L3Result<()> {
            let prefix: IpPrefix = prefix.parse().unwrap();
            let mut env = RouteEnv {
                hosts: &mut self.hosts,
                cache: &mut self.cache,
                intfs: &self.intfs,
                drop_egress_id: self.drop_egress_id,
                to_cpu_egress_id: self.to_cpu_egress_id,
                use_host_table_for_host_routes: self.use_host_table,
            };
            self.routes.delete_route(&mut env, VrfId::DEFAULT, &prefix)
        }
    }

    fn nexthops(hops: &[(u32, &str)]) -> ForwardInfo {
        let set: NextHopSet = hops
            .iter()
            .map(|&(intf, addr)| NextHop::new(InterfaceId::new(intf), addr.parse().unwrap()))
            .collect();
        ForwardInfo::Nexthops(set)
    }

    fn route_dest(prefix: &str) -> fwd_sdk::RouteDest {
        let prefix: IpPrefix = prefix.parse().unwrap();
        let entry = L3RouteEntry::new(
            VrfId::DEFAULT,
            prefix.address(),
            prefix.prefix_len(),
            EgressId::INVALID,
        );
        entry.dest
    }

    #[test]
    fn test_drop_route_uses_shared_drop_egress() {
        let mut f = Fixture::new();
        f.add("10.0.0.0/24", &ForwardInfo::Drop).unwrap();

        let hw = f.sdk.route(VrfId::DEFAULT, &route_dest("10.0.0.0/24")).unwrap();
        assert_eq!(hw.intf, f.drop_egress_id);
        // no host-table references were taken
        assert_eq!(f.hosts.host_count(), 0);
        assert_eq!(f.hosts.ecmp_host_count(), 0);
    }

    #[test]
    fn test_to_cpu_route_uses_shared_cpu_egress() {
        let mut f = Fixture::new();
        f.add("10.0.0.0/24", &ForwardInfo::ToCpu).unwrap();
        let hw = f.sdk.route(VrfId::DEFAULT, &route_dest("10.0.0.0/24")).unwrap();
        assert_eq!(hw.intf, f.to_cpu_egress_id);
    }

    #[test]
    fn test_nexthop_route_sets_multipath_only_for_ecmp() {
        let mut f = Fixture::new();
        f.add("10.0.0.0/24", &nexthops(&[(1, "2001::1")])).unwrap();
        let hw = f.sdk.route(VrfId::DEFAULT, &route_dest("10.0.0.0/24")).unwrap();
        assert!(!hw.flags.contains(L3Flags::MULTIPATH));

        f.add("10.1.0.0/24", &nexthops(&[(1, "2001::1"), (2, "2001::2")]))
            .unwrap();
        let hw = f.sdk.route(VrfId::DEFAULT, &route_dest("10.1.0.0/24")).unwrap();
        assert!(hw.flags.contains(L3Flags::MULTIPATH));
    }

    #[test]
    fn test_identical_reprogram_issues_no_hardware_call() {
        let mut f = Fixture::new();
        let fwd = nexthops(&[(1, "2001::1")]);
        f.add("10.0.0.0/24", &fwd).unwrap();
        f.sdk.clear_calls();

        f.add("10.0.0.0/24", &fwd).unwrap();
        assert!(f.sdk.calls().is_empty());
    }

    #[test]
    fn test_reprogram_swaps_references() {
        let mut f = Fixture::new();
        let fwd_a = nexthops(&[(1, "2001::1"), (2, "2001::2")]);
        let fwd_b = nexthops(&[(1, "2001::1")]);
        let set_a = fwd_a.nexthops().unwrap().clone();
        let set_b = fwd_b.nexthops().unwrap().clone();

        f.add("10.0.0.0/24", &fwd_a).unwrap();
        assert_eq!(f.hosts.ecmp_host_ref_count(VrfId::DEFAULT, &set_a), Some(1));

        f.add("10.0.0.0/24", &fwd_b).unwrap();
        // the old ECMP host drained, the new one holds the reference
        assert!(f.hosts.get_ecmp_host(VrfId::DEFAULT, &set_a).is_none());
        assert_eq!(f.hosts.ecmp_host_ref_count(VrfId::DEFAULT, &set_b), Some(1));

        // back to A: two distinct reprograms, refcounts as after the
        // first program
        f.add("10.0.0.0/24", &fwd_a).unwrap();
        assert_eq!(f.hosts.ecmp_host_ref_count(VrfId::DEFAULT, &set_a), Some(1));
        assert!(f.hosts.get_ecmp_host(VrfId::DEFAULT, &set_b).is_none());
        assert_eq!(f.sdk.calls_matching("l3_route_add"), 3);
    }

    #[test]
    fn test_ecmp_collapse_destroys_group() {
        // S1: reprogram from two next hops to one
        let mut f = Fixture::new();
        let fwd_two = nexthops(&[(1, "2001::1"), (2, "2001::2")]);
        f.add("10.0.0.0/24", &fwd_two).unwrap();
        assert_eq!(f.sdk.ecmp_count(), 1);
        assert_eq!(f.hosts.host_count(), 2);

        let fwd_one = nexthops(&[(1, "2001::1")]);
        f.add("10.0.0.0/24", &fwd_one).unwrap();

        // group destroyed, the dropped member's host drained
        assert_eq!(f.sdk.ecmp_count(), 0);
        assert_eq!(f.hosts.host_count(), 1);
        assert!(f
            .hosts
            .get_host(VrfId::DEFAULT, &"2001::2".parse::<IpAddress>().unwrap())
            .is_none());

        // the route now points at the single member's egress
        let e1 = f
            .hosts
            .get_host(VrfId::DEFAULT, &"2001::1".parse::<IpAddress>().unwrap())
            .unwrap()
            .egress_id();
        let hw = f.sdk.route(VrfId::DEFAULT, &route_dest("10.0.0.0/24")).unwrap();
        assert_eq!(hw.intf, e1);
    }

    #[test]
    fn test_delete_route_drains_references() {
        let mut f = Fixture::new();
        let fwd = nexthops(&[(1, "2001::1"), (2, "2001::2")]);
        f.add("10.0.0.0/24", &fwd).unwrap();

        f.del("10.0.0.0/24").unwrap();
        assert_eq!(f.routes.route_count(), 0);
        assert_eq!(f.hosts.host_count(), 0);
        assert_eq!(f.hosts.ecmp_host_count(), 0);
        assert_eq!(f.sdk.route_count(), 0);
        assert_eq!(f.sdk.host_count(), 0);
        assert_eq!(f.sdk.ecmp_count(), 0);
        // only the shared action egresses remain
        assert_eq!(f.sdk.egress_count(), 2);
    }

    #[test]
    fn test_delete_unknown_route_is_not_found() {
        let mut f = Fixture::new();
        assert!(matches!(
            f.del("10.0.0.0/24"),
            Err(L3Error::RouteNotFound { .. })
        ));
    }

    #[test]
    fn test_program_failure_rolls_back_new_references() {
        let mut f = Fixture::new();
        let fwd = nexthops(&[(1, "2001::1"), (2, "2001::2")]);
        f.sdk.fail_on("l3_route_add");

        assert!(f.add("10.0.0.0/24", &fwd).is_err());
        // the route entry was not kept and the acquired references were
        // released
        assert_eq!(f.routes.route_count(), 0);
        assert_eq!(f.hosts.ecmp_host_count(), 0);
        assert_eq!(f.hosts.host_count(), 0);
        assert_eq!(f.sdk.ecmp_count(), 0);
    }

    #[test]
    fn test_failed_reprogram_keeps_previous_forwarding() {
        let mut f = Fixture::new();
        let fwd_a = nexthops(&[(1, "2001::1")]);
        let set_a = fwd_a.nexthops().unwrap().clone();
        f.add("10.0.0.0/24", &fwd_a).unwrap();

        f.sdk.fail_on("l3_route_add");
        let fwd_b = ForwardInfo::Drop;
        assert!(f.add("10.0.0.0/24", &fwd_b).is_err());
        f.sdk.clear_failures();

        // the route still exists with its old references
        assert_eq!(f.routes.route_count(), 1);
        assert_eq!(f.hosts.ecmp_host_ref_count(VrfId::DEFAULT, &set_a), Some(1));
    }

    #[test]
    fn test_host_route_platform_uses_host_table() {
        // S6: /32 with the platform capability set
        let mut f = Fixture::new();
        f.use_host_table = true;
        let fwd = nexthops(&[(1, "2001::1")]);
        f.add("10.0.0.1/32", &fwd).unwrap();

        // no LPM entry; a host entry keyed by the route's own address
        assert_eq!(f.sdk.route_count(), 0);
        let addr: IpAddress = "10.0.0.1".parse().unwrap();
        assert!(f.sdk.host(VrfId::DEFAULT, &addr).is_some());
        let host = f.hosts.get_host(VrfId::DEFAULT, &addr).unwrap();
        let e1 = f
            .hosts
            .get_host(VrfId::DEFAULT, &"2001::1".parse::<IpAddress>().unwrap())
            .unwrap()
            .egress_id();
        assert_eq!(host.egress_id(), e1);

        f.del("10.0.0.1/32").unwrap();
        assert_eq!(f.sdk.host_count(), 0);
        assert_eq!(f.hosts.host_count(), 0);
    }

    #[test]
    fn test_host_route_without_capability_uses_lpm() {
        let mut f = Fixture::new();
        let fwd = nexthops(&[(1, "2001::1")]);
        f.add("10.0.0.1/32", &fwd).unwrap();
        assert_eq!(f.sdk.route_count(), 1);
    }

    #[test]
    fn test_warm_boot_equivalent_route_elides_add() {
        let mut f = Fixture::new();
        // seed hardware with a drop route, then re-collect the cache
        f.sdk.preload_route(L3RouteEntry::new(
            VrfId::DEFAULT,
            &"10.0.0.0".parse().unwrap(),
            24,
            f.drop_egress_id,
        ));
        f.cache = WarmBootCache::collect(f.sdk.as_ref(), SdkUnit::default()).unwrap();

        f.sdk.clear_calls();
        f.add("10.0.0.0/24", &ForwardInfo::Drop).unwrap();
        assert_eq!(f.sdk.calls_matching("l3_route_add"), 0);
        // entry claimed
        assert!(f
            .cache
            .find_route(VrfId::DEFAULT, &"10.0.0.0".parse().unwrap(), 24)
            .is_none());
    }

    #[test]
    fn test_warm_boot_changed_route_is_replaced() {
        let mut f = Fixture::new();
        f.sdk.preload_route(L3RouteEntry::new(
            VrfId::DEFAULT,
            &"10.0.0.0".parse().unwrap(),
            24,
            EgressId::new(0x42),
        ));
        f.cache = WarmBootCache::collect(f.sdk.as_ref(), SdkUnit::default()).unwrap();

        f.add("10.0.0.0/24", &ForwardInfo::Drop).unwrap();
        // replaced, not duplicated, and now pointing at the drop egress
        assert_eq!(f.sdk.route_count(), 1);
        let hw = f.sdk.route(VrfId::DEFAULT, &route_dest("10.0.0.0/24")).unwrap();
        assert_eq!(hw.intf, f.drop_egress_id);
        assert!(f
            .cache
            .find_route(VrfId::DEFAULT, &"10.0.0.0".parse().unwrap(), 24)
            .is_none());
    }

    #[test]
    fn test_routes_share_ecmp_host() {
        let mut f = Fixture::new();
        let fwd = nexthops(&[(1, "2001::1"), (2, "2001::2")]);
        let set = fwd.nexthops().unwrap().clone();
        f.add("10.0.0.0/24", &fwd).unwrap();
        f.add("10.1.0.0/24", &fwd).unwrap();

        assert_eq!(f.hosts.ecmp_host_count(), 1);
        assert_eq!(f.hosts.ecmp_host_ref_count(VrfId::DEFAULT, &set), Some(2));
        assert_eq!(f.sdk.ecmp_count(), 1);

        f.del("10.0.0.0/24").unwrap();
        assert_eq!(f.hosts.ecmp_host_ref_count(VrfId::DEFAULT, &set), Some(1));
        f.del("10.1.0.0/24").unwrap();
        assert_eq!(f.hosts.ecmp_host_count(), 0);
    }
}
