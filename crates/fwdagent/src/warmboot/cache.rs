//! Snapshot of hardware state discovered at startup.
//!
//! After a warm reboot the ASIC still holds the previous process's
//! forwarding objects. The cache captures them once at startup; every
//! first program of a host or route consults it so an unchanged entry
//! costs no hardware write. Entries are claimed as their owners
//! reprogram them, and whatever is left unclaimed after the initial
//! sync is swept out of hardware.

use fwd_sdk::{EgressId, L3RouteEntry, L3HostEntry, RouteDest, SdkResult, SdkUnit, SwitchSdk};
use fwd_types::{IpAddress, Ipv6Address, VrfId};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;

fn route_key(entry: &L3RouteEntry) -> (VrfId, IpAddress, u8) {
    match entry.dest {
        RouteDest::V4 { subnet, mask } => (
            entry.vrf,
            IpAddress::from(Ipv4Addr::from(subnet)),
            mask.count_ones() as u8,
        ),
        RouteDest::V6 { subnet, mask } => (
            entry.vrf,
            IpAddress::V6(Ipv6Address::from(subnet)),
            mask.iter().map(|b| b.count_ones()).sum::<u32>() as u8,
        ),
    }
}

/// Hardware state surviving from before the reboot.
pub struct WarmBootCache {
    hosts: HashMap<(VrfId, IpAddress), L3HostEntry>,
    routes: HashMap<(VrfId, IpAddress, u8), L3RouteEntry>,
    ecmp: BTreeMap<EgressId, BTreeSet<EgressId>>,
}

impl WarmBootCache {
    /// An empty cache, for cold boots.
    pub fn empty() -> Self {
        WarmBootCache {
            hosts: HashMap::new(),
            routes: HashMap::new(),
            ecmp: BTreeMap::new(),
        }
    }

    /// Snapshots the hardware L3 tables.
    pub fn collect(sdk: &dyn SwitchSdk, unit: SdkUnit) -> SdkResult<Self> {
        let mut cache = Self::empty();
        for entry in sdk.l3_host_traverse(unit)? {
            cache
                .hosts
                .insert((entry.vrf, entry.addr.to_ip()), entry);
        }
        for entry in sdk.l3_route_traverse(unit)? {
            cache.routes.insert(route_key(&entry), entry);
        }
        for (group, members) in sdk.ecmp_traverse(unit)? {
            cache.ecmp.insert(group, members.into_iter().collect());
        }
        info!(
            "warm boot cache: {} hosts, {} routes, {} ECMP groups",
            cache.hosts.len(),
            cache.routes.len(),
            cache.ecmp.len()
        );
        Ok(cache)
    }

    pub fn find_host(&self, vrf: VrfId, ip: &IpAddress) -> Option<&L3HostEntry> {
        self.hosts.get(&(vrf, *ip))
    }

    /// Claims a host entry: its owner reprogrammed (or elided) it.
    pub fn host_programmed(&mut self, vrf: VrfId, ip: &IpAddress) {
        if self.hosts.remove(&(vrf, *ip)).is_some() {
            debug!("claimed warm boot host entry for {} in vrf {}", ip, vrf);
        }
    }

    pub fn find_route(&self, vrf: VrfId, prefix: &IpAddress, len: u8) -> Option<&L3RouteEntry> {
        self.routes.get(&(vrf, *prefix, len))
    }

    /// Claims a route entry.
    pub fn route_programmed(&mut self, vrf: VrfId, prefix: &IpAddress, len: u8) {
        if self.routes.remove(&(vrf, *prefix, len)).is_some() {
            debug!(
                "claimed warm boot route entry for {}/{} in vrf {}",
                prefix, len, vrf
            );
        }
    }

    /// ECMP groups discovered in hardware and not yet owned by any ECMP
    /// host entry. Link-state changes during early startup mutate these
    /// directly.
    pub fn ecmp_groups(&self) -> &BTreeMap<EgressId, BTreeSet<EgressId>> {
        &self.ecmp
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.routes.is_empty() && self.ecmp.is_empty()
    }

    /// Deletes everything still unclaimed from hardware. Called once
    /// after the initial sync: anything the new state never reprogrammed
    /// is stale.
    pub fn remove_unclaimed_entries(&mut self, sdk: &dyn SwitchSdk, unit: SdkUnit) {
        for ((vrf, ip), entry) in self.hosts.drain() {
            debug!("sweeping unclaimed host entry {} in vrf {}", ip, vrf);
            if let Err(e) = sdk.l3_host_delete(unit, &entry) {
                warn!("failed to sweep host entry {} in vrf {}: {}", ip, vrf, e);
            }
        }
        for ((vrf, prefix, len), entry) in self.routes.drain() {
            debug!(
                "sweeping unclaimed route entry {}/{} in vrf {}",
                prefix, len, vrf
            );
            if let Err(e) = sdk.l3_route_delete(unit, &entry) {
                warn!(
                    "failed to sweep route entry {}/{} in vrf {}: {}",
                    prefix, len, vrf, e
                );
            }
        }
        let groups: Vec<EgressId> = self.ecmp.keys().copied().collect();
        self.ecmp.clear();
        for group in groups {
            debug!("sweeping unclaimed ECMP group {}", group);
            if let Err(e) = sdk.ecmp_destroy(unit, group) {
                warn!("failed to sweep ECMP group {}: {}", group, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwd_test::FakeSdk;

    fn v4(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_collect_and_claim() {
        let sdk = FakeSdk::new();
        let unit = SdkUnit::default();
        sdk.preload_host(L3HostEntry::new(
            VrfId::DEFAULT,
            &v4("10.0.0.1"),
            EgressId::new(7),
        ));
        sdk.preload_route(L3RouteEntry::new(
            VrfId::DEFAULT,
            &v4("10.1.0.0"),
            16,
            EgressId::new(7),
        ));

        let mut cache = WarmBootCache::collect(&sdk, unit).unwrap();
        assert!(cache.find_host(VrfId::DEFAULT, &v4("10.0.0.1")).is_some());
        assert!(cache
            .find_route(VrfId::DEFAULT, &v4("10.1.0.0"), 16)
            .is_some());
        assert!(cache.find_route(VrfId::DEFAULT, &v4("10.1.0.0"), 24).is_none());

        cache.host_programmed(VrfId::DEFAULT, &v4("10.0.0.1"));
        assert!(cache.find_host(VrfId::DEFAULT, &v4("10.0.0.1")).is_none());
    }

    #[test]
    fn test_v6_route_key_from_mask() {
        let sdk = FakeSdk::new();
        let prefix: IpAddress = "2001:db8::".parse().unwrap();
        sdk.preload_route(L3RouteEntry::new(
            VrfId::DEFAULT,
            &prefix,
            48,
            EgressId::new(7),
        ));
        let cache = WarmBootCache::collect(&sdk, SdkUnit::default()).unwrap();
        assert!(cache.find_route(VrfId::DEFAULT, &prefix, 48).is_some());
    }

    #[test]
    fn test_sweep_deletes_unclaimed() {
        let sdk = FakeSdk::new();
        let unit = SdkUnit::default();
        sdk.preload_host(L3HostEntry::new(
            VrfId::DEFAULT,
            &v4("10.0.0.1"),
            EgressId::new(7),
        ));
        sdk.preload_host(L3HostEntry::new(
            VrfId::DEFAULT,
            &v4("10.0.0.2"),
            EgressId::new(8),
        ));
        sdk.preload_ecmp(EgressId::new(0x20), vec![EgressId::new(7), EgressId::new(8)]);

        let mut cache = WarmBootCache::collect(&sdk, unit).unwrap();
        // one host is claimed, the other entries are stale
        cache.host_programmed(VrfId::DEFAULT, &v4("10.0.0.1"));
        cache.remove_unclaimed_entries(&sdk, unit);

        assert!(cache.is_empty());
        assert_eq!(sdk.host_count(), 1);
        assert_eq!(sdk.ecmp_count(), 0);
    }
}
