//! A single programmed route.

use crate::error::L3Result;
use crate::host::HostTable;
use crate::intf::IntfTable;
use crate::route::nexthop::ForwardInfo;
use crate::warmboot::WarmBootCache;
use fwd_sdk::{EgressId, L3Flags, L3RouteEntry, SdkUnit, SwitchSdk};
use fwd_types::{IpAddress, VrfId};
use log::{debug, error};
use std::cmp::Ordering;
use std::fmt;

/// Key of a route: `(vrf, prefix, length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub vrf: VrfId,
    pub prefix: IpAddress,
    pub len: u8,
}

impl Ord for RouteKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.vrf
            .cmp(&other.vrf)
            .then(self.len.cmp(&other.len))
            .then(self.prefix.cmp(&other.prefix))
    }
}

impl PartialOrd for RouteKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@vrf{}", self.prefix, self.len, self.vrf)
    }
}

/// Everything route programming needs besides the route itself: the
/// host table the route draws references from, the warm-boot cache,
/// the interface table for punting unresolved next hops, the shared
/// action egresses, and the platform's host-route capability.
pub struct RouteEnv<'a> {
    pub hosts: &'a mut HostTable,
    pub cache: &'a mut WarmBootCache,
    pub intfs: &'a IntfTable,
    pub drop_egress_id: EgressId,
    pub to_cpu_egress_id: EgressId,
    pub use_host_table_for_host_routes: bool,
}

/// A route resident in hardware (or about to be).
///
/// Holds at most one reference into the host table: the ECMP host for
/// its next-hop set when forwarding, plus (for host routes on capable
/// platforms) the host entry keyed by its own address.
#[derive(Debug)]
pub struct Route {
    key: RouteKey,
    fwd: Option<ForwardInfo>,
    added: bool,
}

impl Route {
    pub(crate) fn new(key: RouteKey) -> Self {
        Route {
            key,
            fwd: None,
            added: false,
        }
    }

    pub fn key(&self) -> RouteKey {
        self.key
    }

    pub fn forward_info(&self) -> Option<&ForwardInfo> {
        self.fwd.as_ref()
    }

    pub fn is_added(&self) -> bool {
        self.added
    }

    /// A host route covers exactly one address (/32 or /128).
    pub fn is_host_route(&self) -> bool {
        self.key.len == self.key.prefix.bit_width()
    }

    fn can_use_host_table(&self, env: &RouteEnv<'_>) -> bool {
        self.is_host_route() && env.use_host_table_for_host_routes
    }

    /// Programs the route's forwarding. Acquires the new references,
    /// programs hardware, then releases the old references; on failure
    /// the new references are released instead and the previous
    /// forwarding stays in force.
    pub(crate) fn program(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        env: &mut RouteEnv<'_>,
        fwd: &ForwardInfo,
    ) -> L3Result<()> {
        if self.added && self.fwd.as_ref() == Some(fwd) {
            return Ok(());
        }

        let egress_id = match fwd {
            ForwardInfo::Drop => env.drop_egress_id,
            ForwardInfo::ToCpu => env.to_cpu_egress_id,
            ForwardInfo::Nexthops(nexthops) => env.hosts.inc_ref_or_create_ecmp_host(
                env.intfs,
                env.cache,
                self.key.vrf,
                nexthops,
            )?,
        };

        let multipath = fwd.nexthop_count() > 1;
        let result = if self.can_use_host_table(env) {
            if self.added {
                // rewrite: drop the reference behind the previous
                // host-table entry before taking the new one
                debug!(
                    "dereferencing host entry for rewritten host route {}",
                    self.key
                );
                env.hosts.deref_host(env.cache, self.key.vrf, self.key.prefix);
            }
            self.program_host_route(env, egress_id, multipath)
        } else {
            self.program_lpm_route(sdk, unit, env, egress_id, multipath)
        };

        if let Err(e) = result {
            if let Some(nexthops) = fwd.nexthops() {
                env.hosts.deref_ecmp_host(env.cache, self.key.vrf, nexthops);
            }
            return Err(e);
        }

        if self.added {
            if let Some(old_nexthops) = self.fwd.as_ref().and_then(ForwardInfo::nexthops) {
                env.hosts
                    .deref_ecmp_host(env.cache, self.key.vrf, old_nexthops);
            }
        }
        self.fwd = Some(fwd.clone());
        self.added = true;
        Ok(())
    }

    /// Programs a host route through the hardware host table: a host
    /// entry keyed by the route's own address, pointing at the chosen
    /// egress.
    fn program_host_route(
        &self,
        env: &mut RouteEnv<'_>,
        egress_id: EgressId,
        is_multipath: bool,
    ) -> L3Result<()> {
        env.hosts
            .inc_ref_or_create_host_with_egress(self.key.vrf, self.key.prefix, egress_id);
        if let Err(e) = env
            .hosts
            .add_host_to_hw(env.cache, self.key.vrf, self.key.prefix, is_multipath)
        {
            env.hosts.deref_host(env.cache, self.key.vrf, self.key.prefix);
            return Err(e);
        }
        debug!("programmed host route {} @egress {}", self.key, egress_id);
        Ok(())
    }

    fn program_lpm_route(
        &self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        env: &mut RouteEnv<'_>,
        egress_id: EgressId,
        multipath: bool,
    ) -> L3Result<()> {
        let mut entry = L3RouteEntry::new(self.key.vrf, &self.key.prefix, self.key.len, egress_id);
        if multipath {
            entry.flags |= L3Flags::MULTIPATH;
        }

        let cached = env
            .cache
            .find_route(self.key.vrf, &self.key.prefix, self.key.len)
            .copied();
        let mut add_route = true;
        if let Some(existing) = cached {
            // Unlike hosts, routes legitimately change: compare the full
            // flag word and the egress and converge with a replace.
            if existing.flags == entry.flags && existing.intf == entry.intf {
                debug!("route {} already exists", self.key);
                add_route = false;
            } else {
                debug!("updating route {}", self.key);
                entry.flags |= L3Flags::REPLACE;
            }
        }

        if add_route {
            if self.added {
                entry.flags |= L3Flags::REPLACE;
            }
            sdk.l3_route_add(unit, &entry)?;
            debug!("created route entry for {} @egress {}", self.key, egress_id);
        }
        if cached.is_some() {
            env.cache
                .route_programmed(self.key.vrf, &self.key.prefix, self.key.len);
        }
        Ok(())
    }

    /// Removes the route from hardware and releases its references.
    pub(crate) fn destroy(&mut self, sdk: &dyn SwitchSdk, unit: SdkUnit, env: &mut RouteEnv<'_>) {
        if !self.added {
            return;
        }
        if self.can_use_host_table(env) {
            debug!("dereferencing host entry for host route {}", self.key);
            env.hosts.deref_host(env.cache, self.key.vrf, self.key.prefix);
        } else {
            let entry =
                L3RouteEntry::new(self.key.vrf, &self.key.prefix, self.key.len, EgressId::INVALID);
            if let Err(e) = sdk.l3_route_delete(unit, &entry) {
                error!("failed to delete route entry for {}: {}", self.key, e);
            } else {
                debug!("deleted route entry for {}", self.key);
            }
        }
        if let Some(nexthops) = self.fwd.as_ref().and_then(ForwardInfo::nexthops) {
            env.hosts.deref_ecmp_host(env.cache, self.key.vrf, nexthops);
        }
        self.added = false;
    }
}
