//! The host table: reference-counted hosts, ECMP hosts, and egress
//! objects.
//!
//! Three arenas with embedded reference counts back the forwarding
//! object graph: routes reference ECMP hosts, ECMP hosts reference
//! hosts, hosts reference egress objects. Lookups never create entries;
//! a reference operation on a missing key is a caller bug and fatal.
//! Creation and teardown always run their hardware side before the
//! count bookkeeping settles, so hardware state stays a superset of the
//! live references during any crossover.

use crate::egress::{
    add_egress_id_hw_locked, remove_egress_id_hw_locked, remove_egress_id_hw_not_locked,
    EcmpEgress, Egress, EgressObject,
};
use crate::error::{L3Error, L3Result};
use crate::fatal;
use crate::host::host::{EcmpHost, EcmpHostKey, Host, HostKey, HostStatus};
use crate::host::port_index::{PortEgressIndex, PortEgressMap, ResolutionTransition};
use crate::intf::IntfTable;
use crate::route::NextHopSet;
use crate::warmboot::WarmBootCache;
use fwd_sdk::{EgressId, IntfId, L3Flags, L3HostEntry, LockContext, SdkUnit, SwitchSdk};
use fwd_types::{IpAddress, MacAddress, PortId, VrfId};
use log::{debug, error, info, warn};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug)]
struct RefEntry<T> {
    value: T,
    ref_count: u32,
}

/// Counters for the debug surface.
#[derive(Debug, Clone, Default)]
pub struct HostTableStats {
    pub hosts_created: u64,
    pub hosts_destroyed: u64,
    pub ecmp_hosts_created: u64,
    pub ecmp_hosts_destroyed: u64,
    pub resolution_events: u64,
}

/// Owner of hosts, ECMP hosts, and the egress arena.
pub struct HostTable {
    sdk: Arc<dyn SwitchSdk>,
    unit: SdkUnit,
    /// The process-wide drop egress; excluded from reference counting
    /// along with INVALID.
    drop_egress_id: EgressId,
    hosts: HashMap<HostKey, RefEntry<Host>>,
    ecmp_hosts: HashMap<EcmpHostKey, RefEntry<EcmpHost>>,
    egresses: HashMap<EgressId, RefEntry<EgressObject>>,
    port_index: PortEgressIndex,
    stats: HostTableStats,
}

enum ProgramOp {
    Forward { mac: MacAddress, port: PortId },
    Drop,
    ToCpu,
}

impl HostTable {
    pub fn new(sdk: Arc<dyn SwitchSdk>, unit: SdkUnit, drop_egress_id: EgressId) -> Self {
        HostTable {
            sdk,
            unit,
            drop_egress_id,
            hosts: HashMap::new(),
            ecmp_hosts: HashMap::new(),
            egresses: HashMap::new(),
            port_index: PortEgressIndex::new(),
            stats: HostTableStats::default(),
        }
    }

    pub fn stats(&self) -> &HostTableStats {
        &self.stats
    }

    // ------------------------------------------------------------------
    // Egress arena
    // ------------------------------------------------------------------

    /// Records a newly constructed egress object with one reference,
    /// owned by the caller. Double insertion of an id is fatal.
    pub fn insert_egress(&mut self, object: EgressObject) -> EgressId {
        let id = object.id();
        if self.egresses.contains_key(&id) {
            fatal!("egress {} inserted twice", id);
        }
        self.egresses.insert(
            id,
            RefEntry {
                value: object,
                ref_count: 1,
            },
        );
        id
    }

    /// Takes a reference on an egress object. No-op for INVALID and the
    /// drop egress; an unknown id is a caller bug and fatal.
    pub fn inc_egress_ref(&mut self, id: EgressId) {
        if !id.is_valid() || id == self.drop_egress_id {
            return;
        }
        match self.egresses.get_mut(&id) {
            Some(entry) => entry.ref_count += 1,
            None => fatal!("inc_ref on unknown egress {}", id),
        }
    }

    /// Releases a reference; at zero the object is destroyed and its
    /// hardware footprint released.
    pub fn dec_egress_ref(&mut self, id: EgressId) {
        if !id.is_valid() || id == self.drop_egress_id {
            return;
        }
        let entry = match self.egresses.get_mut(&id) {
            Some(entry) => entry,
            None => fatal!("dec_ref on unknown egress {}", id),
        };
        if entry.ref_count == 0 {
            fatal!("egress {} reference count underflow", id);
        }
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            let mut removed = self.egresses.remove(&id).unwrap();
            removed.value.destroy(self.sdk.as_ref(), self.unit);
        }
    }

    pub fn egress(&self, id: EgressId) -> Option<&EgressObject> {
        self.egresses.get(&id).map(|e| &e.value)
    }

    pub fn egress_ref_count(&self, id: EgressId) -> Option<u32> {
        self.egresses.get(&id).map(|e| e.ref_count)
    }

    pub fn egress_count(&self) -> usize {
        self.egresses.len()
    }

    // ------------------------------------------------------------------
    // Hosts
    // ------------------------------------------------------------------

    pub fn get_host(&self, vrf: VrfId, ip: &IpAddress) -> Option<&Host> {
        self.hosts.get(&HostKey { vrf, ip: *ip }).map(|e| &e.value)
    }

    pub fn host_ref_count(&self, vrf: VrfId, ip: &IpAddress) -> Option<u32> {
        self.hosts.get(&HostKey { vrf, ip: *ip }).map(|e| e.ref_count)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Returns the existing host with its count bumped, or creates an
    /// unprogrammed one with count 1.
    pub fn inc_ref_or_create_host(&mut self, vrf: VrfId, ip: IpAddress) -> &Host {
        let key = HostKey { vrf, ip };
        if self.hosts.contains_key(&key) {
            self.hosts.get_mut(&key).unwrap().ref_count += 1;
        } else {
            self.stats.hosts_created += 1;
            self.hosts.insert(
                key,
                RefEntry {
                    value: Host::new(key),
                    ref_count: 1,
                },
            );
        }
        &self.hosts.get(&key).unwrap().value
    }

    /// Like [`inc_ref_or_create_host`](Self::inc_ref_or_create_host),
    /// but a newly created host adopts `egress_id` and takes a
    /// reference on it. The egress argument is ignored when the host
    /// already exists. Used by host-route programming.
    pub fn inc_ref_or_create_host_with_egress(
        &mut self,
        vrf: VrfId,
        ip: IpAddress,
        egress_id: EgressId,
    ) -> &Host {
        let key = HostKey { vrf, ip };
        if self.hosts.contains_key(&key) {
            self.hosts.get_mut(&key).unwrap().ref_count += 1;
        } else {
            self.inc_egress_ref(egress_id);
            self.stats.hosts_created += 1;
            self.hosts.insert(
                key,
                RefEntry {
                    value: Host::with_egress(key, egress_id),
                    ref_count: 1,
                },
            );
        }
        &self.hosts.get(&key).unwrap().value
    }

    /// Releases a host reference; at zero the host is destroyed: its
    /// hardware entry deleted, its port mapping cleared, its egress
    /// reference released. Returns true when the host was destroyed.
    pub fn deref_host(&mut self, cache: &WarmBootCache, vrf: VrfId, ip: IpAddress) -> bool {
        let key = HostKey { vrf, ip };
        let entry = match self.hosts.get_mut(&key) {
            Some(entry) => entry,
            None => {
                warn!("deref of unknown host {}", key);
                return false;
            }
        };
        if entry.ref_count == 0 {
            fatal!("host {} reference count underflow", key);
        }
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return false;
        }
        let removed = self.hosts.remove(&key).unwrap().value;
        self.stats.hosts_destroyed += 1;
        self.destroy_host(cache, removed);
        true
    }

    fn destroy_host(&mut self, cache: &WarmBootCache, host: Host) {
        let egress_id = match host.status {
            HostStatus::Unprogrammed => return,
            HostStatus::Referenced(id) => id,
            HostStatus::Added(id) => {
                let entry = L3HostEntry::new(host.key.vrf, &host.key.ip, id);
                if let Err(e) = self.sdk.l3_host_delete(self.unit, &entry) {
                    // A host entry we believe added must be deletable;
                    // disagreement here means the model is corrupt.
                    fatal!("failed to delete L3 host entry for {}: {}", host.key, e);
                }
                debug!("deleted L3 host entry for {}", host.key);
                id
            }
        };
        if !host.port.is_none() {
            self.update_port_egress_mapping(cache, egress_id, host.port, PortId::NONE);
        }
        self.dec_egress_ref(egress_id);
    }

    // ------------------------------------------------------------------
    // Host programming
    // ------------------------------------------------------------------

    /// Resolves a host: program its egress to forward to `mac` on
    /// `port` out `intf`, add the hardware host entry on first program,
    /// and refresh the port mapping.
    pub fn program_host(
        &mut self,
        cache: &mut WarmBootCache,
        vrf: VrfId,
        ip: IpAddress,
        intf: IntfId,
        mac: MacAddress,
        port: PortId,
    ) -> L3Result<()> {
        self.program_host_inner(cache, vrf, ip, intf, ProgramOp::Forward { mac, port })
    }

    /// Programs a host to discard. The port mapping is cleared.
    pub fn program_host_to_drop(
        &mut self,
        cache: &mut WarmBootCache,
        vrf: VrfId,
        ip: IpAddress,
        intf: IntfId,
    ) -> L3Result<()> {
        self.program_host_inner(cache, vrf, ip, intf, ProgramOp::Drop)
    }

    /// Programs a host to punt to the CPU, so traffic for it triggers
    /// neighbor discovery. The port mapping is cleared.
    pub fn program_host_to_cpu(
        &mut self,
        cache: &mut WarmBootCache,
        vrf: VrfId,
        ip: IpAddress,
        intf: IntfId,
    ) -> L3Result<()> {
        self.program_host_inner(cache, vrf, ip, intf, ProgramOp::ToCpu)
    }

    fn program_host_inner(
        &mut self,
        cache: &mut WarmBootCache,
        vrf: VrfId,
        ip: IpAddress,
        intf: IntfId,
        op: ProgramOp,
    ) -> L3Result<()> {
        let sdk = self.sdk.clone();
        let key = HostKey { vrf, ip };
        let host = match self.hosts.get(&key) {
            Some(entry) => entry.value,
            None => return Err(L3Error::HostNotFound { vrf, ip }),
        };

        // Get the egress object, creating one on first program.
        let egress_id = match host.status {
            HostStatus::Unprogrammed => {
                let mut egress = Egress::new(vrf);
                match &op {
                    ProgramOp::Forward { mac, port } => {
                        egress.program(sdk.as_ref(), self.unit, intf, ip, *mac, *port)?
                    }
                    ProgramOp::Drop => egress.program_to_drop(sdk.as_ref(), self.unit, intf, ip)?,
                    ProgramOp::ToCpu => egress.program_to_cpu(sdk.as_ref(), self.unit, intf, ip)?,
                }
                self.insert_egress(EgressObject::Unicast(egress))
            }
            HostStatus::Referenced(id) | HostStatus::Added(id) => {
                let entry = match self.egresses.get_mut(&id) {
                    Some(entry) => entry,
                    None => fatal!("host {} references unknown egress {}", key, id),
                };
                let egress = match &mut entry.value {
                    EgressObject::Unicast(e) => e,
                    EgressObject::Ecmp(_) => {
                        fatal!("host {} egress {} is an ECMP group", key, id)
                    }
                };
                match &op {
                    ProgramOp::Forward { mac, port } => {
                        egress.program(sdk.as_ref(), self.unit, intf, ip, *mac, *port)?
                    }
                    ProgramOp::Drop => egress.program_to_drop(sdk.as_ref(), self.unit, intf, ip)?,
                    ProgramOp::ToCpu => egress.program_to_cpu(sdk.as_ref(), self.unit, intf, ip)?,
                }
                id
            }
        };

        // The host now owns the egress reference even if the hardware
        // host add below fails; teardown will release it.
        if !host.status.is_added() {
            self.hosts.get_mut(&key).unwrap().value.status = HostStatus::Referenced(egress_id);
            self.add_host_to_hw(cache, vrf, ip, false)?;
        }

        let new_port = match &op {
            ProgramOp::Forward { port, .. } => *port,
            ProgramOp::Drop | ProgramOp::ToCpu => PortId::NONE,
        };
        let old_port = host.port;
        self.hosts.get_mut(&key).unwrap().value.port = new_port;
        if old_port != new_port {
            debug!(
                "updated port for egress {} from {} to {}",
                egress_id, old_port, new_port
            );
            self.update_port_egress_mapping(cache, egress_id, old_port, new_port);
        }
        Ok(())
    }

    /// Adds the hardware L3 host entry for an already referenced host.
    /// No-op when the entry already exists. On the first add after a
    /// warm boot the cached hardware entry is compared on the
    /// significant flags, vrf and egress; a match elides the hardware
    /// call, a mismatch is fatal; host entries must not drift.
    pub fn add_host_to_hw(
        &mut self,
        cache: &mut WarmBootCache,
        vrf: VrfId,
        ip: IpAddress,
        is_multipath: bool,
    ) -> L3Result<()> {
        let key = HostKey { vrf, ip };
        let host = match self.hosts.get(&key) {
            Some(entry) => entry.value,
            None => return Err(L3Error::HostNotFound { vrf, ip }),
        };
        let egress_id = match host.status {
            HostStatus::Unprogrammed => fatal!("host {} has no egress to add with", key),
            HostStatus::Added(_) => return Ok(()),
            HostStatus::Referenced(id) => id,
        };

        let mut entry = L3HostEntry::new(vrf, &ip, egress_id);
        if is_multipath {
            entry.flags |= L3Flags::MULTIPATH;
        }

        if let Some(cached) = cache.find_host(vrf, &ip) {
            let equivalent = cached.flags.significant() == entry.flags.significant()
                && cached.vrf == entry.vrf
                && cached.intf == entry.intf;
            if !equivalent {
                fatal!(
                    "host entry for {} changed across warm boot (cached egress {}, new egress {})",
                    key,
                    cached.intf,
                    entry.intf
                );
            }
            debug!("host entry for {} already exists", key);
            cache.host_programmed(vrf, &ip);
        } else {
            self.sdk.l3_host_add(self.unit, &entry)?;
            debug!("created L3 host entry for {} @egress {}", key, egress_id);
        }
        self.hosts.get_mut(&key).unwrap().value.status = HostStatus::Added(egress_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // ECMP hosts
    // ------------------------------------------------------------------

    pub fn get_ecmp_host(&self, vrf: VrfId, nexthops: &NextHopSet) -> Option<&EcmpHost> {
        let key = EcmpHostKey {
            vrf,
            nexthops: nexthops.clone(),
        };
        self.ecmp_hosts.get(&key).map(|e| &e.value)
    }

    pub fn ecmp_host_ref_count(&self, vrf: VrfId, nexthops: &NextHopSet) -> Option<u32> {
        let key = EcmpHostKey {
            vrf,
            nexthops: nexthops.clone(),
        };
        self.ecmp_hosts.get(&key).map(|e| e.ref_count)
    }

    pub fn ecmp_host_count(&self) -> usize {
        self.ecmp_hosts.len()
    }

    /// Returns the egress id routes should point at for this next-hop
    /// set, creating the ECMP host (and its member hosts) on first use.
    pub fn inc_ref_or_create_ecmp_host(
        &mut self,
        intfs: &IntfTable,
        cache: &mut WarmBootCache,
        vrf: VrfId,
        nexthops: &NextHopSet,
    ) -> L3Result<EgressId> {
        let key = EcmpHostKey {
            vrf,
            nexthops: nexthops.clone(),
        };
        if let Some(entry) = self.ecmp_hosts.get_mut(&key) {
            entry.ref_count += 1;
            return Ok(entry.value.egress_id);
        }
        let host = self.create_ecmp_host(intfs, cache, key.clone())?;
        let egress_id = host.egress_id;
        self.stats.ecmp_hosts_created += 1;
        self.ecmp_hosts.insert(
            key,
            RefEntry {
                value: host,
                ref_count: 1,
            },
        );
        Ok(egress_id)
    }

    /// Builds an ECMP host, acquiring one reference per member host. On
    /// any failure every reference acquired so far is released before
    /// the error propagates.
    fn create_ecmp_host(
        &mut self,
        intfs: &IntfTable,
        cache: &mut WarmBootCache,
        key: EcmpHostKey,
    ) -> L3Result<EcmpHost> {
        let vrf = key.vrf;
        let mut acquired: Vec<IpAddress> = Vec::with_capacity(key.nexthops.len());
        let mut paths: BTreeSet<EgressId> = BTreeSet::new();

        for nh in key.nexthops.iter() {
            self.inc_ref_or_create_host(vrf, nh.ip);
            acquired.push(nh.ip);

            let programmed = self
                .get_host(vrf, &nh.ip)
                .map(Host::is_programmed)
                .unwrap_or(false);
            if !programmed {
                // Punt until the neighbor resolves; the punted traffic
                // is what triggers discovery.
                let result = intfs
                    .hw_intf(nh.intf)
                    .and_then(|hw_intf| self.program_host_to_cpu(cache, vrf, nh.ip, hw_intf));
                if let Err(e) = result {
                    self.rollback_hosts(cache, vrf, &acquired);
                    return Err(e);
                }
            }
            let egress_id = self.get_host(vrf, &nh.ip).unwrap().egress_id();
            paths.insert(egress_id);
        }

        if paths.len() == 1 {
            // One distinct member egress: no group needed, the entry
            // aliases the member directly.
            let egress_id = *paths.iter().next().unwrap();
            debug!("ECMP host {} collapsed to single egress {}", key, egress_id);
            return Ok(EcmpHost {
                key,
                egress_id,
                ecmp_egress_id: EgressId::INVALID,
            });
        }

        let sdk = self.sdk.clone();
        let group = match EcmpEgress::program(sdk.as_ref(), self.unit, paths) {
            Ok(group) => group,
            Err(e) => {
                self.rollback_hosts(cache, vrf, &acquired);
                return Err(e);
            }
        };
        let egress_id = self.insert_egress(EgressObject::Ecmp(group));
        info!("created ECMP host {} @group {}", key, egress_id);
        Ok(EcmpHost {
            key,
            egress_id,
            ecmp_egress_id: egress_id,
        })
    }

    fn rollback_hosts(&mut self, cache: &WarmBootCache, vrf: VrfId, ips: &[IpAddress]) {
        for ip in ips {
            self.deref_host(cache, vrf, *ip);
        }
    }

    /// Releases an ECMP host reference; at zero the group egress and
    /// every member host reference are released, group first since it
    /// points at the members.
    pub fn deref_ecmp_host(
        &mut self,
        cache: &WarmBootCache,
        vrf: VrfId,
        nexthops: &NextHopSet,
    ) -> bool {
        let key = EcmpHostKey {
            vrf,
            nexthops: nexthops.clone(),
        };
        let entry = match self.ecmp_hosts.get_mut(&key) {
            Some(entry) => entry,
            None => {
                warn!("deref of unknown ECMP host {}", key);
                return false;
            }
        };
        if entry.ref_count == 0 {
            fatal!("ECMP host {} reference count underflow", key);
        }
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return false;
        }
        let removed = self.ecmp_hosts.remove(&key).unwrap().value;
        self.stats.ecmp_hosts_destroyed += 1;
        debug!("destroying ECMP host {}", removed.key);
        self.dec_egress_ref(removed.ecmp_egress_id);
        for nh in removed.key.nexthops.iter() {
            self.deref_host(cache, vrf, nh.ip);
        }
        true
    }

    // ------------------------------------------------------------------
    // Port mapping and link state
    // ------------------------------------------------------------------

    /// Current published snapshot of the port/egress relation.
    pub fn port_egress_snapshot(&self) -> Arc<PortEgressMap> {
        self.port_index.snapshot()
    }

    /// The port an egress currently resolves out, NONE if unresolved.
    pub fn egress_port(&self, egress_id: EgressId) -> PortId {
        self.port_index
            .snapshot()
            .port_for(egress_id)
            .unwrap_or(PortId::NONE)
    }

    /// Rewrites the published mapping for one egress and, when the
    /// update is a resolution transition, tells every ECMP group about
    /// the path. Runs with the hardware lock held: both the update
    /// thread (through the SDK's entry points) and SDK callbacks reach
    /// here under it.
    pub(crate) fn update_port_egress_mapping(
        &mut self,
        cache: &WarmBootCache,
        egress_id: EgressId,
        old_port: PortId,
        new_port: PortId,
    ) {
        let transition = self.port_index.update(egress_id, old_port, new_port);
        let mut paths = BTreeSet::new();
        paths.insert(egress_id);
        match transition {
            // The egress just resolved. Groups need a checked add: if a
            // neighbor entry expired without its port going down, the
            // member was never removed and is still in the group.
            ResolutionTransition::CameUp => {
                self.egress_resolution_changed(cache, &paths, true, LockContext::held())
            }
            ResolutionTransition::WentAway => {
                self.egress_resolution_changed(cache, &paths, false, LockContext::held())
            }
            ResolutionTransition::None => {}
        }
    }

    /// Link went up, called from SDK callback context under the
    /// hardware lock.
    pub fn link_up_hw_locked(&mut self, cache: &WarmBootCache, port: PortId) {
        self.link_state_changed(cache, port, true, LockContext::held());
    }

    /// Link went down, called from SDK callback context under the
    /// hardware lock.
    pub fn link_down_hw_locked(&mut self, cache: &WarmBootCache, port: PortId) {
        self.link_state_changed(cache, port, false, LockContext::held());
    }

    /// Link state change delivered outside the hardware lock.
    pub fn link_state_changed_not_locked(
        &mut self,
        cache: &WarmBootCache,
        port: PortId,
        up: bool,
    ) {
        self.link_state_changed(cache, port, up, LockContext::NotHeld);
    }

    /// Fans a port's link transition out to the egress objects
    /// currently resolved on it.
    pub fn link_state_changed(
        &mut self,
        cache: &WarmBootCache,
        port: PortId,
        up: bool,
        lock: LockContext,
    ) {
        let snapshot = self.port_index.snapshot();
        let paths = match snapshot.egress_ids_for(port) {
            Some(paths) => paths.clone(),
            None => return,
        };
        debug!(
            "link {} on port {} affects {} paths",
            if up { "up" } else { "down" },
            port,
            paths.len()
        );
        self.egress_resolution_changed(cache, &paths, up, lock);
    }

    /// Updates ECMP membership for a set of paths whose reachability
    /// changed: every owned ECMP group, and every group the warm-boot
    /// cache still knows about that no ECMP host owns yet (link events
    /// can arrive before the first FIB sync).
    pub fn egress_resolution_changed(
        &mut self,
        cache: &WarmBootCache,
        paths: &BTreeSet<EgressId>,
        up: bool,
        lock: LockContext,
    ) {
        self.stats.resolution_events += 1;
        let sdk = self.sdk.clone();
        let unit = self.unit;

        let group_ids: Vec<EgressId> = self
            .ecmp_hosts
            .values()
            .map(|e| e.value.ecmp_egress_id)
            .filter(EgressId::is_valid)
            .collect();
        for group_id in group_ids {
            let entry = match self.egresses.get_mut(&group_id) {
                Some(entry) => entry,
                None => fatal!("ECMP host references unknown egress {}", group_id),
            };
            let group = match entry.value.as_ecmp_mut() {
                Some(group) => group,
                None => fatal!("egress {} is not an ECMP group", group_id),
            };
            for path in paths {
                let result = if up {
                    match lock.token() {
                        Some(token) => group.path_reachable(sdk.as_ref(), unit, token, *path),
                        None => fatal!("path-reachable update requires the hardware lock"),
                    }
                } else {
                    match lock {
                        LockContext::Held(token) => {
                            group.path_unreachable_locked(sdk.as_ref(), unit, token, *path)
                        }
                        LockContext::NotHeld => {
                            group.path_unreachable_not_locked(sdk.as_ref(), unit, *path)
                        }
                    }
                };
                if let Err(e) = result {
                    error!(
                        "failed to update path {} in ECMP group {}: {}",
                        path, group_id, e
                    );
                }
            }
        }

        for (&group, _members) in cache.ecmp_groups() {
            for path in paths {
                let result = if up {
                    match lock.token() {
                        Some(token) => add_egress_id_hw_locked(sdk.as_ref(), unit, token, group, *path),
                        None => fatal!("path-reachable update requires the hardware lock"),
                    }
                } else {
                    match lock {
                        LockContext::Held(token) => {
                            remove_egress_id_hw_locked(sdk.as_ref(), unit, token, group, *path)
                        }
                        LockContext::NotHeld => {
                            remove_egress_id_hw_not_locked(sdk.as_ref(), unit, group, *path)
                        }
                    }
                };
                if let Err(e) = result {
                    error!(
                        "failed to update path {} in warm boot ECMP group {}: {}",
                        path, group, e
                    );
                }
            }
        }
    }

    /// Called once the initial host sync completed after a warm boot:
    /// replays the current physical link state of every port so ECMP
    /// membership converges with reality. Ports may have flapped while
    /// the process was down, so all of them are replayed.
    pub fn warm_boot_host_entries_synced(&mut self, cache: &WarmBootCache) -> L3Result<()> {
        let sdk = self.sdk.clone();
        let pcfg = sdk.port_config(self.unit)?;
        info!(
            "warm boot host entries synced, replaying link state for {} ports",
            pcfg.ports.len()
        );
        for port in pcfg.ports {
            match sdk.port_link_up(self.unit, port) {
                Ok(true) => self.link_up_hw_locked(cache, port),
                Ok(false) => self.link_down_hw_locked(cache, port),
                Err(e) => warn!("failed to read link state of port {}: {}", port, e),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Debug surface
    // ------------------------------------------------------------------

    fn egress_json(&self, id: EgressId) -> serde_json::Value {
        if id.is_valid() && id != self.drop_egress_id {
            if let Some(entry) = self.egresses.get(&id) {
                return entry.value.to_json();
            }
        }
        serde_json::Value::Null
    }

    pub fn host_to_json(&self, host: &Host) -> serde_json::Value {
        let egress_id = host.egress_id();
        json!({
            "vrf": host.key.vrf.as_u32(),
            "ip": host.key.ip.to_string(),
            "port": host.port.as_u32(),
            "egressId": if egress_id.is_valid() {
                serde_json::Value::from(egress_id.as_u32())
            } else {
                serde_json::Value::Null
            },
            "egress": self.egress_json(egress_id),
        })
    }

    pub fn ecmp_host_to_json(&self, host: &EcmpHost) -> serde_json::Value {
        json!({
            "vrf": host.key.vrf.as_u32(),
            "nexthops": host.key.nexthops.iter().map(|nh| nh.to_string()).collect::<Vec<_>>(),
            "egressId": host.egress_id.as_u32(),
            "ecmpEgressId": if host.ecmp_egress_id.is_valid() {
                serde_json::Value::from(host.ecmp_egress_id.as_u32())
            } else {
                serde_json::Value::Null
            },
            "ecmpEgress": self.egress_json(host.ecmp_egress_id),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "hosts": self.hosts.values().map(|e| self.host_to_json(&e.value)).collect::<Vec<_>>(),
            "ecmpHosts": self.ecmp_hosts.values().map(|e| self.ecmp_host_to_json(&e.value)).collect::<Vec<_>>(),
        })
    }
}
