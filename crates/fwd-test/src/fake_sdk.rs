//! In-memory hardware model implementing the SDK trait.

use fwd_sdk::{
    EgressId, EgressParams, HostAddr, IntfId, IntfParams, L3Flags, L3HostEntry, L3RouteEntry,
    PortConfig, RouteDest, SdkError, SdkResult, SdkStatus, SdkUnit, SwitchSdk,
};
use fwd_types::{IpAddress, PortId, VrfId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct FakeHw {
    hosts: HashMap<(VrfId, HostAddr), L3HostEntry>,
    routes: HashMap<(VrfId, RouteDest), L3RouteEntry>,
    egresses: HashMap<EgressId, EgressParams>,
    ecmp_groups: HashMap<EgressId, Vec<EgressId>>,
    intfs: HashMap<IntfId, IntfParams>,
    ports: Vec<PortId>,
    link_state: HashMap<PortId, bool>,
    next_egress_id: u32,
    next_intf_id: u32,
    calls: Vec<String>,
    fail_ops: HashSet<String>,
}

impl FakeHw {
    fn check(&mut self, op: &str, detail: String) -> SdkResult<()> {
        self.calls.push(format!("{}({})", op, detail));
        if self.fail_ops.contains(op) {
            Err(SdkError::failure(SdkStatus::Fail, format!("{} {}", op, detail)))
        } else {
            Ok(())
        }
    }

    fn alloc_egress_id(&mut self) -> EgressId {
        let id = EgressId::new(self.next_egress_id);
        self.next_egress_id += 1;
        id
    }
}

/// An in-memory switch ASIC.
///
/// All state lives behind one mutex, the same shape the orchestration
/// mocks use. Egress and ECMP ids come from a single counter starting at
/// 0x1000 so tests can also preload "pre-boot" objects below that range.
pub struct FakeSdk {
    inner: Mutex<FakeHw>,
}

impl Default for FakeSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSdk {
    pub fn new() -> Self {
        let hw = FakeHw {
            next_egress_id: 0x1000,
            next_intf_id: 0x100,
            ..Default::default()
        };
        FakeSdk {
            inner: Mutex::new(hw),
        }
    }

    /// Creates a fake with the given hardware ports, all links up.
    pub fn with_ports(ports: &[u32]) -> Self {
        let sdk = Self::new();
        {
            let mut hw = sdk.inner.lock().unwrap();
            for &p in ports {
                let port = PortId::new(p);
                hw.ports.push(port);
                hw.link_state.insert(port, true);
            }
        }
        sdk
    }

    /// Sets the physical link state of a port.
    pub fn set_link(&self, port: PortId, up: bool) {
        self.inner.lock().unwrap().link_state.insert(port, up);
    }

    /// Makes every subsequent call to `op` fail with `E_FAIL` until
    /// cleared.
    pub fn fail_on(&self, op: &str) {
        self.inner.lock().unwrap().fail_ops.insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().fail_ops.clear();
    }

    // --- pre-boot seeding (warm-boot tests) ---

    /// Seeds a host entry as if it survived from a previous process.
    pub fn preload_host(&self, entry: L3HostEntry) {
        let mut hw = self.inner.lock().unwrap();
        hw.hosts.insert((entry.vrf, entry.addr), entry);
    }

    /// Seeds a route entry as if it survived from a previous process.
    pub fn preload_route(&self, entry: L3RouteEntry) {
        let mut hw = self.inner.lock().unwrap();
        hw.routes.insert((entry.vrf, entry.dest), entry);
    }

    /// Seeds an egress object with a fixed id.
    pub fn preload_egress(&self, id: EgressId, params: EgressParams) {
        let mut hw = self.inner.lock().unwrap();
        hw.egresses.insert(id, params);
    }

    /// Seeds an ECMP group with a fixed id and member set.
    pub fn preload_ecmp(&self, group: EgressId, members: Vec<EgressId>) {
        let mut hw = self.inner.lock().unwrap();
        hw.ecmp_groups.insert(group, members);
    }

    // --- inspection ---

    pub fn host_count(&self) -> usize {
        self.inner.lock().unwrap().hosts.len()
    }

    pub fn route_count(&self) -> usize {
        self.inner.lock().unwrap().routes.len()
    }

    pub fn egress_count(&self) -> usize {
        self.inner.lock().unwrap().egresses.len()
    }

    pub fn intf_count(&self) -> usize {
        self.inner.lock().unwrap().intfs.len()
    }

    pub fn ecmp_count(&self) -> usize {
        self.inner.lock().unwrap().ecmp_groups.len()
    }

    pub fn host(&self, vrf: VrfId, ip: &IpAddress) -> Option<L3HostEntry> {
        self.inner
            .lock()
            .unwrap()
            .hosts
            .get(&(vrf, HostAddr::from_ip(ip)))
            .copied()
    }

    pub fn route(&self, vrf: VrfId, dest: &RouteDest) -> Option<L3RouteEntry> {
        self.inner.lock().unwrap().routes.get(&(vrf, *dest)).copied()
    }

    pub fn egress(&self, id: EgressId) -> Option<EgressParams> {
        self.inner.lock().unwrap().egresses.get(&id).copied()
    }

    pub fn ecmp_members(&self, group: EgressId) -> Option<Vec<EgressId>> {
        self.inner.lock().unwrap().ecmp_groups.get(&group).cloned()
    }

    /// Returns the recorded call log (one entry per SDK call, including
    /// failed ones).
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Counts recorded calls whose name starts with `prefix`.
    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }
}

fn host_key_str(entry: &L3HostEntry) -> String {
    format!("{}, {}", entry.vrf, entry.addr.to_ip())
}

fn route_key_str(entry: &L3RouteEntry) -> String {
    match entry.dest {
        RouteDest::V4 { subnet, mask } => {
            format!("{}, {:#010x}/{:#010x}", entry.vrf, subnet, mask)
        }
        RouteDest::V6 { subnet, .. } => {
            format!(
                "{}, {}",
                entry.vrf,
                IpAddress::V6(fwd_types::Ipv6Address::from(subnet))
            )
        }
    }
}

impl SwitchSdk for FakeSdk {
    fn l3_host_add(&self, _unit: SdkUnit, entry: &L3HostEntry) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("l3_host_add", host_key_str(entry))?;
        let key = (entry.vrf, entry.addr);
        if hw.hosts.contains_key(&key) && !entry.flags.contains(L3Flags::REPLACE) {
            return Err(SdkError::failure(SdkStatus::Exists, host_key_str(entry)));
        }
        let mut stored = *entry;
        stored.flags = stored.flags.without(L3Flags::REPLACE);
        hw.hosts.insert(key, stored);
        Ok(())
    }

    fn l3_host_delete(&self, _unit: SdkUnit, entry: &L3HostEntry) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("l3_host_delete", host_key_str(entry))?;
        let key = (entry.vrf, entry.addr);
        if hw.hosts.remove(&key).is_none() {
            return Err(SdkError::failure(SdkStatus::NotFound, host_key_str(entry)));
        }
        Ok(())
    }

    fn l3_route_add(&self, _unit: SdkUnit, entry: &L3RouteEntry) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("l3_route_add", route_key_str(entry))?;
        let key = (entry.vrf, entry.dest);
        if hw.routes.contains_key(&key) && !entry.flags.contains(L3Flags::REPLACE) {
            return Err(SdkError::failure(SdkStatus::Exists, route_key_str(entry)));
        }
        let mut stored = *entry;
        stored.flags = stored.flags.without(L3Flags::REPLACE);
        hw.routes.insert(key, stored);
        Ok(())
    }

    fn l3_route_delete(&self, _unit: SdkUnit, entry: &L3RouteEntry) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("l3_route_delete", route_key_str(entry))?;
        let key = (entry.vrf, entry.dest);
        if hw.routes.remove(&key).is_none() {
            return Err(SdkError::failure(SdkStatus::NotFound, route_key_str(entry)));
        }
        Ok(())
    }

    fn l3_intf_create(&self, _unit: SdkUnit, params: &IntfParams) -> SdkResult<IntfId> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("l3_intf_create", format!("vlan {}", params.vlan))?;
        let id = IntfId::new(hw.next_intf_id);
        hw.next_intf_id += 1;
        hw.intfs.insert(id, *params);
        Ok(id)
    }

    fn l3_intf_delete(&self, _unit: SdkUnit, intf: IntfId) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("l3_intf_delete", format!("{}", intf))?;
        if hw.intfs.remove(&intf).is_none() {
            return Err(SdkError::failure(SdkStatus::NotFound, format!("intf {}", intf)));
        }
        Ok(())
    }

    fn egress_create(&self, _unit: SdkUnit, params: &EgressParams) -> SdkResult<EgressId> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("egress_create", format!("intf {}", params.intf))?;
        let id = hw.alloc_egress_id();
        hw.egresses.insert(id, *params);
        Ok(id)
    }

    fn egress_replace(&self, _unit: SdkUnit, id: EgressId, params: &EgressParams) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("egress_replace", format!("{}", id))?;
        match hw.egresses.get_mut(&id) {
            Some(existing) => {
                *existing = *params;
                Ok(())
            }
            None => Err(SdkError::failure(SdkStatus::NotFound, format!("egress {}", id))),
        }
    }

    fn egress_destroy(&self, _unit: SdkUnit, id: EgressId) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("egress_destroy", format!("{}", id))?;
        if hw.egresses.remove(&id).is_none() {
            return Err(SdkError::failure(SdkStatus::NotFound, format!("egress {}", id)));
        }
        Ok(())
    }

    fn ecmp_create(&self, _unit: SdkUnit, members: &[EgressId]) -> SdkResult<EgressId> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("ecmp_create", format!("{} members", members.len()))?;
        let id = hw.alloc_egress_id();
        hw.ecmp_groups.insert(id, members.to_vec());
        Ok(id)
    }

    fn ecmp_destroy(&self, _unit: SdkUnit, group: EgressId) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("ecmp_destroy", format!("{}", group))?;
        if hw.ecmp_groups.remove(&group).is_none() {
            return Err(SdkError::failure(SdkStatus::NotFound, format!("group {}", group)));
        }
        Ok(())
    }

    fn ecmp_member_add(&self, _unit: SdkUnit, group: EgressId, member: EgressId) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("ecmp_member_add", format!("{} += {}", group, member))?;
        let members = hw
            .ecmp_groups
            .get_mut(&group)
            .ok_or_else(|| SdkError::failure(SdkStatus::NotFound, format!("group {}", group)))?;
        if members.contains(&member) {
            return Err(SdkError::failure(
                SdkStatus::Exists,
                format!("group {} member {}", group, member),
            ));
        }
        members.push(member);
        Ok(())
    }

    fn ecmp_member_remove(
        &self,
        _unit: SdkUnit,
        group: EgressId,
        member: EgressId,
    ) -> SdkResult<()> {
        let mut hw = self.inner.lock().unwrap();
        hw.check("ecmp_member_remove", format!("{} -= {}", group, member))?;
        let members = hw
            .ecmp_groups
            .get_mut(&group)
            .ok_or_else(|| SdkError::failure(SdkStatus::NotFound, format!("group {}", group)))?;
        let before = members.len();
        members.retain(|m| *m != member);
        if members.len() == before {
            return Err(SdkError::failure(
                SdkStatus::NotFound,
                format!("group {} member {}", group, member),
            ));
        }
        Ok(())
    }

    fn ecmp_member_list(&self, _unit: SdkUnit, group: EgressId) -> SdkResult<Vec<EgressId>> {
        let hw = self.inner.lock().unwrap();
        hw.ecmp_groups
            .get(&group)
            .cloned()
            .ok_or_else(|| SdkError::failure(SdkStatus::NotFound, format!("group {}", group)))
    }

    fn port_config(&self, _unit: SdkUnit) -> SdkResult<PortConfig> {
        let hw = self.inner.lock().unwrap();
        Ok(PortConfig {
            ports: hw.ports.clone(),
        })
    }

    fn port_link_up(&self, _unit: SdkUnit, port: PortId) -> SdkResult<bool> {
        let hw = self.inner.lock().unwrap();
        hw.link_state
            .get(&port)
            .copied()
            .ok_or_else(|| SdkError::failure(SdkStatus::Port, format!("port {}", port)))
    }

    fn l3_host_traverse(&self, _unit: SdkUnit) -> SdkResult<Vec<L3HostEntry>> {
        Ok(self.inner.lock().unwrap().hosts.values().copied().collect())
    }

    fn l3_route_traverse(&self, _unit: SdkUnit) -> SdkResult<Vec<L3RouteEntry>> {
        Ok(self.inner.lock().unwrap().routes.values().copied().collect())
    }

    fn ecmp_traverse(&self, _unit: SdkUnit) -> SdkResult<Vec<(EgressId, Vec<EgressId>)>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ecmp_groups
            .iter()
            .map(|(id, members)| (*id, members.clone()))
            .collect())
    }
}
