//! Router interface table.
//!
//! Maps control-plane interface ids to the hardware L3 interface the
//! SDK assigned, plus the attributes host programming needs. Populated
//! by the state-delta applier; consulted when unresolved next hops are
//! punted to the CPU on their owning interface.

use crate::error::{L3Error, L3Result};
use fwd_sdk::{IntfId, IntfParams, SdkUnit, SwitchSdk};
use fwd_types::{InterfaceId, MacAddress, VlanId, VrfId};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct IntfEntry {
    pub hw_intf: IntfId,
    pub vrf: VrfId,
    pub mac: MacAddress,
    pub vlan: VlanId,
    pub mtu: u32,
}

pub struct IntfTable {
    sdk: Arc<dyn SwitchSdk>,
    unit: SdkUnit,
    intfs: HashMap<InterfaceId, IntfEntry>,
}

impl IntfTable {
    pub fn new(sdk: Arc<dyn SwitchSdk>, unit: SdkUnit) -> Self {
        IntfTable {
            sdk,
            unit,
            intfs: HashMap::new(),
        }
    }

    pub fn get(&self, id: InterfaceId) -> Option<&IntfEntry> {
        self.intfs.get(&id)
    }

    /// Returns the hardware interface id, or an error when the
    /// interface has not been programmed. Host programming for a next
    /// hop on an unknown interface cannot proceed.
    pub fn hw_intf(&self, id: InterfaceId) -> L3Result<IntfId> {
        self.intfs
            .get(&id)
            .map(|e| e.hw_intf)
            .ok_or(L3Error::IntfNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.intfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intfs.is_empty()
    }

    /// Creates the hardware interface and records the mapping.
    pub fn add_intf(
        &mut self,
        id: InterfaceId,
        vrf: VrfId,
        mac: MacAddress,
        vlan: VlanId,
        mtu: u32,
    ) -> L3Result<()> {
        if self.intfs.contains_key(&id) {
            return self.update_intf(id, vrf, mac, vlan, mtu);
        }
        let params = IntfParams {
            vrf,
            mac,
            vlan,
            mtu,
        };
        let hw_intf = self.sdk.l3_intf_create(self.unit, &params)?;
        info!("created L3 interface {} for intf {}", hw_intf, id);
        self.intfs.insert(
            id,
            IntfEntry {
                hw_intf,
                vrf,
                mac,
                vlan,
                mtu,
            },
        );
        Ok(())
    }

    /// Reprograms an existing interface whose attributes changed.
    pub fn update_intf(
        &mut self,
        id: InterfaceId,
        vrf: VrfId,
        mac: MacAddress,
        vlan: VlanId,
        mtu: u32,
    ) -> L3Result<()> {
        let entry = self
            .intfs
            .get_mut(&id)
            .ok_or(L3Error::IntfNotFound(id))?;
        if entry.vrf == vrf && entry.mac == mac && entry.vlan == vlan && entry.mtu == mtu {
            return Ok(());
        }
        let params = IntfParams {
            vrf,
            mac,
            vlan,
            mtu,
        };
        self.sdk.l3_intf_delete(self.unit, entry.hw_intf)?;
        let hw_intf = self.sdk.l3_intf_create(self.unit, &params)?;
        info!(
            "reprogrammed L3 interface for intf {}: {} -> {}",
            id, entry.hw_intf, hw_intf
        );
        *entry = IntfEntry {
            hw_intf,
            vrf,
            mac,
            vlan,
            mtu,
        };
        Ok(())
    }

    /// Deletes the hardware interface and drops the mapping.
    pub fn remove_intf(&mut self, id: InterfaceId) -> L3Result<()> {
        let entry = self.intfs.remove(&id).ok_or(L3Error::IntfNotFound(id))?;
        if let Err(e) = self.sdk.l3_intf_delete(self.unit, entry.hw_intf) {
            warn!("failed to delete L3 interface {}: {}", entry.hw_intf, e);
        }
        info!("removed L3 interface {} for intf {}", entry.hw_intf, id);
        Ok(())
    }
}
