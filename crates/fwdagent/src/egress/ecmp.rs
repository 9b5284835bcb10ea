//! ECMP egress groups.

use crate::error::L3Result;
use fwd_sdk::{EgressId, HwLockToken, SdkResult, SdkUnit, SwitchSdk};
use log::debug;
use serde_json::json;
use std::collections::BTreeSet;

/// An ECMP group: a hardware egress object the ASIC hashes across a set
/// of member egress objects.
///
/// Membership is mutated from link-state events, which arrive either on
/// the update thread or from inside SDK callbacks that already hold the
/// hardware lock. The reachable path requires the lock (the SDK contract
/// for adding members from callback context); the unreachable path has a
/// variant for each caller.
#[derive(Debug)]
pub struct EcmpEgress {
    id: EgressId,
    members: BTreeSet<EgressId>,
}

impl EcmpEgress {
    /// Creates the hardware group over `members`.
    pub fn program(
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        members: BTreeSet<EgressId>,
    ) -> L3Result<EcmpEgress> {
        let list: Vec<EgressId> = members.iter().copied().collect();
        let id = sdk.ecmp_create(unit, &list)?;
        debug!("created ECMP group {} with {} members", id, list.len());
        Ok(EcmpEgress { id, members })
    }

    pub fn id(&self) -> EgressId {
        self.id
    }

    pub fn members(&self) -> &BTreeSet<EgressId> {
        &self.members
    }

    /// A member became reachable again. Checked add: the path is only
    /// added if the hardware group does not already contain it, which
    /// covers a neighbor entry expiring without its port going down:
    /// the member was never removed in that case.
    pub fn path_reachable(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        _lock: HwLockToken,
        path: EgressId,
    ) -> SdkResult<bool> {
        let added = checked_member_add(sdk, unit, self.id, path)?;
        self.members.insert(path);
        Ok(added)
    }

    /// A member became unreachable; caller holds the hardware lock.
    pub fn path_unreachable_locked(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        _lock: HwLockToken,
        path: EgressId,
    ) -> SdkResult<bool> {
        self.remove_path(sdk, unit, path)
    }

    /// A member became unreachable; caller does not hold the hardware
    /// lock.
    pub fn path_unreachable_not_locked(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        path: EgressId,
    ) -> SdkResult<bool> {
        self.remove_path(sdk, unit, path)
    }

    fn remove_path(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        path: EgressId,
    ) -> SdkResult<bool> {
        self.members.remove(&path);
        match sdk.ecmp_member_remove(unit, self.id, path) {
            Ok(()) => {
                debug!("removed path {} from ECMP group {}", path, self.id);
                Ok(true)
            }
            // Already gone from hardware (neighbor expired earlier).
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Releases the hardware group. Failures are logged; teardown never
    /// propagates.
    pub fn destroy(&mut self, sdk: &dyn SwitchSdk, unit: SdkUnit) {
        if !self.id.is_valid() {
            return;
        }
        if let Err(e) = sdk.ecmp_destroy(unit, self.id) {
            log::error!("failed to destroy ECMP group {}: {}", self.id, e);
        } else {
            debug!("destroyed ECMP group {}", self.id);
        }
        self.id = EgressId::INVALID;
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "egressId": self.id.as_u32(),
            "paths": self.members.iter().map(|m| m.as_u32()).collect::<Vec<_>>(),
        })
    }
}

fn checked_member_add(
    sdk: &dyn SwitchSdk,
    unit: SdkUnit,
    group: EgressId,
    path: EgressId,
) -> SdkResult<bool> {
    let hw_members = sdk.ecmp_member_list(unit, group)?;
    if hw_members.contains(&path) {
        debug!("ECMP group {} already contains path {}", group, path);
        return Ok(false);
    }
    sdk.ecmp_member_add(unit, group, path)?;
    debug!("added path {} to ECMP group {}", path, group);
    Ok(true)
}

/// Checked member add against a hardware group discovered by the
/// warm-boot cache and not yet owned by any ECMP host entry
/// (early-startup, before FIB sync).
pub fn add_egress_id_hw_locked(
    sdk: &dyn SwitchSdk,
    unit: SdkUnit,
    _lock: HwLockToken,
    group: EgressId,
    path: EgressId,
) -> SdkResult<bool> {
    checked_member_add(sdk, unit, group, path)
}

/// Member removal against a warm-boot-cached group, hardware lock held.
pub fn remove_egress_id_hw_locked(
    sdk: &dyn SwitchSdk,
    unit: SdkUnit,
    _lock: HwLockToken,
    group: EgressId,
    path: EgressId,
) -> SdkResult<bool> {
    remove_member(sdk, unit, group, path)
}

/// Member removal against a warm-boot-cached group, hardware lock not
/// held.
pub fn remove_egress_id_hw_not_locked(
    sdk: &dyn SwitchSdk,
    unit: SdkUnit,
    group: EgressId,
    path: EgressId,
) -> SdkResult<bool> {
    remove_member(sdk, unit, group, path)
}

fn remove_member(
    sdk: &dyn SwitchSdk,
    unit: SdkUnit,
    group: EgressId,
    path: EgressId,
) -> SdkResult<bool> {
    match sdk.ecmp_member_remove(unit, group, path) {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwd_test::FakeSdk;

    fn members(ids: &[u32]) -> BTreeSet<EgressId> {
        ids.iter().map(|&i| EgressId::new(i)).collect()
    }

    #[test]
    fn test_program_and_destroy() {
        let sdk = FakeSdk::new();
        let unit = SdkUnit::default();
        let mut group = EcmpEgress::program(&sdk, unit, members(&[1, 2, 3])).unwrap();
        assert_eq!(sdk.ecmp_members(group.id()).unwrap().len(), 3);

        group.destroy(&sdk, unit);
        assert_eq!(sdk.ecmp_count(), 0);
    }

    #[test]
    fn test_path_unreachable_then_reachable() {
        let sdk = FakeSdk::new();
        let unit = SdkUnit::default();
        let mut group = EcmpEgress::program(&sdk, unit, members(&[1, 2])).unwrap();
        let lock = HwLockToken::assert_held();

        let removed = group
            .path_unreachable_locked(&sdk, unit, lock, EgressId::new(1))
            .unwrap();
        assert!(removed);
        assert_eq!(sdk.ecmp_members(group.id()).unwrap(), vec![EgressId::new(2)]);

        let added = group
            .path_reachable(&sdk, unit, lock, EgressId::new(1))
            .unwrap();
        assert!(added);
        assert_eq!(sdk.ecmp_members(group.id()).unwrap().len(), 2);
    }

    #[test]
    fn test_checked_add_skips_present_member() {
        let sdk = FakeSdk::new();
        let unit = SdkUnit::default();
        let mut group = EcmpEgress::program(&sdk, unit, members(&[1, 2])).unwrap();
        let lock = HwLockToken::assert_held();

        // path 1 never left the hardware group
        let added = group
            .path_reachable(&sdk, unit, lock, EgressId::new(1))
            .unwrap();
        assert!(!added);
        assert_eq!(sdk.ecmp_members(group.id()).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_tolerates_missing_member() {
        let sdk = FakeSdk::new();
        let unit = SdkUnit::default();
        let mut group = EcmpEgress::program(&sdk, unit, members(&[1, 2])).unwrap();

        let removed = group
            .path_unreachable_not_locked(&sdk, unit, EgressId::new(9))
            .unwrap();
        assert!(!removed);
    }

    #[test]
    fn test_cached_group_helpers() {
        let sdk = FakeSdk::new();
        let unit = SdkUnit::default();
        let group = EgressId::new(0x20);
        sdk.preload_ecmp(group, vec![EgressId::new(1), EgressId::new(2)]);
        let lock = HwLockToken::assert_held();

        assert!(remove_egress_id_hw_locked(&sdk, unit, lock, group, EgressId::new(1)).unwrap());
        assert!(!remove_egress_id_hw_not_locked(&sdk, unit, group, EgressId::new(1)).unwrap());
        assert!(add_egress_id_hw_locked(&sdk, unit, lock, group, EgressId::new(1)).unwrap());
        assert!(!add_egress_id_hw_locked(&sdk, unit, lock, group, EgressId::new(2)).unwrap());
    }
}
