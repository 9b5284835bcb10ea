//! The SDK call surface consumed by the forwarding object manager.

use crate::error::SdkResult;
use crate::types::{
    EgressId, EgressParams, IntfId, IntfParams, L3HostEntry, L3RouteEntry, PortConfig, SdkUnit,
};
use fwd_types::PortId;

/// The vendor SDK call surface.
///
/// Every method is a synchronous, fallible hardware call. Production
/// code implements this over the vendor C library; tests implement it
/// over an in-memory hardware model. Callers treat the methods as
/// opaque: a returned error means the hardware was not changed by that
/// call, and recovery is the caller's rollback responsibility.
pub trait SwitchSdk: Send + Sync {
    // --- L3 host table ---

    /// Adds a host entry. Overwrites an existing entry only when the
    /// `REPLACE` flag is set.
    fn l3_host_add(&self, unit: SdkUnit, entry: &L3HostEntry) -> SdkResult<()>;

    /// Deletes the host entry with the same `(vrf, addr)` key.
    fn l3_host_delete(&self, unit: SdkUnit, entry: &L3HostEntry) -> SdkResult<()>;

    // --- LPM route table ---

    /// Adds a route entry. Overwrites an existing entry only when the
    /// `REPLACE` flag is set.
    fn l3_route_add(&self, unit: SdkUnit, entry: &L3RouteEntry) -> SdkResult<()>;

    /// Deletes the route entry with the same `(vrf, dest)` key.
    fn l3_route_delete(&self, unit: SdkUnit, entry: &L3RouteEntry) -> SdkResult<()>;

    // --- router interfaces ---

    /// Creates an L3 router interface and returns its hardware id.
    fn l3_intf_create(&self, unit: SdkUnit, params: &IntfParams) -> SdkResult<IntfId>;

    /// Deletes an L3 router interface.
    fn l3_intf_delete(&self, unit: SdkUnit, intf: IntfId) -> SdkResult<()>;

    // --- unicast egress objects ---

    /// Creates an egress object and returns its hardware-assigned id.
    fn egress_create(&self, unit: SdkUnit, params: &EgressParams) -> SdkResult<EgressId>;

    /// Rewrites an existing egress object in place, keeping its id. L3
    /// entries pointing at the id observe the new payload atomically.
    fn egress_replace(&self, unit: SdkUnit, id: EgressId, params: &EgressParams) -> SdkResult<()>;

    /// Destroys an egress object, releasing its hardware resources.
    fn egress_destroy(&self, unit: SdkUnit, id: EgressId) -> SdkResult<()>;

    // --- ECMP groups ---

    /// Creates an ECMP group over the given members and returns its id.
    /// The id lives in the same namespace as unicast egress ids.
    fn ecmp_create(&self, unit: SdkUnit, members: &[EgressId]) -> SdkResult<EgressId>;

    /// Destroys an ECMP group. Member egress objects are untouched.
    fn ecmp_destroy(&self, unit: SdkUnit, group: EgressId) -> SdkResult<()>;

    /// Adds a member to an existing group.
    fn ecmp_member_add(&self, unit: SdkUnit, group: EgressId, member: EgressId) -> SdkResult<()>;

    /// Removes a member from an existing group. Removing a member that
    /// is not in the group fails with `E_NOT_FOUND`.
    fn ecmp_member_remove(&self, unit: SdkUnit, group: EgressId, member: EgressId)
        -> SdkResult<()>;

    /// Reads back the current hardware membership of a group.
    fn ecmp_member_list(&self, unit: SdkUnit, group: EgressId) -> SdkResult<Vec<EgressId>>;

    // --- ports ---

    /// Returns the hardware port bitmap.
    fn port_config(&self, unit: SdkUnit) -> SdkResult<PortConfig>;

    /// Returns the current physical link state of a port.
    fn port_link_up(&self, unit: SdkUnit, port: PortId) -> SdkResult<bool>;

    // --- warm-boot discovery ---

    /// Dumps every L3 host entry resident in hardware. Used once at
    /// startup to seed the warm-boot cache.
    fn l3_host_traverse(&self, unit: SdkUnit) -> SdkResult<Vec<L3HostEntry>>;

    /// Dumps every LPM route entry resident in hardware.
    fn l3_route_traverse(&self, unit: SdkUnit) -> SdkResult<Vec<L3RouteEntry>>;

    /// Dumps every ECMP group and its member set.
    fn ecmp_traverse(&self, unit: SdkUnit) -> SdkResult<Vec<(EgressId, Vec<EgressId>)>>;
}
