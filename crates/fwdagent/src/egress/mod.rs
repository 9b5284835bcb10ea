//! Hardware egress objects.
//!
//! An egress object encodes what the ASIC does with a packet after the
//! L3 lookup: "rewrite to MAC M and send out interface I on port P",
//! discard, punt to the CPU, or hash across an ECMP group of other
//! egress objects. Objects are owned and reference-counted by the host
//! table; this module owns their hardware programming.

mod ecmp;
mod object;

pub use ecmp::{
    add_egress_id_hw_locked, remove_egress_id_hw_locked, remove_egress_id_hw_not_locked,
    EcmpEgress,
};
pub use object::Egress;

use fwd_sdk::{EgressId, SdkUnit, SwitchSdk};

/// An entry in the egress arena: either a unicast egress or an ECMP
/// group. Both live in the same hardware id namespace.
#[derive(Debug)]
pub enum EgressObject {
    Unicast(Egress),
    Ecmp(EcmpEgress),
}

impl EgressObject {
    pub fn id(&self) -> EgressId {
        match self {
            EgressObject::Unicast(e) => e.id(),
            EgressObject::Ecmp(e) => e.id(),
        }
    }

    pub fn as_ecmp_mut(&mut self) -> Option<&mut EcmpEgress> {
        match self {
            EgressObject::Ecmp(e) => Some(e),
            EgressObject::Unicast(_) => None,
        }
    }

    /// Releases the hardware object. Failures are logged; teardown
    /// never propagates.
    pub fn destroy(&mut self, sdk: &dyn SwitchSdk, unit: SdkUnit) {
        match self {
            EgressObject::Unicast(e) => e.destroy(sdk, unit),
            EgressObject::Ecmp(e) => e.destroy(sdk, unit),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            EgressObject::Unicast(e) => e.to_json(),
            EgressObject::Ecmp(e) => e.to_json(),
        }
    }
}
