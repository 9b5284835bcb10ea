//! Unicast egress objects.

use crate::error::L3Result;
use fwd_sdk::{EgressParams, EgressId, IntfId, L3Flags, SdkUnit, SwitchSdk};
use fwd_types::{IpAddress, MacAddress, PortId, VrfId};
use log::{debug, error};
use serde_json::json;

/// A unicast hardware egress object.
///
/// Created lazily: the object exists in software first and gets its
/// hardware id on the first `program` call. Reprogramming with an
/// unchanged payload is a no-op; a changed payload is rewritten in
/// place so L3 entries pointing at the id follow atomically.
#[derive(Debug)]
pub struct Egress {
    id: EgressId,
    vrf: VrfId,
    /// The neighbor this egress reaches, once known. Kept for the debug
    /// surface; the hardware object does not key on it.
    ip: Option<IpAddress>,
    /// Last payload programmed to hardware; `None` until first program.
    params: Option<EgressParams>,
}

impl Egress {
    pub fn new(vrf: VrfId) -> Self {
        Egress {
            id: EgressId::INVALID,
            vrf,
            ip: None,
            params: None,
        }
    }

    pub fn id(&self) -> EgressId {
        self.id
    }

    /// The resolved port, [`PortId::NONE`] for drop/to-CPU payloads or
    /// before the first program.
    pub fn port(&self) -> PortId {
        self.params.map_or(PortId::NONE, |p| p.port)
    }

    /// Programs the egress to forward to `mac` out `intf` on `port`.
    pub fn program(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        intf: IntfId,
        ip: IpAddress,
        mac: MacAddress,
        port: PortId,
    ) -> L3Result<()> {
        let params = EgressParams {
            intf,
            mac: Some(mac),
            port,
            flags: L3Flags::NONE,
        };
        self.verify_and_program(sdk, unit, ip, params)
    }

    /// Programs the egress to discard. The stored port becomes NONE.
    pub fn program_to_drop(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        intf: IntfId,
        ip: IpAddress,
    ) -> L3Result<()> {
        let params = EgressParams {
            intf,
            mac: None,
            port: PortId::NONE,
            flags: L3Flags::DST_DISCARD,
        };
        self.verify_and_program(sdk, unit, ip, params)
    }

    /// Programs the egress to punt to the CPU, so traffic for an
    /// unresolved neighbor triggers discovery. The stored port becomes
    /// NONE.
    pub fn program_to_cpu(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        intf: IntfId,
        ip: IpAddress,
    ) -> L3Result<()> {
        let params = EgressParams {
            intf,
            mac: None,
            port: PortId::NONE,
            flags: L3Flags::COPY_TO_CPU,
        };
        self.verify_and_program(sdk, unit, ip, params)
    }

    fn verify_and_program(
        &mut self,
        sdk: &dyn SwitchSdk,
        unit: SdkUnit,
        ip: IpAddress,
        params: EgressParams,
    ) -> L3Result<()> {
        if self.params == Some(params) {
            debug!("egress {} for {} unchanged, not reprogramming", self.id, ip);
            self.ip = Some(ip);
            return Ok(());
        }
        if self.id.is_valid() {
            sdk.egress_replace(unit, self.id, &params)?;
            debug!("replaced egress {} for {}", self.id, ip);
        } else {
            self.id = sdk.egress_create(unit, &params)?;
            debug!("created egress {} for {}", self.id, ip);
        }
        self.ip = Some(ip);
        self.params = Some(params);
        Ok(())
    }

    /// Releases the hardware object. Failures are logged; teardown
    /// never propagates.
    pub fn destroy(&mut self, sdk: &dyn SwitchSdk, unit: SdkUnit) {
        if !self.id.is_valid() {
            return;
        }
        if let Err(e) = sdk.egress_destroy(unit, self.id) {
            error!("failed to destroy egress {}: {}", self.id, e);
        } else {
            debug!("destroyed egress {}", self.id);
        }
        self.id = EgressId::INVALID;
        self.params = None;
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "egressId": self.id.as_u32(),
            "vrf": self.vrf.as_u32(),
            "ip": self.ip.map(|ip| ip.to_string()),
            "mac": self.params.and_then(|p| p.mac).map(|m| m.to_string()),
            "intf": self.params.map(|p| p.intf.as_u32()),
            "port": self.port().as_u32(),
        })
    }
}
