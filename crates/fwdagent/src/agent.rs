//! The forwarding agent container.
//!
//! Owns the SDK handle and the forwarding tables and wires the update
//! thread entry points together: state updates flow through the delta
//! applier, inbound ND packets through the handler, and link-state
//! callbacks from the SDK into the host table.

use crate::applier::{ApplierOptions, DeltaApplier};
use crate::config::AgentConfig;
use crate::error::L3Result;
use crate::host::HostTable;
use crate::intf::IntfTable;
use crate::ndp::{Ipv6Header, NdpHandler, NdpStats, PacketDisposition, PacketTx, RxPacketMeta};
use crate::route::RouteTable;
use crate::state::{StateDelta, StateHandle, SwitchState};
use crate::warmboot::WarmBootCache;
use fwd_sdk::{EgressParams, EgressId, IntfId, L3Flags, SdkUnit, SwitchSdk};
use fwd_types::{Ipv6Address, PortId, VlanId};
use log::info;
use std::sync::Arc;

pub struct L3Agent {
    sdk: Arc<dyn SwitchSdk>,
    unit: SdkUnit,
    state: StateHandle,
    intfs: IntfTable,
    hosts: HostTable,
    routes: RouteTable,
    cache: WarmBootCache,
    applier: DeltaApplier,
    ndp: NdpHandler,
    drop_egress_id: EgressId,
    to_cpu_egress_id: EgressId,
}

impl L3Agent {
    /// Brings the agent up: snapshots surviving hardware state into the
    /// warm-boot cache and creates the process-wide drop and to-CPU
    /// egresses.
    pub fn new(
        sdk: Arc<dyn SwitchSdk>,
        config: AgentConfig,
        tx: Arc<dyn PacketTx>,
    ) -> L3Result<Self> {
        let unit = SdkUnit::new(config.unit);
        let cache = WarmBootCache::collect(sdk.as_ref(), unit)?;

        let drop_egress_id = sdk.egress_create(
            unit,
            &EgressParams {
                intf: IntfId::default(),
                mac: None,
                port: PortId::NONE,
                flags: L3Flags::DST_DISCARD,
            },
        )?;
        let to_cpu_egress_id = sdk.egress_create(
            unit,
            &EgressParams {
                intf: IntfId::default(),
                mac: None,
                port: PortId::NONE,
                flags: L3Flags::COPY_TO_CPU,
            },
        )?;
        info!(
            "agent up on unit {} (drop egress {}, to-CPU egress {})",
            unit, drop_egress_id, to_cpu_egress_id
        );

        Ok(L3Agent {
            state: StateHandle::new(SwitchState::default()),
            intfs: IntfTable::new(sdk.clone(), unit),
            hosts: HostTable::new(sdk.clone(), unit, drop_egress_id),
            routes: RouteTable::new(sdk.clone(), unit),
            applier: DeltaApplier::new(ApplierOptions {
                drop_egress_id,
                to_cpu_egress_id,
                use_host_table_for_host_routes: config.use_host_table_for_host_routes,
            }),
            ndp: NdpHandler::new(tx, &config),
            cache,
            sdk,
            unit,
            drop_egress_id,
            to_cpu_egress_id,
        })
    }

    // ------------------------------------------------------------------
    // Update thread
    // ------------------------------------------------------------------

    /// Commits a state update and applies the resulting delta.
    pub fn update_state<F>(&mut self, f: F)
    where
        F: FnOnce(&SwitchState) -> Option<SwitchState>,
    {
        if let Some(delta) = self.state.update(f) {
            self.apply_delta(&delta);
        }
    }

    /// Applies one delta: the ND handler tracks interface lifecycle,
    /// then the applier drives the forwarding tables.
    pub fn apply_delta(&mut self, delta: &StateDelta) {
        self.ndp.state_updated(delta);
        self.applier.apply(
            delta,
            &mut self.intfs,
            &mut self.hosts,
            &mut self.routes,
            &mut self.cache,
        );
    }

    /// Signals the end of the initial sync: replays link state into
    /// ECMP membership and sweeps unclaimed warm-boot entries.
    pub fn set_initial_sync_complete(&mut self) {
        self.applier.set_initial_sync_complete(
            self.sdk.as_ref(),
            self.unit,
            &mut self.hosts,
            &mut self.cache,
        );
    }

    // ------------------------------------------------------------------
    // Packet I/O
    // ------------------------------------------------------------------

    /// Feeds an inbound ICMPv6 packet to the ND handler and applies any
    /// neighbor-state updates it produced.
    pub fn handle_packet(
        &mut self,
        meta: &RxPacketMeta,
        ipv6: &Ipv6Header,
        payload: &[u8],
    ) -> PacketDisposition {
        let mut out = Vec::new();
        let disposition = self
            .ndp
            .handle_packet(&mut self.state, &mut out, meta, ipv6, payload);
        for delta in &out {
            self.apply_delta(delta);
        }
        disposition
    }

    /// Records a pending neighbor entry for `target` and solicits it.
    pub fn send_neighbor_solicitations(&mut self, target: Ipv6Address) {
        let mut out = Vec::new();
        self.ndp
            .send_neighbor_solicitations(&mut self.state, &mut out, target);
        for delta in &out {
            self.apply_delta(delta);
        }
    }

    /// Floods unsolicited neighbor advertisements on every interface.
    pub fn flood_neighbor_advertisements(&mut self) {
        self.ndp.flood_neighbor_advertisements(&self.state);
    }

    /// Synchronously removes a neighbor entry and unprograms its host.
    /// Returns the number of entries removed.
    pub fn flush_ndp_entry_blocking(&mut self, ip: Ipv6Address, vlan: VlanId) -> u32 {
        let mut out = Vec::new();
        let flushed = self
            .ndp
            .flush_ndp_entry_blocking(&mut self.state, &mut out, ip, vlan);
        for delta in &out {
            self.apply_delta(delta);
        }
        flushed
    }

    // ------------------------------------------------------------------
    // Link-state callbacks (SDK context)
    // ------------------------------------------------------------------

    pub fn link_up_hw_locked(&mut self, port: PortId) {
        self.hosts.link_up_hw_locked(&self.cache, port);
    }

    pub fn link_down_hw_locked(&mut self, port: PortId) {
        self.hosts.link_down_hw_locked(&self.cache, port);
    }

    pub fn link_state_changed_not_locked(&mut self, port: PortId, up: bool) {
        self.hosts.link_state_changed_not_locked(&self.cache, port, up);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn current_state(&self) -> Arc<SwitchState> {
        self.state.current()
    }

    pub fn host_table(&self) -> &HostTable {
        &self.hosts
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.routes
    }

    pub fn ndp_stats(&self) -> &NdpStats {
        self.ndp.stats()
    }

    pub fn drop_egress_id(&self) -> EgressId {
        self.drop_egress_id
    }

    pub fn to_cpu_egress_id(&self) -> EgressId {
        self.to_cpu_egress_id
    }

    pub fn is_dirty(&self) -> bool {
        self.applier.is_dirty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.hosts.to_json()
    }
}
