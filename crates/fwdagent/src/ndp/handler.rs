//! The IPv6 neighbor discovery handler.
//!
//! Consumes inbound ND packets from the packet I/O context and produces
//! neighbor-state updates through the state handle; the delta applier
//! then turns those into host programming. The handler itself owns only
//! the per-interface router-advertisement map.

use crate::config::AgentConfig;
use crate::ndp::advertiser::RouteAdvertiser;
use crate::ndp::packet::{
    build_neighbor_advertisement, build_neighbor_solicitation, verify_checksum, Icmpv6Packet,
    Ipv6Header, NaFlags, NdpMessage, ICMPV6_TYPE_NEIGHBOR_ADVERTISEMENT,
    ICMPV6_TYPE_NEIGHBOR_SOLICITATION, ICMPV6_TYPE_ROUTER_ADVERTISEMENT,
    ICMPV6_TYPE_ROUTER_SOLICITATION, ND_HOP_LIMIT,
};
use crate::state::{Delta, Interface, NeighborEntry, StateDelta, StateHandle};
use fwd_types::{InterfaceId, IpAddress, Ipv6Address, MacAddress, PortId, VlanId};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Where a received packet came from.
#[derive(Debug, Clone, Copy)]
pub struct RxPacketMeta {
    pub port: PortId,
    pub vlan: VlanId,
    pub src_mac: MacAddress,
    pub dst_mac: MacAddress,
}

/// Outbound seam to the packet layer: the handler builds ICMPv6
/// payloads, the packet layer owns ethernet/IPv6 encapsulation.
pub trait PacketTx: Send + Sync {
    fn send_ndp(
        &self,
        vlan: VlanId,
        src_mac: MacAddress,
        dst_mac: MacAddress,
        src_ip: Ipv6Address,
        dst_ip: Ipv6Address,
        payload: Vec<u8>,
    );
}

/// What the handler did with a packet. `Unhandled` returns ownership to
/// the caller (ICMPv6 that is not one of the ND types).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDisposition {
    Handled,
    Unhandled,
}

#[derive(Debug, Clone, Default)]
pub struct NdpStats {
    pub rx_router_solicitation: u64,
    pub rx_router_advertisement: u64,
    pub rx_neighbor_solicitation: u64,
    pub rx_neighbor_advertisement: u64,
    pub tx_neighbor_solicitation: u64,
    pub tx_neighbor_advertisement: u64,
    pub tx_router_advertisement: u64,
    pub dropped_invalid: u64,
    pub unhandled: u64,
}

pub struct NdpHandler {
    tx: Arc<dyn PacketTx>,
    advertisers: HashMap<InterfaceId, RouteAdvertiser>,
    stats: NdpStats,
    ra_hop_limit: u8,
    ra_router_lifetime: u16,
}

impl NdpHandler {
    pub fn new(tx: Arc<dyn PacketTx>, config: &AgentConfig) -> Self {
        NdpHandler {
            tx,
            advertisers: HashMap::new(),
            stats: NdpStats::default(),
            ra_hop_limit: config.ra_hop_limit,
            ra_router_lifetime: config.ra_router_lifetime,
        }
    }

    pub fn stats(&self) -> &NdpStats {
        &self.stats
    }

    /// Handles an inbound ICMPv6 packet. ND types are consumed (valid
    /// or not); anything else is handed back. State updates produced by
    /// the packet are appended to `out` for the applier.
    pub fn handle_packet(
        &mut self,
        state: &mut StateHandle,
        out: &mut Vec<StateDelta>,
        meta: &RxPacketMeta,
        ipv6: &Ipv6Header,
        payload: &[u8],
    ) -> PacketDisposition {
        let icmp = match Icmpv6Packet::parse(payload) {
            Ok(icmp) => icmp,
            Err(e) => {
                debug!("dropping malformed ICMPv6 packet: {}", e);
                self.stats.dropped_invalid += 1;
                return PacketDisposition::Handled;
            }
        };
        match icmp.msg_type {
            ICMPV6_TYPE_NEIGHBOR_SOLICITATION => {
                self.stats.rx_neighbor_solicitation += 1;
                if self.check_ndp_packet(ipv6, &icmp, payload) {
                    self.handle_neighbor_solicitation(state, out, meta, ipv6, icmp.body);
                }
                PacketDisposition::Handled
            }
            ICMPV6_TYPE_NEIGHBOR_ADVERTISEMENT => {
                self.stats.rx_neighbor_advertisement += 1;
                if self.check_ndp_packet(ipv6, &icmp, payload) {
                    self.handle_neighbor_advertisement(state, out, meta, icmp.body);
                }
                PacketDisposition::Handled
            }
            ICMPV6_TYPE_ROUTER_SOLICITATION => {
                self.stats.rx_router_solicitation += 1;
                if self.check_ndp_packet(ipv6, &icmp, payload) {
                    self.handle_router_solicitation(state, meta, ipv6);
                }
                PacketDisposition::Handled
            }
            ICMPV6_TYPE_ROUTER_ADVERTISEMENT => {
                self.stats.rx_router_advertisement += 1;
                if self.check_ndp_packet(ipv6, &icmp, payload) {
                    self.handle_router_advertisement(ipv6, icmp.body);
                }
                PacketDisposition::Handled
            }
            other => {
                trace!("ICMPv6 type {} not handled here", other);
                self.stats.unhandled += 1;
                PacketDisposition::Unhandled
            }
        }
    }

    /// Validation applied to every ND type: unforwarded hop limit, zero
    /// code, valid checksum. Failures drop the packet and count it.
    fn check_ndp_packet(
        &mut self,
        ipv6: &Ipv6Header,
        icmp: &Icmpv6Packet<'_>,
        payload: &[u8],
    ) -> bool {
        let valid = ipv6.hop_limit == ND_HOP_LIMIT
            && icmp.code == 0
            && verify_checksum(&ipv6.src, &ipv6.dst, payload);
        if !valid {
            debug!(
                "dropping invalid ND packet from {} (hop limit {}, code {})",
                ipv6.src, ipv6.hop_limit, icmp.code
            );
            self.stats.dropped_invalid += 1;
        }
        valid
    }

    fn handle_neighbor_solicitation(
        &mut self,
        state: &mut StateHandle,
        out: &mut Vec<StateDelta>,
        meta: &RxPacketMeta,
        ipv6: &Ipv6Header,
        body: &[u8],
    ) {
        let msg = match NdpMessage::parse(ICMPV6_TYPE_NEIGHBOR_SOLICITATION, body) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("dropping bad NS: {}", e);
                self.stats.dropped_invalid += 1;
                return;
            }
        };
        let (target, src_ll) = match &msg {
            NdpMessage::NeighborSolicitation { target, .. } => (*target, msg.source_link_layer()),
            _ => unreachable!(),
        };
        if target.is_multicast() {
            debug!("dropping NS for multicast target {}", target);
            self.stats.dropped_invalid += 1;
            return;
        }

        let snapshot = state.current();
        let intf = match snapshot.vlan_interface(meta.vlan) {
            Some(intf) => intf.clone(),
            None => {
                trace!("NS on vlan {} with no interface", meta.vlan);
                return;
            }
        };

        let src_unspecified = ipv6.src == Ipv6Address::UNSPECIFIED;
        if !src_unspecified {
            // learn the solicitor while we are here
            let mac = src_ll.unwrap_or(meta.src_mac);
            self.update_neighbor_entry(
                state,
                out,
                meta.vlan,
                IpAddress::V6(ipv6.src),
                mac,
                meta.port,
            );
        }

        if !intf.has_address(&IpAddress::V6(target)) {
            trace!("NS target {} is not ours", target);
            return;
        }

        // Duplicate-address-detection probes come from :: and get an
        // all-nodes multicast answer.
        let (dst_ip, dst_mac, solicited) = if src_unspecified {
            (
                Ipv6Address::ALL_NODES,
                MacAddress::ipv6_multicast(&Ipv6Address::ALL_NODES),
                false,
            )
        } else {
            (ipv6.src, meta.src_mac, true)
        };
        let flags = NaFlags {
            router: true,
            solicited,
            override_flag: true,
        };
        let payload = build_neighbor_advertisement(&target, &dst_ip, target, intf.mac, flags);
        self.tx
            .send_ndp(meta.vlan, intf.mac, dst_mac, target, dst_ip, payload);
        self.stats.tx_neighbor_advertisement += 1;
    }

    fn handle_neighbor_advertisement(
        &mut self,
        state: &mut StateHandle,
        out: &mut Vec<StateDelta>,
        meta: &RxPacketMeta,
        body: &[u8],
    ) {
        let msg = match NdpMessage::parse(ICMPV6_TYPE_NEIGHBOR_ADVERTISEMENT, body) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("dropping bad NA: {}", e);
                self.stats.dropped_invalid += 1;
                return;
            }
        };
        let (flags, target) = match &msg {
            NdpMessage::NeighborAdvertisement { flags, target, .. } => (*flags, *target),
            _ => unreachable!(),
        };
        if target.is_multicast() {
            debug!("dropping NA for multicast target {}", target);
            self.stats.dropped_invalid += 1;
            return;
        }
        let mac = msg.target_link_layer().unwrap_or(meta.src_mac);
        debug!(
            "NA for {} -> {} (router={} solicited={} override={})",
            target, mac, flags.router, flags.solicited, flags.override_flag
        );
        self.update_neighbor_entry(
            state,
            out,
            meta.vlan,
            IpAddress::V6(target),
            mac,
            meta.port,
        );
    }

    fn handle_router_solicitation(
        &mut self,
        state: &mut StateHandle,
        meta: &RxPacketMeta,
        ipv6: &Ipv6Header,
    ) {
        let snapshot = state.current();
        let intf = match snapshot.vlan_interface(meta.vlan) {
            Some(intf) => intf.clone(),
            None => return,
        };
        if !intf.ra_enabled {
            trace!("RS on {} but RA is disabled", intf.id);
            return;
        }
        if let Some(advertiser) = self.advertisers.get(&intf.id) {
            if advertiser.send_unicast(ipv6.src, meta.src_mac) {
                self.stats.tx_router_advertisement += 1;
            }
        }
    }

    fn handle_router_advertisement(&mut self, ipv6: &Ipv6Header, body: &[u8]) {
        match NdpMessage::parse(ICMPV6_TYPE_ROUTER_ADVERTISEMENT, body) {
            Ok(NdpMessage::RouterAdvertisement {
                router_lifetime, ..
            }) => {
                debug!(
                    "router advertisement from {} (lifetime {}s)",
                    ipv6.src, router_lifetime
                );
            }
            Ok(_) => {}
            Err(e) => {
                debug!("dropping bad RA: {}", e);
                self.stats.dropped_invalid += 1;
            }
        }
    }

    fn update_neighbor_entry(
        &mut self,
        state: &mut StateHandle,
        out: &mut Vec<StateDelta>,
        vlan: VlanId,
        ip: IpAddress,
        mac: MacAddress,
        port: PortId,
    ) {
        if let Some(delta) =
            state.update(|s| s.set_neighbor(vlan, NeighborEntry::resolved(ip, mac, port)))
        {
            out.push(delta);
        }
    }

    /// Records a pending entry for an address we are about to solicit.
    /// Never downgrades a resolved entry.
    pub fn set_pending_ndp_entry(
        &mut self,
        state: &mut StateHandle,
        out: &mut Vec<StateDelta>,
        vlan: VlanId,
        ip: IpAddress,
    ) {
        let delta = state.update(|s| {
            let v = s.vlan(vlan)?;
            if v.neighbors.contains_key(&ip) {
                return None;
            }
            s.set_neighbor(vlan, NeighborEntry::pending(ip))
        });
        if let Some(delta) = delta {
            out.push(delta);
        }
    }

    /// Emits one neighbor solicitation for `target` on `vlan`.
    pub fn send_neighbor_solicitation(
        &mut self,
        state: &StateHandle,
        target: Ipv6Address,
        vlan: VlanId,
    ) {
        let snapshot = state.current();
        let intf = match snapshot.vlan_interface(vlan) {
            Some(intf) => intf.clone(),
            None => return,
        };
        let src = match intf.nd_source() {
            Some(src) => src,
            None => {
                warn!("no IPv6 source to solicit {} on vlan {}", target, vlan);
                return;
            }
        };
        let dst = target.solicited_node_multicast();
        let payload = build_neighbor_solicitation(&src, &dst, target, intf.mac);
        self.tx.send_ndp(
            vlan,
            intf.mac,
            MacAddress::ipv6_multicast(&dst),
            src,
            dst,
            payload,
        );
        self.stats.tx_neighbor_solicitation += 1;
    }

    /// An outbound lookup found no neighbor for `target`: record a
    /// pending entry on the owning VLAN and solicit. Retransmission
    /// pacing belongs to the neighbor state machine upstream.
    pub fn send_neighbor_solicitations(
        &mut self,
        state: &mut StateHandle,
        out: &mut Vec<StateDelta>,
        target: Ipv6Address,
    ) {
        let snapshot = state.current();
        let vlan_id = match snapshot.vlan_for_address(&IpAddress::V6(target)) {
            Some(vlan) => vlan.id,
            None => {
                trace!("no VLAN covers {}", target);
                return;
            }
        };
        self.set_pending_ndp_entry(state, out, vlan_id, IpAddress::V6(target));
        self.send_neighbor_solicitation(state, target, vlan_id);
    }

    /// Emits unsolicited neighbor advertisements for every address on
    /// every interface. Used after interface or MAC changes; one NA per
    /// address per call, no internal pacing.
    pub fn flood_neighbor_advertisements(&mut self, state: &StateHandle) {
        let snapshot = state.current();
        let dst = Ipv6Address::ALL_NODES;
        let dst_mac = MacAddress::ipv6_multicast(&dst);
        for intf in snapshot.interfaces.values() {
            for addr in intf.v6_addrs() {
                let flags = NaFlags {
                    router: true,
                    solicited: false,
                    override_flag: true,
                };
                let payload = build_neighbor_advertisement(&addr, &dst, addr, intf.mac, flags);
                self.tx
                    .send_ndp(intf.vlan, intf.mac, dst_mac, addr, dst, payload);
                self.stats.tx_neighbor_advertisement += 1;
            }
        }
    }

    /// Synchronously removes a neighbor entry. Returns the number of
    /// entries removed (0 or 1); when it returns, the state update has
    /// committed.
    pub fn flush_ndp_entry_blocking(
        &mut self,
        state: &mut StateHandle,
        out: &mut Vec<StateDelta>,
        ip: Ipv6Address,
        vlan: VlanId,
    ) -> u32 {
        match state.update(|s| s.remove_neighbor(vlan, &IpAddress::V6(ip))) {
            Some(delta) => {
                out.push(delta);
                1
            }
            None => 0,
        }
    }

    /// Maintains the per-interface RA map from interface deltas. This
    /// is the handler's only persistent state.
    pub fn state_updated(&mut self, delta: &StateDelta) {
        for (id, change) in delta.interface_deltas() {
            match change {
                Delta::Added(intf) => self.intf_added(id, intf),
                Delta::Changed(_, intf) => {
                    if intf.ra_enabled {
                        match self.advertisers.get_mut(&id) {
                            Some(advertiser) => advertiser.update_interface(intf),
                            None => self.intf_added(id, intf),
                        }
                    } else {
                        self.advertisers.remove(&id);
                    }
                }
                Delta::Removed(_) => {
                    self.advertisers.remove(&id);
                }
            }
        }
    }

    fn intf_added(&mut self, id: InterfaceId, intf: Arc<Interface>) {
        if !intf.ra_enabled {
            return;
        }
        debug!("starting route advertiser for interface {}", id);
        self.advertisers.insert(
            id,
            RouteAdvertiser::new(
                self.tx.clone(),
                intf,
                self.ra_hop_limit,
                self.ra_router_lifetime,
            ),
        );
    }

    pub fn advertiser_count(&self) -> usize {
        self.advertisers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndp::packet::{
        build_neighbor_advertisement, icmpv6_checksum, Icmpv6Packet, NdpMessage,
    };
    use crate::state::{SwitchState, Vlan};
    use fwd_types::VrfId;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Sent {
        vlan: VlanId,
        dst_mac: MacAddress,
        src_ip: Ipv6Address,
        dst_ip: Ipv6Address,
        payload: Vec<u8>,
    }

    #[derive(Default)]
    struct MockTx {
        sent: Mutex<Vec<Sent>>,
    }

    impl MockTx {
        fn take(&self) -> Vec<Sent> {
            std::mem::take(&mut self.sent.lock().unwrap())
        }
    }

    impl PacketTx for MockTx {
        fn send_ndp(
            &self,
            vlan: VlanId,
            _src_mac: MacAddress,
            dst_mac: MacAddress,
            src_ip: Ipv6Address,
            dst_ip: Ipv6Address,
            payload: Vec<u8>,
        ) {
            self.sent.lock().unwrap().push(Sent {
                vlan,
                dst_mac,
                src_ip,
                dst_ip,
                payload,
            });
        }
    }

    const OUR_MAC: &str = "02:00:00:00:00:01";

    fn base_state() -> SwitchState {
        let vlan = VlanId::new(10).unwrap();
        let mut state = SwitchState::default();
        state.interfaces.insert(
            InterfaceId::new(1),
            Arc::new(Interface {
                id: InterfaceId::new(1),
                vrf: VrfId::DEFAULT,
                vlan,
                mac: OUR_MAC.parse().unwrap(),
                addrs: vec![
                    "fe80::1/64".parse().unwrap(),
                    "2001:db8::1/64".parse().unwrap(),
                ],
                mtu: 9000,
                ra_enabled: true,
            }),
        );
        state
            .vlans
            .insert(vlan, Arc::new(Vlan::new(vlan, InterfaceId::new(1))));
        state
    }

    struct Fixture {
        tx: Arc<MockTx>,
        handler: NdpHandler,
        state: StateHandle,
        out: Vec<StateDelta>,
    }

    fn fixture() -> Fixture {
        let tx = Arc::new(MockTx::default());
        let mut handler = NdpHandler::new(tx.clone(), &AgentConfig::default());
        let state = StateHandle::new(base_state());
        // seed the RA map the way the agent does at startup
        let bootstrap = StateDelta::new(
            Arc::new(SwitchState::default()),
            state.current(),
        );
        handler.state_updated(&bootstrap);
        Fixture {
            tx,
            handler,
            state,
            out: Vec::new(),
        }
    }

    fn meta(port: u32) -> RxPacketMeta {
        RxPacketMeta {
            port: PortId::new(port),
            vlan: VlanId::new(10).unwrap(),
            src_mac: "00:11:22:33:44:55".parse().unwrap(),
            dst_mac: OUR_MAC.parse().unwrap(),
        }
    }

    fn v6(s: &str) -> Ipv6Address {
        s.parse().unwrap()
    }

    fn header(src: &str, dst: &str, payload: &[u8]) -> Ipv6Header {
        Ipv6Header {
            src: v6(src),
            dst: v6(dst),
            next_header: crate::ndp::packet::IP_PROTO_ICMPV6,
            hop_limit: ND_HOP_LIMIT,
            payload_len: payload.len() as u16,
        }
    }

    #[test]
    fn test_ns_for_our_address_gets_solicited_na() {
        let mut f = fixture();
        let peer_mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        let payload = build_neighbor_solicitation(
            &v6("fe80::9"),
            &v6("fe80::1").solicited_node_multicast(),
            v6("fe80::1"),
            peer_mac,
        );
        let hdr = header("fe80::9", "ff02::1:ff00:1", &payload);

        let disposition =
            f.handler
                .handle_packet(&mut f.state, &mut f.out, &meta(5), &hdr, &payload);
        assert_eq!(disposition, PacketDisposition::Handled);

        // reply: solicited+override NA from the target address
        let sent = f.tx.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].src_ip, v6("fe80::1"));
        assert_eq!(sent[0].dst_ip, v6("fe80::9"));
        let icmp = Icmpv6Packet::parse(&sent[0].payload).unwrap();
        match NdpMessage::parse(icmp.msg_type, icmp.body).unwrap() {
            NdpMessage::NeighborAdvertisement { flags, target, .. } => {
                assert!(flags.solicited && flags.override_flag);
                assert_eq!(target, v6("fe80::1"));
            }
            _ => panic!("expected NA"),
        }

        // and the solicitor was learned
        assert_eq!(f.out.len(), 1);
        let snapshot = f.state.current();
        let entry = snapshot
            .vlan(VlanId::new(10).unwrap())
            .unwrap()
            .neighbors
            .get(&IpAddress::V6(v6("fe80::9")))
            .copied()
            .unwrap();
        assert_eq!(entry.mac, Some(peer_mac));
        assert_eq!(entry.port, PortId::new(5));
    }

    #[test]
    fn test_ns_for_other_address_only_learns() {
        let mut f = fixture();
        let payload = build_neighbor_solicitation(
            &v6("fe80::9"),
            &v6("fe80::42").solicited_node_multicast(),
            v6("fe80::42"),
            "00:11:22:33:44:55".parse().unwrap(),
        );
        let hdr = header("fe80::9", "ff02::1:ff00:42", &payload);
        f.handler
            .handle_packet(&mut f.state, &mut f.out, &meta(5), &hdr, &payload);
        assert!(f.tx.take().is_empty());
        assert_eq!(f.out.len(), 1);
    }

    #[test]
    fn test_bad_hop_limit_dropped() {
        let mut f = fixture();
        let payload = build_neighbor_solicitation(
            &v6("fe80::9"),
            &v6("fe80::1").solicited_node_multicast(),
            v6("fe80::1"),
            "00:11:22:33:44:55".parse().unwrap(),
        );
        let mut hdr = header("fe80::9", "ff02::1:ff00:1", &payload);
        hdr.hop_limit = 64;

        f.handler
            .handle_packet(&mut f.state, &mut f.out, &meta(5), &hdr, &payload);
        assert!(f.tx.take().is_empty());
        assert!(f.out.is_empty());
        assert_eq!(f.handler.stats().dropped_invalid, 1);
    }

    #[test]
    fn test_bad_checksum_dropped() {
        let mut f = fixture();
        let mut payload = build_neighbor_solicitation(
            &v6("fe80::9"),
            &v6("fe80::1").solicited_node_multicast(),
            v6("fe80::1"),
            "00:11:22:33:44:55".parse().unwrap(),
        );
        payload[6] ^= 0x55;
        let hdr = header("fe80::9", "ff02::1:ff00:1", &payload);

        f.handler
            .handle_packet(&mut f.state, &mut f.out, &meta(5), &hdr, &payload);
        assert_eq!(f.handler.stats().dropped_invalid, 1);
        assert!(f.out.is_empty());
    }

    #[test]
    fn test_na_resolves_pending_entry() {
        // S5: pending entry flips to resolved on NA
        let mut f = fixture();
        let vlan = VlanId::new(10).unwrap();
        f.handler
            .send_neighbor_solicitations(&mut f.state, &mut f.out, v6("2001:db8::a"));

        // pending entry exists and the NS went to the solicited-node group
        let snapshot = f.state.current();
        assert!(snapshot
            .vlan(vlan)
            .unwrap()
            .neighbors
            .get(&IpAddress::V6(v6("2001:db8::a")))
            .unwrap()
            .is_pending());
        let sent = f.tx.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dst_ip, v6("ff02::1:ff00:a"));
        assert_eq!(sent[0].dst_mac, "33:33:ff:00:00:0a".parse().unwrap());

        // inbound NA resolves it
        let peer_mac: MacAddress = "00:aa:bb:cc:dd:ee".parse().unwrap();
        let payload = build_neighbor_advertisement(
            &v6("2001:db8::a"),
            &v6("fe80::1"),
            v6("2001:db8::a"),
            peer_mac,
            NaFlags {
                router: false,
                solicited: true,
                override_flag: true,
            },
        );
        let hdr = header("2001:db8::a", "fe80::1", &payload);
        let mut meta5 = meta(5);
        meta5.src_mac = peer_mac;
        f.handler
            .handle_packet(&mut f.state, &mut f.out, &meta5, &hdr, &payload);

        let snapshot = f.state.current();
        let entry = snapshot
            .vlan(vlan)
            .unwrap()
            .neighbors
            .get(&IpAddress::V6(v6("2001:db8::a")))
            .copied()
            .unwrap();
        assert_eq!(entry.mac, Some(peer_mac));
        assert!(!entry.is_pending());
        assert_eq!(f.out.len(), 2);
    }

    #[test]
    fn test_pending_does_not_downgrade_resolved() {
        let mut f = fixture();
        let vlan = VlanId::new(10).unwrap();
        let ip = IpAddress::V6(v6("2001:db8::a"));
        f.state
            .update(|s| {
                s.set_neighbor(
                    vlan,
                    NeighborEntry::resolved(ip, "00:aa:bb:cc:dd:ee".parse().unwrap(), PortId::new(5)),
                )
            })
            .unwrap();

        f.handler
            .set_pending_ndp_entry(&mut f.state, &mut f.out, vlan, ip);
        assert!(f.out.is_empty());
        assert!(!f
            .state
            .current()
            .vlan(vlan)
            .unwrap()
            .neighbors
            .get(&ip)
            .unwrap()
            .is_pending());
    }

    #[test]
    fn test_rs_triggers_unicast_ra() {
        let mut f = fixture();
        // RS body: 4 reserved bytes, no options
        let mut payload = vec![ICMPV6_TYPE_ROUTER_SOLICITATION, 0, 0, 0, 0, 0, 0, 0];
        let checksum = icmpv6_checksum(&v6("fe80::9"), &v6("ff02::2"), &payload);
        payload[2..4].copy_from_slice(&checksum.to_be_bytes());
        let hdr = header("fe80::9", "ff02::2", &payload);

        f.handler
            .handle_packet(&mut f.state, &mut f.out, &meta(5), &hdr, &payload);
        let sent = f.tx.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dst_ip, v6("fe80::9"));
        let icmp = Icmpv6Packet::parse(&sent[0].payload).unwrap();
        assert_eq!(icmp.msg_type, ICMPV6_TYPE_ROUTER_ADVERTISEMENT);
    }

    #[test]
    fn test_non_nd_icmpv6_returned_to_caller() {
        let mut f = fixture();
        // echo request
        let payload = vec![128u8, 0, 0, 0, 0, 0, 0, 0];
        let hdr = header("fe80::9", "fe80::1", &payload);
        let disposition =
            f.handler
                .handle_packet(&mut f.state, &mut f.out, &meta(5), &hdr, &payload);
        assert_eq!(disposition, PacketDisposition::Unhandled);
        assert_eq!(f.handler.stats().unhandled, 1);
    }

    #[test]
    fn test_flood_neighbor_advertisements() {
        let mut f = fixture();
        f.handler.flood_neighbor_advertisements(&f.state);
        let sent = f.tx.take();
        // one NA per v6 address on the interface
        assert_eq!(sent.len(), 2);
        for s in &sent {
            assert_eq!(s.dst_ip, Ipv6Address::ALL_NODES);
            assert_eq!(s.vlan, VlanId::new(10).unwrap());
            let icmp = Icmpv6Packet::parse(&s.payload).unwrap();
            match NdpMessage::parse(icmp.msg_type, icmp.body).unwrap() {
                NdpMessage::NeighborAdvertisement { flags, .. } => {
                    assert!(!flags.solicited && flags.override_flag);
                }
                _ => panic!("expected NA"),
            }
        }
    }

    #[test]
    fn test_flush_blocking_counts() {
        let mut f = fixture();
        let vlan = VlanId::new(10).unwrap();
        f.handler
            .send_neighbor_solicitations(&mut f.state, &mut f.out, v6("2001:db8::a"));

        assert_eq!(
            f.handler
                .flush_ndp_entry_blocking(&mut f.state, &mut f.out, v6("2001:db8::a"), vlan),
            1
        );
        assert_eq!(
            f.handler
                .flush_ndp_entry_blocking(&mut f.state, &mut f.out, v6("2001:db8::a"), vlan),
            0
        );
    }

    #[test]
    fn test_ra_map_follows_interface_lifecycle() {
        let mut f = fixture();
        assert_eq!(f.handler.advertiser_count(), 1);

        // interface loses RA
        let delta = f
            .state
            .update(|s| {
                let mut next = s.clone();
                let mut intf = Interface::clone(next.interfaces.get(&InterfaceId::new(1)).unwrap());
                intf.ra_enabled = false;
                next.interfaces.insert(InterfaceId::new(1), Arc::new(intf));
                Some(next)
            })
            .unwrap();
        f.handler.state_updated(&delta);
        assert_eq!(f.handler.advertiser_count(), 0);

        // interface removed entirely
        let delta = f
            .state
            .update(|s| {
                let mut next = s.clone();
                next.interfaces.remove(&InterfaceId::new(1));
                Some(next)
            })
            .unwrap();
        f.handler.state_updated(&delta);
        assert_eq!(f.handler.advertiser_count(), 0);
    }
}
