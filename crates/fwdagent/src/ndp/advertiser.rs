//! Per-interface router advertisement emitter.

use crate::ndp::handler::PacketTx;
use crate::ndp::packet::build_router_advertisement;
use crate::state::Interface;
use fwd_types::{Ipv6Address, MacAddress};
use log::debug;
use std::sync::Arc;

/// Emits router advertisements for one interface.
///
/// Owned by the ND handler, created when an interface with RA enabled
/// appears and dropped when it goes away. Periodic advertisement is
/// driven by a timer outside this subsystem; this type only builds and
/// sends.
pub struct RouteAdvertiser {
    intf: Arc<Interface>,
    tx: Arc<dyn PacketTx>,
    hop_limit: u8,
    router_lifetime: u16,
}

impl RouteAdvertiser {
    pub fn new(
        tx: Arc<dyn PacketTx>,
        intf: Arc<Interface>,
        hop_limit: u8,
        router_lifetime: u16,
    ) -> Self {
        RouteAdvertiser {
            intf,
            tx,
            hop_limit,
            router_lifetime,
        }
    }

    /// Tracks interface attribute changes.
    pub fn update_interface(&mut self, intf: Arc<Interface>) {
        self.intf = intf;
    }

    fn advertised_prefixes(&self) -> Vec<(Ipv6Address, u8)> {
        self.intf
            .addrs
            .iter()
            .filter_map(|p| {
                let addr = p.address().as_v6().copied()?;
                if addr.is_link_local() {
                    None
                } else {
                    Some((addr, p.prefix_len()))
                }
            })
            .collect()
    }

    fn send(&self, dst_ip: Ipv6Address, dst_mac: MacAddress) -> bool {
        let src = match self.intf.nd_source() {
            Some(src) => src,
            None => {
                debug!("interface {} has no IPv6 source for RA", self.intf.id);
                return false;
            }
        };
        let payload = build_router_advertisement(
            &src,
            &dst_ip,
            self.hop_limit,
            self.router_lifetime,
            self.intf.mac,
            &self.advertised_prefixes(),
            Some(self.intf.mtu),
        );
        self.tx
            .send_ndp(self.intf.vlan, self.intf.mac, dst_mac, src, dst_ip, payload);
        true
    }

    /// Unicast RA to a soliciting host.
    pub fn send_unicast(&self, dst_ip: Ipv6Address, dst_mac: MacAddress) -> bool {
        self.send(dst_ip, dst_mac)
    }

    /// Multicast RA to all nodes.
    pub fn send_multicast(&self) -> bool {
        let dst = Ipv6Address::ALL_NODES;
        self.send(dst, MacAddress::ipv6_multicast(&dst))
    }
}
