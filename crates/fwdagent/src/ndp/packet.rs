//! ICMPv6 neighbor-discovery wire format.
//!
//! Ethernet and IPv6 header handling belongs to the packet layer; this
//! module covers the ICMPv6 envelope and the four ND message bodies
//! (RFC 4861), including the pseudo-header checksum and the 8-byte-unit
//! option walk.

use fwd_types::{Ipv6Address, MacAddress};
use thiserror::Error;

pub const IP_PROTO_ICMPV6: u8 = 58;

/// ND packets must arrive with an unforwarded hop limit.
pub const ND_HOP_LIMIT: u8 = 255;

pub const ICMPV6_TYPE_ROUTER_SOLICITATION: u8 = 133;
pub const ICMPV6_TYPE_ROUTER_ADVERTISEMENT: u8 = 134;
pub const ICMPV6_TYPE_NEIGHBOR_SOLICITATION: u8 = 135;
pub const ICMPV6_TYPE_NEIGHBOR_ADVERTISEMENT: u8 = 136;

pub const OPT_SOURCE_LINK_LAYER: u8 = 1;
pub const OPT_TARGET_LINK_LAYER: u8 = 2;
pub const OPT_PREFIX_INFORMATION: u8 = 3;
pub const OPT_MTU: u8 = 5;

/// The fixed IPv6 header fields the ND handler consumes. Parsing the
/// header itself happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub src: Ipv6Address,
    pub dst: Ipv6Address,
    pub next_header: u8,
    pub hop_limit: u8,
    pub payload_len: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NdpParseError {
    #[error("packet too short")]
    Truncated,
    #[error("bad option length")]
    BadOptionLength,
    #[error("not an ND message type: {0}")]
    UnknownType(u8),
}

/// A parsed ND option. `data` excludes the two type/length bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdpOption {
    pub kind: u8,
    pub data: Vec<u8>,
}

fn parse_options(buf: &[u8]) -> Result<Vec<NdpOption>, NdpParseError> {
    let mut options = Vec::new();
    let mut at = 0;
    while at < buf.len() {
        if buf.len() - at < 2 {
            return Err(NdpParseError::Truncated);
        }
        let kind = buf[at];
        let len = usize::from(buf[at + 1]) * 8;
        if len == 0 || at + len > buf.len() {
            return Err(NdpParseError::BadOptionLength);
        }
        options.push(NdpOption {
            kind,
            data: buf[at + 2..at + len].to_vec(),
        });
        at += len;
    }
    Ok(options)
}

fn link_layer_option(options: &[NdpOption], kind: u8) -> Option<MacAddress> {
    options
        .iter()
        .find(|o| o.kind == kind && o.data.len() >= 6)
        .map(|o| {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&o.data[..6]);
            MacAddress::new(bytes)
        })
}

fn read_v6(buf: &[u8]) -> Ipv6Address {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buf[..16]);
    Ipv6Address::from(octets)
}

/// Flags carried by a neighbor advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NaFlags {
    pub router: bool,
    pub solicited: bool,
    pub override_flag: bool,
}

impl NaFlags {
    fn to_byte(self) -> u8 {
        (u8::from(self.router) << 7)
            | (u8::from(self.solicited) << 6)
            | (u8::from(self.override_flag) << 5)
    }

    fn from_byte(b: u8) -> Self {
        NaFlags {
            router: b & 0x80 != 0,
            solicited: b & 0x40 != 0,
            override_flag: b & 0x20 != 0,
        }
    }
}

/// A parsed ND message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdpMessage {
    RouterSolicitation {
        options: Vec<NdpOption>,
    },
    RouterAdvertisement {
        hop_limit: u8,
        managed: bool,
        other: bool,
        router_lifetime: u16,
        reachable_time: u32,
        retrans_timer: u32,
        options: Vec<NdpOption>,
    },
    NeighborSolicitation {
        target: Ipv6Address,
        options: Vec<NdpOption>,
    },
    NeighborAdvertisement {
        flags: NaFlags,
        target: Ipv6Address,
        options: Vec<NdpOption>,
    },
}

impl NdpMessage {
    /// Parses an ND message body (the bytes after the 4-byte ICMPv6
    /// header) for the given ICMPv6 type.
    pub fn parse(msg_type: u8, body: &[u8]) -> Result<NdpMessage, NdpParseError> {
        match msg_type {
            ICMPV6_TYPE_ROUTER_SOLICITATION => {
                if body.len() < 4 {
                    return Err(NdpParseError::Truncated);
                }
                Ok(NdpMessage::RouterSolicitation {
                    options: parse_options(&body[4..])?,
                })
            }
            ICMPV6_TYPE_ROUTER_ADVERTISEMENT => {
                if body.len() < 12 {
                    return Err(NdpParseError::Truncated);
                }
                Ok(NdpMessage::RouterAdvertisement {
                    hop_limit: body[0],
                    managed: body[1] & 0x80 != 0,
                    other: body[1] & 0x40 != 0,
                    router_lifetime: u16::from_be_bytes([body[2], body[3]]),
                    reachable_time: u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
                    retrans_timer: u32::from_be_bytes([body[8], body[9], body[10], body[11]]),
                    options: parse_options(&body[12..])?,
                })
            }
            ICMPV6_TYPE_NEIGHBOR_SOLICITATION => {
                if body.len() < 20 {
                    return Err(NdpParseError::Truncated);
                }
                Ok(NdpMessage::NeighborSolicitation {
                    target: read_v6(&body[4..20]),
                    options: parse_options(&body[20..])?,
                })
            }
            ICMPV6_TYPE_NEIGHBOR_ADVERTISEMENT => {
                if body.len() < 20 {
                    return Err(NdpParseError::Truncated);
                }
                Ok(NdpMessage::NeighborAdvertisement {
                    flags: NaFlags::from_byte(body[0]),
                    target: read_v6(&body[4..20]),
                    options: parse_options(&body[20..])?,
                })
            }
            other => Err(NdpParseError::UnknownType(other)),
        }
    }

    pub fn source_link_layer(&self) -> Option<MacAddress> {
        link_layer_option(self.options(), OPT_SOURCE_LINK_LAYER)
    }

    pub fn target_link_layer(&self) -> Option<MacAddress> {
        link_layer_option(self.options(), OPT_TARGET_LINK_LAYER)
    }

    fn options(&self) -> &[NdpOption] {
        match self {
            NdpMessage::RouterSolicitation { options }
            | NdpMessage::RouterAdvertisement { options, .. }
            | NdpMessage::NeighborSolicitation { options, .. }
            | NdpMessage::NeighborAdvertisement { options, .. } => options,
        }
    }
}

/// The ICMPv6 envelope over an ND message.
#[derive(Debug, Clone, Copy)]
pub struct Icmpv6Packet<'a> {
    pub msg_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub body: &'a [u8],
}

impl<'a> Icmpv6Packet<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, NdpParseError> {
        if buf.len() < 4 {
            return Err(NdpParseError::Truncated);
        }
        Ok(Icmpv6Packet {
            msg_type: buf[0],
            code: buf[1],
            checksum: u16::from_be_bytes([buf[2], buf[3]]),
            body: &buf[4..],
        })
    }
}

fn sum_bytes(sum: &mut u32, bytes: &[u8]) {
    let mut chunks = bytes.chunks_exact(2);
    for chunk in &mut chunks {
        *sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        *sum += u32::from(u16::from_be_bytes([*last, 0]));
    }
}

/// Computes the ICMPv6 checksum over the pseudo header and message.
/// The message's checksum field must be zero.
pub fn icmpv6_checksum(src: &Ipv6Address, dst: &Ipv6Address, msg: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    sum_bytes(&mut sum, &src.octets());
    sum_bytes(&mut sum, &dst.octets());
    sum_bytes(&mut sum, &(msg.len() as u32).to_be_bytes());
    sum_bytes(&mut sum, &[0, 0, 0, IP_PROTO_ICMPV6]);
    sum_bytes(&mut sum, msg);
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Verifies a received message's checksum.
pub fn verify_checksum(src: &Ipv6Address, dst: &Ipv6Address, msg: &[u8]) -> bool {
    if msg.len() < 4 {
        return false;
    }
    let stored = u16::from_be_bytes([msg[2], msg[3]]);
    let mut zeroed = msg.to_vec();
    zeroed[2] = 0;
    zeroed[3] = 0;
    icmpv6_checksum(src, dst, &zeroed) == stored
}

fn finish(src: &Ipv6Address, dst: &Ipv6Address, mut buf: Vec<u8>) -> Vec<u8> {
    let checksum = icmpv6_checksum(src, dst, &buf);
    buf[2..4].copy_from_slice(&checksum.to_be_bytes());
    buf
}

/// Builds a neighbor solicitation with the source link-layer option.
pub fn build_neighbor_solicitation(
    src: &Ipv6Address,
    dst: &Ipv6Address,
    target: Ipv6Address,
    src_ll: MacAddress,
) -> Vec<u8> {
    let mut buf = vec![ICMPV6_TYPE_NEIGHBOR_SOLICITATION, 0, 0, 0, 0, 0, 0, 0];
    buf.extend_from_slice(&target.octets());
    buf.extend_from_slice(&[OPT_SOURCE_LINK_LAYER, 1]);
    buf.extend_from_slice(src_ll.as_bytes());
    finish(src, dst, buf)
}

/// Builds a neighbor advertisement with the target link-layer option.
pub fn build_neighbor_advertisement(
    src: &Ipv6Address,
    dst: &Ipv6Address,
    target: Ipv6Address,
    target_ll: MacAddress,
    flags: NaFlags,
) -> Vec<u8> {
    let mut buf = vec![
        ICMPV6_TYPE_NEIGHBOR_ADVERTISEMENT,
        0,
        0,
        0,
        flags.to_byte(),
        0,
        0,
        0,
    ];
    buf.extend_from_slice(&target.octets());
    buf.extend_from_slice(&[OPT_TARGET_LINK_LAYER, 1]);
    buf.extend_from_slice(target_ll.as_bytes());
    finish(src, dst, buf)
}

/// Builds a router advertisement carrying the source link-layer option
/// and one prefix-information option per advertised prefix (on-link,
/// autonomous, 30-day lifetimes).
pub fn build_router_advertisement(
    src: &Ipv6Address,
    dst: &Ipv6Address,
    hop_limit: u8,
    router_lifetime: u16,
    src_ll: MacAddress,
    prefixes: &[(Ipv6Address, u8)],
    mtu: Option<u32>,
) -> Vec<u8> {
    let mut buf = vec![ICMPV6_TYPE_ROUTER_ADVERTISEMENT, 0, 0, 0, hop_limit, 0];
    buf.extend_from_slice(&router_lifetime.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes()); // reachable time: unspecified
    buf.extend_from_slice(&0u32.to_be_bytes()); // retrans timer: unspecified
    buf.extend_from_slice(&[OPT_SOURCE_LINK_LAYER, 1]);
    buf.extend_from_slice(src_ll.as_bytes());
    if let Some(mtu) = mtu {
        buf.extend_from_slice(&[OPT_MTU, 1, 0, 0]);
        buf.extend_from_slice(&mtu.to_be_bytes());
    }
    for &(prefix, len) in prefixes {
        buf.extend_from_slice(&[OPT_PREFIX_INFORMATION, 4, len, 0xc0]);
        buf.extend_from_slice(&2_592_000u32.to_be_bytes()); // valid lifetime
        buf.extend_from_slice(&604_800u32.to_be_bytes()); // preferred lifetime
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&prefix.octets());
    }
    finish(src, dst, buf)
}
