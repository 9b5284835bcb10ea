//! Next-hop and forwarding-action types.
//!
//! A route forwards to a canonicalized set of next hops, or drops, or
//! punts to the CPU. The canonical set (sorted, deduplicated) is also
//! the key ECMP host entries are shared under: two routes naming the
//! same next hops in any order resolve to the same entry.

use fwd_types::{InterfaceId, IpAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single forwarding destination: a neighbor address out an interface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NextHop {
    pub intf: InterfaceId,
    pub ip: IpAddress,
}

impl NextHop {
    pub fn new(intf: InterfaceId, ip: IpAddress) -> Self {
        NextHop { intf, ip }
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ip, self.intf)
    }
}

/// A canonicalized set of next hops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NextHopSet(BTreeSet<NextHop>);

impl NextHopSet {
    pub fn new() -> Self {
        NextHopSet(BTreeSet::new())
    }

    pub fn single(nexthop: NextHop) -> Self {
        let mut set = BTreeSet::new();
        set.insert(nexthop);
        NextHopSet(set)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, nexthop: &NextHop) -> bool {
        self.0.contains(nexthop)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NextHop> {
        self.0.iter()
    }
}

impl FromIterator<NextHop> for NextHopSet {
    fn from_iter<I: IntoIterator<Item = NextHop>>(iter: I) -> Self {
        NextHopSet(iter.into_iter().collect())
    }
}

impl fmt::Display for NextHopSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = self.0.iter().map(|nh| nh.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// What a route does with matching packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardInfo {
    /// Discard.
    Drop,
    /// Punt to the CPU.
    ToCpu,
    /// Forward to the next-hop set (never empty).
    Nexthops(NextHopSet),
}

impl ForwardInfo {
    pub fn nexthops(&self) -> Option<&NextHopSet> {
        match self {
            ForwardInfo::Nexthops(set) => Some(set),
            _ => None,
        }
    }

    /// Number of next hops; 0 for drop and to-CPU actions.
    pub fn nexthop_count(&self) -> usize {
        self.nexthops().map_or(0, NextHopSet::len)
    }
}

impl fmt::Display for ForwardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardInfo::Drop => write!(f, "drop"),
            ForwardInfo::ToCpu => write!(f, "to-cpu"),
            ForwardInfo::Nexthops(set) => write!(f, "nexthops[{}]", set),
        }
    }
}
