//! Published port-to-egress mapping.
//!
//! Link-state callbacks need to know which egress objects currently
//! resolve out a port, and they run outside the update thread. The
//! mapping is therefore copy-on-write: writers clone the current map,
//! mutate the clone, and publish it with a pointer swap under a short
//! lock; readers clone the pointer and observe an immutable snapshot.

use fwd_sdk::EgressId;
use fwd_types::PortId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// An immutable snapshot of the port/egress relation.
///
/// Invariants: a port is present in `forward` iff its set is non-empty,
/// and `reverse[e] == p` iff `e ∈ forward[p]`.
#[derive(Debug, Clone, Default)]
pub struct PortEgressMap {
    forward: BTreeMap<PortId, BTreeSet<EgressId>>,
    reverse: BTreeMap<EgressId, PortId>,
}

impl PortEgressMap {
    pub fn egress_ids_for(&self, port: PortId) -> Option<&BTreeSet<EgressId>> {
        self.forward.get(&port)
    }

    pub fn port_for(&self, egress_id: EgressId) -> Option<PortId> {
        self.reverse.get(&egress_id).copied()
    }

    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.forward.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    fn detach(&mut self, egress_id: EgressId, old_port: PortId) {
        self.reverse.remove(&egress_id);
        if let Some(set) = self.forward.get_mut(&old_port) {
            set.remove(&egress_id);
            if set.is_empty() {
                self.forward.remove(&old_port);
            }
        }
    }

    fn attach(&mut self, egress_id: EgressId, new_port: PortId) {
        self.forward.entry(new_port).or_default().insert(egress_id);
        self.reverse.insert(egress_id, new_port);
    }
}

/// The transition an index update represents for the egress object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTransition {
    /// Unresolved to resolved: the egress gained a port.
    CameUp,
    /// Resolved to unresolved: the egress lost its port.
    WentAway,
    /// Port-to-port move or no change; no resolution edge.
    None,
}

/// Publisher of [`PortEgressMap`] snapshots.
#[derive(Debug, Default)]
pub struct PortEgressIndex {
    published: Mutex<Arc<PortEgressMap>>,
}

impl PortEgressIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot. Never blocks longer than the
    /// pointer swap in [`update`](Self::update).
    pub fn snapshot(&self) -> Arc<PortEgressMap> {
        self.published.lock().unwrap().clone()
    }

    /// Rewrites the mapping for one egress object and publishes the new
    /// snapshot. Returns the resolution transition, which the host
    /// table forwards to ECMP membership updates.
    pub fn update(
        &self,
        egress_id: EgressId,
        old_port: PortId,
        new_port: PortId,
    ) -> ResolutionTransition {
        let mut next = PortEgressMap::clone(&self.snapshot());
        if !old_port.is_none() {
            next.detach(egress_id, old_port);
        }
        if !new_port.is_none() {
            next.attach(egress_id, new_port);
        }
        *self.published.lock().unwrap() = Arc::new(next);

        match (old_port.is_none(), new_port.is_none()) {
            (true, false) => ResolutionTransition::CameUp,
            (false, true) => ResolutionTransition::WentAway,
            _ => ResolutionTransition::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_and_detach() {
        let index = PortEgressIndex::new();
        let e1 = EgressId::new(1);
        let p5 = PortId::new(5);

        let t = index.update(e1, PortId::NONE, p5);
        assert_eq!(t, ResolutionTransition::CameUp);
        let snap = index.snapshot();
        assert!(snap.egress_ids_for(p5).unwrap().contains(&e1));
        assert_eq!(snap.port_for(e1), Some(p5));

        let t = index.update(e1, p5, PortId::NONE);
        assert_eq!(t, ResolutionTransition::WentAway);
        let snap = index.snapshot();
        assert!(snap.is_empty());
        assert_eq!(snap.port_for(e1), None);
    }

    #[test]
    fn test_port_move_is_not_a_resolution_edge() {
        let index = PortEgressIndex::new();
        let e1 = EgressId::new(1);

        index.update(e1, PortId::NONE, PortId::new(5));
        let t = index.update(e1, PortId::new(5), PortId::new(6));
        assert_eq!(t, ResolutionTransition::None);

        let snap = index.snapshot();
        assert!(snap.egress_ids_for(PortId::new(5)).is_none());
        assert!(snap.egress_ids_for(PortId::new(6)).unwrap().contains(&e1));
        assert_eq!(snap.port_for(e1), Some(PortId::new(6)));
    }

    #[test]
    fn test_empty_sets_are_dropped() {
        let index = PortEgressIndex::new();
        let p5 = PortId::new(5);
        index.update(EgressId::new(1), PortId::NONE, p5);
        index.update(EgressId::new(2), PortId::NONE, p5);
        index.update(EgressId::new(1), p5, PortId::NONE);

        let snap = index.snapshot();
        assert_eq!(snap.egress_ids_for(p5).unwrap().len(), 1);

        index.update(EgressId::new(2), p5, PortId::NONE);
        let snap = index.snapshot();
        assert!(snap.egress_ids_for(p5).is_none());
    }

    #[test]
    fn test_readers_keep_old_snapshot() {
        let index = PortEgressIndex::new();
        let e1 = EgressId::new(1);
        index.update(e1, PortId::NONE, PortId::new(5));

        let before = index.snapshot();
        index.update(e1, PortId::new(5), PortId::NONE);

        // the old snapshot is unchanged, the new one reflects the update
        assert_eq!(before.port_for(e1), Some(PortId::new(5)));
        assert_eq!(index.snapshot().port_for(e1), None);
    }
}
