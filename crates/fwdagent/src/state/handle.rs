//! Synchronous commit point for state updates.

use crate::state::delta::StateDelta;
use crate::state::types::SwitchState;
use std::sync::Arc;

/// Owner of the current state snapshot.
///
/// Updates commit synchronously on the update thread: the closure sees
/// the current snapshot and returns the next one (or `None` for no
/// change), and the resulting delta is handed back for application.
/// Callers that need "blocking" semantics get them for free: when
/// `update` returns, the state has committed.
pub struct StateHandle {
    current: Arc<SwitchState>,
}

impl StateHandle {
    pub fn new(initial: SwitchState) -> Self {
        StateHandle {
            current: Arc::new(initial),
        }
    }

    pub fn current(&self) -> Arc<SwitchState> {
        self.current.clone()
    }

    /// Commits an update. Returns the delta when the closure produced
    /// a new state.
    pub fn update<F>(&mut self, f: F) -> Option<StateDelta>
    where
        F: FnOnce(&SwitchState) -> Option<SwitchState>,
    {
        let old = self.current.clone();
        let next = f(&old)?;
        let next = Arc::new(next);
        self.current = next.clone();
        Some(StateDelta::new(old, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{NeighborEntry, Vlan};
    use fwd_types::{InterfaceId, VlanId};

    #[test]
    fn test_update_commits_and_diffs() {
        let vlan = VlanId::new(10).unwrap();
        let mut state = SwitchState::default();
        state
            .vlans
            .insert(vlan, Arc::new(Vlan::new(vlan, InterfaceId::new(1))));
        let mut handle = StateHandle::new(state);

        let delta = handle
            .update(|s| s.set_neighbor(vlan, NeighborEntry::pending("2001::5".parse().unwrap())))
            .unwrap();
        assert_eq!(delta.neighbor_deltas().len(), 1);
        assert!(handle
            .current()
            .vlan(vlan)
            .unwrap()
            .neighbors
            .contains_key(&"2001::5".parse().unwrap()));

        // no-change closures commit nothing
        assert!(handle.update(|_| None).is_none());
    }
}
