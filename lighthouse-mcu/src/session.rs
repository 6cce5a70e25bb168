//! Session registry
//!
//! Fixed pool of connection slots, sized once at start. Slots are claimed
//! first-fit on connect and released on the matching disconnect. A
//! connection that finds no free slot stays connected at the stack level
//! but is not tracked here.

use log::*;

use crate::ble::ConnHandle;

/// One slot of the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSlot {
    handle: Option<ConnHandle>,
}

impl SessionSlot {
    pub fn handle(&self) -> Option<ConnHandle> {
        self.handle
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }
}

/// Result of a connect event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Stored in this slot
    Tracked(usize),
    /// Handle already held by this slot; nothing changed
    AlreadyTracked(usize),
    /// Pool full; connection accepted but not accounted
    CapacityExceeded,
    /// The connection attempt did not establish a link
    Failed,
}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    slots: Box<[SessionSlot]>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![SessionSlot::default(); capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn on_connect(&mut self, handle: ConnHandle, established: bool) -> ConnectOutcome {
        if !established {
            return ConnectOutcome::Failed;
        }

        if let Some(index) = self.slot_of(handle) {
            debug!("Connection {} already tracked in slot {}", handle, index);
            return ConnectOutcome::AlreadyTracked(index);
        }

        match self.slots.iter().position(|s| !s.is_connected()) {
            Some(index) => {
                self.slots[index].handle = Some(handle);
                info!("Connection {} stored in slot {}", handle, index);
                ConnectOutcome::Tracked(index)
            }
            None => {
                warn!(
                    "No free connection slot available for {} ({} in use)",
                    handle,
                    self.capacity()
                );
                ConnectOutcome::CapacityExceeded
            }
        }
    }

    /// Free the slot holding `handle`. Returns the slot index, or `None`
    /// if the handle was never tracked.
    pub fn on_disconnect(&mut self, handle: ConnHandle) -> Option<usize> {
        let index = self.slot_of(handle)?;
        self.slots[index].handle = None;
        info!("Connection {} removed from slot {}", handle, index);
        Some(index)
    }

    pub fn is_any_connected(&self) -> bool {
        self.slots.iter().any(SessionSlot::is_connected)
    }

    pub fn is_tracked(&self, handle: ConnHandle) -> bool {
        self.slot_of(handle).is_some()
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_connected()).count()
    }

    /// Handles of all tracked sessions, in slot order
    pub fn handles(&self) -> impl Iterator<Item = ConnHandle> + '_ {
        self.slots.iter().filter_map(SessionSlot::handle)
    }

    pub fn slots(&self) -> &[SessionSlot] {
        &self.slots
    }

    fn slot_of(&self, handle: ConnHandle) -> Option<usize> {
        self.slots.iter().position(|s| s.handle == Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    const A: ConnHandle = ConnHandle(1);
    const B: ConnHandle = ConnHandle(2);
    const C: ConnHandle = ConnHandle(3);
    const D: ConnHandle = ConnHandle(4);
    const E: ConnHandle = ConnHandle(5);

    #[test]
    fn empty_pool_has_nobody_connected() {
        let registry = SessionRegistry::new(3);
        assert!(!registry.is_any_connected());
        assert_eq!(registry.occupied(), 0);
    }

    #[test]
    fn full_pool_scenario() {
        let mut registry = SessionRegistry::new(3);

        assert_eq!(registry.on_connect(A, true), ConnectOutcome::Tracked(0));
        assert_eq!(registry.on_connect(B, true), ConnectOutcome::Tracked(1));
        assert_eq!(registry.on_connect(C, true), ConnectOutcome::Tracked(2));
        assert_eq!(registry.on_connect(D, true), ConnectOutcome::CapacityExceeded);
        assert!(registry.is_any_connected());
        assert!(!registry.is_tracked(D));

        assert_eq!(registry.on_disconnect(B), Some(1));
        assert!(registry.is_tracked(A));
        assert!(registry.is_tracked(C));
        assert_eq!(registry.slots()[1].handle(), None);

        assert_eq!(registry.on_connect(E, true), ConnectOutcome::Tracked(1));
        assert_eq!(registry.handles().collect::<Vec<_>>(), vec![A, E, C]);
    }

    #[test]
    fn untracked_disconnect_is_a_no_op() {
        let mut registry = SessionRegistry::new(1);
        registry.on_connect(A, true);

        assert_eq!(registry.on_disconnect(D), None);
        assert!(registry.is_tracked(A));
    }

    #[test]
    fn failed_connect_claims_nothing() {
        let mut registry = SessionRegistry::new(2);
        assert_eq!(registry.on_connect(A, false), ConnectOutcome::Failed);
        assert!(!registry.is_any_connected());
    }

    #[test]
    fn duplicate_handle_keeps_single_slot() {
        let mut registry = SessionRegistry::new(3);
        registry.on_connect(A, true);

        assert_eq!(registry.on_connect(A, true), ConnectOutcome::AlreadyTracked(0));
        assert_eq!(registry.occupied(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Connect(u16),
        Disconnect(u16),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u16..8).prop_map(Op::Connect),
            (0u16..8).prop_map(Op::Disconnect),
        ]
    }

    proptest! {
        #[test]
        fn occupancy_matches_a_model_of_the_pool(
            capacity in 1usize..5,
            ops in proptest::collection::vec(op(), 0..64),
        ) {
            let mut registry = SessionRegistry::new(capacity);
            let mut model: HashSet<u16> = HashSet::new();

            for op in ops {
                match op {
                    Op::Connect(h) => {
                        let outcome = registry.on_connect(ConnHandle(h), true);
                        if model.contains(&h) {
                            prop_assert!(matches!(outcome, ConnectOutcome::AlreadyTracked(_)));
                        } else if model.len() < capacity {
                            prop_assert!(matches!(outcome, ConnectOutcome::Tracked(_)));
                            model.insert(h);
                        } else {
                            prop_assert_eq!(outcome, ConnectOutcome::CapacityExceeded);
                        }
                    }
                    Op::Disconnect(h) => {
                        let freed = registry.on_disconnect(ConnHandle(h));
                        prop_assert_eq!(freed.is_some(), model.remove(&h));
                    }
                }

                prop_assert_eq!(registry.occupied(), model.len());
                prop_assert!(registry.occupied() <= capacity);
                prop_assert_eq!(registry.is_any_connected(), !model.is_empty());

                let handles: Vec<_> = registry.handles().collect();
                let unique: HashSet<_> = handles.iter().collect();
                prop_assert_eq!(unique.len(), handles.len());
            }
        }
    }
}
