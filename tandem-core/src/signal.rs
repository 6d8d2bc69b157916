//! Per-instance change notification.
//!
//! A [`Signal`] is an ordered observer list owned by exactly one container.
//! Emission is synchronous: every connected slot runs before `emit` returns,
//! in connection order.
//!
//! ```text
//! container.set()/remote event
//!       │
//!       ▼
//! Signal::emit(&change) ──► slot 1 ──► slot 2 ──► ... (same call stack)
//! ```
//!
//! Slots may connect, disconnect or even clear the signal while an emission
//! is in flight; the emission works on a snapshot of the slot list taken
//! when it started.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Identifies a connected slot so it can be disconnected later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

type Slot<A> = Rc<dyn Fn(&A)>;

/// Typed, single-threaded observer list.
pub struct Signal<A> {
    slots: RefCell<Vec<(SlotId, Slot<A>)>>,
    next_id: Cell<u64>,
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Signal<A> {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Connect a slot. Returns an id for [`Signal::disconnect`].
    pub fn connect(&self, slot: impl Fn(&A) + 'static) -> SlotId {
        let id = SlotId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push((id, Rc::new(slot)));
        id
    }

    /// Disconnect a slot. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|(slot_id, _)| *slot_id != id);
        slots.len() != before
    }

    /// Invoke every connected slot with `args`.
    pub fn emit(&self, args: &A) {
        // Snapshot so slots can touch the signal without a double borrow.
        let snapshot: Vec<Slot<A>> = self
            .slots
            .borrow()
            .iter()
            .map(|(_, slot)| slot.clone())
            .collect();
        for slot in snapshot {
            slot(args);
        }
    }

    /// Drop every slot.
    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
    }

    /// Number of connected slots.
    pub fn slot_count(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_count() == 0
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slot_count())
            .finish()
    }
}
