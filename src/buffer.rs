//! Single-slot cache between the one physical upstream item and its many
//! logical deliveries.

use std::collections::BTreeMap;

use crate::error::ProtocolViolation;
use crate::registry::ConsumerId;

#[derive(Debug)]
enum Slot<T> {
    Empty,
    Cached(T),
    /// The upstream ended; every handle observes the end from now on.
    Tombstone,
}

/// Outcome of [`Buffer::try_take`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Take<T> {
    /// Nothing cached that this consumer has not seen.
    Miss,
    Item {
        item: T,
        /// This take was the last outstanding one and emptied the slot.
        cleared: bool,
    },
    End,
}

#[derive(Debug)]
pub(crate) struct Buffer<T> {
    slot: Slot<T>,
    /// Per consumer: has it taken the cached item yet.
    seen: BTreeMap<ConsumerId, bool>,
    next_id: u64,
}

impl<T> Buffer<T>
where
    T: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            slot: Slot::Empty,
            seen: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Adds a consumer record.
    ///
    /// The newcomer has seen the cached item unless `inherit_from` names a
    /// consumer whose flag it should copy. Returns `None` once the upstream
    /// has ended: there is nothing left to join.
    pub(crate) fn join(&mut self, inherit_from: Option<ConsumerId>) -> Option<ConsumerId> {
        if matches!(self.slot, Slot::Tombstone) {
            return None;
        }

        let id = ConsumerId::new(self.next_id);
        self.next_id += 1;

        let seen = inherit_from
            .and_then(|parent| self.seen.get(&parent).copied())
            .unwrap_or(true);
        self.seen.insert(id, seen);
        Some(id)
    }

    /// Removes a consumer record. Returns `true` if that drained the slot.
    pub(crate) fn leave(&mut self, id: ConsumerId) -> bool {
        self.seen.remove(&id);
        self.clear_if_drained()
    }

    pub(crate) fn try_take(&mut self, id: ConsumerId) -> Take<T> {
        let item = match &self.slot {
            Slot::Empty => return Take::Miss,
            Slot::Tombstone => return Take::End,
            Slot::Cached(item) => item,
        };
        if self.seen.get(&id).copied().unwrap_or(true) {
            return Take::Miss;
        }

        let item = item.clone();
        let cleared = self.mark_seen(id);
        Take::Item { item, cleared }
    }

    /// Stores the result of a physical poll: `Some` caches an item every
    /// current consumer still has to take, `None` leaves a tombstone.
    ///
    /// # Panics
    ///
    /// If the slot still holds an item or a tombstone.
    pub(crate) fn install(&mut self, next: Option<T>) {
        if !matches!(self.slot, Slot::Empty) {
            panic!("{}", ProtocolViolation::OccupiedSlot);
        }

        match next {
            Some(item) => {
                self.seen.values_mut().for_each(|seen| *seen = false);
                self.slot = Slot::Cached(item);
            }
            None => {
                self.seen.clear();
                self.slot = Slot::Tombstone;
            }
        }
    }

    /// Idempotent. Returns `true` if this emptied the slot.
    pub(crate) fn mark_seen(&mut self, id: ConsumerId) -> bool {
        if let Some(seen) = self.seen.get_mut(&id) {
            *seen = true;
        }
        self.clear_if_drained()
    }

    /// An item or tombstone is present: no physical poll may start.
    pub(crate) fn is_occupied(&self) -> bool {
        !matches!(self.slot, Slot::Empty)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.slot, Slot::Tombstone)
    }

    /// Whether a cached item is waiting for `id`.
    pub(crate) fn has_unseen(&self, id: ConsumerId) -> bool {
        matches!(self.slot, Slot::Cached(_)) && self.seen.get(&id) == Some(&false)
    }

    pub(crate) fn consumers(&self) -> usize {
        self.seen.len()
    }

    fn clear_if_drained(&mut self) -> bool {
        if matches!(self.slot, Slot::Cached(_)) && self.seen.values().all(|seen| *seen) {
            self.slot = Slot::Empty;
            return true;
        }
        false
    }
}
