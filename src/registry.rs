//! Suspension registry: who is parked, and how to wake them.
//!
//! The registry also doubles as the waker handed to the upstream stream. When
//! the upstream signals readiness it flags itself as notified and wakes every
//! parked handle, so any of them can drive the next poll.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Waker;

use futures_util::task::ArcWake;

/// Identifier of one handle within a fork point.
///
/// Allocated in increasing order, so iterating a map keyed by it follows the
/// order in which handles joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ConsumerId(u64);

impl ConsumerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    wakers: Mutex<BTreeMap<ConsumerId, Waker>>,
    notified: AtomicBool,
}

impl Registry {
    /// Records the waker for `id`, replacing any previous one.
    pub(crate) fn register(&self, id: ConsumerId, waker: &Waker) {
        let mut wakers = self.lock();
        match wakers.get_mut(&id) {
            Some(current) if current.will_wake(waker) => {}
            Some(current) => *current = waker.clone(),
            None => {
                wakers.insert(id, waker.clone());
            }
        }
    }

    pub(crate) fn unregister(&self, id: ConsumerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Removes every registered waker, in join order, without waking them.
    ///
    /// Callers holding the fork state lock drain here and wake after the lock
    /// is released.
    pub(crate) fn drain(&self) -> Vec<Waker> {
        std::mem::take(&mut *self.lock()).into_values().collect()
    }

    /// Wakes every registered handle exactly once.
    pub(crate) fn wake_all_pending(&self) {
        wake_all(self.drain());
    }

    /// Clears the upstream notification ahead of a physical poll.
    pub(crate) fn arm(&self) {
        self.notified.store(false, Ordering::SeqCst);
    }

    /// Whether the upstream woke us since the last [`arm`](Self::arm).
    pub(crate) fn upstream_notified(&self) -> bool {
        self.notified.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ConsumerId, Waker>> {
        self.wakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArcWake for Registry {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        // Flag first: a handle registering concurrently either lands in the
        // drain below or observes the flag afterwards.
        arc_self.notified.store(true, Ordering::SeqCst);
        arc_self.wake_all_pending();
    }
}

pub(crate) fn wake_all(wakers: Vec<Waker>) {
    wakers.into_iter().for_each(Waker::wake);
}
