use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Runtime metrics for one fork point.
///
/// A lightweight, read-only view shared by every handle forked from the same
/// upstream stream. Obtain it via `ForkedStream::stats()`. Values use relaxed
/// atomics and are intended for diagnostics.
#[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
#[derive(Debug, Clone, Default)]
pub struct Stats {
    active_handles: Arc<AtomicU64>,
    upstream_polls: Arc<AtomicU64>,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn handle_joined(&self) {
        self.active_handles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn handle_left(&self) {
        self.active_handles.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn upstream_polled(&self) {
        self.upstream_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of live handles that have not yet observed the end
    /// of the stream.
    pub fn active_handles(&self) -> u64 {
        self.active_handles.load(Ordering::Relaxed)
    }

    /// Returns how many times the upstream stream was physically polled.
    ///
    /// However many handles exist, each upstream item costs at least one poll,
    /// plus one per `Pending` answer.
    pub fn upstream_polls(&self) -> u64 {
        self.upstream_polls.load(Ordering::Relaxed)
    }
}
