//! Upstream driver: single-flight polling of the wrapped stream and fan-out of
//! whatever it yields.
//!
//! All bookkeeping (slot, consumer flags, flight state) lives behind one state
//! lock. The wrapped stream sits behind a second lock that only the handle
//! which won the flight ever touches, and it is polled with the state lock
//! released, so a stream that wakes synchronously from inside its own
//! `poll_next` cannot deadlock the fork.

use futures_util::stream::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::task::{Context, Poll, Waker};
use tracing::{debug, trace};

use crate::buffer::{Buffer, Take};
use crate::config::{ForkConfig, LateJoin};
use crate::error::ProtocolViolation;
use crate::registry::{wake_all, ConsumerId, Registry};

pub(crate) type SizeHint = (usize, Option<usize>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flight {
    /// No physical poll is outstanding.
    Idle,
    /// A handle is inside the wrapped stream's `poll_next` right now.
    Polling,
    /// The last physical poll returned `Pending`; the registry is the waker
    /// the stream holds.
    Parked,
}

struct State<T> {
    buffer: Buffer<T>,
    flight: Flight,
    size_hint: SizeHint,
}

pub(crate) struct Upstream<S>
where
    S: Stream,
{
    state: Mutex<State<S::Item>>,
    registry: Arc<Registry>,
    upstream_waker: Waker,
    source: Mutex<Pin<Box<S>>>,
    config: ForkConfig,
    #[cfg(feature = "stats")]
    stats: crate::stats::Stats,
}

impl<S> Upstream<S>
where
    S: Stream,
    S::Item: Clone,
{
    pub(crate) fn new(stream: S, config: ForkConfig) -> Self {
        let size_hint = stream.size_hint();
        let registry = Arc::new(Registry::default());
        let upstream_waker = futures_util::task::waker(Arc::clone(&registry));

        debug!(label = config.label.as_deref(), ?size_hint, "forked upstream stream");

        Self {
            state: Mutex::new(State {
                buffer: Buffer::new(),
                flight: Flight::Idle,
                size_hint,
            }),
            registry,
            upstream_waker,
            source: Mutex::new(Box::pin(stream)),
            config,
            #[cfg(feature = "stats")]
            stats: crate::stats::Stats::new(),
        }
    }

    /// Registers a new handle. `parent` is the handle being cloned, if any.
    ///
    /// Returns `None` if the upstream already ended.
    pub(crate) fn join(&self, parent: Option<ConsumerId>) -> Option<ConsumerId> {
        let inherit_from = match self.config.late_join {
            LateJoin::Exclude => None,
            LateJoin::Inherit => parent,
        };

        let mut state = self.lock_state();
        let id = state.buffer.join(inherit_from)?;
        drop(state);

        #[cfg(feature = "stats")]
        self.stats.handle_joined();
        trace!(label = self.label(), consumer = %id, "fork handle joined");
        Some(id)
    }

    /// Removes a handle, waking its siblings if it was the last one holding
    /// the slot.
    pub(crate) fn leave(&self, id: ConsumerId) {
        let mut state = self.lock_state();
        self.registry.unregister(id);
        let waiters = if state.buffer.leave(id) {
            self.registry.drain()
        } else {
            Vec::new()
        };
        let remaining = state.buffer.consumers();
        drop(state);

        #[cfg(feature = "stats")]
        self.stats.handle_left();
        trace!(label = self.label(), consumer = %id, remaining, "fork handle left");
        wake_all(waiters);
    }

    pub(crate) fn poll_next(
        &self,
        id: ConsumerId,
        cx: &mut Context<'_>,
    ) -> Poll<Option<S::Item>> {
        let mut state = self.lock_state();

        match state.buffer.try_take(id) {
            Take::Item { item, cleared } => {
                let waiters = if cleared {
                    self.registry.drain()
                } else {
                    Vec::new()
                };
                drop(state);
                wake_all(waiters);
                return Poll::Ready(Some(item));
            }
            Take::End => return Poll::Ready(None),
            Take::Miss => {}
        }

        // The caller already took the cached item: wait for the siblings.
        if state.buffer.is_occupied() {
            self.registry.register(id, cx.waker());
            return Poll::Pending;
        }

        // Registered before any physical poll so that an upstream wake is
        // never lost, whoever ends up driving.
        self.registry.register(id, cx.waker());
        match state.flight {
            Flight::Polling => return Poll::Pending,
            Flight::Parked if !self.registry.upstream_notified() => return Poll::Pending,
            Flight::Parked | Flight::Idle => {}
        }

        state.flight = Flight::Polling;
        self.registry.arm();
        drop(state);

        let mut in_flight = InFlight {
            upstream: self,
            done: false,
        };
        let (polled, size_hint) = self.poll_upstream();
        in_flight.done = true;

        let mut state = self.lock_state();
        state.size_hint = size_hint;
        let next = match polled {
            Poll::Pending => {
                state.flight = Flight::Parked;
                trace!(label = self.label(), consumer = %id, "upstream pending");
                // Woken while still polling: whoever parked since then missed it.
                let waiters = if self.registry.upstream_notified() {
                    self.registry.drain()
                } else {
                    Vec::new()
                };
                drop(state);
                wake_all(waiters);
                return Poll::Pending;
            }
            Poll::Ready(next) => next,
        };

        state.flight = Flight::Idle;
        self.registry.unregister(id);
        if next.is_none() {
            debug!(label = self.label(), "upstream stream terminated");
        } else {
            trace!(
                label = self.label(),
                consumers = state.buffer.consumers(),
                "installed upstream item"
            );
        }
        state.buffer.install(next);
        let served = state.buffer.try_take(id);
        let waiters = self.registry.drain();
        drop(state);
        wake_all(waiters);

        match served {
            Take::Item { item, .. } => Poll::Ready(Some(item)),
            Take::End => Poll::Ready(None),
            Take::Miss => panic!("{}", ProtocolViolation::DriverNotServed),
        }
    }

    /// Upstream hint plus the cached item, if `id` still has to take it.
    pub(crate) fn size_hint(&self, id: ConsumerId) -> SizeHint {
        let state = self.lock_state();
        if state.buffer.is_terminated() {
            return (0, Some(0));
        }

        let pending = usize::from(state.buffer.has_unseen(id));
        let (lower, upper) = state.size_hint;
        (
            lower.saturating_add(pending),
            upper.and_then(|upper| upper.checked_add(pending)),
        )
    }

    #[cfg(feature = "stats")]
    pub(crate) fn stats(&self) -> crate::stats::Stats {
        self.stats.clone()
    }

    fn poll_upstream(&self) -> (Poll<Option<S::Item>>, SizeHint) {
        let mut source = match self.source.try_lock() {
            Ok(source) => source,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => panic!("{}", ProtocolViolation::OverlappingPoll),
        };

        #[cfg(feature = "stats")]
        self.stats.upstream_polled();

        let mut cx = Context::from_waker(&self.upstream_waker);
        let polled = source.as_mut().poll_next(&mut cx);
        (polled, source.size_hint())
    }

    fn lock_state(&self) -> MutexGuard<'_, State<S::Item>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn label(&self) -> Option<&str> {
        self.config.label.as_deref()
    }
}

/// Lands an interrupted flight if the wrapped stream panics mid-poll, so the
/// siblings of the panicking handle can take over.
struct InFlight<'a, S>
where
    S: Stream,
    S::Item: Clone,
{
    upstream: &'a Upstream<S>,
    done: bool,
}

impl<S> Drop for InFlight<'_, S>
where
    S: Stream,
    S::Item: Clone,
{
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut state = self.upstream.lock_state();
        state.flight = Flight::Idle;
        let waiters = self.upstream.registry.drain();
        drop(state);
        wake_all(waiters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{gate, Probe, WakeCounter};
    use futures_util::stream;
    use std::sync::atomic::Ordering;

    fn ready<T>(polled: Poll<Option<T>>) -> Option<T> {
        match polled {
            Poll::Ready(next) => next,
            Poll::Pending => panic!("expected a ready poll"),
        }
    }

    #[test]
    fn test_driver_is_served_without_second_round_trip() {
        let upstream = Upstream::new(stream::iter(vec![1, 2]), ForkConfig::default());
        let a = upstream.join(None).unwrap();
        let b = upstream.join(None).unwrap();
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert_eq!(ready(upstream.poll_next(a, &mut cx)), Some(1));
        assert_eq!(upstream.size_hint(a), (1, Some(1)));
        assert_eq!(upstream.size_hint(b), (2, Some(2)));
        assert_eq!(ready(upstream.poll_next(b, &mut cx)), Some(1));
    }

    #[test]
    fn test_ahead_handle_waits_for_sibling_then_is_woken() {
        let upstream = Upstream::new(stream::iter(vec![1, 2]), ForkConfig::default());
        let a = upstream.join(None).unwrap();
        let b = upstream.join(None).unwrap();
        let a_waker = WakeCounter::new();
        let b_waker = WakeCounter::new();
        let a_waker_ref = a_waker.waker();
        let b_waker_ref = b_waker.waker();
        let mut a_cx = Context::from_waker(&a_waker_ref);
        let mut b_cx = Context::from_waker(&b_waker_ref);

        assert_eq!(ready(upstream.poll_next(a, &mut a_cx)), Some(1));
        assert!(upstream.poll_next(a, &mut a_cx).is_pending());
        assert_eq!(a_waker.count(), 0);

        assert_eq!(ready(upstream.poll_next(b, &mut b_cx)), Some(1));
        assert_eq!(a_waker.count(), 1);
        assert_eq!(ready(upstream.poll_next(a, &mut a_cx)), Some(2));
    }

    #[test]
    fn test_parked_upstream_is_polled_once_until_notified() {
        let (tx, rx) = gate();
        let probe = Probe::new(rx);
        let polls = probe.polls();
        let upstream = Upstream::new(probe, ForkConfig::default());
        let a = upstream.join(None).unwrap();
        let b = upstream.join(None).unwrap();
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(upstream.poll_next(a, &mut cx).is_pending());
        assert!(upstream.poll_next(b, &mut cx).is_pending());
        assert!(upstream.poll_next(a, &mut cx).is_pending());
        assert_eq!(polls.load(Ordering::SeqCst), 1);

        tx.send(8).unwrap();
        assert_eq!(ready(upstream.poll_next(b, &mut cx)), Some(8));
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(ready(upstream.poll_next(a, &mut cx)), Some(8));
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_poll_after_end() {
        let probe = Probe::new(stream::iter(Vec::<i32>::new()));
        let polls = probe.polls();
        let upstream = Upstream::new(probe, ForkConfig::default());
        let a = upstream.join(None).unwrap();
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        for _ in 0..3 {
            assert_eq!(ready(upstream.poll_next(a, &mut cx)), None);
        }
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert_eq!(upstream.join(None), None);
        assert_eq!(upstream.size_hint(a), (0, Some(0)));
    }

    #[test]
    fn test_panicking_upstream_releases_the_flight() {
        struct PanicOnce(bool);

        impl Stream for PanicOnce {
            type Item = i32;

            fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<i32>> {
                if !std::mem::replace(&mut self.0, true) {
                    panic!("upstream failure");
                }
                Poll::Ready(Some(1))
            }
        }

        let upstream = Upstream::new(PanicOnce(false), ForkConfig::default());
        let a = upstream.join(None).unwrap();
        let b = upstream.join(None).unwrap();
        let waker = futures_util::task::noop_waker();

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            upstream.poll_next(a, &mut Context::from_waker(&waker))
        }));
        assert!(caught.is_err());

        let mut cx = Context::from_waker(&waker);
        assert_eq!(ready(upstream.poll_next(b, &mut cx)), Some(1));
        assert_eq!(ready(upstream.poll_next(a, &mut cx)), Some(1));
    }

    #[test]
    fn test_inherit_policy_copies_parent_position() {
        let config = ForkConfig::new().late_join(LateJoin::Inherit);
        let upstream = Upstream::new(stream::iter(vec![1, 2]), config);
        let a = upstream.join(None).unwrap();
        let b = upstream.join(None).unwrap();
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert_eq!(ready(upstream.poll_next(a, &mut cx)), Some(1));
        let from_b = upstream.join(Some(b)).unwrap();
        let from_a = upstream.join(Some(a)).unwrap();

        assert_eq!(ready(upstream.poll_next(from_b, &mut cx)), Some(1));
        assert_eq!(ready(upstream.poll_next(b, &mut cx)), Some(1));
        assert_eq!(ready(upstream.poll_next(from_a, &mut cx)), Some(2));
    }
}
