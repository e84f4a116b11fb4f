//! Helpers shared by the unit tests.

use futures_util::stream::Stream;
use futures_util::task::ArcWake;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Default)]
struct Counter(AtomicUsize);

impl ArcWake for Counter {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A waker that counts how often it was woken.
pub(crate) struct WakeCounter {
    counter: Arc<Counter>,
    waker: Waker,
}

impl WakeCounter {
    pub(crate) fn new() -> Self {
        let counter = Arc::new(Counter::default());
        let waker = futures_util::task::waker(Arc::clone(&counter));
        Self { counter, waker }
    }

    pub(crate) fn waker(&self) -> Waker {
        self.waker.clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.counter.0.load(Ordering::SeqCst)
    }
}

/// Wraps a stream, counting physical polls and failing on overlapping ones.
pub(crate) struct Probe<S> {
    inner: S,
    polls: Arc<AtomicUsize>,
    in_poll: Arc<AtomicBool>,
}

impl<S> Probe<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            polls: Arc::new(AtomicUsize::new(0)),
            in_poll: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn polls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.polls)
    }
}

impl<S> Stream for Probe<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        assert!(
            !self.in_poll.swap(true, Ordering::SeqCst),
            "overlapping upstream poll"
        );
        self.polls.fetch_add(1, Ordering::SeqCst);
        std::thread::yield_now();
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        self.in_poll.store(false, Ordering::SeqCst);
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A source that stays pending until the test pushes items into it.
pub(crate) fn gate<T>() -> (mpsc::UnboundedSender<T>, UnboundedReceiverStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}
