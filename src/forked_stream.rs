use futures_util::stream::{FusedStream, Stream};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::config::ForkConfig;
use crate::driver::Upstream;
use crate::registry::ConsumerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Ready to take the next item.
    Awaiting,
    /// Parked until the upstream or a sibling wakes it.
    Suspended,
    /// Observed the end of the stream. Absorbing.
    Terminated,
}

/// One independent consumer of a forked stream.
///
/// Every `ForkedStream` created from the same fork point shares a single
/// upstream stream. Each handle observes every item the upstream yields after
/// the handle was created, exactly once and in order; cloning creates another
/// such consumer.
///
/// # Examples
///
/// ```
/// use stream_fork::ForkedStream;
/// use futures_util::stream;
/// use futures_util::StreamExt;
///
/// # tokio_test::block_on(async {
/// let data = vec!["hello", "world", "from", "rust"];
/// let forked = ForkedStream::new(stream::iter(data.clone()));
///
/// let consumer1 = forked.clone();
/// let consumer2 = forked;
///
/// let (result1, result2) = tokio::join!(
///     consumer1.collect::<Vec<&str>>(),
///     consumer2.collect::<Vec<&str>>()
/// );
///
/// assert_eq!(result1, data);
/// assert_eq!(result2, data);
/// # });
/// ```
///
/// A clone only sees what is fetched after it exists:
///
/// ```
/// use stream_fork::ForkedStream;
/// use futures_util::stream;
/// use futures_util::StreamExt;
///
/// # tokio_test::block_on(async {
/// let mut forked = ForkedStream::new(stream::iter(vec![1, 2, 3, 4, 5]));
///
/// assert_eq!(forked.next().await, Some(1));
///
/// let cloned = forked.clone();
/// drop(forked);
/// let remaining: Vec<i32> = cloned.collect().await;
///
/// assert_eq!(remaining, vec![2, 3, 4, 5]);
/// # });
/// ```
///
/// # Requirements
///
/// The items must implement [`Clone`]. The upstream does not need to be
/// [`Unpin`]: it is pinned on the heap when forked and never moved again.
///
/// ```
/// use stream_fork::ForkedStream;
/// use futures_util::stream::{Stream, StreamExt};
/// use std::pin::Pin;
/// use std::task::{Context, Poll};
///
/// struct NotUnpinStream {
///     data: Vec<i32>,
///     index: usize,
///     _pin: std::marker::PhantomPinned,
/// }
///
/// impl Stream for NotUnpinStream {
///     type Item = i32;
///
///     fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
///         // SAFETY: no field is structurally pinned
///         let this = unsafe { self.get_unchecked_mut() };
///         let item = this.data.get(this.index).copied();
///         this.index += 1;
///         Poll::Ready(item)
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let source = NotUnpinStream {
///     data: vec![1, 2, 3],
///     index: 0,
///     _pin: std::marker::PhantomPinned,
/// };
/// let result: Vec<i32> = ForkedStream::new(source).collect().await;
/// assert_eq!(result, vec![1, 2, 3]);
/// # });
/// ```
///
/// # Progress
///
/// Only one upstream item is buffered. A handle that is kept alive but never
/// polled therefore holds back all of its siblings once they are one item
/// ahead of it. Drop handles you no longer poll.
pub struct ForkedStream<S>
where
    S: Stream,
    S::Item: Clone,
{
    upstream: Arc<Upstream<S>>,
    // `None` once terminated: the handle no longer holds a consumer record.
    id: Option<ConsumerId>,
    phase: Phase,
}

impl<S> ForkedStream<S>
where
    S: Stream,
    S::Item: Clone,
{
    /// Forks `stream` with the default [`ForkConfig`] and returns the first
    /// handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use stream_fork::ForkedStream;
    /// use futures_util::stream;
    ///
    /// let forked = ForkedStream::new(stream::iter(vec![1, 2, 3, 4, 5]));
    /// ```
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, ForkConfig::default())
    }

    /// Forks `stream` with an explicit configuration.
    ///
    /// ```
    /// use stream_fork::{ForkConfig, ForkedStream, LateJoin};
    /// use futures_util::stream;
    ///
    /// let config = ForkConfig::new().late_join(LateJoin::Inherit);
    /// let forked = ForkedStream::with_config(stream::iter(0..10), config);
    /// ```
    pub fn with_config(stream: S, config: ForkConfig) -> Self {
        let upstream = Arc::new(Upstream::new(stream, config));
        let id = upstream.join(None);
        Self::from_parts(upstream, id)
    }

    /// Returns runtime metrics shared by all handles of this fork point.
    ///
    /// ```
    /// use stream_fork::ForkedStream;
    /// use futures_util::stream;
    ///
    /// let forked = ForkedStream::new(stream::iter(vec![1, 2, 3]));
    /// let stats = forked.stats();
    /// assert_eq!(stats.active_handles(), 1);
    ///
    /// let clone = forked.clone();
    /// assert_eq!(stats.active_handles(), 2);
    ///
    /// drop(clone);
    /// assert_eq!(stats.active_handles(), 1);
    /// assert_eq!(stats.upstream_polls(), 0);
    /// ```
    #[cfg(feature = "stats")]
    #[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
    pub fn stats(&self) -> crate::stats::Stats {
        self.upstream.stats()
    }

    fn from_parts(upstream: Arc<Upstream<S>>, id: Option<ConsumerId>) -> Self {
        let phase = match id {
            Some(_) => Phase::Awaiting,
            None => Phase::Terminated,
        };
        Self {
            upstream,
            id,
            phase,
        }
    }
}

impl<S> Clone for ForkedStream<S>
where
    S: Stream,
    S::Item: Clone,
{
    fn clone(&self) -> Self {
        let id = self.id.and_then(|parent| self.upstream.join(Some(parent)));
        Self::from_parts(Arc::clone(&self.upstream), id)
    }
}

impl<S> Stream for ForkedStream<S>
where
    S: Stream,
    S::Item: Clone,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(id) = this.id else {
            return Poll::Ready(None);
        };

        match this.upstream.poll_next(id, cx) {
            Poll::Pending => {
                this.phase = Phase::Suspended;
                Poll::Pending
            }
            Poll::Ready(Some(item)) => {
                this.phase = Phase::Awaiting;
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.phase = Phase::Terminated;
                this.id = None;
                this.upstream.leave(id);
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.id {
            Some(id) => self.upstream.size_hint(id),
            None => (0, Some(0)),
        }
    }
}

impl<S> FusedStream for ForkedStream<S>
where
    S: Stream,
    S::Item: Clone,
{
    fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }
}

impl<S> Drop for ForkedStream<S>
where
    S: Stream,
    S::Item: Clone,
{
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.upstream.leave(id);
        }
    }
}

impl<S> fmt::Debug for ForkedStream<S>
where
    S: Stream,
    S::Item: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkedStream")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
