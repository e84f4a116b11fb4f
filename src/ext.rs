//! Extension trait for forking streams.
//!
//! This module provides the `ForkStreamExt` trait, which adds `fork` and
//! `fork_with` to every [`Stream`] with clonable items.

use crate::{ForkConfig, ForkedStream};
use futures_util::stream::Stream;

/// Extension trait for [`Stream`] that provides the `fork` methods.
pub trait ForkStreamExt: Stream {
    /// Converts this stream into the first handle of a [`ForkedStream`].
    ///
    /// The stream is consumed; clone the returned handle to add consumers.
    ///
    /// ```
    /// use stream_fork::{ForkStreamExt, ForkedStream};
    /// use futures_util::stream;
    ///
    /// let forked: ForkedStream<_> = stream::iter(vec!["hello", "world"]).fork();
    /// let other = forked.clone();
    /// ```
    fn fork(self) -> ForkedStream<Self>
    where
        Self: Sized,
        Self::Item: Clone,
    {
        ForkedStream::new(self)
    }

    /// Like [`fork`](Self::fork), with an explicit [`ForkConfig`].
    fn fork_with(self, config: ForkConfig) -> ForkedStream<Self>
    where
        Self: Sized,
        Self::Item: Clone,
    {
        ForkedStream::with_config(self, config)
    }
}

impl<S> ForkStreamExt for S where S: Stream {}
