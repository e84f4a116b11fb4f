//! Fork a single-consumer stream into many independent consumers.
//!
//! [`ForkedStream`] wraps any [`Stream`] whose items are [`Clone`] and makes it
//! cloneable. Every handle forked from the same upstream observes each item
//! produced after the handle was created, exactly once and in the upstream's
//! order. The upstream is polled by one handle at a time, and a single item is
//! buffered until every live handle has taken it.
//!
//! # Examples
//!
//! ```
//! use stream_fork::ForkStreamExt;
//! use futures_util::stream;
//! use futures_util::StreamExt;
//!
//! # tokio_test::block_on(async {
//! let data = vec![1, 2, 3, 4, 5];
//! let forked = stream::iter(data.clone()).fork();
//!
//! let consumer1 = forked.clone();
//! let consumer2 = forked;
//!
//! let (result1, result2) = tokio::join!(
//!     consumer1.collect::<Vec<i32>>(),
//!     consumer2.collect::<Vec<i32>>()
//! );
//!
//! assert_eq!(result1, data);
//! assert_eq!(result2, data);
//! # });
//! ```
//!
//! # Behavior
//!
//! - A clone starts at the next item the upstream produces. An item that is
//!   already buffered for slower siblings is not replayed to it, unless the
//!   fork was configured with [`LateJoin::Inherit`].
//! - Once the upstream ends, every handle yields `None` forever and the
//!   upstream is never polled again.
//! - Items that encode failure (e.g. `Result<T, E>`) are delivered like any
//!   other item.
//! - Dropping a handle at any point, including while it is suspended, never
//!   blocks its siblings.
//!
//! # Thread Safety
//!
//! `ForkedStream` is [`Send`] and [`Sync`] when the upstream and its items are
//! `Send`, so handles can be consumed from tasks on different threads.
//!
//! ```
//! use stream_fork::ForkedStream;
//! use futures_util::stream;
//! use futures_util::StreamExt;
//! use tokio::task;
//!
//! # tokio_test::block_on(async {
//! let data = vec![1, 2, 3, 4, 5];
//! let stream1 = ForkedStream::new(stream::iter(data.clone()));
//! let stream2 = stream1.clone();
//!
//! let handle1 = task::spawn(async move { stream1.collect::<Vec<i32>>().await });
//! let handle2 = task::spawn(async move { stream2.collect::<Vec<i32>>().await });
//!
//! let (result1, result2) = tokio::join!(handle1, handle2);
//! assert_eq!(result1.unwrap(), data);
//! assert_eq!(result2.unwrap(), data);
//! # });
//! ```
//!
//! # Performance Considerations
//!
//! - **Memory**: one item is buffered at a time and cloned once per handle
//! - **Lock-step**: the fastest handle runs at most one item ahead of the
//!   slowest, so an idle handle stalls the others until it is dropped
//! - **Synchronization**: every poll takes a short internal lock
//!
//! Prefer cheap-to-clone items (consider `Arc<T>` for large data).
//!
//! [`Stream`]: futures_util::stream::Stream

mod buffer;
mod config;
mod driver;
mod error;
mod ext;
mod forked_stream;
mod registry;
#[cfg(feature = "stats")]
mod stats;
#[cfg(test)]
mod test_util;

pub use config::{ForkConfig, LateJoin};
pub use error::ProtocolViolation;
pub use ext::ForkStreamExt;
pub use forked_stream::ForkedStream;
#[cfg(feature = "stats")]
pub use stats::Stats;
