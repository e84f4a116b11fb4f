//! Invariant breaches of the fork machinery.
//!
//! None of these are recoverable: they indicate a bug in the arbitration
//! between handles, not bad input, so they are raised with `panic!` and never
//! returned to callers.

/// A broken internal invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// Two physical polls of the upstream stream overlapped.
    #[error("upstream stream polled while a previous poll was still outstanding")]
    OverlappingPoll,

    /// A new item was installed over one that some handle has not seen yet.
    #[error("upstream item installed into an occupied, undrained slot")]
    OccupiedSlot,

    /// The handle that drove the upstream could not take its own copy.
    #[error("the handle that drove the upstream poll was not served its item")]
    DriverNotServed,
}
