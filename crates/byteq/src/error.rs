//! The queue's closed error enumeration.

use thiserror::Error;

/// Every way a [`crate::Queue`] operation can fail.
///
/// `Ok` is never represented here — operations return `Result<T, QueueError>`
/// directly rather than an explicit `Ok` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("not enough space: requested {requested} bytes, {free} free")]
    NotEnoughSpace { requested: usize, free: usize },

    #[error("a reservation is already pending")]
    AlreadyReserved,

    #[error("the same descriptor buffer was supplied for both arguments")]
    SameRangeList,

    #[error("stored {given} bytes but {reserved} were reserved")]
    DifferentByteCountThanReserved { reserved: usize, given: usize },

    #[error("the supplied descriptor buffer is the currently published one")]
    RangeListInUse,

    #[error("compare-and-swap lost a race; retry with a fresh view")]
    CasUnsuccessful,

    #[error("internal invariant violated: {reason}")]
    FileABug { reason: &'static str },
}
