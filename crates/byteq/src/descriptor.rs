//! The immutable range-list snapshot published by the queue, and the
//! caller-owned buffer that holds one.

use std::cell::UnsafeCell;

use crate::range::Range;

/// Upper bound on the number of committed messages a single snapshot can
/// track. Fixed at compile time so `RangeDescriptor` has no heap allocation
/// of its own and can be copied freely.
pub const MAX_MESSAGES: usize = 128;

/// An immutable snapshot of everything currently committed or reserved in
/// the ring: at most one in-flight reservation, plus the ordered list of
/// fully stored messages awaiting `fetch`.
///
/// A `RangeDescriptor` never mutates in place. Every operation that changes
/// the queue's state builds a new one and swaps it in with a single CAS.
#[derive(Debug, Clone, Copy)]
pub struct RangeDescriptor {
    pub has_reservation: bool,
    pub reservation: Range,
    pub full: [Range; MAX_MESSAGES],
    pub full_count: usize,
}

impl RangeDescriptor {
    pub const EMPTY: RangeDescriptor = RangeDescriptor {
        has_reservation: false,
        reservation: Range::EMPTY,
        full: [Range::EMPTY; MAX_MESSAGES],
        full_count: 0,
    };

    #[inline]
    pub fn full_ranges(&self) -> &[Range] {
        &self.full[..self.full_count]
    }

    /// Where the next reservation would start, ignoring any reservation
    /// already present (callers only ask this when none is).
    pub fn next_reservation_position(&self, capacity: usize) -> usize {
        match self.full_count {
            0 => 0,
            n => self.full[n - 1].end(capacity),
        }
    }

    /// Bytes not claimed by any committed message or the live reservation.
    pub fn free_bytes(&self, capacity: usize) -> usize {
        let committed: usize = self.full_ranges().iter().map(|r| r.length).sum();
        let reserved = if self.has_reservation { self.reservation.length } else { 0 };
        capacity - committed - reserved
    }

    /// Appends `range` to `full`, returning a new descriptor. Panics if the
    /// compile-time message-count bound is exceeded; exceeding it means the
    /// caller is holding more outstanding messages than the queue was built
    /// to track, which is a caller error rather than a queue state to
    /// report through [`crate::error::QueueError`].
    pub fn with_committed(&self, range: Range) -> RangeDescriptor {
        assert!(
            self.full_count < MAX_MESSAGES,
            "committed message count exceeds MAX_MESSAGES ({MAX_MESSAGES}); the caller is holding too many unfetched messages"
        );
        let mut next = *self;
        next.full[next.full_count] = range;
        next.full_count += 1;
        next.has_reservation = false;
        next.reservation = Range::EMPTY;
        next
    }

    /// Drops the oldest committed message, returning it alongside the new
    /// descriptor.
    pub fn without_head(&self) -> (Range, RangeDescriptor) {
        let head = self.full[0];
        let mut next = *self;
        next.full.copy_within(1..next.full_count, 0);
        next.full_count -= 1;
        next.full[next.full_count] = Range::EMPTY;
        (head, next)
    }

    pub fn with_reservation(&self, reservation: Range) -> RangeDescriptor {
        let mut next = *self;
        next.has_reservation = true;
        next.reservation = reservation;
        next
    }
}

/// A caller-owned buffer that can hold one [`RangeDescriptor`] snapshot.
///
/// Every queue operation that publishes a new snapshot takes one of these by
/// reference, writes into it, and CASes the queue's published pointer to
/// point at it. From that moment the buffer is "in use" by the queue — the
/// caller must not reuse it for another operation until a later operation
/// publishes past it or [`crate::Queue::internalize`] releases it back.
///
/// This discipline is what lets the queue avoid any memory-reclamation
/// scheme: the published pointer only ever points at memory owned by the
/// queue itself or by a caller who has agreed, by the shape of this API, to
/// keep it alive.
pub struct Descriptor {
    slot: Box<UnsafeCell<RangeDescriptor>>,
}

impl Descriptor {
    pub fn new() -> Self {
        Self { slot: Box::new(UnsafeCell::new(RangeDescriptor::EMPTY)) }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut RangeDescriptor {
        self.slot.get()
    }

    /// Copies the currently held snapshot out.
    ///
    /// Not `unsafe`: a single [`Queue`](crate::Queue) call only ever reads a
    /// buffer before it writes the *other* buffer in the pair, so there's no
    /// concurrent access to race. Two buffers aliasing the same slot is
    /// exactly the case `Queue` checks for itself via pointer identity.
    pub(crate) fn read(&self) -> RangeDescriptor {
        unsafe { *self.slot.get() }
    }

    pub(crate) fn write(&self, value: RangeDescriptor) {
        unsafe { *self.slot.get() = value };
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: a `Descriptor` only ever holds a `Copy` snapshot behind an
// `UnsafeCell`; ownership is handed to exactly one thread at a time by the
// caller's discipline around the queue's API.
unsafe impl Send for Descriptor {}
unsafe impl Sync for Descriptor {}
