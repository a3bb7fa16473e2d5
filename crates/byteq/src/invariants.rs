//! Debug assertion macros for range-descriptor invariants.
//!
//! Active only in debug builds (`#[cfg(debug_assertions)]`), so there is
//! zero overhead in release builds.

/// Assert that consecutive committed ranges in a descriptor abut with no
/// gap and no overlap: each range starts exactly where the previous one
/// ended.
///
/// Used in: `Queue::store`, `Queue::fetch` after building the new descriptor.
macro_rules! debug_assert_full_ranges_contiguous {
    ($descriptor:expr, $capacity:expr) => {
        debug_assert!(
            {
                let d = &$descriptor;
                let mut ok = true;
                for i in 1..d.full_count {
                    if d.full[i].position != d.full[i - 1].end($capacity) {
                        ok = false;
                        break;
                    }
                }
                ok
            },
            "committed ranges are not contiguous"
        )
    };
}

/// Assert that a live reservation starts exactly where the last committed
/// range ends (or at `0` when nothing is committed).
///
/// Used in: `Queue::reserve` after building the new descriptor.
macro_rules! debug_assert_reservation_abuts_tail {
    ($descriptor:expr, $capacity:expr) => {
        debug_assert!(
            !$descriptor.has_reservation
                || $descriptor.reservation.position
                    == $descriptor.next_reservation_position($capacity),
            "reservation does not start where the committed tail ends"
        )
    };
}

/// Assert that the reservation plus every committed range never claims more
/// bytes than the ring holds.
///
/// Used in: `Queue::reserve`, `Queue::store` after building the new descriptor.
macro_rules! debug_assert_bounded_total_claimed {
    ($descriptor:expr, $capacity:expr) => {
        debug_assert!(
            $descriptor.free_bytes($capacity) <= $capacity,
            "descriptor claims more bytes than the ring holds"
        )
    };
}

/// Assert that a descriptor pointer obtained from the published slot is not
/// null.
///
/// Used in: every `Queue` operation, right after the initial acquire load.
macro_rules! debug_assert_valid_descriptor_ptr {
    ($ptr:expr) => {
        debug_assert!(!$ptr.is_null(), "null published descriptor pointer")
    };
}

pub(crate) use debug_assert_bounded_total_claimed;
pub(crate) use debug_assert_full_ranges_contiguous;
pub(crate) use debug_assert_reservation_abuts_tail;
pub(crate) use debug_assert_valid_descriptor_ptr;
