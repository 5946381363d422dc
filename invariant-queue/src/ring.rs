//! Cursor arithmetic shared by the ring-buffer queues.
//!
//! A ring of `N` slots addresses them with `index & (N - 1)`, so `N` must be
//! a power of two. One slot always stays empty: that is what lets
//! `head == tail` mean empty without a separate length counter.
//!
//! Capacity is checked when a queue type is first instantiated, so a bad `N`
//! fails the build:
//!
//! ```compile_fail
//! use invariant_queue::SpscRingQueue;
//! let q = SpscRingQueue::<u64, 3>::new(); // ERROR: 3 is not a power of 2
//! ```
//!
//! ```compile_fail
//! use invariant_queue::BoundedRingQueue;
//! let q = BoundedRingQueue::<u64, 3>::new(); // ERROR: 3 is not a power of 2
//! ```
//!
//! ```compile_fail
//! use invariant_queue::BoundedRingQueue;
//! let q = BoundedRingQueue::<u64, 1>::new(); // ERROR: no usable slot
//! ```

/// Returns the index mask for a ring of `capacity` slots.
///
/// # Panics
///
/// Panics if `capacity` is not a power of two greater than 1. Called from an
/// associated `const`, the panic becomes a compile error.
#[must_use]
pub const fn mask(capacity: usize) -> usize {
    assert!(capacity > 1, "ring capacity must be greater than 1");
    assert!(capacity.is_power_of_two(), "ring capacity must be a power of 2");
    capacity - 1
}

/// Advances a cursor by one slot, wrapping with `mask`.
#[inline]
#[must_use]
pub const fn next(index: usize, mask: usize) -> usize {
    (index + 1) & mask
}

/// Occupancy of a ring with the given cursors.
///
/// `head` is where the last push landed, `tail` is where the last pop read.
#[inline]
#[must_use]
pub const fn len(head: usize, tail: usize, mask: usize) -> usize {
    head.wrapping_sub(tail) & mask
}

/// Where a ring is in its empty/normal/full cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// `head == tail`: nothing to pop.
    Empty,
    /// At least one task and at least one free slot.
    Normal,
    /// `next(head) == tail`: nothing more can be pushed.
    Full,
}

impl State {
    /// Classifies a pair of cursors.
    #[inline]
    #[must_use]
    pub const fn of(head: usize, tail: usize, mask: usize) -> Self {
        if head == tail {
            Self::Empty
        } else if next(head, mask) == tail {
            Self::Full
        } else {
            Self::Normal
        }
    }
}
