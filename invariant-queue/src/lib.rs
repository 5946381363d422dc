//! # invariant-queue
//!
//! Task queues for handing work from producer threads to consumer threads.
//!
//! ## Variants
//!
//! | Type | Capacity | Synchronization | Threads |
//! |------|----------|-----------------|---------|
//! | [`SpscRingQueue`] | `N - 1` | acquire/release atomics, no locks | one producer, one consumer |
//! | [`BoundedRingQueue`] | `N - 1` | one mutex | any |
//! | [`UnboundedQueue`] | unlimited | one mutex | any |
//!
//! All three share the same contract: *try* to push a task, *try* to pop a
//! task. Nothing ever blocks waiting for data or space; a full ring hands the
//! task back in [`Full`], an empty queue returns `None`. Callers that want
//! to wait layer their own spin/backoff/park loop on top.
//!
//! ## Ring layout
//!
//! Both ring variants use a power-of-two capacity `N` and keep one slot
//! permanently empty, so `head == tail` means empty and
//! `next(head) == tail` means full. Usable capacity is `N - 1`.
//!
//! ## Task types
//!
//! Tasks must be `Send`. This also keeps raw pointers out of the queues:
//!
//! ```compile_fail
//! use invariant_queue::BoundedRingQueue;
//! let q = BoundedRingQueue::<*mut u8, 4>::new(); // ERROR: *mut u8 is not Send
//! ```
//!
//! ```compile_fail
//! use invariant_queue::UnboundedQueue;
//! let q = UnboundedQueue::<*mut u8>::new(); // ERROR: *mut u8 is not Send
//! ```
//!
//! ## Example
//!
//! ```
//! use invariant_queue::SpscRingQueue;
//!
//! let (mut tx, mut rx) = SpscRingQueue::<u64, 1024>::new().split();
//!
//! tx.push(42).unwrap();
//! assert_eq!(rx.pop(), Some(42));
//! assert_eq!(rx.pop(), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::fmt;

use crossbeam_utils::CachePadded;

pub mod bounded;
pub mod ring;
pub mod spsc;
pub mod unbounded;

mod sync;
pub mod trace;

pub use bounded::BoundedRingQueue;
pub use spsc::SpscRingQueue;
pub use unbounded::UnboundedQueue;

/// Alignment used to keep producer-side and consumer-side state apart.
///
/// This is the alignment of [`CachePadded`] on the target: 128 bytes on
/// x86_64, aarch64 and powerpc64 (adjacent-line prefetch pulls lines in
/// pairs), the known line size on other listed targets, 64 otherwise.
pub const CACHE_LINE_SIZE: usize = std::mem::align_of::<CachePadded<u8>>();

/// Error returned when a bounded queue is full.
///
/// Contains the task that could not be pushed. The queue is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the task that could not be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T: fmt::Debug> std::error::Error for Full<T> {}

/// The producing side of any queue in this crate.
///
/// Implemented for shared references to the mutex-based queues and for
/// [`spsc::Producer`], so dispatch code can be written once over all three.
pub trait TaskSink<T> {
    /// Attempts to enqueue `task`, handing it back if there is no room.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] with the task when a bounded queue has no free slot.
    fn push(&mut self, task: T) -> Result<(), Full<T>>;
}

/// The consuming side of any queue in this crate.
pub trait TaskSource<T> {
    /// Attempts to dequeue the oldest task.
    fn pop(&mut self) -> Option<T>;

    /// Pops until the queue reports empty, passing each task to `f` by value.
    ///
    /// Tasks pushed concurrently while draining may or may not be observed.
    /// Returns the number of tasks handed to `f`.
    fn drain_to<F: FnMut(T)>(&mut self, mut f: F) -> usize {
        let mut count = 0;
        while let Some(task) = self.pop() {
            f(task);
            count += 1;
        }
        count
    }
}
