//! Fixed-capacity ring buffer behind a single mutex.
//!
//! Any number of threads may push and pop concurrently. Each operation takes
//! the lock once, does O(1) work, and releases it; there is no internal retry
//! or spinning, so lock contention is the only wait.
//!
//! This is the baseline the lock-free [`SpscRingQueue`](crate::SpscRingQueue)
//! is measured against: same layout and the same sentinel slot, with the
//! mutex standing in for the atomic cursor protocol.
//!
//! # Example
//!
//! ```
//! use invariant_queue::BoundedRingQueue;
//!
//! // 4 slots, 3 usable
//! let q = BoundedRingQueue::<u32, 4>::new();
//!
//! q.push(1).unwrap();
//! q.push(2).unwrap();
//! q.push(3).unwrap();
//! assert_eq!(q.push(4).unwrap_err().into_inner(), 4); // Full!
//!
//! assert_eq!(q.pop(), Some(1));
//! q.push(4).unwrap(); // Room again
//! ```

use std::fmt;

use parking_lot::Mutex;

use crate::ring::{self, State};
use crate::trace::{debug, trace};
use crate::{Full, TaskSink, TaskSource};

/// A mutex-protected ring buffer of `N` slots holding up to `N - 1` tasks.
///
/// `N` must be a power of 2 greater than 1 (enforced at compile time) and
/// defaults to 256 slots.
pub struct BoundedRingQueue<T, const N: usize = 256> {
    ring: Mutex<Ring<T, N>>,
}

/// Cursors and slots, only ever touched with the lock held.
struct Ring<T, const N: usize> {
    /// Slot of the most recent push.
    head: usize,
    /// Slot of the most recent pop.
    tail: usize,
    slots: [Option<T>; N],
}

impl<T: Send, const N: usize> BoundedRingQueue<T, N> {
    const MASK: usize = ring::mask(N);

    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        // Force the compile-time capacity check
        let _ = Self::MASK;

        debug!(slots = N, capacity = N - 1, "bounded ring queue created");

        Self {
            ring: Mutex::new(Ring {
                head: 0,
                tail: 0,
                slots: std::array::from_fn(|_| None),
            }),
        }
    }

    /// Attempts to push a task.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] with the task if every usable slot is occupied. The
    /// queue is left unchanged.
    pub fn push(&self, task: T) -> Result<(), Full<T>> {
        let mut ring = self.ring.lock();

        let next = ring::next(ring.head, Self::MASK);
        if next == ring.tail {
            trace!("bounded push rejected, queue full");
            return Err(Full(task));
        }

        ring.slots[next] = Some(task);
        ring.head = next;
        Ok(())
    }

    /// Attempts to pop the oldest task. Returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let mut ring = self.ring.lock();

        if ring.head == ring.tail {
            return None;
        }

        let next_tail = ring::next(ring.tail, Self::MASK);
        let task = ring.slots[next_tail].take();
        ring.tail = next_tail;
        debug_assert!(task.is_some(), "occupied slot was empty");
        task
    }

    /// Maximum number of tasks the queue can hold: `N - 1`.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        let ring = self.ring.lock();
        ring::len(ring.head, ring.tail, Self::MASK)
    }

    /// Returns `true` if there is nothing to pop.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state() == State::Empty
    }

    /// Returns `true` if a push would be rejected.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.state() == State::Full
    }

    /// Returns the current empty/normal/full state.
    ///
    /// Other threads may change it as soon as the lock is released.
    #[must_use]
    pub fn state(&self) -> State {
        let ring = self.ring.lock();
        State::of(ring.head, ring.tail, Self::MASK)
    }
}

impl<T: Send, const N: usize> Default for BoundedRingQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send, const N: usize> TaskSink<T> for &BoundedRingQueue<T, N> {
    #[inline]
    fn push(&mut self, task: T) -> Result<(), Full<T>> {
        BoundedRingQueue::push(self, task)
    }
}

impl<T: Send, const N: usize> TaskSource<T> for &BoundedRingQueue<T, N> {
    #[inline]
    fn pop(&mut self) -> Option<T> {
        BoundedRingQueue::pop(self)
    }
}

impl<T, const N: usize> fmt::Debug for BoundedRingQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("BoundedRingQueue")
            .field("capacity", &(N - 1))
            .field("head", &ring.head)
            .field("tail", &ring.tail)
            .finish_non_exhaustive()
    }
}
