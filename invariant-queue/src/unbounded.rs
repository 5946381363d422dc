//! Growable FIFO queue behind a single mutex.
//!
//! Push never fails: the backing [`VecDeque`] grows as needed. There is no
//! backpressure, so a producer that outruns its consumers grows memory without
//! bound. Pick [`BoundedRingQueue`](crate::BoundedRingQueue) when a full
//! signal is wanted.
//!
//! # Example
//!
//! ```
//! use invariant_queue::UnboundedQueue;
//!
//! let q = UnboundedQueue::new();
//! q.push("a");
//! q.push("b");
//!
//! assert_eq!(q.pop(), Some("a"));
//! assert_eq!(q.pop(), Some("b"));
//! assert_eq!(q.pop(), None);
//! ```

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::trace::debug;
use crate::{Full, TaskSink, TaskSource};

/// A mutex-protected queue with no capacity limit.
pub struct UnboundedQueue<T> {
    tasks: Mutex<VecDeque<T>>,
}

impl<T: Send> UnboundedQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        debug!("unbounded queue created");
        Self {
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    /// Creates an empty queue with room for `capacity` tasks before it
    /// reallocates. This is a reservation, not a limit.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        debug!(capacity, "unbounded queue created");
        Self {
            tasks: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Pushes a task. Always succeeds.
    ///
    /// Allocation failure while growing aborts the process.
    pub fn push(&self, task: T) {
        self.tasks.lock().push_back(task);
    }

    /// Attempts to pop the oldest task. Returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        self.tasks.lock().pop_front()
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Returns `true` if there is nothing to pop.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl<T: Send> Default for UnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> TaskSink<T> for &UnboundedQueue<T> {
    #[inline]
    fn push(&mut self, task: T) -> Result<(), Full<T>> {
        UnboundedQueue::push(self, task);
        Ok(())
    }
}

impl<T: Send> TaskSource<T> for &UnboundedQueue<T> {
    #[inline]
    fn pop(&mut self) -> Option<T> {
        UnboundedQueue::pop(self)
    }
}

impl<T> fmt::Debug for UnboundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnboundedQueue")
            .field("len", &self.tasks.lock().len())
            .finish_non_exhaustive()
    }
}
