//! Lock-free single-producer single-consumer ring buffer.
//!
//! One thread pushes, one thread pops, and the only synchronization between
//! them is a pair of acquire/release cursor updates. No locks, no CAS, no
//! retries inside an operation.
//!
//! # Design
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Cache line 0: head   (written by producer, read by consumer) │
//! ├────────────────────────────────────────────────────────────┤
//! │ Cache line 1: tail   (written by consumer, read by producer) │
//! ├────────────────────────────────────────────────────────────┤
//! │ Cache line 2..: slots[0..N]                                 │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! `head` is the slot of the last push, `tail` the slot of the last pop. A
//! push writes slot `next(head)` and then publishes `head` with a Release
//! store; a pop Acquire-loads `head`, so the slot write happens-before the
//! slot read. The same pairing on `tail` tells the producer a slot has been
//! moved out before it is overwritten.
//!
//! One slot is always left empty so that `head == tail` means empty and
//! `next(head) == tail` means full. Usable capacity is `N - 1`.
//!
//! # Two ways in
//!
//! [`SpscRingQueue::split`] moves the queue behind an `Arc` and returns a
//! [`Producer`] and a [`Consumer`]. Both take `&mut self` and neither is
//! `Clone`, so the one-producer/one-consumer rule is checked by the compiler.
//!
//! [`SpscRingQueue::push`] and [`SpscRingQueue::pop`] operate on a shared
//! reference and are `unsafe`: the caller promises the threading rule
//! instead. Useful with scoped threads when the queue should stay on the
//! stack or inside another structure.
//!
//! # Example
//!
//! ```
//! use invariant_queue::SpscRingQueue;
//! use std::thread;
//!
//! let (mut tx, mut rx) = SpscRingQueue::<u64, 1024>::new().split();
//!
//! let producer = thread::spawn(move || {
//!     for i in 0..10_000 {
//!         while tx.push(i).is_err() {
//!             std::hint::spin_loop();
//!         }
//!     }
//! });
//!
//! let mut expected = 0;
//! while expected < 10_000 {
//!     if let Some(v) = rx.pop() {
//!         assert_eq!(v, expected);
//!         expected += 1;
//!     }
//! }
//! producer.join().unwrap();
//! ```
//!
//! # Compile-Time Enforcement
//!
//! ```compile_fail
//! use invariant_queue::SpscRingQueue;
//! let q = SpscRingQueue::<u64, 100>::new(); // ERROR: 100 is not a power of 2
//! ```
//!
//! ```compile_fail
//! use invariant_queue::SpscRingQueue;
//! let q = SpscRingQueue::<*const u64, 8>::new(); // ERROR: raw pointers are not Send
//! ```

use std::fmt;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::ring;
use crate::sync::{Arc, AtomicUsize, Ordering, UnsafeCell};
use crate::trace::{debug, trace};
use crate::{Full, TaskSink, TaskSource};

/// A fixed-capacity lock-free SPSC ring buffer of `N` slots holding up to
/// `N - 1` tasks.
///
/// `N` must be a power of 2 greater than 1 (enforced at compile time) and
/// defaults to 256 slots.
#[repr(C)]
pub struct SpscRingQueue<T, const N: usize = 256> {
    /// Slot of the most recent push. Written only by the producer.
    head: CachePadded<AtomicUsize>,
    /// Slot of the most recent pop. Written only by the consumer.
    tail: CachePadded<AtomicUsize>,
    /// Slots in `next(tail) ..= head` are initialized, all others are not.
    slots: CachePadded<[UnsafeCell<MaybeUninit<T>>; N]>,
}

// Safety: the cursor protocol gives the producer and the consumer disjoint
// slots, and each slot access is ordered by the acquire/release pairs.
unsafe impl<T: Send, const N: usize> Sync for SpscRingQueue<T, N> {}

impl<T, const N: usize> SpscRingQueue<T, N> {
    const MASK: usize = ring::mask(N);
}

impl<T: Send, const N: usize> SpscRingQueue<T, N> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        // Force the compile-time capacity check
        let _ = Self::MASK;

        debug!(
            slots = N,
            capacity = N - 1,
            cache_line = crate::CACHE_LINE_SIZE,
            "spsc ring queue created"
        );

        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots: CachePadded::new(std::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit()))),
        }
    }

    /// Moves the queue onto the heap and returns its two endpoints.
    #[must_use]
    pub fn split(self) -> (Producer<T, N>, Consumer<T, N>) {
        let queue = Arc::new(self);
        (
            Producer {
                queue: Arc::clone(&queue),
            },
            Consumer { queue },
        )
    }

    /// Attempts to push a task.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] with the task if every usable slot is occupied. The
    /// queue is left unchanged.
    ///
    /// # Safety
    ///
    /// For the whole lifetime of the queue, `push` must only ever be called
    /// from one thread at a time, and never concurrently with itself. That
    /// thread is the producer. Nothing checks this; two concurrent pushes can
    /// both write the same slot, which is a data race.
    #[inline]
    pub unsafe fn push(&self, task: T) -> Result<(), Full<T>> {
        // Only this thread writes head
        let head = self.head.load(Ordering::Relaxed);
        let next = ring::next(head, Self::MASK);

        // Acquire pairs with the consumer's Release of tail: the slot at
        // `next` has been moved out before we overwrite it.
        if next == self.tail.load(Ordering::Acquire) {
            trace!("spsc push rejected, queue full");
            return Err(Full(task));
        }

        // Safety: `next` is outside `next(tail) ..= head`, so the consumer
        // will not read it until the Release below publishes it.
        self.slots[next].with_mut(|slot| unsafe { (*slot).write(task) });

        self.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Attempts to pop the oldest task. Returns `None` if the queue is empty.
    ///
    /// # Safety
    ///
    /// For the whole lifetime of the queue, `pop` must only ever be called
    /// from one thread at a time, and never concurrently with itself. That
    /// thread is the consumer. Nothing checks this; two concurrent pops can
    /// both move out of the same slot, producing a double drop.
    #[inline]
    pub unsafe fn pop(&self) -> Option<T> {
        // Only this thread writes tail
        let tail = self.tail.load(Ordering::Relaxed);

        // Acquire pairs with the producer's Release of head: every slot up to
        // the observed head has been written.
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        let next_tail = ring::next(tail, Self::MASK);

        // Safety: `next_tail` lies in `next(tail) ..= head`, so it holds an
        // initialized task that the producer will not touch until the
        // Release below frees it.
        let task = self.slots[next_tail].with(|slot| unsafe { (*slot).assume_init_read() });

        self.tail.store(next_tail, Ordering::Release);
        Some(task)
    }

    /// Maximum number of tasks the queue can hold: `N - 1`.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Returns the number of queued tasks.
    ///
    /// A snapshot: the other side may have moved on by the time it returns.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        ring::len(head, tail, Self::MASK)
    }

    /// Returns `true` if the queue looked empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send, const N: usize> Default for SpscRingQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for SpscRingQueue<T, N> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let mut tail = self.tail.load(Ordering::Relaxed);

        // Drop remaining tasks
        while tail != head {
            tail = ring::next(tail, Self::MASK);
            self.slots[tail].with_mut(|slot| unsafe { (*slot).assume_init_drop() });
        }
    }
}

impl<T, const N: usize> fmt::Debug for SpscRingQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscRingQueue")
            .field("capacity", &(N - 1))
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// The pushing endpoint of a split [`SpscRingQueue`].
///
/// Takes `&mut self` and is not `Clone`, so there is exactly one producer.
pub struct Producer<T, const N: usize = 256> {
    queue: Arc<SpscRingQueue<T, N>>,
}

impl<T: Send, const N: usize> Producer<T, N> {
    /// Attempts to push a task.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] with the task if the queue is full.
    ///
    /// # Example
    ///
    /// ```
    /// use invariant_queue::SpscRingQueue;
    ///
    /// let (mut tx, _rx) = SpscRingQueue::<u32, 2>::new().split();
    ///
    /// assert!(tx.push(1).is_ok());
    /// assert!(tx.push(2).is_err()); // Full, one slot stays empty
    /// ```
    #[inline]
    pub fn push(&mut self, task: T) -> Result<(), Full<T>> {
        // Safety: this handle is the only producer and `&mut self` keeps its
        // calls from overlapping.
        unsafe { self.queue.push(task) }
    }

    /// Maximum number of tasks the queue can hold.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Returns the number of queued tasks (snapshot).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if the queue looked empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns `true` if the consumer has been dropped.
    #[inline]
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.queue) == 1
    }
}

impl<T: Send, const N: usize> TaskSink<T> for Producer<T, N> {
    #[inline]
    fn push(&mut self, task: T) -> Result<(), Full<T>> {
        Producer::push(self, task)
    }
}

impl<T, const N: usize> Drop for Producer<T, N> {
    fn drop(&mut self) {
        debug!("spsc producer dropped");
    }
}

impl<T, const N: usize> fmt::Debug for Producer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &(N - 1))
            .finish_non_exhaustive()
    }
}

/// The popping endpoint of a split [`SpscRingQueue`].
///
/// Takes `&mut self` and is not `Clone`, so there is exactly one consumer.
pub struct Consumer<T, const N: usize = 256> {
    queue: Arc<SpscRingQueue<T, N>>,
}

impl<T: Send, const N: usize> Consumer<T, N> {
    /// Attempts to pop the oldest task. Returns `None` if the queue is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use invariant_queue::SpscRingQueue;
    ///
    /// let (mut tx, mut rx) = SpscRingQueue::<u32, 8>::new().split();
    ///
    /// assert_eq!(rx.pop(), None); // Empty
    ///
    /// tx.push(42).unwrap();
    /// assert_eq!(rx.pop(), Some(42));
    /// ```
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        // Safety: this handle is the only consumer and `&mut self` keeps its
        // calls from overlapping.
        unsafe { self.queue.pop() }
    }

    /// Maximum number of tasks the queue can hold.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Returns the number of queued tasks (snapshot).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if the queue looked empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns `true` if the producer has been dropped.
    ///
    /// Tasks pushed before the drop can still be popped.
    #[inline]
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.queue) == 1
    }
}

impl<T: Send, const N: usize> TaskSource<T> for Consumer<T, N> {
    #[inline]
    fn pop(&mut self) -> Option<T> {
        Consumer::pop(self)
    }
}

impl<T, const N: usize> Drop for Consumer<T, N> {
    fn drop(&mut self) {
        debug!("spsc consumer dropped");
    }
}

impl<T, const N: usize> fmt::Debug for Consumer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &(N - 1))
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::thread;

    use crate::CACHE_LINE_SIZE;

    // ============================================================================
    // Layout
    // ============================================================================

    #[test]
    fn cursors_and_slots_on_separate_lines() {
        type Q = SpscRingQueue<u64, 16>;

        let head = std::mem::offset_of!(Q, head);
        let tail = std::mem::offset_of!(Q, tail);
        let slots = std::mem::offset_of!(Q, slots);

        assert_eq!(head, 0);
        assert_eq!(tail % CACHE_LINE_SIZE, 0);
        assert_eq!(slots % CACHE_LINE_SIZE, 0);
        assert!(tail >= head + CACHE_LINE_SIZE);
        assert!(slots >= tail + CACHE_LINE_SIZE);
        assert_eq!(std::mem::align_of::<Q>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn cache_line_is_128_on_prefetching_targets() {
        if cfg!(any(
            target_arch = "x86_64",
            target_arch = "aarch64",
            target_arch = "powerpc64"
        )) {
            assert_eq!(CACHE_LINE_SIZE, 128);
        }
        assert!(CACHE_LINE_SIZE.is_power_of_two());
    }

    // ============================================================================
    // Basic Operations
    // ============================================================================

    #[test]
    fn basic_push_pop() {
        let (mut tx, mut rx) = SpscRingQueue::<u64, 8>::new().split();

        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();

        assert_eq!(rx.pop(), Some(1));
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn empty_pop_returns_none() {
        let (_tx, mut rx) = SpscRingQueue::<u64, 4>::new().split();
        assert_eq!(rx.pop(), None);
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn full_buffer() {
        let (mut tx, mut rx) = SpscRingQueue::<u64, 4>::new().split();
        assert_eq!(tx.capacity(), 3);

        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();

        assert_eq!(tx.push(4), Err(Full(4)));
        assert_eq!(rx.len(), 3);

        assert_eq!(rx.pop(), Some(1));
        tx.push(4).unwrap();

        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
        assert_eq!(rx.pop(), Some(4));
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn wraparound() {
        let (mut tx, mut rx) = SpscRingQueue::<u64, 4>::new().split();

        for lap in 0..100u64 {
            for i in 0..3 {
                tx.push(lap * 3 + i).unwrap();
            }
            assert!(tx.push(u64::MAX).is_err());
            for i in 0..3 {
                assert_eq!(rx.pop(), Some(lap * 3 + i));
            }
            assert!(rx.is_empty());
        }
    }

    #[test]
    fn default_capacity() {
        let q: SpscRingQueue<u32> = SpscRingQueue::new();
        assert_eq!(q.capacity(), 255);

        let (mut tx, mut rx) = q.split();
        for i in 0..255 {
            tx.push(i).unwrap();
        }
        assert_eq!(tx.push(255), Err(Full(255)));
        assert_eq!(rx.pop(), Some(0));
    }

    #[test]
    fn interleaved() {
        let (mut tx, mut rx) = SpscRingQueue::<u64, 2>::new().split();

        for i in 0..1000 {
            tx.push(i).unwrap();
            assert_eq!(rx.pop(), Some(i));
        }
    }

    #[test]
    fn raw_api_on_shared_reference() {
        let q = SpscRingQueue::<u32, 4>::new();

        unsafe {
            assert_eq!(q.pop(), None);
            q.push(10).unwrap();
            q.push(20).unwrap();
            assert_eq!(q.pop(), Some(10));
            assert_eq!(q.pop(), Some(20));
            assert_eq!(q.pop(), None);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn string_type() {
        let (mut tx, mut rx) = SpscRingQueue::<String, 4>::new().split();

        tx.push("hello".to_string()).unwrap();
        tx.push("world".to_string()).unwrap();

        assert_eq!(rx.pop().as_deref(), Some("hello"));
        assert_eq!(rx.pop().as_deref(), Some("world"));
    }

    #[test]
    fn zero_sized_type() {
        let (mut tx, mut rx) = SpscRingQueue::<(), 4>::new().split();

        tx.push(()).unwrap();
        tx.push(()).unwrap();

        assert_eq!(rx.pop(), Some(()));
        assert_eq!(rx.pop(), Some(()));
        assert_eq!(rx.pop(), None);
    }

    // ============================================================================
    // Disconnection
    // ============================================================================

    #[test]
    fn producer_disconnected() {
        let (mut tx, mut rx) = SpscRingQueue::<u64, 4>::new().split();

        tx.push(7).unwrap();
        assert!(!rx.is_disconnected());
        drop(tx);
        assert!(rx.is_disconnected());

        // Already-pushed tasks survive the disconnect
        assert_eq!(rx.pop(), Some(7));
    }

    #[test]
    fn consumer_disconnected() {
        let (tx, rx) = SpscRingQueue::<u64, 4>::new().split();

        assert!(!tx.is_disconnected());
        drop(rx);
        assert!(tx.is_disconnected());
    }

    // ============================================================================
    // Drop Behavior
    // ============================================================================

    #[derive(Debug)]
    struct DropCounter(std::sync::Arc<StdAtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn drop_remaining() {
        let drop_count = std::sync::Arc::new(StdAtomicUsize::new(0));

        let (mut tx, rx) = SpscRingQueue::<DropCounter, 8>::new().split();

        tx.push(DropCounter(std::sync::Arc::clone(&drop_count))).unwrap();
        tx.push(DropCounter(std::sync::Arc::clone(&drop_count))).unwrap();
        tx.push(DropCounter(std::sync::Arc::clone(&drop_count))).unwrap();

        assert_eq!(drop_count.load(std::sync::atomic::Ordering::SeqCst), 0);

        drop(tx);
        drop(rx);

        assert_eq!(drop_count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn drop_remaining_after_wrap() {
        let drop_count = std::sync::Arc::new(StdAtomicUsize::new(0));

        let q = SpscRingQueue::<DropCounter, 4>::new();
        unsafe {
            // Walk the cursors around so the live range straddles slot 0
            for _ in 0..3 {
                q.push(DropCounter(std::sync::Arc::clone(&drop_count))).unwrap();
                drop(q.pop());
            }
            q.push(DropCounter(std::sync::Arc::clone(&drop_count))).unwrap();
            q.push(DropCounter(std::sync::Arc::clone(&drop_count))).unwrap();
        }
        assert_eq!(drop_count.load(std::sync::atomic::Ordering::SeqCst), 3);

        drop(q);
        assert_eq!(drop_count.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    // ============================================================================
    // Cross-Thread
    // ============================================================================

    #[test]
    fn cross_thread_fifo() {
        let (mut tx, mut rx) = SpscRingQueue::<u64, 1024>::new().split();

        let h = thread::spawn(move || {
            for i in 0..100_000u64 {
                while tx.push(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0u64;
        while expected < 100_000 {
            if let Some(v) = rx.pop() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        assert_eq!(rx.pop(), None);

        h.join().unwrap();
    }

    #[test]
    fn cross_thread_raw_scoped() {
        let q = SpscRingQueue::<u64, 64>::new();

        let received = thread::scope(|s| {
            s.spawn(|| {
                for i in 0..50_000u64 {
                    // Safety: this is the only thread calling push
                    while unsafe { q.push(i) }.is_err() {
                        std::hint::spin_loop();
                    }
                }
            });

            let consumer = s.spawn(|| {
                let mut received = Vec::with_capacity(50_000);
                while received.len() < 50_000 {
                    // Safety: this is the only thread calling pop
                    match unsafe { q.pop() } {
                        Some(v) => received.push(v),
                        None => std::hint::spin_loop(),
                    }
                }
                received
            });

            consumer.join().unwrap()
        });

        assert!(received.iter().copied().eq(0..50_000));
        assert!(q.is_empty());
    }

    #[test]
    fn cross_thread_heap_tasks() {
        let (mut tx, mut rx) = SpscRingQueue::<Box<[u64; 4]>, 16>::new().split();

        let h = thread::spawn(move || {
            for i in 0..10_000u64 {
                let mut task = Box::new([i, i + 1, i + 2, i + 3]);
                while let Err(Full(back)) = tx.push(task) {
                    task = back;
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0u64;
        while expected < 10_000 {
            if let Some(task) = rx.pop() {
                assert_eq!(*task, [expected, expected + 1, expected + 2, expected + 3]);
                expected += 1;
            }
        }

        h.join().unwrap();
    }
}
