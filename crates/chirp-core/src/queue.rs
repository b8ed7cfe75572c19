//! Unbounded lock-free MPMC queue
//!
//! Michael-Scott design: a singly-linked list with a permanent sentinel
//! at the head and two atomic pointers. `enqueue` links a node after the
//! tail and swings the tail; `dequeue` swings the head to its successor
//! and takes the successor's value, which turns that node into the new
//! sentinel. Neither operation blocks: contention only costs CAS
//! retries, and a lagging tail is advanced by whichever thread sees it.
//!
//! Nodes are reference counted through `arc-swap`. A thread that loaded
//! a node keeps it alive until its guard drops, so a retired node is
//! never freed (or its address reused) while someone may dereference it.

use arc_swap::{ArcSwap, ArcSwapOption};
use core::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A value that can be taken out exactly once
struct Slot<T> {
    taken: AtomicBool,
    value: UnsafeCell<Option<T>>,
}

// Safety: `value` is only touched by the single caller that flips `taken`
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> Slot<T> {
    fn empty() -> Self {
        Self {
            taken: AtomicBool::new(true),
            value: UnsafeCell::new(None),
        }
    }

    fn new(value: T) -> Self {
        Self {
            taken: AtomicBool::new(false),
            value: UnsafeCell::new(Some(value)),
        }
    }

    fn take(&self) -> Option<T> {
        if self.taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        // Safety: the swap above admits exactly one caller
        unsafe { (*self.value.get()).take() }
    }
}

struct Node<T> {
    value: Slot<T>,
    next: ArcSwapOption<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Self {
            value: Slot::empty(),
            next: ArcSwapOption::empty(),
        }
    }

    fn new(value: T) -> Self {
        Self {
            value: Slot::new(value),
            next: ArcSwapOption::empty(),
        }
    }
}

/// Unbounded non-blocking FIFO for many producers and many consumers
///
/// # Example
///
/// ```
/// use chirp_core::LockFreeQueue;
///
/// let queue = LockFreeQueue::new();
/// queue.enqueue("first");
/// queue.enqueue("second");
/// assert_eq!(queue.dequeue(), Some("first"));
/// assert_eq!(queue.dequeue(), Some("second"));
/// assert_eq!(queue.dequeue(), None);
/// ```
pub struct LockFreeQueue<T> {
    /// Current sentinel; its successor holds the oldest value
    head: ArcSwap<Node<T>>,

    /// Last node, or one behind it while an enqueue is finishing
    tail: ArcSwap<Node<T>>,

    /// Approximate number of queued values (diagnostics only)
    len: AtomicUsize,
}

impl<T> LockFreeQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        let sentinel = Arc::new(Node::sentinel());
        Self {
            head: ArcSwap::new(Arc::clone(&sentinel)),
            tail: ArcSwap::new(sentinel),
            len: AtomicUsize::new(0),
        }
    }

    /// Append a value at the tail. Never blocks.
    pub fn enqueue(&self, value: T) {
        let node = Arc::new(Node::new(value));
        // Counted before linking so a racing dequeue can't underflow it
        self.len.fetch_add(1, Ordering::Relaxed);

        let unlinked: Option<Arc<Node<T>>> = None;
        loop {
            let tail = self.tail.load();
            let next = tail.next.load();

            match &*next {
                None => {
                    let prev = tail.next.compare_and_swap(&unlinked, Some(Arc::clone(&node)));
                    if prev.is_none() {
                        // Best effort: a lagging tail is fixed by whoever sees it next
                        self.tail.compare_and_swap(&tail, node);
                        return;
                    }
                }
                Some(successor) => {
                    self.tail.compare_and_swap(&tail, Arc::clone(successor));
                }
            }
        }
    }

    /// Remove the value at the head, or `None` if the queue is empty.
    /// Never blocks.
    pub fn dequeue(&self) -> Option<T> {
        loop {
            let head = self.head.load();
            let tail = self.tail.load();
            let next = head.next.load_full();

            if Arc::ptr_eq(&*head, &*tail) {
                let successor = next?;
                // Tail is lagging behind a completed link
                self.tail.compare_and_swap(&tail, successor);
                continue;
            }

            let Some(successor) = next else {
                continue;
            };

            let prev = self.head.compare_and_swap(&head, Arc::clone(&successor));
            if Arc::ptr_eq(&*prev, &*head) {
                // We retired `head`; `successor` is the new sentinel and its
                // value belongs to us alone.
                if let Some(value) = successor.value.take() {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    return Some(value);
                }
            }
        }
    }

    /// Check whether the queue currently holds no values
    pub fn is_empty(&self) -> bool {
        self.head.load().next.load().is_none()
    }

    /// Approximate number of queued values (may be stale under contention)
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // Unlink one node at a time; letting the chain drop on its own
        // would recurse once per queued node.
        while self.dequeue().is_some() {}
    }
}

impl<T> std::fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn test_enqueue_dequeue_roundtrip() {
        let queue = LockFreeQueue::new();
        queue.enqueue(42);
        assert_eq!(queue.dequeue(), Some(42));
    }

    #[test]
    fn test_empty_dequeue() {
        let queue = LockFreeQueue::<i32>::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_fifo_order() {
        let queue = LockFreeQueue::new();
        for i in 0..5 {
            queue.enqueue(i);
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            assert_eq!(queue.dequeue(), Some(i));
        }
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_interleaved_operations() {
        let queue = LockFreeQueue::new();
        queue.enqueue("a");
        queue.enqueue("b");
        assert_eq!(queue.dequeue(), Some("a"));
        queue.enqueue("c");
        assert_eq!(queue.dequeue(), Some("b"));
        assert_eq!(queue.dequeue(), Some("c"));
        assert_eq!(queue.dequeue(), None);
        queue.enqueue("d");
        assert_eq!(queue.dequeue(), Some("d"));
    }

    #[test]
    fn test_concurrent_producers_and_consumers() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let queue = Arc::new(LockFreeQueue::new());
        let received = Arc::new(AtomicUsize::new(0));
        let mut producers = vec![];
        let mut consumers = vec![];

        for p in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            producers.push(thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.enqueue((p, seq));
                }
            }));
        }

        for _ in 0..CONSUMERS {
            let queue = Arc::clone(&queue);
            let received = Arc::clone(&received);
            consumers.push(thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    if let Some(item) = queue.dequeue() {
                        seen.push(item);
                        received.fetch_add(1, Ordering::SeqCst);
                    } else if received.load(Ordering::SeqCst) >= TOTAL {
                        break;
                    } else {
                        thread::yield_now();
                    }
                }
                seen
            }));
        }

        for h in producers {
            h.join().unwrap();
        }

        let mut all = Vec::with_capacity(TOTAL);
        for h in consumers {
            let seen = h.join().unwrap();

            // Each consumer sees any one producer's values in order
            let mut last: HashMap<usize, usize> = HashMap::new();
            for &(p, seq) in &seen {
                if let Some(&prev) = last.get(&p) {
                    assert!(seq > prev, "producer {} reordered: {} after {}", p, seq, prev);
                }
                last.insert(p, seq);
            }
            all.extend(seen);
        }

        // No loss, no duplication
        assert_eq!(all.len(), TOTAL);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), TOTAL);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drop_releases_queued_values() {
        let marker = Arc::new(());
        {
            let queue = LockFreeQueue::new();
            for _ in 0..10 {
                queue.enqueue(Arc::clone(&marker));
            }
            drop(queue.dequeue());
            assert_eq!(Arc::strong_count(&marker), 10);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_drop_long_queue() {
        let queue = LockFreeQueue::new();
        for i in 0..200_000u32 {
            queue.enqueue(i);
        }
        drop(queue);
    }
}
