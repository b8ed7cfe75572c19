//! Reader/writer lock with a reader cap and writer priority
//!
//! A monitor (one `Mutex` + one `Condvar`) tracks three counters and
//! admits callers according to fixed predicates:
//!
//! - a writer waits while any reader or writer is active,
//! - a reader waits while a writer is active, a writer is *waiting*,
//!   or the reader cap is reached.
//!
//! The waiting-writer clause gives writers priority so a steady stream
//! of readers cannot starve them. Release broadcasts to every waiter and
//! each waiter re-checks its own predicate.
//!
//! The lock is not reentrant. Acquiring it twice from the same thread
//! deadlocks.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Maximum number of concurrent readers admitted by [`ReadWriteLock::new`]
pub const READER_CAP: usize = 32;

/// Admission counters, always accessed under `ReadWriteLock::state`
#[derive(Debug, Default)]
struct LockState {
    active_readers: usize,
    waiting_writers: usize,
    active_writer: bool,
}

impl LockState {
    #[inline]
    fn writer_blocked(&self) -> bool {
        self.active_readers > 0 || self.active_writer
    }

    #[inline]
    fn reader_blocked(&self, reader_cap: usize) -> bool {
        self.active_writer || self.waiting_writers > 0 || self.active_readers >= reader_cap
    }
}

/// A reader/writer lock owning the data it protects
///
/// # Example
///
/// ```
/// use chirp_core::ReadWriteLock;
///
/// let lock = ReadWriteLock::new(Vec::new());
/// lock.lock().push(7);
/// assert_eq!(lock.rlock().len(), 1);
/// ```
pub struct ReadWriteLock<T> {
    /// Admission counters
    state: Mutex<LockState>,

    /// Waiters of both kinds park here
    cond: Condvar,

    /// Readers admitted at once
    reader_cap: usize,

    /// Protected data
    data: UnsafeCell<T>,
}

// Safety: access to `data` is mediated by the admission protocol. Shared
// guards hand out `&T` to many threads, so `T: Sync` is needed as well.
unsafe impl<T: Send> Send for ReadWriteLock<T> {}
unsafe impl<T: Send + Sync> Sync for ReadWriteLock<T> {}

impl<T> ReadWriteLock<T> {
    /// Create a lock admitting at most [`READER_CAP`] readers
    pub const fn new(value: T) -> Self {
        Self::with_reader_cap(value, READER_CAP)
    }

    /// Create a lock with a custom reader cap (clamped to at least 1)
    pub const fn with_reader_cap(value: T, reader_cap: usize) -> Self {
        Self {
            state: Mutex::new(LockState {
                active_readers: 0,
                waiting_writers: 0,
                active_writer: false,
            }),
            cond: Condvar::new(),
            reader_cap: if reader_cap == 0 { 1 } else { reader_cap },
            data: UnsafeCell::new(value),
        }
    }

    /// Maximum number of concurrent readers
    #[inline]
    pub fn reader_cap(&self) -> usize {
        self.reader_cap
    }

    /// Acquire exclusive access, blocking until admitted
    ///
    /// Registers as a waiting writer first, which stops new readers from
    /// being admitted until this writer has run.
    pub fn lock(&self) -> WriteGuard<'_, T> {
        let mut state = self.state();
        state.waiting_writers += 1;
        let mut state = self.wait_while(state, |s| s.writer_blocked());
        state.waiting_writers -= 1;
        state.active_writer = true;
        WriteGuard { lock: self }
    }

    /// Acquire shared access, blocking until admitted
    pub fn rlock(&self) -> ReadGuard<'_, T> {
        let cap = self.reader_cap;
        let state = self.state();
        let mut state = self.wait_while(state, |s| s.reader_blocked(cap));
        state.active_readers += 1;
        ReadGuard { lock: self }
    }

    /// Acquire exclusive access only if it can be granted right now
    ///
    /// Fails while another writer is queued in [`lock`](Self::lock), so a
    /// caller never overtakes a writer that is already waiting.
    pub fn try_lock(&self) -> Option<WriteGuard<'_, T>> {
        let mut state = self.state();
        if state.writer_blocked() || state.waiting_writers > 0 {
            return None;
        }
        state.active_writer = true;
        Some(WriteGuard { lock: self })
    }

    /// Acquire shared access only if it can be granted right now
    pub fn try_rlock(&self) -> Option<ReadGuard<'_, T>> {
        let mut state = self.state();
        if state.reader_blocked(self.reader_cap) {
            return None;
        }
        state.active_readers += 1;
        Some(ReadGuard { lock: self })
    }

    fn unlock(&self) {
        let mut state = self.state();
        state.active_writer = false;
        drop(state);
        self.cond.notify_all();
    }

    fn runlock(&self) {
        let mut state = self.state();
        state.active_readers -= 1;
        let last = state.active_readers == 0;
        drop(state);
        // The last reader out releases pending writers.
        if last {
            self.cond.notify_all();
        }
    }

    // The counters are updated without running user code under the
    // mutex, so a poisoned state is still consistent.
    #[inline]
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn wait_while<'a, F>(&self, guard: MutexGuard<'a, LockState>, blocked: F) -> MutexGuard<'a, LockState>
    where
        F: FnMut(&mut LockState) -> bool,
    {
        self.cond
            .wait_while(guard, blocked)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for ReadWriteLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReadWriteLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_rlock() {
            Some(guard) => f.debug_struct("ReadWriteLock")
                .field("data", &*guard)
                .finish(),
            None => f.debug_struct("ReadWriteLock")
                .field("data", &"<locked>")
                .finish(),
        }
    }
}

/// Shared access guard; runs `runlock` when dropped
pub struct ReadGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<'a, T> Deref for ReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: readers are only admitted while no writer is active
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> Drop for ReadGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.runlock();
    }
}

/// Exclusive access guard; runs `unlock` when dropped
pub struct WriteGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<'a, T> Deref for WriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: we are the only active holder
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for WriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: we are the only active holder
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for WriteGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_write_then_read() {
        let lock = ReadWriteLock::new(0u32);

        {
            let mut guard = lock.lock();
            *guard = 42;
        }

        let first = lock.rlock();
        let second = lock.rlock();
        assert_eq!(*first, 42);
        assert_eq!(*second, 42);
    }

    #[test]
    fn test_try_lock_excludes_readers() {
        let lock = ReadWriteLock::new(());

        let reader = lock.try_rlock();
        assert!(reader.is_some());
        assert!(lock.try_lock().is_none());

        drop(reader);
        let writer = lock.try_lock();
        assert!(writer.is_some());
        assert!(lock.try_rlock().is_none());
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn test_reader_cap_refuses_extra_reader() {
        let lock = ReadWriteLock::with_reader_cap((), 2);
        assert_eq!(lock.reader_cap(), 2);

        let a = lock.rlock();
        let b = lock.rlock();
        assert!(lock.try_rlock().is_none());

        drop(a);
        assert!(lock.try_rlock().is_some());
        drop(b);
    }

    #[test]
    fn test_zero_cap_is_clamped() {
        let lock = ReadWriteLock::with_reader_cap((), 0);
        assert_eq!(lock.reader_cap(), 1);
        let _guard = lock.rlock();
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let lock = Arc::new(ReadWriteLock::new(0u32));
        let reader = lock.rlock();

        let writer_lock = Arc::clone(&lock);
        let writer = thread::spawn(move || {
            *writer_lock.lock() += 1;
        });

        while lock.state().waiting_writers == 0 {
            thread::yield_now();
        }

        // A writer is queued: readers are no longer admitted
        assert!(lock.try_rlock().is_none());

        drop(reader);
        writer.join().unwrap();

        assert_eq!(*lock.rlock(), 1);
        assert_eq!(lock.state().waiting_writers, 0);
    }

    #[test]
    fn test_reader_cap_under_contention() {
        const THREADS: usize = 64;
        let lock = Arc::new(ReadWriteLock::new(()));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));
        let mut handles = vec![];

        for _ in 0..THREADS {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                let _guard = lock.rlock();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(peak <= READER_CAP, "{} readers held the lock at once", peak);
    }

    #[test]
    fn test_writers_exclusive_with_readers() {
        let lock = Arc::new(ReadWriteLock::new(0u64));
        let readers = Arc::new(AtomicUsize::new(0));
        let writers = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let readers = Arc::clone(&readers);
            let writers = Arc::clone(&writers);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    let mut guard = lock.lock();
                    assert_eq!(writers.fetch_add(1, Ordering::SeqCst), 0);
                    assert_eq!(readers.load(Ordering::SeqCst), 0);
                    *guard += 1;
                    writers.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let readers = Arc::clone(&readers);
            let writers = Arc::clone(&writers);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    let guard = lock.rlock();
                    readers.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(writers.load(Ordering::SeqCst), 0);
                    let _ = *guard;
                    readers.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*lock.rlock(), 2000);
    }

    #[test]
    fn test_panic_while_writing_releases_lock() {
        let lock = Arc::new(ReadWriteLock::new(1u32));

        let victim = Arc::clone(&lock);
        let result = thread::spawn(move || {
            let _guard = victim.lock();
            panic!("writer died");
        })
        .join();
        assert!(result.is_err());

        *lock.lock() += 1;
        assert_eq!(*lock.rlock(), 2);
    }

    #[test]
    fn test_try_lock_yields_to_waiting_writer() {
        let lock = ReadWriteLock::new(());

        // A writer queued in lock() but not yet admitted
        lock.state().waiting_writers += 1;
        assert!(lock.try_lock().is_none());
        assert!(lock.try_rlock().is_none());

        lock.state().waiting_writers -= 1;
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_capped_reader_released_by_last_reader() {
        let lock = Arc::new(ReadWriteLock::with_reader_cap(5u32, 2));
        let first = lock.rlock();
        let second = lock.rlock();
        let admitted = Arc::new(AtomicUsize::new(0));

        let third = {
            let lock = Arc::clone(&lock);
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                let guard = lock.rlock();
                admitted.fetch_add(1, Ordering::SeqCst);
                *guard
            })
        };

        // Still capped while one of the two readers remains
        thread::sleep(Duration::from_millis(20));
        assert_eq!(admitted.load(Ordering::SeqCst), 0);
        drop(first);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(admitted.load(Ordering::SeqCst), 0);

        // The last reader out broadcasts
        drop(second);
        assert_eq!(third.join().unwrap(), 5);
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(lock.state().active_readers, 0);
    }
}
