//! Bounded blocking FIFO queue built on a `Mutex` and two `Condvar`s.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::errors::{ArgumentError, CoordError, CoordResult};
use crate::synca::{deadline_after, recover, wait_until, CancellationToken, Waker};

/// A thread-safe FIFO queue with a fixed capacity.
///
/// Producers block in [`BoundedQueue::put`] while the queue is full and
/// consumers block in [`BoundedQueue::take`] while it is empty. Every
/// mutation wakes all waiters of the opposite kind, each of which
/// re-checks its condition before proceeding.
///
/// # Examples
///
/// ```
/// use foundation_concurrency::BoundedQueue;
/// use std::thread;
///
/// let queue = BoundedQueue::new(2).unwrap();
///
/// let producer_queue = queue.clone();
/// let producer = thread::spawn(move || {
///     for i in 0..5 {
///         producer_queue.put(i);
///     }
/// });
///
/// let received: Vec<i32> = (0..5).map(|_| queue.take()).collect();
/// producer.join().unwrap();
///
/// assert_eq!(received, vec![0, 1, 2, 3, 4]);
/// ```
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Waker for Inner<T> {
    fn wake(&self) {
        // taking the lock orders this wakeup after any waiter's token check.
        let guard = recover(self.items.lock());
        drop(guard);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl<T> BoundedQueue<T> {
    /// Creates a new queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `capacity` is 0.
    pub fn new(capacity: usize) -> CoordResult<Self> {
        if capacity == 0 {
            return Err(ArgumentError::ZeroCapacity.into());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        })
    }

    /// Appends an item to the tail, blocking while the queue is full.
    pub fn put(&self, item: T) {
        let mut guard = recover(self.inner.items.lock());
        while guard.len() >= self.inner.capacity {
            guard = recover(self.inner.not_full.wait(guard));
        }
        self.push_locked(guard, item);
    }

    /// Removes the head item, blocking while the queue is empty.
    pub fn take(&self) -> T {
        let mut guard = recover(self.inner.items.lock());
        loop {
            if let Some(item) = guard.pop_front() {
                self.release_locked(guard);
                return item;
            }
            guard = recover(self.inner.not_empty.wait(guard));
        }
    }

    /// Attempts to append without blocking, handing the item back if
    /// the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the item when there is no room for it.
    pub fn try_put(&self, item: T) -> Result<(), T> {
        let guard = recover(self.inner.items.lock());
        if guard.len() >= self.inner.capacity {
            return Err(item);
        }
        self.push_locked(guard, item);
        Ok(())
    }

    /// Attempts to remove the head item without blocking.
    pub fn try_take(&self) -> Option<T> {
        let mut guard = recover(self.inner.items.lock());
        let item = guard.pop_front()?;
        self.release_locked(guard);
        Some(item)
    }

    /// Like [`BoundedQueue::put`] but gives up once `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if no room became available in time; the queue
    /// is left unchanged and the item is dropped.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> CoordResult<()> {
        let deadline = deadline_after(timeout);
        let mut guard = recover(self.inner.items.lock());
        while guard.len() >= self.inner.capacity {
            guard = match wait_until(&self.inner.not_full, guard, deadline) {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!("put timed out after {:?}", timeout);
                    return Err(CoordError::Timeout);
                }
            };
        }
        self.push_locked(guard, item);
        Ok(())
    }

    /// Like [`BoundedQueue::take`] but gives up once `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if nothing arrived in time.
    pub fn take_timeout(&self, timeout: Duration) -> CoordResult<T> {
        let deadline = deadline_after(timeout);
        let mut guard = recover(self.inner.items.lock());
        loop {
            if let Some(item) = guard.pop_front() {
                self.release_locked(guard);
                return Ok(item);
            }
            guard = match wait_until(&self.inner.not_empty, guard, deadline) {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!("take timed out after {:?}", timeout);
                    return Err(CoordError::Timeout);
                }
            };
        }
    }

    /// Returns the current number of items, a snapshot that may be stale
    /// as soon as it is returned.
    #[must_use]
    pub fn size(&self) -> usize {
        recover(self.inner.items.lock()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size() >= self.inner.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    fn push_locked(&self, mut guard: MutexGuard<'_, VecDeque<T>>, item: T) {
        guard.push_back(item);
        drop(guard);
        self.inner.not_empty.notify_all();
    }

    fn release_locked(&self, guard: MutexGuard<'_, VecDeque<T>>) {
        drop(guard);
        self.inner.not_full.notify_all();
    }
}

impl<T: Send + 'static> BoundedQueue<T> {
    /// Like [`BoundedQueue::put`] but returns `Cancelled` as soon as
    /// `token` is cancelled, whether before or while blocking.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` without inserting; the item is dropped.
    pub fn put_until_cancelled(&self, item: T, token: &CancellationToken) -> CoordResult<()> {
        let _registration = token.register(self.inner.clone());

        let mut guard = recover(self.inner.items.lock());
        loop {
            if token.is_cancelled() {
                tracing::debug!("put cancelled while waiting for room");
                return Err(CoordError::Cancelled);
            }
            if guard.len() < self.inner.capacity {
                break;
            }
            guard = recover(self.inner.not_full.wait(guard));
        }
        self.push_locked(guard, item);
        Ok(())
    }

    /// Like [`BoundedQueue::take`] but returns `Cancelled` as soon as
    /// `token` is cancelled, whether before or while blocking.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` without removing anything.
    pub fn take_until_cancelled(&self, token: &CancellationToken) -> CoordResult<T> {
        let _registration = token.register(self.inner.clone());

        let mut guard = recover(self.inner.items.lock());
        loop {
            if token.is_cancelled() {
                tracing::debug!("take cancelled while waiting for an item");
                return Err(CoordError::Cancelled);
            }
            if let Some(item) = guard.pop_front() {
                self.release_locked(guard);
                return Ok(item);
            }
            guard = recover(self.inner.not_empty.wait(guard));
        }
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("size", &self.size())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}
