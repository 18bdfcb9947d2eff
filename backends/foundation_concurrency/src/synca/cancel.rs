// Implements explicit cancellation for threads blocked inside the
// crate's monitors, standing in for thread interruption which Rust
// does not have.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::recover;

/// A `Waker` is anything that can rouse the threads sleeping on it.
///
/// Monitors implement it by taking their own lock and broadcasting on
/// their condition variables, so a waiter that checked the token under
/// that lock can never miss the wakeup.
pub trait Waker {
    fn wake(&self);
}

pub type SharedWaker = Arc<dyn Waker + Send + Sync>;

/// `CancellationToken` is a cloneable flag that, once cancelled, wakes
/// every monitor a waiting thread registered with it.
///
/// Cancellation is one-way: a cancelled token stays cancelled.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    next_entry: AtomicU64,
    wakers: Mutex<BTreeMap<u64, SharedWaker>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                next_entry: AtomicU64::new(0),
                wakers: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Cancels the token and wakes every registered waiter.
    ///
    /// Returns `false` if the token was already cancelled.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }

        // wake outside the registry lock, wakers take their own monitor lock.
        let wakers: Vec<SharedWaker> = recover(self.inner.wakers.lock())
            .values()
            .cloned()
            .collect();

        tracing::debug!("Cancelling token with {} registered waiters", wakers.len());
        for waker in wakers {
            waker.wake();
        }
        true
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registers a waker to be called on cancellation for as long as the
    /// returned registration lives.
    #[must_use]
    pub fn register(&self, waker: SharedWaker) -> WakerRegistration {
        let entry = self.inner.next_entry.fetch_add(1, Ordering::Relaxed);
        recover(self.inner.wakers.lock()).insert(entry, waker);
        WakerRegistration {
            token: Arc::clone(&self.inner),
            entry,
        }
    }

    /// Number of currently registered wakers.
    #[must_use]
    pub fn waiters(&self) -> usize {
        recover(self.inner.wakers.lock()).len()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("waiters", &self.waiters())
            .finish()
    }
}

/// Removes its waker from the token when dropped.
pub struct WakerRegistration {
    token: Arc<TokenInner>,
    entry: u64,
}

impl Drop for WakerRegistration {
    fn drop(&mut self) {
        recover(self.token.wakers.lock()).remove(&self.entry);
    }
}
