//! Reusable barrier with a per-generation action and a broken state.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::errors::{ArgumentError, CoordError, CoordResult};
use crate::synca::{recover, CancellationToken, Waker};

/// Runs on the last arriving thread of every generation, before any
/// waiting party is released.
pub type BarrierAction = Box<dyn FnMut() + Send>;

/// A barrier that blocks a fixed number of parties until all of them
/// have arrived.
///
/// Each trip of the barrier is a generation. The thread completing a
/// generation runs the barrier action (if any) and only then releases the
/// others, so every write made before arriving is visible to the action
/// and everything the action writes is visible to every released party.
///
/// A generation breaks instead of tripping when a party is cancelled,
/// when [`GenerationBarrier::break_barrier`] is called or when the action
/// panics. Every party waiting on a broken generation is released with
/// `BrokenBarrier`, and so is every later arrival until
/// [`GenerationBarrier::reset`] opens a fresh generation.
///
/// # Examples
///
/// ```
/// use foundation_concurrency::GenerationBarrier;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::thread;
///
/// let trips = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&trips);
/// let barrier = GenerationBarrier::with_action(3, move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// })
/// .unwrap();
///
/// let handles: Vec<_> = (0..3)
///     .map(|_| {
///         let barrier = barrier.clone();
///         thread::spawn(move || barrier.wait().unwrap().is_leader())
///     })
///     .collect();
///
/// let leaders = handles
///     .into_iter()
///     .map(|handle| handle.join().unwrap())
///     .filter(|is_leader| *is_leader)
///     .count();
///
/// assert_eq!(leaders, 1);
/// assert_eq!(trips.load(Ordering::SeqCst), 1);
/// ```
pub struct GenerationBarrier {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<BarrierState>,
    condvar: Condvar,
    parties: usize,
}

struct BarrierState {
    arrived: usize,
    current: Arc<Generation>,
    action: Option<BarrierAction>,
}

struct Generation {
    id: u64,
    // only touched with the state lock held.
    broken: AtomicBool,
}

impl Generation {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            broken: AtomicBool::new(false),
        })
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }
}

/// Result returned from [`GenerationBarrier::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
    generation: u64,
}

impl BarrierWaitResult {
    /// Returns `true` if this thread was the last to arrive and ran the
    /// barrier action.
    #[inline]
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// The generation this thread was released from.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Waker for Inner {
    fn wake(&self) {
        let guard = recover(self.state.lock());
        drop(guard);
        self.condvar.notify_all();
    }
}

impl Inner {
    fn break_locked(&self, state: &mut MutexGuard<'_, BarrierState>) {
        if state.current.is_broken() {
            return;
        }
        tracing::warn!(
            "Breaking barrier generation {} with {}/{} parties arrived",
            state.current.id,
            state.arrived,
            self.parties
        );
        state.current.broken.store(true, Ordering::Relaxed);
        state.arrived = 0;
        self.condvar.notify_all();
    }

    fn next_generation(state: &mut MutexGuard<'_, BarrierState>) {
        state.current = Generation::new(state.current.id + 1);
        state.arrived = 0;
    }
}

impl Clone for GenerationBarrier {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl GenerationBarrier {
    /// Creates a barrier for `parties` threads without an action.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `parties` is 0.
    pub fn new(parties: usize) -> CoordResult<Self> {
        Self::build(parties, None)
    }

    /// Creates a barrier for `parties` threads that runs `action` once per
    /// generation on the last arriving thread.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `parties` is 0.
    pub fn with_action<F>(parties: usize, action: F) -> CoordResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Self::build(parties, Some(Box::new(action)))
    }

    fn build(parties: usize, action: Option<BarrierAction>) -> CoordResult<Self> {
        if parties == 0 {
            return Err(ArgumentError::ZeroParties.into());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BarrierState {
                    arrived: 0,
                    current: Generation::new(0),
                    action,
                }),
                condvar: Condvar::new(),
                parties,
            }),
        })
    }

    /// Blocks until all parties of the current generation have arrived.
    ///
    /// # Errors
    ///
    /// Returns `BrokenBarrier` if the generation is or becomes broken
    /// (including by a panicking action).
    pub fn wait(&self) -> CoordResult<BarrierWaitResult> {
        self.arrive(None)
    }

    /// Like [`GenerationBarrier::wait`] but gives up when `token` is
    /// cancelled. Giving up breaks the generation so no other party is
    /// left waiting for an arrival that will not come.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` to the cancelled party and `BrokenBarrier` to
    /// every other party of the generation.
    pub fn wait_until_cancelled(&self, token: &CancellationToken) -> CoordResult<BarrierWaitResult> {
        self.arrive(Some(token))
    }

    fn arrive(&self, token: Option<&CancellationToken>) -> CoordResult<BarrierWaitResult> {
        let _registration = token.map(|token| token.register(self.inner.clone()));

        let mut guard = recover(self.inner.state.lock());
        let generation = Arc::clone(&guard.current);

        if generation.is_broken() {
            return Err(CoordError::BrokenBarrier);
        }
        if token.is_some_and(CancellationToken::is_cancelled) {
            self.inner.break_locked(&mut guard);
            return Err(CoordError::Cancelled);
        }

        guard.arrived += 1;
        if guard.arrived >= self.inner.parties {
            return self.trip(guard, &generation);
        }

        loop {
            guard = recover(self.inner.condvar.wait(guard));

            if generation.is_broken() {
                return Err(CoordError::BrokenBarrier);
            }
            if !Arc::ptr_eq(&generation, &guard.current) {
                return Ok(BarrierWaitResult {
                    is_leader: false,
                    generation: generation.id,
                });
            }
            if token.is_some_and(CancellationToken::is_cancelled) {
                self.inner.break_locked(&mut guard);
                return Err(CoordError::Cancelled);
            }
        }
    }

    fn trip(
        &self,
        mut guard: MutexGuard<'_, BarrierState>,
        generation: &Arc<Generation>,
    ) -> CoordResult<BarrierWaitResult> {
        let outcome = match guard.action.as_mut() {
            Some(action) => panic::catch_unwind(AssertUnwindSafe(|| action())),
            None => Ok(()),
        };

        if outcome.is_err() {
            tracing::error!("Barrier action panicked in generation {}", generation.id);
            self.inner.break_locked(&mut guard);
            return Err(CoordError::BrokenBarrier);
        }

        tracing::debug!("Barrier generation {} tripped", generation.id);
        Inner::next_generation(&mut guard);
        drop(guard);
        self.inner.condvar.notify_all();

        Ok(BarrierWaitResult {
            is_leader: true,
            generation: generation.id,
        })
    }

    /// Breaks the current generation, releasing every waiting party with
    /// `BrokenBarrier`.
    pub fn break_barrier(&self) {
        let mut guard = recover(self.inner.state.lock());
        self.inner.break_locked(&mut guard);
    }

    /// Breaks the current generation if anyone is waiting on it, then
    /// opens a fresh one.
    pub fn reset(&self) {
        let mut guard = recover(self.inner.state.lock());
        if guard.arrived > 0 {
            self.inner.break_locked(&mut guard);
        }
        Inner::next_generation(&mut guard);
        drop(guard);
        self.inner.condvar.notify_all();
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        recover(self.inner.state.lock()).current.is_broken()
    }

    #[must_use]
    pub fn parties(&self) -> usize {
        self.inner.parties
    }

    /// Number of parties waiting on the current generation.
    #[must_use]
    pub fn arrived(&self) -> usize {
        recover(self.inner.state.lock()).arrived
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        recover(self.inner.state.lock()).current.id
    }
}

impl fmt::Debug for GenerationBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = recover(self.inner.state.lock());
        f.debug_struct("GenerationBarrier")
            .field("parties", &self.inner.parties)
            .field("arrived", &guard.arrived)
            .field("generation", &guard.current.id)
            .field("broken", &guard.current.is_broken())
            .finish()
    }
}
