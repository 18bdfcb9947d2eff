mod cancel;
mod drops;

pub use cancel::*;
pub use drops::*;

use std::sync::{Condvar, LockResult, MutexGuard};
use std::time::{Duration, Instant};

/// `recover` returns the guard held by a lock or wait result, taking it
/// back out of the `PoisonError` when a previous holder panicked.
///
/// Every critical section in this crate finishes its mutation before
/// running code that could panic, so the data behind a poisoned lock is
/// still consistent.
#[inline]
pub(crate) fn recover<G>(result: LockResult<G>) -> G {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// `deadline_after` returns the instant `timeout` from now, or `None` when
/// that instant is not representable (e.g. `Duration::MAX`), which callers
/// treat as no deadline at all.
#[inline]
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// `wait_until` blocks on `condvar` until notified or `deadline` passes,
/// waiting without a bound when there is no deadline.
///
/// Returns `Err` with the reacquired guard once the deadline has passed,
/// so callers recheck their predicate on `Ok` and give up on `Err`.
pub(crate) fn wait_until<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    deadline: Option<Instant>,
) -> Result<MutexGuard<'a, T>, MutexGuard<'a, T>> {
    let Some(deadline) = deadline else {
        return Ok(recover(condvar.wait(guard)));
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(guard);
    }
    Ok(recover(condvar.wait_timeout(guard, remaining)).0)
}
