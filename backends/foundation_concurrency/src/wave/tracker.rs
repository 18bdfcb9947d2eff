use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::errors::{CoordError, CoordResult};
use crate::synca::{deadline_after, recover, wait_until};

/// Lifecycle of a single wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePhase {
    Created,
    Dispatched,
    Combining,
    Released,
    Broken,
}

impl WavePhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, WavePhase::Released | WavePhase::Broken)
    }
}

/// `WaveTracker` records how far a wave got and lets the submitting
/// thread wait, with a deadline, for every task to finish.
pub struct WaveTracker<R> {
    tasks: usize,
    progress: Mutex<Progress<R>>,
    finished: Condvar,
}

struct Progress<R> {
    phase: WavePhase,
    finished: usize,
    outcome: Option<R>,
}

impl<R> WaveTracker<R> {
    #[must_use]
    pub fn new(tasks: usize) -> Self {
        Self {
            tasks,
            progress: Mutex::new(Progress {
                phase: WavePhase::Created,
                finished: 0,
                outcome: None,
            }),
            finished: Condvar::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> WavePhase {
        recover(self.progress.lock()).phase
    }

    #[must_use]
    pub fn finished(&self) -> usize {
        recover(self.progress.lock()).finished
    }

    /// Every task has been handed to the pool.
    pub fn mark_dispatched(&self) {
        self.advance(WavePhase::Created, WavePhase::Dispatched);
    }

    /// The last task arrived and the combine step started.
    pub fn mark_combining(&self) {
        let mut progress = recover(self.progress.lock());
        if !progress.phase.is_terminal() {
            progress.phase = WavePhase::Combining;
        }
    }

    /// The combine step returned `outcome`.
    pub fn mark_released(&self, outcome: R) {
        let mut progress = recover(self.progress.lock());
        if progress.phase == WavePhase::Combining {
            progress.phase = WavePhase::Released;
            progress.outcome = Some(outcome);
        }
    }

    /// A task could not reach the barrier or the combine step failed.
    /// A released wave stays released.
    pub fn mark_broken(&self) {
        let mut progress = recover(self.progress.lock());
        if progress.phase != WavePhase::Released && progress.phase != WavePhase::Broken {
            tracing::warn!("Wave broken while {:?}", progress.phase);
            progress.phase = WavePhase::Broken;
        }
    }

    /// One task is done with the wave, whatever its outcome.
    pub fn task_finished(&self) {
        let mut progress = recover(self.progress.lock());
        progress.finished += 1;
        let all_done = progress.finished >= self.tasks;
        drop(progress);

        if all_done {
            self.finished.notify_all();
        }
    }

    /// Blocks until every task finished or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if tasks are still running at the deadline and
    /// `BrokenBarrier` if the wave did not release.
    pub fn wait(&self, timeout: Duration) -> CoordResult<R> {
        let deadline = deadline_after(timeout);
        let mut progress = recover(self.progress.lock());

        while progress.finished < self.tasks {
            progress = match wait_until(&self.finished, progress, deadline) {
                Ok(progress) => progress,
                Err(progress) => {
                    tracing::warn!(
                        "Wave timed out with {}/{} tasks finished",
                        progress.finished,
                        self.tasks
                    );
                    return Err(CoordError::Timeout);
                }
            };
        }

        match (progress.phase, progress.outcome.take()) {
            (WavePhase::Released, Some(outcome)) => Ok(outcome),
            _ => Err(CoordError::BrokenBarrier),
        }
    }

    fn advance(&self, from: WavePhase, to: WavePhase) {
        let mut progress = recover(self.progress.lock());
        if progress.phase == from {
            progress.phase = to;
        }
    }
}
