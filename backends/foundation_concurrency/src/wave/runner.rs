use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::arena::ResultArena;
use super::barrier::GenerationBarrier;
use super::pool::WorkerPool;
use super::tracker::WaveTracker;
use crate::config::WaveConfig;
use crate::errors::{ArgumentError, CoordError, CoordResult};
use crate::synca::{CancellationToken, RunOnDrop};

/// `WaveRunner` executes waves of independent tasks on a fixed pool and
/// joins each wave through a single combine step.
///
/// Task `i` of a wave computes `input(i)` and stores the value in slot `i`
/// of the wave's result buffer, then waits at the wave's barrier. The last
/// task to arrive runs `combine` over the full buffer exactly once, after
/// which every task is released.
///
/// # Examples
///
/// ```
/// use foundation_concurrency::WaveRunner;
/// use std::time::Duration;
///
/// let runner = WaveRunner::new(4).unwrap();
/// let sum = runner
///     .execute_wave(
///         4,
///         |i| (i as u64 + 1).pow(2),
///         |squares| squares.iter().sum::<u64>(),
///         Duration::from_secs(5),
///     )
///     .unwrap();
///
/// assert_eq!(sum, 30);
/// ```
pub struct WaveRunner {
    config: WaveConfig,
    pool: WorkerPool,
    waves: AtomicU64,
}

impl WaveRunner {
    /// Creates a runner backed by `pool_size` worker threads.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `pool_size` is 0.
    pub fn new(pool_size: usize) -> CoordResult<Self> {
        Self::with_config(WaveConfig::new(pool_size))
    }

    /// Creates a runner sized from the environment, see
    /// [`WaveConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns `ThreadSpawn` if the workers cannot be started.
    pub fn from_env() -> CoordResult<Self> {
        Self::with_config(WaveConfig::from_env())
    }

    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configured pool size is 0 and
    /// `ThreadSpawn` if the workers cannot be started.
    pub fn with_config(config: WaveConfig) -> CoordResult<Self> {
        let pool = WorkerPool::new(config.get_pool_size(), config.get_thread_name())?;
        Ok(Self {
            config,
            pool,
            waves: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn config(&self) -> &WaveConfig {
        &self.config
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Tasks submitted to the pool that no worker has picked up yet.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.pool.pending()
    }

    /// Runs a wave of `tasks` tasks and returns what `combine` returned.
    ///
    /// Blocks until every task has finished or `timeout` elapses. A timed
    /// out wave keeps running in the background; cancel it explicitly
    /// with [`WaveRunner::execute_wave_until_cancelled`] when that is not
    /// wanted.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `tasks` is 0 or exceeds the pool size.
    /// - `BrokenBarrier` if any task panicked or never ran, or `combine`
    ///   panicked. `combine` is not called when a task failed.
    /// - `Timeout` if the wave was still running at the deadline.
    /// - `PoolShutdown` if the runner was shut down.
    pub fn execute_wave<T, R, I, C>(
        &self,
        tasks: usize,
        input: I,
        combine: C,
        timeout: Duration,
    ) -> CoordResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        I: Fn(usize) -> T + Send + Sync + 'static,
        C: FnOnce(&[T]) -> R + Send + 'static,
    {
        self.run_wave(tasks, input, combine, timeout, CancellationToken::new())
    }

    /// [`WaveRunner::execute_wave`] bounded by the configured default
    /// timeout.
    ///
    /// # Errors
    ///
    /// Same as [`WaveRunner::execute_wave`].
    pub fn execute_wave_default<T, R, I, C>(&self, tasks: usize, input: I, combine: C) -> CoordResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        I: Fn(usize) -> T + Send + Sync + 'static,
        C: FnOnce(&[T]) -> R + Send + 'static,
    {
        let timeout = self.config.get_default_timeout();
        self.execute_wave(tasks, input, combine, timeout)
    }

    /// [`WaveRunner::execute_wave`] that also gives up when `token` is
    /// cancelled. Cancelling breaks the wave's barrier: tasks waiting on it
    /// are released and tasks that have not started yet are skipped.
    ///
    /// # Errors
    ///
    /// Same as [`WaveRunner::execute_wave`]; a cancelled wave reports
    /// `BrokenBarrier`.
    pub fn execute_wave_until_cancelled<T, R, I, C>(
        &self,
        tasks: usize,
        input: I,
        combine: C,
        timeout: Duration,
        token: &CancellationToken,
    ) -> CoordResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        I: Fn(usize) -> T + Send + Sync + 'static,
        C: FnOnce(&[T]) -> R + Send + 'static,
    {
        self.run_wave(tasks, input, combine, timeout, token.clone())
    }

    /// Stops the pool. Tasks of in-flight waves that have not started are
    /// dropped, which breaks their waves. Idempotent.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn run_wave<T, R, I, C>(
        &self,
        tasks: usize,
        input: I,
        combine: C,
        timeout: Duration,
        token: CancellationToken,
    ) -> CoordResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        I: Fn(usize) -> T + Send + Sync + 'static,
        C: FnOnce(&[T]) -> R + Send + 'static,
    {
        if tasks == 0 {
            return Err(ArgumentError::ZeroTasks.into());
        }
        if tasks > self.pool.size() {
            return Err(ArgumentError::WaveExceedsPool {
                tasks,
                pool: self.pool.size(),
            }
            .into());
        }
        if self.pool.is_shutdown() {
            return Err(CoordError::PoolShutdown);
        }

        let wave = self.waves.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Wave {} dispatching {} tasks on a pool of {} workers",
            wave,
            tasks,
            self.pool.size()
        );

        let (arena, writers) = ResultArena::new(tasks);
        let tracker = Arc::new(WaveTracker::new(tasks));
        let barrier = combining_barrier(tasks, Arc::clone(&arena), Arc::clone(&tracker), combine)?;
        let input = Arc::new(input);

        let mut jobs = Vec::with_capacity(tasks);
        for writer in writers {
            let index = writer.index();
            let input = Arc::clone(&input);
            let barrier = barrier.clone();
            let tracker = Arc::clone(&tracker);
            let token = token.clone();

            // fires if the task panics, is skipped, or is dropped unrun.
            let abandon = {
                let barrier = barrier.clone();
                let tracker = Arc::clone(&tracker);
                RunOnDrop::new(move || {
                    tracing::debug!("Task {} abandoned its wave", index);
                    barrier.break_barrier();
                    tracker.mark_broken();
                    tracker.task_finished();
                })
            };

            let task = move || {
                if barrier.is_broken() || token.is_cancelled() {
                    return;
                }

                writer.write(input(index));
                abandon.disarm();

                if let Err(err) = barrier.wait_until_cancelled(&token) {
                    tracing::debug!("Task {} left the barrier with {}", index, err);
                    tracker.mark_broken();
                }
                tracker.task_finished();
            };

            jobs.push(task);
        }

        // queued as one batch so concurrent waves never interleave their tasks.
        if let Err(err) = self.pool.execute_all(jobs) {
            tracing::warn!("Wave {} could not be submitted: {}", wave, err);
            return Err(err);
        }
        tracker.mark_dispatched();

        let outcome = tracker.wait(timeout);
        match &outcome {
            Ok(_) => tracing::debug!("Wave {} released", wave),
            Err(err) => tracing::warn!("Wave {} failed: {}", wave, err),
        }
        outcome
    }
}

/// Builds the wave's barrier whose action drains the arena into `combine`
/// and records the result on the tracker.
fn combining_barrier<T, R, C>(
    tasks: usize,
    arena: Arc<ResultArena<T>>,
    tracker: Arc<WaveTracker<R>>,
    combine: C,
) -> CoordResult<GenerationBarrier>
where
    T: Send + 'static,
    R: Send + 'static,
    C: FnOnce(&[T]) -> R + Send + 'static,
{
    let mut combine = Some(combine);
    GenerationBarrier::with_action(tasks, move || {
        let Some(combine) = combine.take() else {
            return;
        };

        tracker.mark_combining();
        match arena.drain() {
            Some(values) => tracker.mark_released(combine(values.as_slice())),
            None => {
                tracing::error!("Wave barrier tripped with {} of {} slots written", arena.written(), arena.len());
                tracker.mark_broken();
            }
        }
    })
}

impl std::fmt::Debug for WaveRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveRunner")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("waves", &self.waves.load(Ordering::Relaxed))
            .finish()
    }
}
