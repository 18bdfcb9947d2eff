//! Fixed-size worker pool fed by a `Condvar` job queue.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::errors::{ArgumentError, CoordError, CoordResult};
use crate::synca::recover;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A pool of named OS threads executing jobs in submission order.
///
/// A job that panics is logged and discarded, the worker that ran it
/// keeps serving the queue. Shutting the pool down drops every job that
/// has not started yet without running it, so jobs that must observe
/// their own abandonment should carry a drop guard.
///
/// # Examples
///
/// ```
/// use foundation_concurrency::WorkerPool;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let pool = WorkerPool::new(4, "example").unwrap();
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..10 {
///     let counter = Arc::clone(&counter);
///     pool.execute(move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     })
///     .unwrap();
/// }
///
/// // shutting down waits for the running jobs, queued ones are dropped.
/// while counter.load(Ordering::Relaxed) < 10 {
///     std::thread::yield_now();
/// }
/// pool.shutdown();
/// assert_eq!(counter.load(Ordering::Relaxed), 10);
/// ```
pub struct WorkerPool {
    name: String,
    size: usize,
    queue: Arc<JobQueue>,
    workers: Mutex<Vec<Worker>>,
}

struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl WorkerPool {
    /// Starts `size` worker threads named `{name}-{index}`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `size` is 0, or `ThreadSpawn` if the
    /// OS refuses a thread (workers already started are shut down).
    pub fn new(size: usize, name: impl Into<String>) -> CoordResult<Self> {
        if size == 0 {
            return Err(ArgumentError::ZeroPoolSize.into());
        }

        let pool = Self {
            name: name.into(),
            size,
            queue: Arc::new(JobQueue::new()),
            workers: Mutex::new(Vec::with_capacity(size)),
        };

        for id in 0..size {
            let worker = Worker::spawn(id, &pool.name, Arc::clone(&pool.queue))?;
            recover(pool.workers.lock()).push(worker);
        }

        tracing::debug!("Started worker pool {} with {} threads", pool.name, size);
        Ok(pool)
    }

    /// Queues a job for the next free worker.
    ///
    /// # Errors
    ///
    /// Returns `PoolShutdown` if the pool no longer accepts jobs, the job
    /// is dropped without running.
    pub fn execute<F>(&self, job: F) -> CoordResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(Box::new(job))
    }

    /// Queues every job in `jobs` back to back, with no job from another
    /// caller in between.
    ///
    /// Jobs that rendezvous with each other must be queued this way: with
    /// at most `size` of them per batch, the batch at the head of the
    /// queue is the only one that can be partially started, so its
    /// remaining jobs always get a worker.
    ///
    /// # Errors
    ///
    /// Returns `PoolShutdown` if the pool no longer accepts jobs, every job
    /// is dropped without running.
    pub fn execute_all<I, F>(&self, jobs: I) -> CoordResult<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        let batch: Vec<Job> = jobs.into_iter().map(|job| Box::new(job) as Job).collect();
        self.queue.push_all(batch)
    }

    /// Stops accepting jobs, drops the queued ones and joins every worker
    /// once its current job returns. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let dropped = self.queue.shutdown();
        if !dropped.is_empty() {
            tracing::warn!(
                "Worker pool {} dropping {} queued jobs on shutdown",
                self.name,
                dropped.len()
            );
        }
        // dropping outside the queue lock, job guards may take other locks.
        drop(dropped);

        let workers: Vec<Worker> = recover(self.workers.lock()).drain(..).collect();
        let current = thread::current().id();
        for worker in workers {
            if worker.thread.thread().id() == current {
                continue;
            }
            if worker.thread.join().is_err() {
                tracing::error!("Worker {} of pool {} panicked", worker.id, self.name);
            }
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.queue.is_shutdown()
    }

    /// Number of jobs waiting for a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        recover(self.queue.state.lock()).jobs.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Worker {
    fn spawn(id: usize, pool_name: &str, queue: Arc<JobQueue>) -> CoordResult<Self> {
        let thread = thread::Builder::new()
            .name(format!("{pool_name}-{id}"))
            .spawn(move || {
                while let Some(job) = queue.pop() {
                    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        tracing::error!(
                            "Job on worker {} panicked: {}",
                            id,
                            panic_message(panic.as_ref())
                        );
                    }
                }
                tracing::debug!("Worker {} exiting", id);
            })
            .map_err(|err| CoordError::ThreadSpawn(err.to_string()))?;

        Ok(Self { id, thread })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

struct JobQueue {
    state: Mutex<JobQueueState>,
    condvar: Condvar,
}

struct JobQueueState {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(JobQueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn push(&self, job: Job) -> CoordResult<()> {
        let mut guard = recover(self.state.lock());
        if guard.shutdown {
            drop(guard);
            drop(job);
            return Err(CoordError::PoolShutdown);
        }
        guard.jobs.push_back(job);
        drop(guard);
        self.condvar.notify_one();
        Ok(())
    }

    fn push_all(&self, batch: Vec<Job>) -> CoordResult<()> {
        let mut guard = recover(self.state.lock());
        if guard.shutdown {
            drop(guard);
            drop(batch);
            return Err(CoordError::PoolShutdown);
        }
        guard.jobs.extend(batch);
        drop(guard);
        self.condvar.notify_all();
        Ok(())
    }

    fn pop(&self) -> Option<Job> {
        let mut guard = recover(self.state.lock());
        loop {
            if guard.shutdown {
                return None;
            }
            if let Some(job) = guard.jobs.pop_front() {
                return Some(job);
            }
            guard = recover(self.condvar.wait(guard));
        }
    }

    /// Marks the queue shut down and hands back the jobs that never ran.
    fn shutdown(&self) -> Vec<Job> {
        let mut guard = recover(self.state.lock());
        guard.shutdown = true;
        let dropped = guard.jobs.drain(..).collect();
        drop(guard);
        self.condvar.notify_all();
        dropped
    }

    fn is_shutdown(&self) -> bool {
        recover(self.state.lock()).shutdown
    }
}
