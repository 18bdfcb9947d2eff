//! Runtime configuration for [`crate::WaveRunner`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable read by [`WaveConfig::from_env`] for the worker
/// pool size.
pub const POOL_SIZE_ENV: &str = "FOUNDATION_WAVE_THREADS";

/// Timeout used by [`crate::WaveRunner::execute_wave_default`] unless
/// configured otherwise.
pub const DEFAULT_WAVE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_THREAD_NAME: &str = "wave-worker";

/// Configuration for a [`crate::WaveRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveConfig {
    /// Number of worker threads, also the widest wave the runner accepts
    pool_size: usize,
    /// Prefix of every worker thread name
    thread_name: String,
    /// Deadline applied by `execute_wave_default`
    default_timeout: Duration,
}

impl WaveConfig {
    /// Creates a configuration for `pool_size` workers with default values.
    ///
    /// Defaults:
    /// - `thread_name`: `wave-worker`
    /// - `default_timeout`: 5 minutes
    #[must_use]
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            default_timeout: DEFAULT_WAVE_TIMEOUT,
        }
    }

    /// Sizes the pool from `FOUNDATION_WAVE_THREADS`, or from the
    /// platform's available parallelism when unset or invalid.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(get_num_threads())
    }

    #[must_use]
    pub fn pool_size(mut self, count: usize) -> Self {
        self.pool_size = count;
        self
    }

    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn get_pool_size(&self) -> usize {
        self.pool_size
    }

    #[must_use]
    pub fn get_thread_name(&self) -> &str {
        &self.thread_name
    }

    #[must_use]
    pub fn get_default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

/// [`get_max_threads`] returns the parallelism the platform reports,
/// or 1 if it cannot tell.
pub(crate) fn get_max_threads() -> usize {
    match std::thread::available_parallelism().ok().map(|s| s.get()) {
        Some(system_value) => {
            tracing::debug!("thread::available_parallelism() reported: {}", system_value);
            system_value
        }
        None => 1,
    }
}

/// [`get_num_threads`] fetches the desired pool size from
/// `FOUNDATION_WAVE_THREADS`, falling back to [`get_max_threads`].
pub(crate) fn get_num_threads() -> usize {
    let requested = env::var(POOL_SIZE_ENV).ok();
    match parse_pool_size(requested.as_deref()) {
        Some(count) => {
            tracing::debug!("Retrieved pool size {} from {}", count, POOL_SIZE_ENV);
            count
        }
        None => get_max_threads(),
    }
}

fn parse_pool_size(value: Option<&str>) -> Option<usize> {
    match value.and_then(|s| usize::from_str(s.trim()).ok()) {
        Some(count @ 1..) => Some(count),
        _ => None,
    }
}
