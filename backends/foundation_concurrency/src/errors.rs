use crate::ledger::AccountId;

pub type CoordResult<T> = core::result::Result<T, CoordError>;

/// `ArgumentError` names the input a call rejected before it touched
/// any shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    /// A queue was requested with no room for any item.
    ZeroCapacity,

    /// Deposits, withdrawals and transfers only move strictly
    /// positive amounts.
    NonPositiveAmount(i64),

    /// Accounts cannot open below zero.
    NegativeBalance(i64),

    /// The deposit would push the balance past `i64::MAX`.
    BalanceOverflow,

    /// The account handle is not registered with the bank it was
    /// handed to.
    UnknownAccount(AccountId),

    /// A barrier needs at least one party.
    ZeroParties,

    /// A wave needs at least one task.
    ZeroTasks,

    /// A worker pool needs at least one thread.
    ZeroPoolSize,

    /// Every task of a wave must be resident at the barrier at the same
    /// time, so a wave can never be wider than the pool running it.
    WaveExceedsPool { tasks: usize, pool: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum CoordError {
    InvalidArgument(ArgumentError),

    /// A blocking call was cancelled through its `CancellationToken`,
    /// the shared state it was waiting on is unchanged.
    #[from(ignore)]
    Cancelled,

    /// One of the parties of a rendezvous could not arrive, every
    /// other party waiting on the same generation was released.
    #[from(ignore)]
    BrokenBarrier,

    /// The deadline given to the call passed first.
    #[from(ignore)]
    Timeout,

    /// The worker pool no longer accepts jobs.
    #[from(ignore)]
    PoolShutdown,

    /// The OS refused to start a worker thread.
    #[from(ignore)]
    ThreadSpawn(String),
}

impl CoordError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoordError::Timeout)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoordError::Cancelled)
    }

    #[must_use]
    pub fn is_broken_barrier(&self) -> bool {
        matches!(self, CoordError::BrokenBarrier)
    }
}

impl std::error::Error for CoordError {}

impl core::fmt::Display for CoordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for ArgumentError {}

impl core::fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
