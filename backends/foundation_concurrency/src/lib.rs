//! Thread coordination building blocks.
//!
//! - [`BoundedQueue`]: blocking FIFO with a fixed capacity for
//!   producer/consumer hand-off.
//! - [`Bank`]: accounts whose transfers lock both sides in a global order
//!   so concurrent transfers cannot deadlock.
//! - [`WaveRunner`]: runs a wave of tasks on a [`WorkerPool`], meets them
//!   at a [`GenerationBarrier`] and combines their results once.
//!
//! Every blocking call has a variant bounded by a deadline or by a
//! [`CancellationToken`].

pub mod config;
pub mod errors;
pub mod ledger;
pub mod queue;
pub mod synca;
pub mod wave;

pub use config::WaveConfig;
pub use errors::{ArgumentError, CoordError, CoordResult};
pub use ledger::{Account, AccountId, Bank};
pub use queue::BoundedQueue;
pub use synca::{CancellationToken, RunOnDrop};
pub use wave::{
    BarrierWaitResult, GenerationBarrier, ResultArena, SlotWriter, WavePhase, WaveRunner,
    WaveTracker, WorkerPool,
};
