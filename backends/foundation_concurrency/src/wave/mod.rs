//! Wave execution: run N tasks on a worker pool, rendezvous at a barrier
//! and fold their results with a single combine step.

mod arena;
mod barrier;
mod pool;
mod runner;
mod tracker;

pub use arena::*;
pub use barrier::*;
pub use pool::*;
pub use runner::*;
pub use tracker::*;
