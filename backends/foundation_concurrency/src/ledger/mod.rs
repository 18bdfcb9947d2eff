//! Balance store with deadlock-free transfers.
//!
//! Each [`Account`] guards its balance with its own mutex. [`Bank::transfer`]
//! holds both accounts' locks for the duration of the move, always taking
//! the lock of the account with the smaller [`AccountId`] first, so two
//! transfers running in opposite directions over the same pair can never
//! wait on each other in a cycle.

mod account;
mod bank;

pub use account::*;
pub use bank::*;
