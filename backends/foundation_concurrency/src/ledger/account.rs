use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::errors::{ArgumentError, CoordResult};
use crate::synca::recover;

/// Identity of an [`Account`], assigned in increasing order by the
/// [`crate::Bank`] that created it. The ordering is the global lock
/// order used by transfers.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AccountId(u64);

impl AccountId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acc-{}", self.0)
    }
}

/// A non-negative balance behind its own lock.
pub struct Account {
    id: AccountId,
    balance: Mutex<i64>,
}

impl Account {
    pub(crate) fn new(id: AccountId, initial_balance: i64) -> CoordResult<Self> {
        if initial_balance < 0 {
            return Err(ArgumentError::NegativeBalance(initial_balance).into());
        }
        Ok(Self {
            id,
            balance: Mutex::new(initial_balance),
        })
    }

    #[must_use]
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Reads the balance under the account's lock.
    #[must_use]
    pub fn balance(&self) -> i64 {
        *self.lock()
    }

    /// Adds `amount` to the balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `amount` is not positive or the
    /// balance would overflow.
    pub fn deposit(&self, amount: i64) -> CoordResult<()> {
        ensure_positive(amount)?;
        deposit_locked(&mut self.lock(), amount)
    }

    /// Subtracts `amount` if the balance covers it.
    ///
    /// Returns `Ok(false)` and leaves the balance alone when funds are
    /// insufficient, that is an ordinary outcome rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `amount` is not positive.
    pub fn withdraw(&self, amount: i64) -> CoordResult<bool> {
        ensure_positive(amount)?;
        Ok(withdraw_locked(&mut self.lock(), amount))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, i64> {
        recover(self.balance.lock())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("balance", &self.balance())
            .finish()
    }
}

pub(crate) fn ensure_positive(amount: i64) -> CoordResult<()> {
    if amount <= 0 {
        return Err(ArgumentError::NonPositiveAmount(amount).into());
    }
    Ok(())
}

/// Balance arithmetic shared by [`Account::deposit`] and transfers, which
/// already hold the lock.
pub(crate) fn deposit_locked(balance: &mut i64, amount: i64) -> CoordResult<()> {
    *balance = balance
        .checked_add(amount)
        .ok_or(ArgumentError::BalanceOverflow)?;
    Ok(())
}

pub(crate) fn withdraw_locked(balance: &mut i64, amount: i64) -> bool {
    if *balance >= amount {
        *balance -= amount;
        return true;
    }
    false
}
