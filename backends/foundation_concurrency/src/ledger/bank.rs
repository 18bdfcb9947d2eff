use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::account::{deposit_locked, ensure_positive, withdraw_locked, Account, AccountId};
use crate::errors::{ArgumentError, CoordResult};
use crate::synca::recover;

/// `Bank` owns a set of [`Account`]s and moves money between them.
///
/// # Examples
///
/// ```
/// use foundation_concurrency::Bank;
///
/// let bank = Bank::new();
/// let first = bank.create_account(100).unwrap();
/// let second = bank.create_account(50).unwrap();
///
/// assert!(bank.transfer(&first, &second, 30).unwrap());
/// assert_eq!((first.balance(), second.balance()), (70, 80));
///
/// assert!(!bank.transfer(&first, &second, 1000).unwrap());
/// assert_eq!(bank.total_balance(), 150);
/// ```
pub struct Bank {
    next_id: AtomicU64,
    accounts: RwLock<BTreeMap<AccountId, Arc<Account>>>,
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

impl Bank {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            accounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Opens and registers a new account.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `initial_balance` is negative.
    pub fn create_account(&self, initial_balance: i64) -> CoordResult<Arc<Account>> {
        if initial_balance < 0 {
            return Err(ArgumentError::NegativeBalance(initial_balance).into());
        }

        let id = AccountId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let account = Arc::new(Account::new(id, initial_balance)?);
        recover(self.accounts.write()).insert(id, Arc::clone(&account));

        tracing::debug!("Opened account {} with balance {}", id, initial_balance);
        Ok(account)
    }

    /// Moves `amount` from `from` to `to` atomically.
    ///
    /// Returns `Ok(false)` with both balances untouched when `from` cannot
    /// cover the amount. A transfer from an account to itself moves
    /// nothing and also returns `Ok(false)`.
    ///
    /// The two account locks are always taken in ascending [`AccountId`]
    /// order regardless of direction, and both are held until the
    /// deposit has been applied, so no other thread ever observes the
    /// money in flight.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `amount` is not positive or either
    /// account is not registered with this bank.
    pub fn transfer(&self, from: &Account, to: &Account, amount: i64) -> CoordResult<bool> {
        ensure_positive(amount)?;
        self.ensure_registered(from)?;
        self.ensure_registered(to)?;

        if from.id() == to.id() {
            tracing::debug!("Transfer from {} to itself is a no-op", from.id());
            return Ok(false);
        }

        let (first, second) = if from.id() < to.id() {
            (from, to)
        } else {
            (to, from)
        };

        let mut first_balance = first.lock();
        let mut second_balance = second.lock();

        let (from_balance, to_balance) = if from.id() < to.id() {
            (&mut *first_balance, &mut *second_balance)
        } else {
            (&mut *second_balance, &mut *first_balance)
        };

        if !withdraw_locked(from_balance, amount) {
            tracing::debug!(
                "Transfer of {} from {} to {} failed: insufficient funds",
                amount,
                from.id(),
                to.id()
            );
            return Ok(false);
        }

        if let Err(err) = deposit_locked(to_balance, amount) {
            // undo the withdrawal before either lock is released.
            *from_balance += amount;
            return Err(err);
        }

        tracing::debug!("Transferred {} from {} to {}", amount, from.id(), to.id());
        Ok(true)
    }

    /// Sums every account's balance.
    ///
    /// Each balance is read under its own lock, but the accounts are not
    /// locked together, so while transfers are in flight the sum may
    /// reflect a state that never existed. With no transfers in flight
    /// the result is exact.
    ///
    /// The sum is widened to `i128`: every balance fits in `i64`, their sum
    /// over many accounts may not.
    #[must_use]
    pub fn total_balance(&self) -> i128 {
        self.accounts()
            .iter()
            .map(|account| i128::from(account.balance()))
            .sum()
    }

    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<Arc<Account>> {
        recover(self.accounts.read()).get(&id).cloned()
    }

    /// Returns every registered account in ascending id order.
    #[must_use]
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        recover(self.accounts.read()).values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        recover(self.accounts.read()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_registered(&self, account: &Account) -> CoordResult<()> {
        let accounts = recover(self.accounts.read());
        match accounts.get(&account.id()) {
            Some(registered) if std::ptr::eq(Arc::as_ptr(registered), account) => Ok(()),
            _ => Err(ArgumentError::UnknownAccount(account.id()).into()),
        }
    }
}

impl std::fmt::Debug for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bank")
            .field("accounts", &self.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
