#![cfg(test)]

use foundation_concurrency::{Account, ArgumentError, Bank, CoordError};
use ntest::timeout;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const ACCOUNTS: usize = 8;
const OPENING_BALANCE: i64 = 1_000;

fn open_bank(accounts: usize, opening: i64) -> (Arc<Bank>, Vec<Arc<Account>>) {
    let bank = Arc::new(Bank::new());
    let opened = (0..accounts)
        .map(|_| bank.create_account(opening).expect("should open account"))
        .collect();
    (bank, opened)
}

/// WHY: Money is neither created nor destroyed by concurrent transfers
/// WHAT: Many threads transferring random amounts between random accounts
/// finish without deadlock, the total is unchanged and no balance is negative
#[test]
#[timeout(30000)]
fn test_random_transfers_conserve_total() {
    let (bank, accounts) = open_bank(ACCOUNTS, OPENING_BALANCE);
    let expected_total = OPENING_BALANCE * ACCOUNTS as i64;
    let accounts = Arc::new(accounts);
    let applied = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8u64)
        .map(|seed| {
            let bank = Arc::clone(&bank);
            let accounts = Arc::clone(&accounts);
            let applied = Arc::clone(&applied);
            thread::spawn(move || {
                let mut rng = fastrand::Rng::with_seed(seed);
                for _ in 0..2_000 {
                    let from = &accounts[rng.usize(..ACCOUNTS)];
                    let to = &accounts[rng.usize(..ACCOUNTS)];
                    let amount = rng.i64(1..=300);
                    if bank.transfer(from, to, amount).expect("valid transfer") {
                        applied.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker should not deadlock or panic");
    }

    assert!(applied.load(Ordering::Relaxed) > 0);
    assert_eq!(bank.total_balance(), i128::from(expected_total));
    for account in accounts.iter() {
        assert!(account.balance() >= 0, "{} went negative", account.id());
    }
}

/// WHY: Lock ordering must hold when every thread pushes the same pair in
/// opposite directions at once
/// WHAT: Two groups hammer A->B and B->A; all complete and the pair keeps its sum
#[test]
#[timeout(20000)]
fn test_opposite_direction_transfers_complete() {
    let (bank, accounts) = open_bank(2, 500);
    let a = Arc::clone(&accounts[0]);
    let b = Arc::clone(&accounts[1]);

    let workers: Vec<_> = (0..6)
        .map(|i| {
            let bank = Arc::clone(&bank);
            let (from, to) = if i % 2 == 0 {
                (Arc::clone(&a), Arc::clone(&b))
            } else {
                (Arc::clone(&b), Arc::clone(&a))
            };
            thread::spawn(move || {
                for _ in 0..5_000 {
                    let _ = bank.transfer(&from, &to, 7).expect("valid transfer");
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("should join");
    }
    assert_eq!(a.balance() + b.balance(), 1_000);
}

/// WHY: Deposits and withdrawals racing with transfers stay consistent
/// WHAT: After matching deposits and withdrawals run alongside transfers,
/// the total equals the opening total plus net deposits
#[test]
#[timeout(20000)]
fn test_deposits_and_withdrawals_race_with_transfers() {
    let (bank, accounts) = open_bank(4, 100);
    let accounts = Arc::new(accounts);

    let depositor = {
        let accounts = Arc::clone(&accounts);
        thread::spawn(move || {
            for i in 0..1_000 {
                accounts[i % 4].deposit(3).expect("positive deposit");
            }
        })
    };
    let transferrer = {
        let bank = Arc::clone(&bank);
        let accounts = Arc::clone(&accounts);
        thread::spawn(move || {
            for i in 0..1_000 {
                let _ = bank
                    .transfer(&accounts[i % 4], &accounts[(i + 1) % 4], 5)
                    .expect("valid transfer");
            }
        })
    };

    depositor.join().expect("should join");
    transferrer.join().expect("should join");

    let mut withdrawn = 0;
    for account in accounts.iter() {
        if account.withdraw(10).expect("positive withdrawal") {
            withdrawn += 10;
        }
    }

    assert_eq!(bank.total_balance(), 400 + 3_000 - withdrawn);
}

/// WHY: Accounts from another bank must be rejected before any lock is taken
/// WHAT: Transferring into a foreign account yields UnknownAccount and leaves balances intact
#[test]
fn test_transfer_rejects_foreign_account() {
    let (bank, accounts) = open_bank(1, 100);
    let (_other_bank, foreign) = open_bank(1, 100);

    let result = bank.transfer(&accounts[0], &foreign[0], 10);
    assert_eq!(
        result,
        Err(CoordError::InvalidArgument(ArgumentError::UnknownAccount(
            foreign[0].id()
        )))
    );
    assert_eq!(accounts[0].balance(), 100);
    assert_eq!(foreign[0].balance(), 100);
    assert_eq!(bank.account(accounts[0].id()).map(|a| a.balance()), Some(100));
}
