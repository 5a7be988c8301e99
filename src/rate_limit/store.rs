//! Account Store
//!
//! In-memory identity → account map owned by a single pool.
//!
//! Each account sits behind its own mutex so that refill-then-debit is atomic
//! per identity, while the map-level lock is only taken for writing when an
//! identity is inserted or removed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use super::account::{Account, AccountSnapshot};

/// In-memory account store
#[derive(Debug, Default)]
pub struct AccountStore {
    /// Account storage
    accounts: RwLock<HashMap<String, Mutex<Account>>>,

    /// Optional bound on tracked identities
    max_accounts: Option<usize>,
}

impl AccountStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `max_accounts` identities
    pub fn bounded(max_accounts: usize) -> Self {
        Self {
            accounts: RwLock::default(),
            max_accounts: Some(max_accounts),
        }
    }

    /// Run `f` against the account for `identity`, creating it if absent
    ///
    /// `f` runs with the account exclusively locked.
    pub fn with_account<R>(&self, identity: &str, f: impl FnOnce(&mut Account) -> R) -> R {
        {
            let accounts = read(&self.accounts);
            if let Some(account) = accounts.get(identity) {
                return f(&mut lock(account));
            }
        }

        let mut accounts = write(&self.accounts);

        if !accounts.contains_key(identity) {
            if let Some(max) = self.max_accounts {
                if accounts.len() >= max {
                    evict_oldest(&mut accounts, max);
                }
            }
            debug!(identity, "Created account");
        }

        let account = accounts
            .entry(identity.to_string())
            .or_insert_with(|| Mutex::new(Account::new()));

        // Holding the write lock, nobody else can reach this account
        f(account.get_mut().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copy of the account for `identity`, if tracked
    pub fn get(&self, identity: &str) -> Option<Account> {
        let accounts = read(&self.accounts);
        accounts.get(identity).map(|a| lock(a).clone())
    }

    /// Whether `identity` is tracked
    pub fn contains(&self, identity: &str) -> bool {
        read(&self.accounts).contains_key(identity)
    }

    /// Stop tracking `identity`
    pub fn remove(&self, identity: &str) -> Option<Account> {
        let mut accounts = write(&self.accounts);
        accounts
            .remove(identity)
            .map(|a| a.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Snapshots of every tracked account
    pub fn snapshots(&self) -> Vec<AccountSnapshot> {
        let accounts = read(&self.accounts);
        accounts
            .iter()
            .map(|(identity, account)| lock(account).snapshot(identity))
            .collect()
    }

    /// Remove accounts not seen since `cutoff_ms`; returns how many went
    pub fn remove_idle_since(&self, cutoff_ms: u64) -> usize {
        let mut accounts = write(&self.accounts);
        let before = accounts.len();

        accounts.retain(|_, account| {
            let account = account.get_mut().unwrap_or_else(PoisonError::into_inner);
            account.last_seen_ms >= cutoff_ms
        });

        before - accounts.len()
    }

    /// Clear all accounts
    pub fn clear(&self) {
        write(&self.accounts).clear();
    }

    /// Get account count
    pub fn len(&self) -> usize {
        read(&self.accounts).len()
    }

    /// Whether no accounts are tracked
    pub fn is_empty(&self) -> bool {
        read(&self.accounts).is_empty()
    }

    /// Configured identity bound
    pub fn max_accounts(&self) -> Option<usize> {
        self.max_accounts
    }
}

/// Fraction of the bound freed per eviction pass (1/16th)
const EVICTION_BATCH_DIVISOR: usize = 16;

/// Evict the least recently seen accounts so one more identity fits under `max`
///
/// Frees a batch of `max / 16` slots at once (at least one), so a full map is
/// scanned once per batch of new identities rather than on every insert.
/// Returns how many accounts were removed.
fn evict_oldest(accounts: &mut HashMap<String, Mutex<Account>>, max: usize) -> usize {
    let needed = (accounts.len() + 1).saturating_sub(max);
    let batch = (max / EVICTION_BATCH_DIVISOR).max(needed).min(accounts.len());
    if batch == 0 {
        return 0;
    }

    let mut by_age: Vec<(u64, String)> = accounts
        .iter_mut()
        .map(|(identity, account)| {
            let account = account.get_mut().unwrap_or_else(PoisonError::into_inner);
            (account.last_seen_ms, identity.clone())
        })
        .collect();

    if batch < by_age.len() {
        by_age.select_nth_unstable(batch - 1);
    }

    for (_, identity) in &by_age[..batch] {
        accounts.remove(identity);
    }

    warn!(
        evicted = batch,
        oldest = %by_age[0].1,
        remaining = accounts.len(),
        "Account limit reached, evicting oldest identities"
    );

    batch
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
