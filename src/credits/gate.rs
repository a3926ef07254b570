//! Admission control over the credit ledger.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

use super::ledger::LedgerStore;
use super::user::UserId;
use crate::error::{CreditGateError, Result};

/// Allowance granted to a user the first time they are admitted.
pub const DEFAULT_CREDITS: i64 = 10;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// One credit was consumed
    Granted {
        /// Balance left after the debit
        remaining: i64,
    },
    /// The balance was below one credit; nothing was changed
    Denied,
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted { .. })
    }
}

/// Per-user credit gate.
///
/// Every read-modify-write against a user's balance runs while holding that
/// user's entry in the lock table. Users never contend with each other.
#[derive(Clone)]
pub struct CreditGate {
    /// Backing ledger
    store: Arc<dyn LedgerStore>,
    /// Allowance for unseen users
    default_credits: i64,
    /// One async mutex per user with an operation in flight
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of a user's critical section.
///
/// Dropping it releases the mutex and evicts the lock table entry once no
/// other task holds or waits on it.
struct UserLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl CreditGate {
    /// Create a gate granting [`DEFAULT_CREDITS`] to new users.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_default_credits(store, DEFAULT_CREDITS)
    }

    /// Create a gate with a custom starting allowance.
    pub fn with_default_credits(store: Arc<dyn LedgerStore>, default_credits: i64) -> Self {
        Self {
            store,
            default_credits,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn default_credits(&self) -> i64 {
        self.default_credits
    }

    /// Consume one credit for `user_id` if the balance allows it.
    ///
    /// The check runs on its own task so that a caller dropping this future
    /// cannot release the user lock between the read and the write.
    pub async fn admit(&self, user_id: &UserId) -> Result<Admission> {
        let gate = self.clone();
        let user_id = user_id.clone();
        tokio::spawn(async move { gate.admit_locked(&user_id).await }).await?
    }

    async fn admit_locked(&self, user_id: &UserId) -> Result<Admission> {
        let _lock = self.lock_user(user_id).await;

        self.store
            .ensure_exists(user_id, self.default_credits)
            .await?;

        let balance = self.store.get_balance(user_id).await?;
        trace!(user_id = %user_id, balance = ?balance, "Checking credits");

        match balance {
            Some(credits) if credits >= 1 => {
                let remaining = credits - 1;
                self.store.set_balance(user_id, remaining).await?;
                debug!(user_id = %user_id, remaining, "Credit consumed");
                Ok(Admission::Granted { remaining })
            }
            _ => {
                debug!(user_id = %user_id, "No credits left");
                Ok(Admission::Denied)
            }
        }
    }

    /// Read-only balance query. Unknown users report zero and stay unknown.
    pub async fn balance(&self, user_id: &UserId) -> Result<i64> {
        Ok(self.store.get_balance(user_id).await?.unwrap_or(0))
    }

    /// Add credits to a user's balance. Administrative only.
    pub async fn top_up(&self, user_id: &UserId, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(CreditGateError::InvalidAmount(amount));
        }
        let _lock = self.lock_user(user_id).await;
        let balance = self
            .store
            .top_up(user_id, amount, self.default_credits)
            .await?;
        debug!(user_id = %user_id, amount, balance, "Credits topped up");
        Ok(balance)
    }

    /// Overwrite a user's balance. Administrative only.
    pub async fn set_balance(&self, user_id: &UserId, amount: i64) -> Result<()> {
        let _lock = self.lock_user(user_id).await;
        self.store.set_balance(user_id, amount).await
    }

    /// Number of users with an operation currently holding or awaiting a lock.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    async fn lock_user(&self, user_id: &UserId) -> UserLock<'_> {
        let key = user_id.to_string();
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        UserLock {
            locks: &*self.locks,
            key,
            guard: Some(guard),
        }
    }
}
