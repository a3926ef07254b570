//! Ledger store trait for abstracting the persisted credit table.

use async_trait::async_trait;

use super::user::UserId;
use crate::error::Result;

/// A single row of the credit ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub user_id: String,
    pub credits: i64,
}

/// Durable mapping from user id to credit balance.
///
/// Each method is a single atomic statement against the store. Sequences of
/// calls are not atomic; [`crate::credits::CreditGate`] serializes them per user.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance, or `None` if the user has no entry. Never creates one.
    async fn get_balance(&self, user_id: &UserId) -> Result<Option<i64>>;

    /// Insert or overwrite the balance. Negative amounts are rejected.
    async fn set_balance(&self, user_id: &UserId, amount: i64) -> Result<()>;

    /// Insert an entry holding `default_amount` if and only if none exists.
    async fn ensure_exists(&self, user_id: &UserId, default_amount: i64) -> Result<()>;

    /// Add `amount` to the balance, seeding absent users with `default_amount` first.
    ///
    /// Returns the resulting balance.
    async fn top_up(&self, user_id: &UserId, amount: i64, default_amount: i64) -> Result<i64>;

    /// Fetch the full entry for a user.
    async fn entry(&self, user_id: &UserId) -> Result<Option<LedgerEntry>> {
        Ok(self.get_balance(user_id).await?.map(|credits| LedgerEntry {
            user_id: user_id.to_string(),
            credits,
        }))
    }
}
