//! Credit ledger and admission gate.

mod gate;
mod ledger;
mod sqlite;
mod user;

pub use gate::{Admission, CreditGate, DEFAULT_CREDITS};
pub use ledger::{LedgerEntry, LedgerStore};
pub use sqlite::SqliteLedger;
pub use user::UserId;
