//! Creditgate - credit-gated image description service
//!
//! This crate puts a per-user prepaid credit ledger in front of an external
//! image description model. Each analysis request consumes exactly one credit,
//! checked and debited atomically per user before the model is called.

pub mod config;
pub mod credits;
pub mod error;
pub mod http;
pub mod vision;

pub use error::{CreditGateError, Result};
