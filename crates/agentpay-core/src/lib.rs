//! AgentPay Core - Canonical types for the agent gig-economy ledger
//!
//! This crate holds the vocabulary every other AgentPay crate speaks:
//! - Identity: `AgentName` (stable, human readable), `AgentId`, `TransactionId`
//! - Money: `Amount` in cents, signed balances
//! - Records: `AgentRecord`, `AgentSnapshot`, `Transaction`
//! - Errors: `LedgerError` with stable kind codes
//!
//! # Bookkeeping Invariants
//!
//! 1. `balance == opening_balance + total_earned - total_spent`
//! 2. `total_earned` and `total_spent` never decrease
//! 3. Each recorded transaction bumps `transaction_count` by exactly one
//! 4. Transactions are immutable once written

pub mod account;
pub mod error;
pub mod transaction;
pub mod types;

pub use account::*;
pub use error::*;
pub use transaction::*;
pub use types::*;
