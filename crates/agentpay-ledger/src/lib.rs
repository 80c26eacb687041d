//! AgentPay Ledger - balances and transactions for agents in the gig economy
//!
//! The ledger is:
//! - Name-keyed (one record per unique agent name, never deleted)
//! - Append-only (transactions are never mutated)
//! - Store-atomic (each posting lands with its counter updates or not at all)
//! - Advisory about budgets (balances may go negative; the orchestrator gates spend)
//!
//! # Invariants
//!
//! 1. `balance == opening_balance + total_earned - total_spent`
//! 2. `total_earned` and `total_spent` never decrease
//! 3. Every posting bumps `transaction_count` of each booked agent by one
//! 4. Non-positive amounts are rejected before anything is written

pub mod config;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{ConfigError, LedgerConfig, StoreBackend};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use service::{
    BalanceSummary, EarningsHistory, LedgerService, RegisterOutcome, DEFAULT_HISTORY_LIMIT,
};
pub use store::{
    Direction, InsertOutcome, LedgerStore, Posting, PostingReceipt, TransactionFilter,
};
