//! Store boundary
//!
//! The ledger never mutates balances itself. It hands the store a `Posting`
//! and the store applies it as one atomic unit: the transaction row and every
//! touched agent's counters land together or not at all.

use agentpay_core::{
    AgentName, AgentRecord, AgentSnapshot, Amount, LedgerError, Result, Transaction,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of an idempotent insert
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(AgentRecord),
    /// A record with this name was already present; nothing was written
    Existing(AgentRecord),
}

/// One value movement, plus which registered agents it books against
#[derive(Debug, Clone)]
pub struct Posting {
    pub transaction: Transaction,
    /// Registered payer whose `total_spent` grows
    pub debit: Option<AgentName>,
    /// Registered payee whose `total_earned` grows
    pub credit: Option<AgentName>,
}

impl Posting {
    /// Payment into `payee` from an external payer
    pub fn earning(
        payee: &AgentName,
        payer: &str,
        amount: Amount,
        purpose: &str,
        memo: Option<serde_json::Value>,
    ) -> Self {
        Self {
            transaction: Transaction::payment(payer, payee.as_str(), amount, purpose, memo),
            debit: None,
            credit: Some(payee.clone()),
        }
    }

    /// Payment out of `payer`; the payee's own stats are left alone
    pub fn spending(
        payer: &AgentName,
        payee: &str,
        amount: Amount,
        purpose: &str,
        memo: Option<serde_json::Value>,
    ) -> Self {
        Self {
            transaction: Transaction::payment(payer.as_str(), payee, amount, purpose, memo),
            debit: Some(payer.clone()),
            credit: None,
        }
    }

    /// Both sides at once; payer and payee must differ
    pub fn transfer(
        payer: &AgentName,
        payee: &AgentName,
        amount: Amount,
        purpose: &str,
        memo: Option<serde_json::Value>,
    ) -> Result<Self> {
        let posting = Self {
            transaction: Transaction::payment(payer.as_str(), payee.as_str(), amount, purpose, memo),
            debit: Some(payer.clone()),
            credit: Some(payee.clone()),
        };
        posting.validate()?;
        Ok(posting)
    }

    /// Reject a posting that books the same agent on both sides
    pub fn validate(&self) -> Result<()> {
        match (&self.debit, &self.credit) {
            (Some(debit), Some(credit)) if debit == credit => Err(LedgerError::InvalidName {
                message: format!("Agent {} cannot pay itself", debit),
            }),
            _ => Ok(()),
        }
    }

    pub fn amount(&self) -> Amount {
        self.transaction.amount
    }

    /// Names that must already be registered, in lock order
    pub fn booked_names(&self) -> Vec<&AgentName> {
        let mut names: Vec<&AgentName> = self.debit.iter().chain(self.credit.iter()).collect();
        names.sort();
        names.dedup();
        names
    }
}

/// What the store committed for a posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingReceipt {
    pub transaction: Transaction,
    pub payer: Option<AgentSnapshot>,
    pub payee: Option<AgentSnapshot>,
}

/// Which side of a transaction to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Any,
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn matches(&self, tx: &Transaction, name: &AgentName) -> bool {
        match self {
            Self::Any => tx.touches(name),
            Self::Incoming => tx.to_name == name.as_str(),
            Self::Outgoing => tx.from_name == name.as_str(),
        }
    }
}

/// Transaction lookup, newest first
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub agent: AgentName,
    pub direction: Direction,
    pub limit: usize,
}

/// Persistence for agents and transactions
///
/// Implementations must make `insert_agent` and `apply_posting` atomic at
/// the store boundary; in-process locking in callers is not relied upon.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Short backend label for logs
    fn backend(&self) -> &'static str;

    /// Round-trip to the store
    async fn ping(&self) -> Result<()>;

    /// Exact-match lookup by name
    async fn find_agent(&self, name: &AgentName) -> Result<Option<AgentRecord>>;

    /// Insert unless the name is taken
    async fn insert_agent(&self, record: AgentRecord) -> Result<InsertOutcome>;

    /// Append the transaction and apply the counters of every booked agent.
    /// Fails with `NotFound` and writes nothing if a booked agent is missing.
    async fn apply_posting(&self, posting: Posting) -> Result<PostingReceipt>;

    async fn transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>>;

    async fn list_agents(&self) -> Result<Vec<AgentRecord>>;
}

pub(crate) fn missing(name: &AgentName) -> LedgerError {
    LedgerError::not_found(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> AgentName {
        AgentName::parse(s).unwrap()
    }

    #[test]
    fn test_posting_sides() {
        let earning = Posting::earning(&name("writer"), "client", Amount::new(5), "x", None);
        assert!(earning.debit.is_none());
        assert_eq!(earning.credit, Some(name("writer")));
        assert_eq!(earning.transaction.from_name, "client");

        let spending = Posting::spending(&name("orch"), "writer", Amount::new(5), "x", None);
        assert_eq!(spending.debit, Some(name("orch")));
        assert!(spending.credit.is_none());
    }

    #[test]
    fn test_booked_names_are_sorted() {
        let transfer =
            Posting::transfer(&name("zeta"), &name("alpha"), Amount::new(1), "x", None).unwrap();
        let names: Vec<&str> = transfer.booked_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_self_transfer_rejected() {
        let err = Posting::transfer(&name("orch"), &name("orch"), Amount::new(1), "x", None).unwrap_err();
        assert_eq!(err.kind(), "invalid_name");

        let mut forged = Posting::spending(&name("orch"), "orch", Amount::new(1), "x", None);
        assert!(forged.validate().is_ok());
        forged.credit = Some(name("orch"));
        assert!(forged.validate().is_err());
    }

    #[test]
    fn test_direction_matching() {
        let tx = Transaction::payment("orch", "writer", Amount::new(1), "x", None);
        assert!(Direction::Incoming.matches(&tx, &name("writer")));
        assert!(!Direction::Outgoing.matches(&tx, &name("writer")));
        assert!(Direction::Any.matches(&tx, &name("orch")));
    }
}
