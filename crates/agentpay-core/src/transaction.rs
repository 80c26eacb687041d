//! Transaction records - the ledger's audit trail
//!
//! A transaction is written once and never mutated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentId, AgentName, Amount, TransactionId};

/// Kind of value movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Payment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
        }
    }
}

/// Settlement state; everything the ledger writes is already settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
        }
    }
}

/// An immutable record of one transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    /// Set only when the payer is a registered agent
    pub from_agent_id: Option<AgentId>,
    /// Payer name; may be an external identity such as a human client
    pub from_name: String,
    pub to_agent_id: Option<AgentId>,
    pub to_name: String,
    pub amount: Amount,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<serde_json::Value>,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// A completed payment with fresh id and timestamp; party ids are
    /// resolved by the store.
    pub fn payment(
        from_name: impl Into<String>,
        to_name: impl Into<String>,
        amount: Amount,
        purpose: impl Into<String>,
        memo: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            kind: TransactionKind::Payment,
            from_agent_id: None,
            from_name: from_name.into(),
            to_agent_id: None,
            to_name: to_name.into(),
            amount,
            purpose: purpose.into(),
            memo,
            status: TransactionStatus::Completed,
            timestamp: Utc::now(),
        }
    }

    pub fn touches(&self, name: &AgentName) -> bool {
        self.from_name == name.as_str() || self.to_name == name.as_str()
    }

    pub fn is_paid_to(&self, name: &AgentName) -> bool {
        self.to_name == name.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_defaults() {
        let tx = Transaction::payment("client-42", "writer-001", Amount::new(800), "Blog post", None);
        assert!(tx.id.0.starts_with("tx_"));
        assert_eq!(tx.kind, TransactionKind::Payment);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.from_agent_id.is_none());

        let writer = AgentName::parse("writer-001").unwrap();
        assert!(tx.touches(&writer));
        assert!(tx.is_paid_to(&writer));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Transaction::payment("a", "b", Amount::new(1), "x", None);
        let b = Transaction::payment("a", "b", Amount::new(1), "x", None);
        assert_ne!(a.id, b.id);
    }
}
