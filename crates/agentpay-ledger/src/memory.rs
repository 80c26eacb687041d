//! In-process ledger store
//!
//! Used as the test fake and as the shadow ledger when the hosted store is
//! unreachable: no cross-process visibility, no durability.

use std::collections::HashMap;
use std::sync::Arc;

use agentpay_core::{AgentName, AgentRecord, Result, Transaction};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{
    missing, InsertOutcome, LedgerStore, Posting, PostingReceipt, TransactionFilter,
};

#[derive(Default)]
struct MemoryState {
    agents: HashMap<AgentName, AgentRecord>,
    /// Append-only
    transactions: Vec<Transaction>,
}

impl MemoryState {
    fn id_of(&self, label: &str) -> Option<agentpay_core::AgentId> {
        AgentName::parse(label)
            .ok()
            .and_then(|name| self.agents.get(&name))
            .map(|record| record.id.clone())
    }
}

/// Thread-safe in-memory store; clones share state
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of transactions held
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_agent(&self, name: &AgentName) -> Result<Option<AgentRecord>> {
        let state = self.state.read().await;
        Ok(state.agents.get(name).cloned())
    }

    async fn insert_agent(&self, record: AgentRecord) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.agents.get(&record.name) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        state.agents.insert(record.name.clone(), record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn apply_posting(&self, posting: Posting) -> Result<PostingReceipt> {
        posting.validate()?;
        let mut state = self.state.write().await;

        let amount = posting.amount();
        let now = posting.transaction.timestamp;

        // Work on copies; commit only once both sides succeeded.
        let mut payer = match &posting.debit {
            Some(name) => Some(state.agents.get(name).cloned().ok_or_else(|| missing(name))?),
            None => None,
        };
        let mut payee = match &posting.credit {
            Some(name) => Some(state.agents.get(name).cloned().ok_or_else(|| missing(name))?),
            None => None,
        };

        if let Some(record) = payer.as_mut() {
            record.apply_spending(amount, now)?;
        }
        if let Some(record) = payee.as_mut() {
            record.apply_earning(amount, now)?;
        }

        let mut transaction = posting.transaction;
        transaction.from_agent_id = state.id_of(&transaction.from_name);
        transaction.to_agent_id = state.id_of(&transaction.to_name);

        for record in payer.iter().chain(payee.iter()) {
            state.agents.insert(record.name.clone(), record.clone());
        }
        state.transactions.push(transaction.clone());

        Ok(PostingReceipt {
            transaction,
            payer: payer.map(|r| r.snapshot()),
            payee: payee.map(|r| r.snapshot()),
        })
    }

    async fn transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| filter.direction.matches(tx, &filter.agent))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let state = self.state.read().await;
        let mut agents: Vec<AgentRecord> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(agents)
    }
}
