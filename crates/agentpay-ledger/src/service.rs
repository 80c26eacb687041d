//! Ledger service - registry, recorder and stats reader

use std::sync::Arc;

use agentpay_core::{
    counterparty, AgentName, AgentRecord, AgentSnapshot, Amount, LedgerError, NewAgent, Result,
    Transaction,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::memory::MemoryStore;
use crate::store::{Direction, InsertOutcome, LedgerStore, Posting, PostingReceipt, TransactionFilter};

/// Default page size for history reads
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Result of a registration attempt; a repeat is not an error
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "agent", rename_all = "snake_case")]
pub enum RegisterOutcome {
    Registered(AgentSnapshot),
    AlreadyExists(AgentSnapshot),
}

impl RegisterOutcome {
    pub fn snapshot(&self) -> &AgentSnapshot {
        match self {
            Self::Registered(s) | Self::AlreadyExists(s) => s,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Registered(_))
    }
}

/// Financial summary of one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub agent: AgentName,
    pub current_balance: i64,
    pub total_earned: Amount,
    pub total_spent: Amount,
    pub net_profit: i64,
}

/// Incoming payments of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsHistory {
    pub agent: AgentName,
    pub total_earned: Amount,
    pub transaction_count: u64,
    pub recent: Vec<Transaction>,
}

/// The ledger over an injected store
///
/// All mutations go through [`LedgerStore::apply_posting`], so the service
/// holds no locks of its own. Nothing is retried: a failed write surfaces
/// to the caller exactly once.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Service over a fresh in-process store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    /// Whether the store answers
    pub async fn health(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.backend(), error = %e, "Ledger store ping failed");
                false
            }
        }
    }

    /// Register an agent, or return the existing record untouched
    pub async fn register(&self, request: NewAgent) -> Result<RegisterOutcome> {
        let name = request.name.clone();
        let record = AgentRecord::register(request, Utc::now())?;

        match self.store.insert_agent(record).await? {
            InsertOutcome::Inserted(record) => {
                info!(
                    agent = %name,
                    role = record.role.as_str(),
                    balance = record.balance,
                    "Registered agent"
                );
                Ok(RegisterOutcome::Registered(record.snapshot()))
            }
            InsertOutcome::Existing(record) => {
                debug!(agent = %name, "Agent already registered");
                Ok(RegisterOutcome::AlreadyExists(record.snapshot()))
            }
        }
    }

    /// Payment into a registered agent from any payer
    pub async fn record_earning(
        &self,
        payee: &AgentName,
        payer: &str,
        amount: Amount,
        description: &str,
        memo: Option<serde_json::Value>,
    ) -> Result<PostingReceipt> {
        ensure_positive(amount)?;
        let payer = counterparty(payer)?;

        let receipt = self
            .post(Posting::earning(payee, payer, amount, description, memo))
            .await?;
        info!(
            agent = %payee,
            from = %payer,
            amount = amount.0,
            tx = %receipt.transaction.id,
            "Recorded earning"
        );
        Ok(receipt)
    }

    /// Payment out of a registered agent; the payee's stats are not touched
    pub async fn record_spending(
        &self,
        payer: &AgentName,
        payee: &str,
        amount: Amount,
        description: &str,
        memo: Option<serde_json::Value>,
    ) -> Result<PostingReceipt> {
        ensure_positive(amount)?;
        let payee = counterparty(payee)?;

        let receipt = self
            .post(Posting::spending(payer, payee, amount, description, memo))
            .await?;
        info!(
            agent = %payer,
            to = %payee,
            amount = amount.0,
            tx = %receipt.transaction.id,
            "Recorded spending"
        );
        Ok(receipt)
    }

    /// Agent-to-agent payment, both sides in one atomic posting
    pub async fn transfer(
        &self,
        payer: &AgentName,
        payee: &AgentName,
        amount: Amount,
        description: &str,
        memo: Option<serde_json::Value>,
    ) -> Result<PostingReceipt> {
        ensure_positive(amount)?;
        let posting = Posting::transfer(payer, payee, amount, description, memo)?;

        let receipt = self
            .post(posting)
            .await?;
        info!(
            from = %payer,
            to = %payee,
            amount = amount.0,
            tx = %receipt.transaction.id,
            "Recorded transfer"
        );
        Ok(receipt)
    }

    async fn post(&self, posting: Posting) -> Result<PostingReceipt> {
        self.store.apply_posting(posting).await.map_err(|e| {
            warn!(backend = self.backend(), kind = e.kind(), error = %e, "Posting rejected");
            e
        })
    }

    pub async fn find(&self, name: &AgentName) -> Result<Option<AgentSnapshot>> {
        Ok(self.store.find_agent(name).await?.map(|r| r.snapshot()))
    }

    /// Current snapshot, or `NotFound`
    pub async fn get_stats(&self, name: &AgentName) -> Result<AgentSnapshot> {
        self.find(name)
            .await?
            .ok_or_else(|| LedgerError::not_found(name))
    }

    pub async fn balance_summary(&self, name: &AgentName) -> Result<BalanceSummary> {
        let stats = self.get_stats(name).await?;
        Ok(BalanceSummary {
            net_profit: stats.net_profit(),
            agent: stats.name,
            current_balance: stats.balance,
            total_earned: stats.total_earned,
            total_spent: stats.total_spent,
        })
    }

    /// Most recent payments received, newest first
    pub async fn earnings_history(&self, name: &AgentName, limit: usize) -> Result<EarningsHistory> {
        let stats = self.get_stats(name).await?;
        let recent = self
            .store
            .transactions(TransactionFilter {
                agent: name.clone(),
                direction: Direction::Incoming,
                limit,
            })
            .await?;

        Ok(EarningsHistory {
            agent: stats.name,
            total_earned: stats.total_earned,
            transaction_count: stats.transaction_count,
            recent,
        })
    }

    /// Recent transactions on either side, newest first
    pub async fn transactions(&self, name: &AgentName, limit: usize) -> Result<Vec<Transaction>> {
        self.store
            .transactions(TransactionFilter {
                agent: name.clone(),
                direction: Direction::Any,
                limit,
            })
            .await
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentSnapshot>> {
        Ok(self
            .store
            .list_agents()
            .await?
            .iter()
            .map(AgentSnapshot::from)
            .collect())
    }
}

fn ensure_positive(amount: Amount) -> Result<()> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount {
            message: "amount must be greater than zero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_core::{AgentProfile, AgentRole};

    fn name(s: &str) -> AgentName {
        AgentName::parse(s).unwrap()
    }

    async fn ledger_with(names: &[&str]) -> LedgerService {
        let ledger = LedgerService::in_memory();
        for n in names {
            ledger
                .register(NewAgent::earner(name(n), AgentProfile::new("WriterAgent", None)))
                .await
                .unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn test_register_twice_returns_same_record() {
        let ledger = LedgerService::in_memory();
        let request = NewAgent::earner(name("writer"), AgentProfile::new("WriterAgent", None));

        let first = ledger.register(request.clone()).await.unwrap();
        let second = ledger.register(request).await.unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.snapshot().id, second.snapshot().id);
        assert_eq!(second.snapshot().display_name, "Writer Agent");
    }

    #[tokio::test]
    async fn test_spender_seed_is_not_a_transaction() {
        let ledger = LedgerService::in_memory();
        let outcome = ledger
            .register(NewAgent::spender(
                name("orch"),
                AgentProfile::new("Orchestrator", None),
                Amount::new(100_000),
            ))
            .await
            .unwrap();

        let stats = outcome.snapshot();
        assert_eq!(stats.role, AgentRole::Spender);
        assert_eq!(stats.balance, 100_000);
        assert_eq!(stats.transaction_count, 0);
        assert_eq!(stats.total_earned, Amount::zero());
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let ledger = ledger_with(&["writer"]).await;
        let result = ledger
            .record_earning(&name("writer"), "client", Amount::zero(), "x", None)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[tokio::test]
    async fn test_spending_leaves_payee_alone() {
        let ledger = ledger_with(&["orch", "writer"]).await;
        ledger
            .record_spending(&name("orch"), "writer", Amount::new(300), "hire", None)
            .await
            .unwrap();

        let orch = ledger.get_stats(&name("orch")).await.unwrap();
        let writer = ledger.get_stats(&name("writer")).await.unwrap();
        assert_eq!(orch.balance, -300);
        assert_eq!(orch.total_spent, Amount::new(300));
        assert_eq!(writer.transaction_count, 0);
    }

    #[tokio::test]
    async fn test_counterparty_labels_are_not_agent_names() {
        let ledger = ledger_with(&["writer"]).await;
        let client = format!("acct:{}", "9".repeat(200));

        let receipt = ledger
            .record_earning(&name("writer"), &client, Amount::new(250), "post", None)
            .await
            .unwrap();
        assert_eq!(receipt.transaction.from_name, client);
        assert!(receipt.transaction.from_agent_id.is_none());

        let vendor = "v".repeat(AgentName::MAX_LEN + 1);
        ledger
            .record_spending(&name("writer"), &vendor, Amount::new(50), "tools", None)
            .await
            .unwrap();
        assert_eq!(ledger.get_stats(&name("writer")).await.unwrap().balance, 200);

        let result = ledger
            .record_earning(&name("writer"), "  ", Amount::new(1), "x", None)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidName { .. })));
        let result = ledger
            .record_spending(&name("writer"), "", Amount::new(1), "x", None)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidName { .. })));
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let ledger = ledger_with(&["writer"]).await;
        let result = ledger
            .transfer(&name("writer"), &name("writer"), Amount::new(1), "x", None)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidName { .. })));
    }

    #[tokio::test]
    async fn test_balance_summary_and_history() {
        let ledger = ledger_with(&["writer"]).await;
        let writer = name("writer");
        ledger
            .record_earning(&writer, "client-a", Amount::new(400), "post", None)
            .await
            .unwrap();
        ledger
            .record_earning(&writer, "client-b", Amount::new(600), "post", None)
            .await
            .unwrap();
        ledger
            .record_spending(&writer, "tools-vendor", Amount::new(100), "tools", None)
            .await
            .unwrap();

        let summary = ledger.balance_summary(&writer).await.unwrap();
        assert_eq!(summary.current_balance, 900);
        assert_eq!(summary.net_profit, 900);

        let history = ledger.earnings_history(&writer, 1).await.unwrap();
        assert_eq!(history.total_earned, Amount::new(1000));
        assert_eq!(history.transaction_count, 3);
        assert_eq!(history.recent.len(), 1);
        assert_eq!(history.recent[0].from_name, "client-b");

        assert_eq!(ledger.transactions(&writer, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stats_for_unknown_agent() {
        let ledger = LedgerService::in_memory();
        let err = ledger.get_stats(&name("nobody")).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(ledger.health().await);
    }
}
