//! Store doubles for tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agentpay_core::{AgentName, AgentRecord, LedgerError, Result, Transaction};
use async_trait::async_trait;

use crate::memory::MemoryStore;
use crate::store::{InsertOutcome, LedgerStore, Posting, PostingReceipt, TransactionFilter};

/// A store that can be switched offline
///
/// While offline every call fails with `StoreUnreachable` and nothing is
/// written; while online it behaves like the wrapped [`MemoryStore`].
#[derive(Clone, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    offline: Arc<AtomicBool>,
}

impl FailingStore {
    /// Starts online
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts offline
    pub fn unreachable() -> Self {
        let store = Self::default();
        store.set_offline(true);
        store
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The backing state, reachable regardless of the switch
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnreachable {
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn find_agent(&self, name: &AgentName) -> Result<Option<AgentRecord>> {
        self.check()?;
        self.inner.find_agent(name).await
    }

    async fn insert_agent(&self, record: AgentRecord) -> Result<InsertOutcome> {
        self.check()?;
        self.inner.insert_agent(record).await
    }

    async fn apply_posting(&self, posting: Posting) -> Result<PostingReceipt> {
        self.check()?;
        self.inner.apply_posting(posting).await
    }

    async fn transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>> {
        self.check()?;
        self.inner.transactions(filter).await
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        self.check()?;
        self.inner.list_agents().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_switching_offline() {
        let store = FailingStore::new();
        assert!(store.ping().await.is_ok());

        store.set_offline(true);
        let err = store.list_agents().await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
