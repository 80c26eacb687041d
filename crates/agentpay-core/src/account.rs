//! Agent accounts and their bookkeeping arithmetic
//!
//! `AgentRecord` is the row the ledger keeps per agent. The earn/spend
//! arithmetic lives here, in one place, so every store applies postings the
//! same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::types::{AgentId, AgentName, AgentRole, AgentStatus, Amount};

/// Display metadata supplied at registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub display_name: String,
    pub agent_type: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_rate_cents: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_model: Option<String>,
}

impl AgentProfile {
    /// Build a profile, deriving the display name from the type when absent
    pub fn new(agent_type: impl Into<String>, display_name: Option<String>) -> Self {
        let agent_type = agent_type.into();
        let display_name = display_name
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| default_display_name(&agent_type));
        let categories = vec![agent_type.clone()];
        Self {
            display_name,
            agent_type,
            categories,
            hourly_rate_cents: None,
            pricing_model: None,
        }
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        if !categories.is_empty() {
            self.categories = categories;
        }
        self
    }

    pub fn with_hourly_rate(mut self, cents: Option<u64>) -> Self {
        self.hourly_rate_cents = cents;
        self
    }

    pub fn with_pricing_model(mut self, model: Option<String>) -> Self {
        self.pricing_model = model;
        self
    }
}

/// `"ResearchAgent"` -> `"Research Agent"`
fn default_display_name(agent_type: &str) -> String {
    match agent_type.strip_suffix("Agent") {
        Some(stem) if !stem.is_empty() && !stem.ends_with(' ') => format!("{} Agent", stem),
        _ => agent_type.to_string(),
    }
}

/// A registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: AgentName,
    pub role: AgentRole,
    pub profile: AgentProfile,
    /// One-time seed, honoured only for spenders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_balance: Option<Amount>,
}

impl NewAgent {
    pub fn earner(name: AgentName, profile: AgentProfile) -> Self {
        Self {
            name,
            role: AgentRole::Earner,
            profile,
            initial_balance: None,
        }
    }

    pub fn spender(name: AgentName, profile: AgentProfile, initial_balance: Amount) -> Self {
        Self {
            name,
            role: AgentRole::Spender,
            profile,
            initial_balance: Some(initial_balance),
        }
    }
}

/// The stored record for one economic participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: AgentName,
    pub role: AgentRole,
    pub profile: AgentProfile,
    pub balance: i64,
    /// Registration seed; zero for everyone but seeded spenders
    pub opening_balance: i64,
    pub hold: i64,
    pub total_earned: Amount,
    pub total_spent: Amount,
    pub transaction_count: u64,
    pub avg_transaction_size: u64,
    pub status: AgentStatus,
    pub rating: f64,
    pub completion_rate: f64,
    pub approval_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Materialize a fresh record from a registration request
    pub fn register(request: NewAgent, now: DateTime<Utc>) -> Result<Self> {
        let opening_balance = match (request.role, request.initial_balance) {
            (AgentRole::Spender, Some(seed)) => seed.to_signed()?,
            _ => 0,
        };

        Ok(Self {
            id: AgentId::new(),
            name: request.name,
            role: request.role,
            profile: request.profile,
            balance: opening_balance,
            opening_balance,
            hold: 0,
            total_earned: Amount::zero(),
            total_spent: Amount::zero(),
            transaction_count: 0,
            avg_transaction_size: 0,
            status: AgentStatus::Active,
            rating: 5.0,
            completion_rate: 100.0,
            approval_rate: 100.0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Payee side of a posting
    pub fn apply_earning(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        let total_earned = self
            .total_earned
            .checked_add(amount)
            .ok_or_else(|| overflow("total_earned"))?;
        self.commit(total_earned, self.total_spent, now)
    }

    /// Payer side of a posting
    pub fn apply_spending(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        let total_spent = self
            .total_spent
            .checked_add(amount)
            .ok_or_else(|| overflow("total_spent"))?;
        self.commit(self.total_earned, total_spent, now)
    }

    /// Compute every derived field first, then assign, so a failed posting
    /// leaves the record untouched.
    fn commit(&mut self, total_earned: Amount, total_spent: Amount, now: DateTime<Utc>) -> Result<()> {
        let transaction_count = self
            .transaction_count
            .checked_add(1)
            .ok_or_else(|| overflow("transaction_count"))?;
        let balance = derive_balance(self.opening_balance, total_earned, total_spent)?;
        let avg_transaction_size = average_size(total_earned, total_spent, transaction_count)?;

        self.total_earned = total_earned;
        self.total_spent = total_spent;
        self.transaction_count = transaction_count;
        self.balance = balance;
        self.avg_transaction_size = avg_transaction_size;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the stored balance agrees with the running totals
    pub fn is_balanced(&self) -> bool {
        derive_balance(self.opening_balance, self.total_earned, self.total_spent)
            .map(|b| b == self.balance)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot::from(self)
    }
}

fn overflow(field: &str) -> LedgerError {
    LedgerError::Overflow {
        message: format!("{} would overflow", field),
    }
}

/// `opening + earned - spent`
pub fn derive_balance(opening: i64, earned: Amount, spent: Amount) -> Result<i64> {
    let earned = earned.to_signed()?;
    let spent = spent.to_signed()?;
    opening
        .checked_add(earned)
        .and_then(|b| b.checked_sub(spent))
        .ok_or_else(|| overflow("balance"))
}

/// `(earned + spent) / count`, floor division, zero when nothing was recorded
pub fn average_size(earned: Amount, spent: Amount, count: u64) -> Result<u64> {
    if count == 0 {
        return Ok(0);
    }
    let volume = earned
        .checked_add(spent)
        .ok_or_else(|| overflow("transaction volume"))?;
    Ok(volume.0 / count)
}

/// Read-only view of an agent's financial state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: AgentName,
    pub display_name: String,
    pub role: AgentRole,
    pub balance: i64,
    pub opening_balance: i64,
    pub total_earned: Amount,
    pub total_spent: Amount,
    pub transaction_count: u64,
    pub avg_transaction_size: u64,
    pub status: AgentStatus,
    pub rating: f64,
    pub completion_rate: f64,
    pub approval_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl From<&AgentRecord> for AgentSnapshot {
    fn from(record: &AgentRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            display_name: record.profile.display_name.clone(),
            role: record.role,
            balance: record.balance,
            opening_balance: record.opening_balance,
            total_earned: record.total_earned,
            total_spent: record.total_spent,
            transaction_count: record.transaction_count,
            avg_transaction_size: record.avg_transaction_size,
            status: record.status,
            rating: record.rating,
            completion_rate: record.completion_rate,
            approval_rate: record.approval_rate,
            updated_at: record.updated_at,
        }
    }
}

impl AgentSnapshot {
    /// Everything the agent has been able to spend so far: seed plus earnings
    pub fn funding_total(&self) -> i64 {
        self.balance.saturating_add(self.total_spent.0 as i64)
    }

    pub fn net_profit(&self) -> i64 {
        (self.total_earned.0 as i64).saturating_sub(self.total_spent.0 as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn earner(name: &str) -> AgentRecord {
        let request = NewAgent::earner(
            AgentName::parse(name).unwrap(),
            AgentProfile::new("DataAnalyst", None),
        );
        AgentRecord::register(request, Utc::now()).unwrap()
    }

    #[test]
    fn test_fresh_record_is_zeroed() {
        let record = earner("data-analyst-001");
        assert_eq!(record.balance, 0);
        assert_eq!(record.transaction_count, 0);
        assert_eq!(record.avg_transaction_size, 0);
        assert_eq!(record.status, AgentStatus::Active);
        assert!(record.is_balanced());
    }

    #[test]
    fn test_seed_only_applies_to_spenders() {
        let mut request = NewAgent::earner(
            AgentName::parse("writer").unwrap(),
            AgentProfile::new("ContentWriter", None),
        );
        request.initial_balance = Some(Amount::new(5_000));
        let record = AgentRecord::register(request, Utc::now()).unwrap();
        assert_eq!(record.balance, 0);

        let spender = NewAgent::spender(
            AgentName::parse("orchestrator-001").unwrap(),
            AgentProfile::new("Orchestrator", None),
            Amount::new(100_000),
        );
        let record = AgentRecord::register(spender, Utc::now()).unwrap();
        assert_eq!(record.balance, 100_000);
        assert_eq!(record.opening_balance, 100_000);
        assert_eq!(record.transaction_count, 0);
    }

    #[test]
    fn test_average_recomputation() {
        let mut record = earner("data-analyst-001");
        for cents in [100, 200, 300] {
            record.apply_earning(Amount::new(cents), Utc::now()).unwrap();
        }
        assert_eq!(record.total_earned, Amount::new(600));
        assert_eq!(record.transaction_count, 3);
        assert_eq!(record.avg_transaction_size, 200);
        assert_eq!(record.balance, 600);
    }

    #[test]
    fn test_spending_can_go_negative() {
        let mut record = earner("researcher-001");
        record.apply_earning(Amount::new(100), Utc::now()).unwrap();
        record.apply_spending(Amount::new(250), Utc::now()).unwrap();
        assert_eq!(record.balance, -150);
        assert_eq!(record.avg_transaction_size, 175);
        assert!(record.is_balanced());
    }

    #[test]
    fn test_overflow_leaves_record_untouched() {
        let mut record = earner("coder");
        record.apply_earning(Amount::new(10), Utc::now()).unwrap();
        let before = record.clone();

        let result = record.apply_earning(Amount::new(u64::MAX), Utc::now());
        assert!(matches!(result, Err(LedgerError::Overflow { .. })));
        assert_eq!(record, before);
    }

    #[test]
    fn test_default_display_name() {
        assert_eq!(AgentProfile::new("ResearchAgent", None).display_name, "Research Agent");
        assert_eq!(AgentProfile::new("Orchestrator", None).display_name, "Orchestrator");
        assert_eq!(
            AgentProfile::new("Agent", Some("Custom".to_string())).display_name,
            "Custom"
        );
    }

    #[test]
    fn test_funding_total_and_profit() {
        let spender = NewAgent::spender(
            AgentName::parse("orchestrator-001").unwrap(),
            AgentProfile::new("Orchestrator", None),
            Amount::new(1_000),
        );
        let mut record = AgentRecord::register(spender, Utc::now()).unwrap();
        record.apply_spending(Amount::new(900), Utc::now()).unwrap();

        let snapshot = record.snapshot();
        assert_eq!(snapshot.balance, 100);
        assert_eq!(snapshot.funding_total(), 1_000);
        assert_eq!(snapshot.net_profit(), -900);
    }
}
