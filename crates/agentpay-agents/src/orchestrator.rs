//! Orchestrator - the spender that hires specialists under a budget
//!
//! The budget gate is local: the orchestrator keeps a `BudgetTracker`
//! refreshed from its ledger row whenever the ledger answers, and falls
//! back to the tracker alone when it does not. The ledger itself never
//! refuses a spend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agentpay_core::{format_cents, AgentName, AgentProfile, AgentSnapshot, Amount, NewAgent, TransactionId};
use agentpay_ledger::{ConfigError, LedgerService};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::analysis::Dataset;
use crate::catalog::{register_all_specialists, SpecialistKind};
use crate::error::{AgentError, Result};
use crate::executor::TaskExecutor;
use crate::specialist::{Specialist, TaskReport};

pub const DEFAULT_ORCHESTRATOR_ID: &str = "orchestrator-001";
/// $1000.00
pub const DEFAULT_BUDGET_CENTS: u64 = 100_000;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub agent_id: String,
    /// Seed budget used when the orchestrator is not yet in the ledger
    pub budget_cents: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_id: DEFAULT_ORCHESTRATOR_ID.to_string(),
            budget_cents: DEFAULT_BUDGET_CENTS,
        }
    }
}

impl OrchestratorConfig {
    /// Read `ORCHESTRATOR_ID` and `ORCHESTRATOR_BUDGET_CENTS`, loading `.env` first
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let agent_id = lookup("ORCHESTRATOR_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.agent_id);

        let budget_cents = match lookup("ORCHESTRATOR_BUDGET_CENTS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: "ORCHESTRATOR_BUDGET_CENTS".to_string(),
                value: raw,
            })?,
            None => defaults.budget_cents,
        };

        Ok(Self {
            agent_id,
            budget_cents,
        })
    }
}

// ============================================================================
// Budget
// ============================================================================

/// Local budget state, in cents
///
/// `spent` always includes `unrecorded`: spend whose payment never reached
/// the ledger. `reserved` holds the estimates of hires still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetTracker {
    pub total: i64,
    pub spent: i64,
    #[serde(default)]
    pub unrecorded: i64,
    #[serde(default)]
    pub reserved: i64,
}

fn cents(amount: Amount) -> i64 {
    i64::try_from(amount.0).unwrap_or(i64::MAX)
}

impl BudgetTracker {
    pub fn new(total: i64, spent: i64) -> Self {
        Self {
            total,
            spent,
            unrecorded: 0,
            reserved: 0,
        }
    }

    /// `total - spent`
    pub fn remaining(&self) -> i64 {
        self.total.saturating_sub(self.spent)
    }

    /// What remains once running hires are paid for
    pub fn available(&self) -> i64 {
        self.remaining().saturating_sub(self.reserved)
    }

    /// Whether a hire costing `cost` fits the available budget
    pub fn can_afford(&self, cost: Amount) -> bool {
        match i64::try_from(cost.0) {
            Ok(cost) => cost <= self.available(),
            Err(_) => false,
        }
    }

    /// Hold `cost` for a hire; `false` when it does not fit
    pub fn reserve(&mut self, cost: Amount) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.reserved = self.reserved.saturating_add(cents(cost));
        true
    }

    pub fn release(&mut self, cost: Amount) {
        self.reserved = self.reserved.saturating_sub(cents(cost)).max(0);
    }

    /// Charge a finished hire; `booked` is whether the ledger holds the payment
    pub fn record(&mut self, cost: Amount, booked: bool) {
        let cost = cents(cost);
        self.spent = self.spent.saturating_add(cost);
        if !booked {
            self.unrecorded = self.unrecorded.saturating_add(cost);
        }
    }

    /// Adopt the ledger's view, keeping spend the ledger never saw
    pub fn sync(&mut self, snapshot: &AgentSnapshot) {
        self.total = snapshot.funding_total();
        self.spent = cents(snapshot.total_spent).saturating_add(self.unrecorded);
    }
}

/// Where a budget reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetSource {
    Ledger,
    Local,
}

/// Budget reading returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub total_budget: String,
    pub spent: String,
    pub remaining: String,
    pub total_cents: i64,
    pub spent_cents: i64,
    pub remaining_cents: i64,
    pub can_spend: bool,
    pub source: BudgetSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl BudgetStatus {
    fn new(tracker: BudgetTracker, source: BudgetSource, note: Option<String>) -> Self {
        let remaining = tracker.remaining();
        Self {
            total_budget: format_cents(tracker.total),
            spent: format_cents(tracker.spent),
            remaining: format_cents(remaining),
            total_cents: tracker.total,
            spent_cents: tracker.spent,
            remaining_cents: remaining,
            can_spend: remaining > 0,
            source,
            note,
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of a hire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HireReport {
    pub kind: SpecialistKind,
    pub agent: AgentName,
    pub task: String,
    pub estimated_cost: Amount,
    pub cost: Amount,
    pub payment_recorded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    pub remaining_budget: i64,
    pub result: TaskReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub user_request: String,
    pub required_agents: Vec<String>,
    pub steps: Vec<String>,
    pub estimated_total_cost: Amount,
    pub remaining_budget: i64,
    /// `OK` or `INSUFFICIENT`
    pub budget_check: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: usize,
    pub summary: String,
    pub total_cost: Amount,
    pub completed_at: DateTime<Utc>,
    pub budget_remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub agent: AgentName,
    pub agent_type: String,
    pub budget: BudgetTracker,
    pub budget_total: String,
    pub spent: String,
    pub remaining: String,
    pub workflows_completed: usize,
    pub degraded: bool,
    pub ledger: Option<AgentSnapshot>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// The spender agent
pub struct Orchestrator {
    name: AgentName,
    ledger: LedgerService,
    specialists: BTreeMap<SpecialistKind, Arc<Specialist>>,
    seed_budget: Amount,
    tracker: RwLock<BudgetTracker>,
    workflows: RwLock<Vec<WorkflowRecord>>,
    degraded: AtomicBool,
    /// Orchestrator and specialists are known to the ledger
    registered: AtomicBool,
}

impl Orchestrator {
    /// Load the orchestrator's budget from the ledger, registering it with
    /// the configured seed on first run
    ///
    /// An unreachable ledger is not fatal: the orchestrator starts from the
    /// configured budget with nothing spent and is marked degraded.
    /// Registration is retried by later budget checks and hires.
    pub async fn bootstrap(
        config: &OrchestratorConfig,
        ledger: LedgerService,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self> {
        let name = AgentName::parse(&config.agent_id)?;

        let mut specialists = BTreeMap::new();
        for kind in SpecialistKind::ALL {
            let specialist = Specialist::new(kind, ledger.clone(), executor.clone())?;
            specialists.insert(kind, Arc::new(specialist));
        }

        let seeded = i64::try_from(config.budget_cents).map_err(|_| {
            AgentError::invalid(format!("budget of {} cents is too large", config.budget_cents))
        })?;

        let orchestrator = Self {
            name,
            ledger,
            specialists,
            seed_budget: Amount::new(config.budget_cents),
            tracker: RwLock::new(BudgetTracker::new(seeded, 0)),
            workflows: RwLock::new(Vec::new()),
            degraded: AtomicBool::new(false),
            registered: AtomicBool::new(false),
        };

        if let Err(e) = orchestrator.ensure_registered().await {
            warn!(
                agent = %orchestrator.name,
                kind = e.kind(),
                "Ledger unavailable, using local budget tracking"
            );
            orchestrator.degraded.store(true, Ordering::SeqCst);
        }

        let tracker = orchestrator.budget().await;
        info!(
            agent = %orchestrator.name,
            budget = tracker.total,
            spent = tracker.spent,
            degraded = orchestrator.is_degraded(),
            "Orchestrator ready"
        );

        Ok(orchestrator)
    }

    /// Register the orchestrator and the catalog unless already done
    ///
    /// Idempotent; concurrent callers may race.
    async fn ensure_registered(&self) -> Result<()> {
        if self.registered.load(Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = Self::load(&self.name, self.seed_budget, &self.ledger).await?;
        register_all_specialists(&self.ledger).await?;

        self.tracker.write().await.sync(&snapshot);
        self.registered.store(true, Ordering::SeqCst);
        self.degraded.store(false, Ordering::SeqCst);
        info!(agent = %self.name, "Orchestrator and specialists registered");
        Ok(())
    }

    fn note_ledger_failure(&self, error: &AgentError) {
        if let AgentError::Ledger(e) = error {
            if e.is_unreachable() {
                self.degraded.store(true, Ordering::SeqCst);
            }
        }
    }

    async fn load(name: &AgentName, seed_budget: Amount, ledger: &LedgerService) -> Result<AgentSnapshot> {
        if let Some(snapshot) = ledger.find(name).await? {
            info!(agent = %name, balance = snapshot.balance, "Loaded orchestrator from ledger");
            return Ok(snapshot);
        }

        let profile = AgentProfile::new(
            "Orchestrator",
            Some("AI Orchestrator (Generalized Agent)".to_string()),
        )
        .with_categories(vec![
            "Orchestration".to_string(),
            "Coordination".to_string(),
            "Management".to_string(),
        ]);
        let request = NewAgent::spender(name.clone(), profile, seed_budget);
        let outcome = ledger.register(request).await?;
        Ok(outcome.snapshot().clone())
    }

    pub fn name(&self) -> &AgentName {
        &self.name
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn specialist(&self, kind: SpecialistKind) -> Option<Arc<Specialist>> {
        self.specialists.get(&kind).cloned()
    }

    /// Current local tracker, without touching the ledger
    pub async fn budget(&self) -> BudgetTracker {
        *self.tracker.read().await
    }

    /// Refresh from the ledger when it answers, else report the local tracker
    pub async fn check_budget(&self) -> BudgetStatus {
        if let Err(e) = self.ensure_registered().await {
            warn!(agent = %self.name, kind = e.kind(), "Ledger registration still failing");
            self.note_ledger_failure(&e);
            let tracker = *self.tracker.read().await;
            let note = format!("Using local tracking (ledger error: {})", e.kind());
            return BudgetStatus::new(tracker, BudgetSource::Local, Some(note));
        }

        match self.ledger.find(&self.name).await {
            Ok(Some(snapshot)) => {
                let mut tracker = self.tracker.write().await;
                tracker.sync(&snapshot);
                self.degraded.store(false, Ordering::SeqCst);
                BudgetStatus::new(*tracker, BudgetSource::Ledger, None)
            }
            Ok(None) => {
                let tracker = *self.tracker.read().await;
                let note = "Using local tracking (orchestrator not in ledger)".to_string();
                BudgetStatus::new(tracker, BudgetSource::Local, Some(note))
            }
            Err(e) => {
                warn!(agent = %self.name, kind = e.kind(), "Budget refresh failed");
                if e.is_unreachable() {
                    self.degraded.store(true, Ordering::SeqCst);
                }
                let tracker = *self.tracker.read().await;
                let note = format!("Using local tracking (ledger error: {})", e.kind());
                BudgetStatus::new(tracker, BudgetSource::Local, Some(note))
            }
        }
    }

    fn denied(&self, cost: Amount, tracker: &BudgetTracker) -> AgentError {
        warn!(
            agent = %self.name,
            cost = cost.0,
            available = tracker.available(),
            "Hire denied: insufficient budget"
        );
        AgentError::InsufficientBudget {
            required: cost.0,
            remaining: tracker.available(),
        }
    }

    /// The budget gate: deny when `cost` exceeds what remains
    pub async fn authorize(&self, cost: Amount) -> Result<()> {
        let tracker = *self.tracker.read().await;
        if tracker.can_afford(cost) {
            return Ok(());
        }
        Err(self.denied(cost, &tracker))
    }

    /// Gate and hold `cost` under one lock
    async fn reserve(&self, cost: Amount) -> Result<()> {
        let mut tracker = self.tracker.write().await;
        if tracker.reserve(cost) {
            return Ok(());
        }
        Err(self.denied(cost, &tracker))
    }

    /// Gate, run the specialist, then pay it the actual price
    ///
    /// The estimate is held until the hire finishes, so concurrent hires
    /// cannot jointly overspend. The local tracker is charged even when the
    /// ledger write fails, and that spend survives later refreshes from the
    /// ledger. The payment is attempted once and never retried.
    pub async fn hire(&self, tag: &str, task: &str, estimated_cost: Amount) -> Result<HireReport> {
        self.hire_with_data(tag, task, estimated_cost, None).await
    }

    /// [`hire`](Self::hire) with a table for the specialist to work on
    pub async fn hire_with_data(
        &self,
        tag: &str,
        task: &str,
        estimated_cost: Amount,
        data: Option<Dataset>,
    ) -> Result<HireReport> {
        let kind = SpecialistKind::from_tag(tag)?;
        let specialist = self
            .specialist(kind)
            .ok_or_else(|| AgentError::UnknownAgentType {
                tag: tag.to_string(),
            })?;

        self.reserve(estimated_cost).await?;

        info!(agent = %self.name, hire = %kind, estimated = estimated_cost.0, "Hiring specialist");
        let result = match specialist
            .execute_task_with_data(task, self.name.as_str(), data, false)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.tracker.write().await.release(estimated_cost);
                return Err(e);
            }
        };
        let cost = result.earnings;

        let mut payment_recorded = false;
        let mut payment_error = None;
        let mut transaction_id = None;

        if !cost.is_zero() {
            let excerpt: String = task.chars().take(100).collect();
            let memo = serde_json::json!({
                "agent_type": kind.tag(),
                "task": task,
                "timestamp": Utc::now(),
            });
            let payment = match self.ensure_registered().await {
                Ok(()) => self
                    .ledger
                    .transfer(
                        &self.name,
                        specialist.name(),
                        cost,
                        &format!("{}: {}", kind.tag(), excerpt),
                        Some(memo),
                    )
                    .await
                    .map_err(AgentError::from),
                Err(e) => Err(e),
            };
            match payment {
                Ok(receipt) => {
                    payment_recorded = true;
                    transaction_id = Some(receipt.transaction.id);
                }
                Err(e) => {
                    warn!(
                        agent = %self.name,
                        payee = %specialist.name(),
                        kind = e.kind(),
                        "Work delivered but payment not recorded"
                    );
                    self.note_ledger_failure(&e);
                    payment_error = Some(e.kind().to_string());
                }
            }
        }

        let remaining_budget = {
            let mut tracker = self.tracker.write().await;
            tracker.release(estimated_cost);
            tracker.record(cost, payment_recorded);
            tracker.remaining()
        };

        info!(
            agent = %self.name,
            hire = %kind,
            cost = cost.0,
            remaining = remaining_budget,
            "Hire complete"
        );

        Ok(HireReport {
            kind,
            agent: specialist.name().clone(),
            task: task.to_string(),
            estimated_cost,
            cost,
            payment_recorded,
            payment_error,
            transaction_id,
            remaining_budget,
            result,
        })
    }

    /// Price a plan from catalog rates; unknown tags are listed, not priced
    pub async fn create_execution_plan(
        &self,
        user_request: &str,
        required_agents: &[String],
        steps: Vec<String>,
    ) -> ExecutionPlan {
        let mut total: u64 = 0;
        let mut unknown_agents = Vec::new();
        for tag in required_agents {
            match SpecialistKind::from_tag(tag) {
                Ok(kind) => total = total.saturating_add(kind.pricing().rate()),
                Err(_) => unknown_agents.push(tag.clone()),
            }
        }
        let estimated_total_cost = Amount::new(total);

        let remaining_budget = self.tracker.read().await.remaining();
        let fits = i64::try_from(total).map(|t| remaining_budget >= t).unwrap_or(false);

        ExecutionPlan {
            user_request: user_request.to_string(),
            required_agents: required_agents.to_vec(),
            steps,
            estimated_total_cost,
            remaining_budget,
            budget_check: if fits { "OK" } else { "INSUFFICIENT" }.to_string(),
            unknown_agents,
        }
    }

    /// Append a numbered workflow record
    pub async fn finalize_workflow(&self, summary: &str, total_cost: Amount) -> WorkflowRecord {
        let budget_remaining = self.tracker.read().await.remaining();
        let mut workflows = self.workflows.write().await;
        let record = WorkflowRecord {
            id: workflows.len() + 1,
            summary: summary.to_string(),
            total_cost,
            completed_at: Utc::now(),
            budget_remaining,
        };
        workflows.push(record.clone());

        info!(agent = %self.name, workflow = record.id, cost = total_cost.0, "Workflow finalized");
        record
    }

    pub async fn workflows(&self) -> Vec<WorkflowRecord> {
        self.workflows.read().await.clone()
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let ledger = match self.ledger.find(&self.name).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(agent = %self.name, kind = e.kind(), "Ledger snapshot unavailable");
                None
            }
        };
        let budget = *self.tracker.read().await;

        OrchestratorStatus {
            agent: self.name.clone(),
            agent_type: "Orchestrator (Spender)".to_string(),
            budget,
            budget_total: format_cents(budget.total),
            spent: format_cents(budget.spent),
            remaining: format_cents(budget.remaining()),
            workflows_completed: self.workflows.read().await.len(),
            degraded: self.is_degraded(),
            ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_budget_gate() {
        let tracker = BudgetTracker::new(1000, 900);
        assert_eq!(tracker.remaining(), 100);
        assert!(!tracker.can_afford(Amount::new(150)));
        assert!(tracker.can_afford(Amount::new(50)));
        assert!(tracker.can_afford(Amount::new(100)));
        assert!(!tracker.can_afford(Amount::new(u64::MAX)));
    }

    #[test]
    fn test_tracker_record_and_overspend() {
        let mut tracker = BudgetTracker::new(100, 0);
        tracker.record(Amount::new(150), true);
        assert_eq!(tracker.remaining(), -50);
        assert_eq!(tracker.unrecorded, 0);
        assert!(!tracker.can_afford(Amount::new(1)));
    }

    #[test]
    fn test_reservations_hold_budget() {
        let mut tracker = BudgetTracker::new(3000, 0);
        assert!(tracker.reserve(Amount::new(2500)));
        assert!(!tracker.reserve(Amount::new(2500)));
        assert_eq!(tracker.remaining(), 3000);
        assert_eq!(tracker.available(), 500);

        tracker.release(Amount::new(2500));
        assert!(tracker.reserve(Amount::new(2500)));
        tracker.release(Amount::new(9000));
        assert_eq!(tracker.reserved, 0);
    }

    #[test]
    fn test_unrecorded_spend_survives_sync() {
        use agentpay_core::AgentRecord;

        let name = AgentName::parse("orchestrator-001").unwrap();
        let request = NewAgent::spender(name, AgentProfile::new("Orchestrator", None), Amount::new(10_000));
        let snapshot = AgentRecord::register(request, Utc::now()).unwrap().snapshot();
        let mut tracker = BudgetTracker::new(10_000, 0);
        tracker.record(Amount::new(2500), false);
        tracker.sync(&snapshot);
        tracker.sync(&snapshot);

        assert_eq!(tracker.total, 10_000);
        assert_eq!(tracker.spent, 2500);
        assert_eq!(tracker.remaining(), 7500);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> =
            [("ORCHESTRATOR_ID", "planner-9"), ("ORCHESTRATOR_BUDGET_CENTS", "2500")]
                .into_iter()
                .collect();
        let config =
            OrchestratorConfig::from_lookup(|k: &str| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.agent_id, "planner-9");
        assert_eq!(config.budget_cents, 2500);

        let config = OrchestratorConfig::from_lookup(|_: &str| None).unwrap();
        assert_eq!(config.agent_id, DEFAULT_ORCHESTRATOR_ID);
        assert_eq!(config.budget_cents, DEFAULT_BUDGET_CENTS);

        let bad = OrchestratorConfig::from_lookup(|k: &str| {
            (k == "ORCHESTRATOR_BUDGET_CENTS").then(|| "lots".to_string())
        });
        assert!(matches!(bad, Err(ConfigError::InvalidValue { .. })));
    }
}
