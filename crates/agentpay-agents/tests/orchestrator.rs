//! Orchestrator flows over the in-process ledger

use std::sync::Arc;

use agentpay_agents::{
    AgentError, BudgetSource, DeterministicExecutor, Orchestrator, OrchestratorConfig,
    SpecialistKind, TaskExecutor, TaskOutput, TaskRequest,
};
use async_trait::async_trait;
use agentpay_core::{AgentName, AgentProfile, Amount, NewAgent};
use agentpay_ledger::testing::FailingStore;
use agentpay_ledger::{LedgerService, MemoryStore};

fn name(s: &str) -> AgentName {
    AgentName::parse(s).unwrap()
}

fn config(budget_cents: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        agent_id: "orchestrator-001".to_string(),
        budget_cents,
    }
}

async fn orchestrator(ledger: &LedgerService, budget_cents: u64) -> Orchestrator {
    Orchestrator::bootstrap(
        &config(budget_cents),
        ledger.clone(),
        Arc::new(DeterministicExecutor::new()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_bootstrap_registers_seeded_spender() {
    let ledger = LedgerService::in_memory();
    let orch = orchestrator(&ledger, 1_000).await;

    assert!(!orch.is_degraded());
    let stats = ledger.get_stats(&name("orchestrator-001")).await.unwrap();
    assert_eq!(stats.balance, 1_000);
    assert_eq!(stats.transaction_count, 0);
    // The five specialists are registered alongside
    assert_eq!(ledger.list_agents().await.unwrap().len(), 6);

    let budget = orch.check_budget().await;
    assert_eq!(budget.source, BudgetSource::Ledger);
    assert_eq!(budget.total_cents, 1_000);
    assert_eq!(budget.remaining_cents, 1_000);
    assert!(budget.can_spend);
}

#[tokio::test]
async fn test_budget_gate_from_ledger_spend() {
    let ledger = LedgerService::in_memory();
    let orch = orchestrator(&ledger, 1_000).await;

    ledger
        .record_spending(&name("orchestrator-001"), "vendor", Amount::new(900), "earlier work", None)
        .await
        .unwrap();

    let budget = orch.check_budget().await;
    assert_eq!(budget.spent_cents, 900);
    assert_eq!(budget.remaining_cents, 100);

    let denied = orch.authorize(Amount::new(150)).await.unwrap_err();
    assert_eq!(denied.kind(), "insufficient_budget");
    orch.authorize(Amount::new(50)).await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_reads_existing_budget() {
    let ledger = LedgerService::in_memory();
    let orch_name = name("orchestrator-001");
    ledger
        .register(NewAgent::spender(
            orch_name.clone(),
            AgentProfile::new("Orchestrator", None),
            Amount::new(5_000),
        ))
        .await
        .unwrap();
    ledger
        .record_spending(&orch_name, "vendor", Amount::new(1_200), "tools", None)
        .await
        .unwrap();

    // The configured seed is ignored once the ledger knows the agent
    let orch = orchestrator(&ledger, 999_999).await;
    let budget = orch.budget().await;
    assert_eq!(budget.total, 5_000);
    assert_eq!(budget.spent, 1_200);
    assert_eq!(budget.remaining(), 3_800);
}

#[tokio::test]
async fn test_hire_pays_specialist_in_one_posting() {
    let store = MemoryStore::new();
    let ledger = LedgerService::new(Arc::new(store.clone()));
    let orch = orchestrator(&ledger, 100_000).await;

    let report = orch
        .hire("researcher", "Compare three CRM vendors", Amount::new(3_500))
        .await
        .unwrap();

    assert_eq!(report.kind, SpecialistKind::Researcher);
    assert_eq!(report.cost, Amount::new(3_500));
    assert!(report.payment_recorded);
    assert!(report.transaction_id.is_some());
    assert_eq!(report.remaining_budget, 96_500);
    assert!(!report.result.earning_recorded);

    let orch_stats = ledger.get_stats(&name("orchestrator-001")).await.unwrap();
    let researcher = ledger.get_stats(&name("researcher-001")).await.unwrap();
    assert_eq!(orch_stats.total_spent, Amount::new(3_500));
    assert_eq!(orch_stats.balance, 96_500);
    assert_eq!(researcher.total_earned, Amount::new(3_500));
    assert_eq!(researcher.transaction_count, 1);
    assert_eq!(store.transaction_count().await, 1);

    let budget = orch.check_budget().await;
    assert_eq!(budget.remaining_cents, 96_500);
}

#[tokio::test]
async fn test_hire_over_budget_is_denied_without_work() {
    let store = MemoryStore::new();
    let ledger = LedgerService::new(Arc::new(store.clone()));
    let orch = orchestrator(&ledger, 1_000).await;

    let err = orch
        .hire("coding_specialist", "Rewrite the billing module", Amount::new(5_000))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "insufficient_budget");
    assert_eq!(store.transaction_count().await, 0);
    let coder = orch.specialist(SpecialistKind::CodingSpecialist).unwrap();
    assert_eq!(coder.total_earned(), Amount::zero());
}

#[tokio::test]
async fn test_unknown_agent_type() {
    let ledger = LedgerService::in_memory();
    let orch = orchestrator(&ledger, 1_000).await;

    let err = orch.hire("astrologer", "Read the stars", Amount::new(1)).await.unwrap_err();
    assert_eq!(err.kind(), "unknown_agent_type");
}

#[tokio::test]
async fn test_unreachable_ledger_falls_back_to_local_tracking() {
    let store = FailingStore::unreachable();
    let ledger = LedgerService::new(Arc::new(store.clone()));
    let orch = orchestrator(&ledger, 10_000).await;

    assert!(orch.is_degraded());
    let budget = orch.check_budget().await;
    assert_eq!(budget.source, BudgetSource::Local);
    assert_eq!(budget.remaining_cents, 10_000);
    assert!(budget.note.is_some());

    let report = orch
        .hire("data_analyst", "Chart weekly signups", Amount::new(2_500))
        .await
        .unwrap();
    assert!(!report.payment_recorded);
    assert_eq!(report.payment_error.as_deref(), Some("store_unreachable"));

    // The local tracker still carries the spend
    assert_eq!(orch.budget().await.spent, 2_500);
    assert_eq!(orch.check_budget().await.remaining_cents, 7_500);
    assert_eq!(store.inner().transaction_count().await, 0);

    let status = orch.status().await;
    assert!(status.degraded);
    assert!(status.ledger.is_none());
}

#[tokio::test]
async fn test_execution_plan_and_workflows() {
    let ledger = LedgerService::in_memory();
    let orch = orchestrator(&ledger, 5_000).await;

    let agents = vec![
        "data_analyst".to_string(),
        "researcher".to_string(),
        "wizard".to_string(),
    ];
    let plan = orch
        .create_execution_plan("Market report", &agents, vec!["research".into(), "analyze".into()])
        .await;
    assert_eq!(plan.estimated_total_cost, Amount::new(6_000));
    assert_eq!(plan.budget_check, "INSUFFICIENT");
    assert_eq!(plan.unknown_agents, vec!["wizard".to_string()]);

    let plan = orch
        .create_execution_plan("Blog post", &["content_writer".to_string()], vec![])
        .await;
    assert_eq!(plan.budget_check, "OK");

    let first = orch.finalize_workflow("Report delivered", Amount::new(2_500)).await;
    let second = orch.finalize_workflow("Post delivered", Amount::new(300)).await;
    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);
    assert_eq!(second.budget_remaining, 5_000);

    let status = orch.status().await;
    assert_eq!(status.workflows_completed, 2);
    assert_eq!(status.budget_total, "$50.00");
    assert!(status.ledger.is_some());
}

#[tokio::test]
async fn test_spend_during_outage_survives_ledger_refresh() {
    let store = FailingStore::new();
    let ledger = LedgerService::new(Arc::new(store.clone()));
    let orch = orchestrator(&ledger, 10_000).await;
    assert!(!orch.is_degraded());

    store.set_offline(true);
    let report = orch
        .hire("data_analyst", "Chart weekly signups", Amount::new(2_500))
        .await
        .unwrap();
    assert!(!report.payment_recorded);
    assert!(orch.is_degraded());

    store.set_offline(false);
    let budget = orch.check_budget().await;
    assert_eq!(budget.source, BudgetSource::Ledger);
    assert_eq!(budget.spent_cents, 2_500);
    assert_eq!(budget.remaining_cents, 7_500);
    assert!(!orch.is_degraded());

    let report = orch
        .hire("researcher", "Fact-check the deck", Amount::new(3_500))
        .await
        .unwrap();
    assert!(report.payment_recorded);

    let budget = orch.check_budget().await;
    assert_eq!(budget.spent_cents, 6_000);
    assert_eq!(budget.remaining_cents, 4_000);
}

#[tokio::test]
async fn test_registration_retried_after_outage_at_startup() {
    let store = FailingStore::unreachable();
    let ledger = LedgerService::new(Arc::new(store.clone()));
    let orch = orchestrator(&ledger, 10_000).await;
    assert!(orch.is_degraded());

    orch.hire("data_analyst", "Chart weekly signups", Amount::new(2_500))
        .await
        .unwrap();

    store.set_offline(false);
    let budget = orch.check_budget().await;
    assert_eq!(budget.source, BudgetSource::Ledger);
    assert_eq!(budget.total_cents, 10_000);
    assert_eq!(budget.spent_cents, 2_500);
    assert!(!orch.is_degraded());
    assert_eq!(ledger.list_agents().await.unwrap().len(), 6);

    let report = orch
        .hire("researcher", "Compare three CRM vendors", Amount::new(3_500))
        .await
        .unwrap();
    assert!(report.payment_recorded);
    assert_eq!(store.inner().transaction_count().await, 1);

    let researcher = ledger.get_stats(&name("researcher-001")).await.unwrap();
    assert_eq!(researcher.total_earned, Amount::new(3_500));
}

#[tokio::test]
async fn test_hire_retries_registration_before_paying() {
    let store = FailingStore::unreachable();
    let ledger = LedgerService::new(Arc::new(store.clone()));
    let orch = orchestrator(&ledger, 10_000).await;

    store.set_offline(false);
    let report = orch
        .hire("coding_specialist", "Review the billing module", Amount::new(5_000))
        .await
        .unwrap();
    assert!(report.payment_recorded);
    assert!(!orch.is_degraded());

    let stats = ledger.get_stats(&name("orchestrator-001")).await.unwrap();
    assert_eq!(stats.total_spent, Amount::new(5_000));
    assert_eq!(stats.balance, 5_000);
}

#[tokio::test]
async fn test_concurrent_hires_cannot_overspend() {
    let store = MemoryStore::new();
    let ledger = LedgerService::new(Arc::new(store.clone()));
    let orch = orchestrator(&ledger, 3_000).await;

    let (first, second) = tokio::join!(
        orch.hire("data_analyst", "Segment users", Amount::new(2_500)),
        orch.hire("data_analyst", "Forecast churn", Amount::new(2_500)),
    );

    let results = [first, second];
    let hired = results.iter().filter(|r| r.is_ok()).count();
    let denied = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == "insufficient_budget"))
        .count();
    assert_eq!(hired, 1);
    assert_eq!(denied, 1);
    assert_eq!(store.transaction_count().await, 1);

    let budget = orch.budget().await;
    assert_eq!(budget.spent, 2_500);
    assert_eq!(budget.reserved, 0);
}

struct BrokenExecutor;

#[async_trait]
impl TaskExecutor for BrokenExecutor {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn execute(&self, _request: &TaskRequest) -> Result<TaskOutput, AgentError> {
        Err(AgentError::ExecutionFailed {
            message: "model offline".to_string(),
        })
    }
}

#[tokio::test]
async fn test_failed_hire_releases_its_hold() {
    let ledger = LedgerService::in_memory();
    let orch = Orchestrator::bootstrap(&config(3_000), ledger, Arc::new(BrokenExecutor))
        .await
        .unwrap();

    let err = orch
        .hire("data_analyst", "Segment users", Amount::new(2_500))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "execution_failed");

    let budget = orch.budget().await;
    assert_eq!(budget.reserved, 0);
    assert_eq!(budget.spent, 0);
    orch.authorize(Amount::new(3_000)).await.unwrap();
}
