//! Specialist agents - do the work, price it, book the earning

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use agentpay_core::{AgentName, AgentSnapshot, Amount, NewAgent, TransactionId};
use agentpay_ledger::{LedgerService, RegisterOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::Dataset;
use crate::catalog::SpecialistKind;
use crate::error::{AgentError, Result};
use crate::executor::{TaskExecutor, TaskRequest};
use crate::pricing::{count_words, Pricing};

/// Longest task excerpt kept in a ledger description
const DESCRIPTION_EXCERPT: usize = 100;

/// Outcome of one finished task
///
/// A ledger failure does not fail the task; it shows up as
/// `earning_recorded = false` with the error kind in `ledger_error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub agent: AgentName,
    pub kind: SpecialistKind,
    pub task: String,
    pub client: String,
    pub output: String,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_billed: Option<f64>,
    pub earnings: Amount,
    pub total_earned: Amount,
    pub earning_recorded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    pub completed_at: DateTime<Utc>,
}

/// Local view of a specialist plus its ledger row, if readable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistStatus {
    pub agent: AgentName,
    pub kind: SpecialistKind,
    pub rate: String,
    pub total_earned: Amount,
    pub tasks_completed: u64,
    pub ledger: Option<AgentSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
}

/// One hireable agent
pub struct Specialist {
    kind: SpecialistKind,
    name: AgentName,
    ledger: LedgerService,
    executor: Arc<dyn TaskExecutor>,
    total_earned: AtomicU64,
    tasks_completed: AtomicU64,
}

impl Specialist {
    /// Specialist under its catalog name
    pub fn new(
        kind: SpecialistKind,
        ledger: LedgerService,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self> {
        Ok(Self::with_name(kind, kind.default_name()?, ledger, executor))
    }

    pub fn with_name(
        kind: SpecialistKind,
        name: AgentName,
        ledger: LedgerService,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            kind,
            name,
            ledger,
            executor,
            total_earned: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> SpecialistKind {
        self.kind
    }

    pub fn name(&self) -> &AgentName {
        &self.name
    }

    pub fn pricing(&self) -> Pricing {
        self.kind.pricing()
    }

    /// Earnings tracked in this process
    pub fn total_earned(&self) -> Amount {
        Amount::new(self.total_earned.load(Ordering::SeqCst))
    }

    /// Cost of `units` hours (or words, for per-word pricing)
    pub fn estimate(&self, units: f64) -> Amount {
        self.pricing().estimate(units)
    }

    /// Register this specialist as an earner
    pub async fn register(&self) -> Result<RegisterOutcome> {
        let request = NewAgent::earner(self.name.clone(), self.kind.profile());
        Ok(self.ledger.register(request).await?)
    }

    /// Run a task for `client` and price the result
    ///
    /// With `auto_charge` the price is booked as an earning paid by
    /// `client`. Executor failures fail the task; ledger failures do not.
    pub async fn execute_task(&self, task: &str, client: &str, auto_charge: bool) -> Result<TaskReport> {
        self.execute_task_with_data(task, client, None, auto_charge).await
    }

    /// [`execute_task`](Self::execute_task) with a table handed to the executor
    pub async fn execute_task_with_data(
        &self,
        task: &str,
        client: &str,
        data: Option<Dataset>,
        auto_charge: bool,
    ) -> Result<TaskReport> {
        if task.trim().is_empty() {
            return Err(AgentError::invalid("task description is empty"));
        }

        let request = TaskRequest {
            kind: self.kind,
            agent: self.name.to_string(),
            task: task.to_string(),
            client: client.to_string(),
            data,
        };

        info!(agent = %self.name, client, executor = self.executor.name(), "Executing task");
        let started = Instant::now();
        let output = self.executor.execute(&request).await.map_err(|e| {
            warn!(agent = %self.name, error = %e, "Task execution failed");
            e
        })?;
        let elapsed_hours = started.elapsed().as_secs_f64() / 3600.0;

        let pricing = self.pricing();
        let word_count = count_words(&output.text);
        let earnings = pricing.charge(elapsed_hours, &output.text);
        let hours_billed = pricing
            .hourly_rate()
            .map(|_| (elapsed_hours.max(1.0) * 100.0).round() / 100.0);

        let total_earned = self.total_earned.fetch_add(earnings.0, Ordering::SeqCst) + earnings.0;
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);

        let mut report = TaskReport {
            agent: self.name.clone(),
            kind: self.kind,
            task: task.to_string(),
            client: client.to_string(),
            output: output.text,
            word_count,
            hours_billed,
            earnings,
            total_earned: Amount::new(total_earned),
            earning_recorded: false,
            ledger_error: None,
            transaction_id: None,
            completed_at: Utc::now(),
        };

        if auto_charge && !earnings.is_zero() {
            let memo = serde_json::json!({
                "agent_type": self.kind.tag(),
                "task": task,
                "word_count": word_count,
            });
            match self
                .ledger
                .record_earning(&self.name, client, earnings, &self.describe(task, word_count), Some(memo))
                .await
            {
                Ok(receipt) => {
                    report.earning_recorded = true;
                    report.transaction_id = Some(receipt.transaction.id);
                }
                Err(e) => {
                    warn!(agent = %self.name, kind = e.kind(), "Task completed but earning not recorded");
                    report.ledger_error = Some(e.kind().to_string());
                }
            }
        }

        info!(agent = %self.name, earnings = earnings.0, "Task complete");
        Ok(report)
    }

    /// Ledger description of finished work
    pub fn describe(&self, task: &str, word_count: usize) -> String {
        match self.pricing() {
            Pricing::PerWord { .. } => format!("Created {}-word content", word_count),
            Pricing::Hourly { .. } => {
                let excerpt: String = task.chars().take(DESCRIPTION_EXCERPT).collect();
                format!("{}: {}", self.kind.entry().work_label, excerpt)
            }
        }
    }

    pub async fn status(&self) -> SpecialistStatus {
        let (ledger, ledger_error) = match self.ledger.find(&self.name).await {
            Ok(snapshot) => (snapshot, None),
            Err(e) => (None, Some(e.kind().to_string())),
        };

        SpecialistStatus {
            agent: self.name.clone(),
            kind: self.kind,
            rate: self.pricing().label(),
            total_earned: self.total_earned(),
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            ledger,
            ledger_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DeterministicExecutor;
    use agentpay_ledger::testing::FailingStore;

    fn specialist(kind: SpecialistKind, ledger: LedgerService) -> Specialist {
        Specialist::new(kind, ledger, Arc::new(DeterministicExecutor::new())).unwrap()
    }

    #[tokio::test]
    async fn test_hourly_task_books_one_hour_minimum() {
        let ledger = LedgerService::in_memory();
        let analyst = specialist(SpecialistKind::DataAnalyst, ledger.clone());
        analyst.register().await.unwrap();

        let report = analyst
            .execute_task("Summarize Q3 churn", "client-1", true)
            .await
            .unwrap();

        assert_eq!(report.earnings, Amount::new(2500));
        assert_eq!(report.hours_billed, Some(1.0));
        assert!(report.earning_recorded);
        assert!(report.transaction_id.is_some());

        let stats = ledger.get_stats(analyst.name()).await.unwrap();
        assert_eq!(stats.total_earned, Amount::new(2500));
        assert_eq!(stats.transaction_count, 1);

        let history = ledger.earnings_history(analyst.name(), 5).await.unwrap();
        assert_eq!(history.recent[0].purpose, "Data analysis: Summarize Q3 churn");
    }

    #[tokio::test]
    async fn test_writer_bills_per_word() {
        let ledger = LedgerService::in_memory();
        let writer = specialist(SpecialistKind::ContentWriter, ledger.clone());
        writer.register().await.unwrap();

        let report = writer.execute_task("Blog post", "client-2", true).await.unwrap();
        assert_eq!(report.word_count, count_words(&report.output));
        assert_eq!(report.earnings, Amount::new(report.word_count as u64 * 10));
        assert_eq!(report.hours_billed, None);

        let history = ledger.earnings_history(writer.name(), 1).await.unwrap();
        assert_eq!(
            history.recent[0].purpose,
            format!("Created {}-word content", report.word_count)
        );
    }

    #[tokio::test]
    async fn test_without_auto_charge_nothing_is_booked() {
        let ledger = LedgerService::in_memory();
        let coder = specialist(SpecialistKind::CodingSpecialist, ledger.clone());
        coder.register().await.unwrap();

        let report = coder.execute_task("Review PR", "orchestrator-001", false).await.unwrap();
        assert!(!report.earning_recorded);
        assert!(report.ledger_error.is_none());
        assert_eq!(coder.total_earned(), Amount::new(5000));
        assert_eq!(ledger.get_stats(coder.name()).await.unwrap().transaction_count, 0);
    }

    #[tokio::test]
    async fn test_ledger_outage_degrades_report() {
        let store = FailingStore::unreachable();
        let ledger = LedgerService::new(Arc::new(store));
        let researcher = specialist(SpecialistKind::Researcher, ledger);

        let report = researcher
            .execute_task("Fact-check the launch post", "client-3", true)
            .await
            .unwrap();

        assert!(!report.earning_recorded);
        assert_eq!(report.ledger_error.as_deref(), Some("store_unreachable"));
        assert_eq!(report.total_earned, Amount::new(3500));

        let status = researcher.status().await;
        assert!(status.ledger.is_none());
        assert_eq!(status.tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_analyst_reports_on_attached_data() {
        let analyst = specialist(SpecialistKind::DataAnalyst, LedgerService::in_memory());
        let data = Dataset::from_json(serde_json::json!({
            "month": ["Jan", "Feb", "Mar", "Apr"],
            "revenue": [10, 10, 5, 5],
        }))
        .unwrap();

        let report = analyst
            .execute_task_with_data("Revenue review", "client-4", Some(data), false)
            .await
            .unwrap();
        assert!(report.output.contains("revenue decreasing (-50.00%)"));
        assert_eq!(report.earnings, Amount::new(2500));
    }

    #[tokio::test]
    async fn test_empty_task_rejected() {
        let marketer = specialist(SpecialistKind::MarketingSpecialist, LedgerService::in_memory());
        let err = marketer.execute_task("  ", "client", true).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }
}
