//! JSON tool surface
//!
//! Every operation an LLM runtime may call, with plain scalar arguments in
//! and a JSON value out. Failures never escape as faults: they come back as
//! `success: false` with a stable `error_kind`.

use std::sync::Arc;

use agentpay_core::{AgentName, AgentProfile, AgentRole, Amount, NewAgent};
use agentpay_ledger::{LedgerService, DEFAULT_HISTORY_LIMIT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::analysis::{AnalysisType, CleanOperation, Dataset, PatternType};
use crate::catalog::listings;
use crate::error::{AgentError, Result};
use crate::orchestrator::Orchestrator;
use crate::pricing::{count_words, quote, roi};

/// Tool description handed to the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Uniform tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_kind: None,
            message: None,
        }
    }

    pub fn failure(error: &AgentError) -> Self {
        Self {
            success: false,
            data: None,
            error_kind: Some(error.kind().to_string()),
            message: Some(error.to_string()),
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!(r#"{{"success":false,"error_kind":"serialization_error","message":"{}"}}"#, e))
    }
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegisterArgs {
    agent_name: String,
    agent_type: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    initial_balance_cents: Option<u64>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    hourly_rate_cents: Option<u64>,
    #[serde(default)]
    pricing_model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EarningArgs {
    agent_name: String,
    client_id: String,
    amount_cents: i64,
    description: String,
    #[serde(default)]
    task_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SpendingArgs {
    agent_name: String,
    recipient_id: String,
    amount_cents: i64,
    description: String,
    #[serde(default)]
    task_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TransferArgs {
    from_agent: String,
    to_agent: String,
    amount_cents: i64,
    description: String,
    #[serde(default)]
    task_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AgentArgs {
    agent_name: String,
}

#[derive(Debug, Deserialize)]
struct HistoryArgs {
    agent_name: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct QuoteArgs {
    service_type: String,
    #[serde(default = "default_complexity")]
    complexity: String,
    #[serde(default = "default_urgency")]
    urgency: String,
}

fn default_complexity() -> String {
    "medium".to_string()
}

fn default_urgency() -> String {
    "normal".to_string()
}

#[derive(Debug, Deserialize)]
struct RoiArgs {
    campaign_cost: f64,
    revenue_generated: f64,
}

#[derive(Debug, Deserialize)]
struct TextArgs {
    text: String,
}

#[derive(Debug, Deserialize)]
struct PlanArgs {
    user_prompt: String,
    required_agents: Vec<String>,
    #[serde(default)]
    workflow_steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HireArgs {
    agent_type: String,
    task_description: String,
    estimated_cost_cents: i64,
    #[serde(default)]
    data: Option<Dataset>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    data: Dataset,
    #[serde(default)]
    analysis_type: AnalysisType,
}

#[derive(Debug, Deserialize)]
struct CleanArgs {
    data: Dataset,
    operations: Vec<CleanOperation>,
}

#[derive(Debug, Deserialize)]
struct PatternArgs {
    data: Dataset,
    #[serde(default)]
    pattern_type: PatternType,
}

#[derive(Debug, Deserialize)]
struct FinalizeArgs {
    workflow_summary: String,
    total_cost_cents: i64,
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    Ok(serde_json::from_value(arguments)?)
}

fn agent(name: &str) -> Result<AgentName> {
    Ok(AgentName::parse(name)?)
}

fn non_negative(field: &str, cents: i64) -> Result<Amount> {
    u64::try_from(cents)
        .map(Amount::new)
        .map_err(|_| AgentError::invalid(format!("{} must not be negative", field)))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| {
        AgentError::Ledger(agentpay_core::LedgerError::SerializationError {
            message: e.to_string(),
        })
    })
}

// ============================================================================
// Registry
// ============================================================================

/// Dispatches tool calls onto the ledger and the orchestrator
#[derive(Clone)]
pub struct ToolRegistry {
    ledger: LedgerService,
    orchestrator: Arc<Orchestrator>,
}

impl ToolRegistry {
    pub fn new(ledger: LedgerService, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            ledger,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run a tool; never fails, errors are folded into the response
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResponse {
        debug!(tool = name, "Tool call");
        match self.dispatch(name, arguments).await {
            Ok(data) => ToolResponse::ok(data),
            Err(e) => {
                debug!(tool = name, kind = e.kind(), "Tool call failed");
                ToolResponse::failure(&e)
            }
        }
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "register_agent" => self.register_agent(parse(arguments)?).await,
            "record_earning" => {
                let args: EarningArgs = parse(arguments)?;
                let receipt = self
                    .ledger
                    .record_earning(
                        &agent(&args.agent_name)?,
                        &args.client_id,
                        Amount::positive(args.amount_cents)?,
                        &args.description,
                        args.task_details,
                    )
                    .await?;
                to_value(&receipt)
            }
            "record_spending" => {
                let args: SpendingArgs = parse(arguments)?;
                let receipt = self
                    .ledger
                    .record_spending(
                        &agent(&args.agent_name)?,
                        &args.recipient_id,
                        Amount::positive(args.amount_cents)?,
                        &args.description,
                        args.task_details,
                    )
                    .await?;
                to_value(&receipt)
            }
            "transfer" => {
                let args: TransferArgs = parse(arguments)?;
                let receipt = self
                    .ledger
                    .transfer(
                        &agent(&args.from_agent)?,
                        &agent(&args.to_agent)?,
                        Amount::positive(args.amount_cents)?,
                        &args.description,
                        args.task_details,
                    )
                    .await?;
                to_value(&receipt)
            }
            "get_agent_stats" => {
                let args: AgentArgs = parse(arguments)?;
                to_value(&self.ledger.get_stats(&agent(&args.agent_name)?).await?)
            }
            "check_balance" => {
                let args: AgentArgs = parse(arguments)?;
                to_value(&self.ledger.balance_summary(&agent(&args.agent_name)?).await?)
            }
            "get_earnings_history" => {
                let args: HistoryArgs = parse(arguments)?;
                let limit = args.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
                to_value(
                    &self
                        .ledger
                        .earnings_history(&agent(&args.agent_name)?, limit)
                        .await?,
                )
            }
            "get_quote" => {
                let args: QuoteArgs = parse(arguments)?;
                to_value(&quote(&args.service_type, &args.complexity, &args.urgency))
            }
            "calculate_roi" => {
                let args: RoiArgs = parse(arguments)?;
                to_value(&roi(args.campaign_cost, args.revenue_generated)?)
            }
            "count_words" => {
                let args: TextArgs = parse(arguments)?;
                Ok(json!({ "word_count": count_words(&args.text) }))
            }
            "list_specialists" => to_value(&listings()),
            "check_budget" => to_value(&self.orchestrator.check_budget().await),
            "create_execution_plan" => {
                let args: PlanArgs = parse(arguments)?;
                let plan = self
                    .orchestrator
                    .create_execution_plan(&args.user_prompt, &args.required_agents, args.workflow_steps)
                    .await;
                to_value(&plan)
            }
            "hire_agent" => {
                let args: HireArgs = parse(arguments)?;
                let estimate = non_negative("estimated_cost_cents", args.estimated_cost_cents)?;
                let report = self
                    .orchestrator
                    .hire_with_data(&args.agent_type, &args.task_description, estimate, args.data)
                    .await?;
                to_value(&report)
            }
            "finalize_workflow" => {
                let args: FinalizeArgs = parse(arguments)?;
                let cost = non_negative("total_cost_cents", args.total_cost_cents)?;
                let record = self
                    .orchestrator
                    .finalize_workflow(&args.workflow_summary, cost)
                    .await;
                to_value(&record)
            }
            "orchestrator_status" => to_value(&self.orchestrator.status().await),
            "analyze_data" => {
                let args: AnalyzeArgs = parse(arguments)?;
                to_value(&args.data.analyze(args.analysis_type)?)
            }
            "clean_data" => {
                let args: CleanArgs = parse(arguments)?;
                if args.operations.is_empty() {
                    return Err(AgentError::invalid("operations must not be empty"));
                }
                to_value(&args.data.clean(&args.operations))
            }
            "find_patterns" => {
                let args: PatternArgs = parse(arguments)?;
                to_value(&args.data.find_patterns(args.pattern_type))
            }
            other => Err(AgentError::invalid(format!("Unknown tool: {}", other))),
        }
    }

    async fn register_agent(&self, args: RegisterArgs) -> Result<Value> {
        let role = match args.role.as_deref() {
            None => AgentRole::Earner,
            Some(raw) => AgentRole::parse(raw)
                .ok_or_else(|| AgentError::invalid(format!("role must be spender or earner, got {}", raw)))?,
        };

        let profile = AgentProfile::new(args.agent_type, args.display_name)
            .with_categories(args.categories)
            .with_hourly_rate(args.hourly_rate_cents)
            .with_pricing_model(args.pricing_model);

        let name = agent(&args.agent_name)?;
        let request = match (role, args.initial_balance_cents) {
            (AgentRole::Spender, Some(seed)) => NewAgent::spender(name, profile, Amount::new(seed)),
            (AgentRole::Spender, None) => NewAgent::spender(name, profile, Amount::zero()),
            (AgentRole::Earner, _) => NewAgent::earner(name, profile),
        };

        let outcome = self.ledger.register(request).await?;
        let snapshot = to_value(outcome.snapshot())?;
        Ok(json!({
            "registered": outcome.is_new(),
            "already_exists": !outcome.is_new(),
            "agent": snapshot,
        }))
    }

    /// Specs for every tool, in a stable order
    pub fn specs(&self) -> Vec<ToolSpec> {
        tool_specs()
    }
}

fn spec(name: &str, description: &str, input_schema: Value) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn agent_name_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "agent_name": { "type": "string", "description": "Unique agent name" }
        },
        "required": ["agent_name"]
    })
}

fn payment_schema(payer: &str, payee: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            payer: { "type": "string" },
            payee: { "type": "string" },
            "amount_cents": { "type": "integer", "minimum": 1, "description": "Amount in cents" },
            "description": { "type": "string" },
            "task_details": { "type": "object", "description": "Optional task details stored with the transaction" }
        },
        "required": [payer, payee, "amount_cents", "description"]
    })
}

fn dataset_schema() -> Value {
    json!({
        "type": "object",
        "description": "Columns by name, each an array of numbers, strings or nulls of equal length",
        "additionalProperties": { "type": "array" }
    })
}

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        spec(
            "register_agent",
            "Register an agent in the ledger. Registering an existing name is a no-op that returns the stored record.",
            json!({
                "type": "object",
                "properties": {
                    "agent_name": { "type": "string" },
                    "agent_type": { "type": "string", "description": "e.g. 'ResearchAgent'" },
                    "display_name": { "type": "string" },
                    "role": { "type": "string", "enum": ["spender", "earner"] },
                    "initial_balance_cents": { "type": "integer", "minimum": 0, "description": "Seed balance, spenders only" },
                    "categories": { "type": "array", "items": { "type": "string" } },
                    "hourly_rate_cents": { "type": "integer", "minimum": 0 },
                    "pricing_model": { "type": "string" }
                },
                "required": ["agent_name", "agent_type"]
            }),
        ),
        spec(
            "record_earning",
            "Record a payment received by a registered agent from a client.",
            payment_schema("agent_name", "client_id"),
        ),
        spec(
            "record_spending",
            "Record a payment made by a registered agent. The recipient's own stats are not updated.",
            payment_schema("agent_name", "recipient_id"),
        ),
        spec(
            "transfer",
            "Pay one registered agent from another; both sides are booked together.",
            payment_schema("from_agent", "to_agent"),
        ),
        spec(
            "get_agent_stats",
            "Current balance, totals, transaction count and average size of an agent.",
            agent_name_schema(),
        ),
        spec(
            "check_balance",
            "Balance, total earned, total spent and net profit of an agent.",
            agent_name_schema(),
        ),
        spec(
            "get_earnings_history",
            "Most recent payments received by an agent, newest first.",
            json!({
                "type": "object",
                "properties": {
                    "agent_name": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": DEFAULT_HISTORY_LIMIT }
                },
                "required": ["agent_name"]
            }),
        ),
        spec(
            "get_quote",
            "Price quote for a service by type, complexity and urgency.",
            json!({
                "type": "object",
                "properties": {
                    "service_type": { "type": "string", "description": "data_analysis, content_writing, research, code_review, image_generation" },
                    "complexity": { "type": "string", "enum": ["simple", "medium", "complex"] },
                    "urgency": { "type": "string", "enum": ["normal", "urgent", "critical"] }
                },
                "required": ["service_type"]
            }),
        ),
        spec(
            "calculate_roi",
            "Return on investment of a campaign, as a percentage.",
            json!({
                "type": "object",
                "properties": {
                    "campaign_cost": { "type": "number" },
                    "revenue_generated": { "type": "number" }
                },
                "required": ["campaign_cost", "revenue_generated"]
            }),
        ),
        spec(
            "count_words",
            "Count whitespace-separated words in a text.",
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        ),
        spec(
            "list_specialists",
            "List the hireable specialist agents with their rates.",
            json!({ "type": "object", "properties": {} }),
        ),
        spec(
            "check_budget",
            "Orchestrator budget: total, spent, remaining and whether it came from the ledger.",
            json!({ "type": "object", "properties": {} }),
        ),
        spec(
            "create_execution_plan",
            "Estimate the cost of a plan from the specialists it needs and check it against the budget.",
            json!({
                "type": "object",
                "properties": {
                    "user_prompt": { "type": "string" },
                    "required_agents": { "type": "array", "items": { "type": "string" } },
                    "workflow_steps": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["user_prompt", "required_agents"]
            }),
        ),
        spec(
            "hire_agent",
            "Hire a specialist for a task. Denied when the estimated cost exceeds the remaining budget.",
            json!({
                "type": "object",
                "properties": {
                    "agent_type": { "type": "string", "enum": ["data_analyst", "content_writer", "researcher", "coding_specialist", "marketing_specialist"] },
                    "task_description": { "type": "string" },
                    "estimated_cost_cents": { "type": "integer", "minimum": 0 },
                    "data": dataset_schema()
                },
                "required": ["agent_type", "task_description", "estimated_cost_cents"]
            }),
        ),
        spec(
            "finalize_workflow",
            "Record a completed workflow with its total cost.",
            json!({
                "type": "object",
                "properties": {
                    "workflow_summary": { "type": "string" },
                    "total_cost_cents": { "type": "integer", "minimum": 0 }
                },
                "required": ["workflow_summary", "total_cost_cents"]
            }),
        ),
        spec(
            "orchestrator_status",
            "Orchestrator identity, budget, completed workflows and ledger snapshot.",
            json!({ "type": "object", "properties": {} }),
        ),
        spec(
            "analyze_data",
            "Descriptive statistics, a correlation matrix or a shape summary of a table.",
            json!({
                "type": "object",
                "properties": {
                    "data": dataset_schema(),
                    "analysis_type": { "type": "string", "enum": ["descriptive", "correlation", "summary"], "default": "descriptive" }
                },
                "required": ["data"]
            }),
        ),
        spec(
            "clean_data",
            "Remove duplicates, fill missing values, drop IQR outliers or min-max normalize a table.",
            json!({
                "type": "object",
                "properties": {
                    "data": dataset_schema(),
                    "operations": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["remove_duplicates", "fill_missing", "remove_outliers", "normalize"] }
                    }
                },
                "required": ["data", "operations"]
            }),
        ),
        spec(
            "find_patterns",
            "Half-over-half trends, z-score anomalies or frequent values per column of a table.",
            json!({
                "type": "object",
                "properties": {
                    "data": dataset_schema(),
                    "pattern_type": { "type": "string", "enum": ["trends", "anomalies", "clusters"], "default": "trends" }
                },
                "required": ["data"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specs_are_unique_objects() {
        let specs = tool_specs();
        assert_eq!(specs.len(), 19);
        let mut names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 19);
        assert!(specs.iter().all(|s| s.input_schema["type"] == "object"));
    }

    #[test]
    fn test_failure_shape() {
        let response = ToolResponse::failure(&AgentError::invalid("nope"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error_kind"], "invalid_arguments");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_negative_cost_rejected() {
        assert!(non_negative("x", -1).is_err());
        assert_eq!(non_negative("x", 0).unwrap(), Amount::zero());
    }
}
