//! AgentPay Agents - specialists, the orchestrator and the tool surface
//!
//! - **Specialist**: does paid work for a client and books the earning
//! - **Orchestrator**: the spender; hires specialists behind a budget gate
//! - **ToolRegistry**: exposes ledger and orchestrator operations as JSON tools
//!
//! # Key Principle
//!
//! **The model proposes, the ledger records.** Task output comes from a
//! pluggable [`TaskExecutor`]; prices, budget checks and postings are
//! computed here, deterministically.

pub mod analysis;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod pricing;
pub mod specialist;
pub mod tools;

pub use analysis::{
    AnalysisReport, AnalysisType, CleanOperation, CleanReport, Dataset, Finding, PatternReport,
    PatternType,
};
pub use catalog::{listings, register_all_specialists, CatalogEntry, SpecialistKind, SpecialistListing};
pub use error::{AgentError, Result};
pub use executor::{DeterministicExecutor, TaskExecutor, TaskOutput, TaskRequest};
pub use orchestrator::{
    BudgetSource, BudgetStatus, BudgetTracker, ExecutionPlan, HireReport, Orchestrator,
    OrchestratorConfig, OrchestratorStatus, WorkflowRecord,
};
pub use pricing::{count_words, quote, roi, Pricing, Quote, RoiReport};
pub use specialist::{Specialist, SpecialistStatus, TaskReport};
pub use tools::{tool_specs, ToolRegistry, ToolResponse, ToolSpec};
