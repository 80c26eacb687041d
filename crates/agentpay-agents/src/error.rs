//! Agent-side errors

use agentpay_core::LedgerError;
use thiserror::Error;

/// Errors that can occur in specialist and orchestrator operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Insufficient budget: need {required}, have {remaining}")]
    InsufficientBudget { required: u64, remaining: i64 },

    #[error("Unknown agent type: {tag}")]
    UnknownAgentType { tag: String },

    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Task execution failed: {message}")]
    ExecutionFailed { message: String },
}

impl AgentError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::InsufficientBudget { .. } => "insufficient_budget",
            Self::UnknownAgentType { .. } => "unknown_agent_type",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::ExecutionFailed { .. } => "execution_failed",
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArguments {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
