//! Error types for AgentPay ledger operations
//!
//! Every variant maps to a stable kind code so tool callers can branch on it
//! without parsing messages.

use thiserror::Error;

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Agent not found: {name}")]
    NotFound { name: String },

    #[error("Ledger store unreachable: {message}")]
    StoreUnreachable { message: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Invalid agent name: {message}")]
    InvalidName { message: String },

    #[error("Arithmetic overflow: {message}")]
    Overflow { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {message}")]
    SerializationError { message: String },
}

impl LedgerError {
    /// Stable machine-readable code
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::StoreUnreachable { .. } => "store_unreachable",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::InvalidName { .. } => "invalid_name",
            Self::Overflow { .. } => "overflow",
            Self::Store { .. } => "store_error",
            Self::SerializationError { .. } => "serialization_error",
        }
    }

    /// Whether the caller may continue on local, in-process state
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::StoreUnreachable { .. })
    }

    pub fn not_found(name: impl std::fmt::Display) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::SerializationError {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
