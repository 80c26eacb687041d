//! Canonical types for AgentPay
//!
//! Identities and money. Everything that crosses the ledger boundary is
//! expressed with these types so the store never sees raw strings or floats.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result};

// ============================================================================
// Identity Types
// ============================================================================

/// Human-readable, stable agent name (e.g. `data-analyst-001`)
///
/// Names are the lookup key of the ledger. They are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentName(String);

impl AgentName {
    /// Longest name accepted by the `agents` collection
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a name. Surrounding whitespace is dropped.
    pub fn parse(name: impl AsRef<str>) -> Result<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(LedgerError::InvalidName {
                message: "Agent name must not be empty".to_string(),
            });
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(LedgerError::InvalidName {
                message: format!("Agent name exceeds {} bytes", Self::MAX_LEN),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trim an external payer or payee label; only an empty label is rejected
pub fn counterparty(label: &str) -> Result<&str> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidName {
            message: "Counterparty must not be empty".to_string(),
        });
    }
    Ok(trimmed)
}

impl TryFrom<String> for AgentName {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<AgentName> for String {
    fn from(name: AgentName) -> Self {
        name.0
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-generated unique identifier for an agent row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique transaction identifier, generated at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn new() -> Self {
        Self(format!("tx_{}", Uuid::new_v4()))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Amount Types
// ============================================================================

/// A non-negative amount of money in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(pub u64);

impl Amount {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn new(cents: u64) -> Self {
        Self(cents)
    }

    /// Accept a signed amount from an untyped caller, rejecting anything <= 0
    pub fn positive(cents: i64) -> Result<Self> {
        if cents <= 0 {
            return Err(LedgerError::InvalidAmount {
                message: format!("Amount must be greater than zero, got {}", cents),
            });
        }
        Ok(Self(cents as u64))
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Signed view of this amount, for balance arithmetic
    pub fn to_signed(self) -> Result<i64> {
        i64::try_from(self.0).map_err(|_| LedgerError::Overflow {
            message: format!("{} cents does not fit a signed balance", self.0),
        })
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_cents(self.0 as i64))
    }
}

/// Render a signed number of cents as dollars, e.g. `-1234` -> `-$12.34`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

// ============================================================================
// Role & Status
// ============================================================================

/// Economic role of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Primarily initiates payments (the orchestrator)
    Spender,
    /// Primarily receives payments (specialists)
    Earner,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spender => "spender",
            Self::Earner => "earner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spender" => Some(Self::Spender),
            "earner" => Some(Self::Earner),
            _ => None,
        }
    }
}

impl Default for AgentRole {
    fn default() -> Self {
        Self::Earner
    }
}

/// Advisory activity flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_name_trims_and_rejects_empty() {
        let name = AgentName::parse("  researcher-001 ").unwrap();
        assert_eq!(name.as_str(), "researcher-001");

        assert!(matches!(
            AgentName::parse("   "),
            Err(LedgerError::InvalidName { .. })
        ));
        assert!(AgentName::parse("x".repeat(AgentName::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_counterparty_allows_long_labels() {
        let long = "c".repeat(AgentName::MAX_LEN * 2);
        assert_eq!(counterparty(&long).unwrap().len(), AgentName::MAX_LEN * 2);
        assert_eq!(counterparty("  client-9 ").unwrap(), "client-9");
        assert!(matches!(counterparty(" "), Err(LedgerError::InvalidName { .. })));
    }

    #[test]
    fn test_agent_name_deserialize_validates() {
        let ok: AgentName = serde_json::from_str("\"coder\"").unwrap();
        assert_eq!(ok.to_string(), "coder");
        assert!(serde_json::from_str::<AgentName>("\"\"").is_err());
    }

    #[test]
    fn test_positive_amount() {
        assert_eq!(Amount::positive(500).unwrap(), Amount::new(500));
        assert!(matches!(
            Amount::positive(0),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(Amount::positive(-10).is_err());
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(2505), "$25.05");
        assert_eq!(format_cents(-150), "-$1.50");
        assert_eq!(Amount::new(100_000).to_string(), "$1000.00");
    }

    #[test]
    fn test_role_round_trip_strings() {
        assert_eq!(AgentRole::parse("spender"), Some(AgentRole::Spender));
        assert_eq!(AgentRole::Earner.as_str(), "earner");
        assert_eq!(AgentRole::parse("broker"), None);
    }
}
