//! Specialist catalog
//!
//! The set of hireable agent types is closed and known at compile time.

use agentpay_core::{AgentName, AgentProfile, NewAgent};
use agentpay_ledger::{LedgerService, RegisterOutcome};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AgentError, Result};
use crate::pricing::Pricing;

/// Hireable specialist types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    DataAnalyst,
    ContentWriter,
    Researcher,
    CodingSpecialist,
    MarketingSpecialist,
}

/// Static description of one specialist type
#[derive(Debug)]
pub struct CatalogEntry {
    pub kind: SpecialistKind,
    pub tag: &'static str,
    pub default_name: &'static str,
    pub display_name: &'static str,
    pub agent_type: &'static str,
    pub pricing: Pricing,
    pub categories: &'static [&'static str],
    pub description: &'static str,
    /// Prefix of the ledger description for finished work
    pub work_label: &'static str,
}

static CATALOG: [CatalogEntry; 5] = [
    CatalogEntry {
        kind: SpecialistKind::DataAnalyst,
        tag: "data_analyst",
        default_name: "data-analyst-001",
        display_name: "Data Analyst AI",
        agent_type: "DataAnalyst",
        pricing: Pricing::Hourly { cents_per_hour: 2500 },
        categories: &["Data Analysis", "Statistics", "Visualization"],
        description: "Analyzes datasets, computes statistics and builds visualizations",
        work_label: "Data analysis",
    },
    CatalogEntry {
        kind: SpecialistKind::ContentWriter,
        tag: "content_writer",
        default_name: "content-writer-001",
        display_name: "Content Writer AI",
        agent_type: "ContentWriter",
        pricing: Pricing::PerWord { cents_per_word: 10 },
        categories: &["Content Writing", "Copywriting", "Blogging"],
        description: "Writes blog posts, articles and marketing copy",
        work_label: "Content writing",
    },
    CatalogEntry {
        kind: SpecialistKind::Researcher,
        tag: "researcher",
        default_name: "researcher-001",
        display_name: "Research Specialist AI",
        agent_type: "Researcher",
        pricing: Pricing::Hourly { cents_per_hour: 3500 },
        categories: &["Research", "Fact-Checking", "Analysis"],
        description: "Researches topics, checks facts and summarizes sources",
        work_label: "Research task",
    },
    CatalogEntry {
        kind: SpecialistKind::CodingSpecialist,
        tag: "coding_specialist",
        default_name: "coding-specialist-001",
        display_name: "Coding Specialist AI",
        agent_type: "CodingSpecialist",
        pricing: Pricing::Hourly { cents_per_hour: 5000 },
        categories: &["Code Review", "Debugging", "Optimization"],
        description: "Reviews, debugs and optimizes code",
        work_label: "Coding task",
    },
    CatalogEntry {
        kind: SpecialistKind::MarketingSpecialist,
        tag: "marketing_specialist",
        default_name: "marketing-specialist-001",
        display_name: "Marketing Specialist AI",
        agent_type: "MarketingSpecialist",
        pricing: Pricing::Hourly { cents_per_hour: 4000 },
        categories: &["Marketing Strategy", "Campaigns", "Analytics"],
        description: "Plans campaigns, positions products and analyzes marketing performance",
        work_label: "Marketing task",
    },
];

impl SpecialistKind {
    pub const ALL: [SpecialistKind; 5] = [
        Self::DataAnalyst,
        Self::ContentWriter,
        Self::Researcher,
        Self::CodingSpecialist,
        Self::MarketingSpecialist,
    ];

    pub fn entry(&self) -> &'static CatalogEntry {
        let index = match self {
            Self::DataAnalyst => 0,
            Self::ContentWriter => 1,
            Self::Researcher => 2,
            Self::CodingSpecialist => 3,
            Self::MarketingSpecialist => 4,
        };
        &CATALOG[index]
    }

    pub fn tag(&self) -> &'static str {
        self.entry().tag
    }

    pub fn pricing(&self) -> Pricing {
        self.entry().pricing
    }

    /// Resolve a tag such as `content_writer`
    pub fn from_tag(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| AgentError::UnknownAgentType {
                tag: tag.to_string(),
            })
    }

    pub fn default_name(&self) -> Result<AgentName> {
        Ok(AgentName::parse(self.entry().default_name)?)
    }

    /// Profile written to the ledger on registration
    pub fn profile(&self) -> AgentProfile {
        let entry = self.entry();
        AgentProfile::new(entry.agent_type, Some(entry.display_name.to_string()))
            .with_categories(entry.categories.iter().map(|c| c.to_string()).collect())
            .with_hourly_rate(entry.pricing.hourly_rate())
            .with_pricing_model(Some(entry.pricing.label()))
    }
}

impl std::fmt::Display for SpecialistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Catalog row as shown to tool callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistListing {
    pub tag: String,
    pub name: String,
    pub display_name: String,
    pub pricing: Pricing,
    pub rate: String,
    pub categories: Vec<String>,
    pub description: String,
}

pub fn listings() -> Vec<SpecialistListing> {
    CATALOG
        .iter()
        .map(|entry| SpecialistListing {
            tag: entry.tag.to_string(),
            name: entry.default_name.to_string(),
            display_name: entry.display_name.to_string(),
            pricing: entry.pricing,
            rate: entry.pricing.label(),
            categories: entry.categories.iter().map(|c| c.to_string()).collect(),
            description: entry.description.to_string(),
        })
        .collect()
}

/// Register every catalog specialist as an earner under its default name
pub async fn register_all_specialists(ledger: &LedgerService) -> Result<Vec<RegisterOutcome>> {
    let mut outcomes = Vec::with_capacity(SpecialistKind::ALL.len());
    for kind in SpecialistKind::ALL {
        let request = NewAgent::earner(kind.default_name()?, kind.profile());
        outcomes.push(ledger.register(request).await?);
    }

    let created = outcomes.iter().filter(|o| o.is_new()).count();
    info!(created, total = outcomes.len(), "Specialists registered");
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_core::Amount;

    #[test]
    fn test_tags_round_trip() {
        for kind in SpecialistKind::ALL {
            assert_eq!(SpecialistKind::from_tag(kind.tag()).unwrap(), kind);
            assert_eq!(kind.entry().kind, kind);
        }
        let err = SpecialistKind::from_tag("astrologer").unwrap_err();
        assert_eq!(err.kind(), "unknown_agent_type");
    }

    #[test]
    fn test_profile_carries_pricing() {
        let writer = SpecialistKind::ContentWriter.profile();
        assert_eq!(writer.display_name, "Content Writer AI");
        assert_eq!(writer.hourly_rate_cents, None);
        assert_eq!(writer.pricing_model.as_deref(), Some("$0.10/word"));

        let coder = SpecialistKind::CodingSpecialist.profile();
        assert_eq!(coder.hourly_rate_cents, Some(5000));
        assert_eq!(coder.categories.len(), 3);
    }

    #[tokio::test]
    async fn test_register_all_is_idempotent() {
        let ledger = LedgerService::in_memory();
        let first = register_all_specialists(&ledger).await.unwrap();
        let second = register_all_specialists(&ledger).await.unwrap();

        assert!(first.iter().all(|o| o.is_new()));
        assert!(second.iter().all(|o| !o.is_new()));
        assert_eq!(ledger.list_agents().await.unwrap().len(), 5);

        let analyst = ledger
            .get_stats(&SpecialistKind::DataAnalyst.default_name().unwrap())
            .await
            .unwrap();
        assert_eq!(analyst.balance, 0);
        assert_eq!(analyst.total_earned, Amount::zero());
    }
}
