//! Pricing arithmetic - charges, quotes, ROI and word counts
//!
//! Everything here is integer cents; fractional intermediate values are
//! floored when converted back.

use agentpay_core::Amount;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// How a specialist bills its work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Pricing {
    Hourly { cents_per_hour: u64 },
    PerWord { cents_per_word: u64 },
}

impl Pricing {
    pub fn rate(&self) -> u64 {
        match self {
            Self::Hourly { cents_per_hour } => *cents_per_hour,
            Self::PerWord { cents_per_word } => *cents_per_word,
        }
    }

    /// Hourly rate, if billed by the hour
    pub fn hourly_rate(&self) -> Option<u64> {
        match self {
            Self::Hourly { cents_per_hour } => Some(*cents_per_hour),
            Self::PerWord { .. } => None,
        }
    }

    /// Human-readable rate, e.g. `$25.00/hour`
    pub fn label(&self) -> String {
        match self {
            Self::Hourly { cents_per_hour } => format!("{}/hour", Amount::new(*cents_per_hour)),
            Self::PerWord { cents_per_word } => format!("{}/word", Amount::new(*cents_per_word)),
        }
    }

    /// Price of finished work
    ///
    /// Hourly work bills at least one hour; per-word work bills every
    /// word of the output.
    pub fn charge(&self, elapsed_hours: f64, output: &str) -> Amount {
        match self {
            Self::Hourly { cents_per_hour } => {
                Amount::new(floor_cents(elapsed_hours.max(1.0) * *cents_per_hour as f64))
            }
            Self::PerWord { cents_per_word } => {
                Amount::new((count_words(output) as u64).saturating_mul(*cents_per_word))
            }
        }
    }

    /// `floor(units * rate)`, units being hours or words
    pub fn estimate(&self, units: f64) -> Amount {
        Amount::new(floor_cents(units * self.rate() as f64))
    }
}

fn floor_cents(value: f64) -> u64 {
    // `as` saturates and maps NaN and negatives to zero
    value.floor() as u64
}

/// Words separated by Unicode whitespace
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Price quote for a service request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub service_type: String,
    pub complexity: String,
    pub urgency: String,
    pub base_price: Amount,
    pub final_price: Amount,
    pub price_formatted: String,
    pub complexity_adjustment: String,
    pub urgency_adjustment: String,
}

fn base_price(service_type: &str) -> u64 {
    match service_type {
        "data_analysis" => 2500,
        "content_writing" => 1500,
        "research" => 2000,
        "code_review" => 1500,
        "image_generation" => 1000,
        _ => 2000,
    }
}

fn complexity_multiplier(complexity: &str) -> f64 {
    match complexity {
        "simple" => 0.8,
        "complex" => 1.5,
        _ => 1.0,
    }
}

fn urgency_multiplier(urgency: &str) -> f64 {
    match urgency {
        "urgent" => 1.3,
        "critical" => 1.6,
        _ => 1.0,
    }
}

fn adjustment(multiplier: f64) -> String {
    format!("{:+.0}%", (multiplier - 1.0) * 100.0)
}

/// Quote a service; unknown levels count as neutral
pub fn quote(service_type: &str, complexity: &str, urgency: &str) -> Quote {
    let base = base_price(service_type);
    let c = complexity_multiplier(complexity);
    let u = urgency_multiplier(urgency);
    let final_price = Amount::new(floor_cents(base as f64 * c * u));

    Quote {
        service_type: service_type.to_string(),
        complexity: complexity.to_string(),
        urgency: urgency.to_string(),
        base_price: Amount::new(base),
        price_formatted: final_price.to_string(),
        final_price,
        complexity_adjustment: adjustment(c),
        urgency_adjustment: adjustment(u),
    }
}

/// Return on a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiReport {
    pub campaign_cost: f64,
    pub revenue_generated: f64,
    pub roi_percentage: f64,
    pub roi_interpretation: String,
    pub profit: f64,
}

/// `(revenue - cost) / cost * 100`, rounded to two decimals
pub fn roi(campaign_cost: f64, revenue_generated: f64) -> Result<RoiReport> {
    if campaign_cost == 0.0 || !campaign_cost.is_finite() || !revenue_generated.is_finite() {
        return Err(AgentError::invalid(
            "campaign_cost must be a non-zero finite number",
        ));
    }

    let raw = (revenue_generated - campaign_cost) / campaign_cost * 100.0;
    let roi_percentage = (raw * 100.0).round() / 100.0;

    Ok(RoiReport {
        campaign_cost,
        revenue_generated,
        roi_percentage,
        roi_interpretation: if raw > 0.0 { "positive" } else { "negative" }.to_string(),
        profit: revenue_generated - campaign_cost,
    })
}
