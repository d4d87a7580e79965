//! External request payload and the machine-readable error envelope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::engine::RuntimeError;
use crate::market::{MarketScenario, MnaOutcome};

/// Seed used when the request omits one. Fixed so that default runs stay
/// reproducible; wall-clock seeding is not allowed anywhere.
pub const DEFAULT_SEED: u64 = 7;

/// One stage-allocation row: `pct` percent of the primary pool deployed as
/// `check_size_m` checks at `stage`. Percentages are integers and must sum
/// to 100 across rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub stage: String,
    pub pct: u32,
    pub check_size_m: f64,
}

/// Full simulation request. Collaborators (HTTP layer, CLI) deserialize
/// straight into this; unknown keys are rejected to keep the override
/// surface enumerable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationRequest {
    #[serde(default)]
    pub market_scenario: MarketScenario,

    /// Per-stage `[promote, fail, mna]` override of the preset table.
    #[serde(default)]
    pub graduation_rates: Option<HashMap<String, [f64; 3]>>,
    /// Per-stage post-money valuation override, $M.
    #[serde(default)]
    pub stage_valuations: Option<HashMap<String, f64>>,
    /// Per-stage dilution override, fraction of ownership lost on promotion
    /// into the stage.
    #[serde(default)]
    pub stage_dilution: Option<HashMap<String, f64>>,
    /// Replacement M&A outcome mixture.
    #[serde(default)]
    pub m_and_a_outcomes: Option<Vec<MnaOutcome>>,

    pub fund_size_m: f64,
    /// Annual management fee as a fraction of fund size.
    #[serde(default)]
    pub management_fee_pct: f64,
    #[serde(default = "default_fee_duration_years")]
    pub fee_duration_years: f64,
    /// Recycled capital as a fraction of fund size; extends deployable capital.
    #[serde(default)]
    pub recycled_capital_pct: f64,
    /// Fraction of the fund carved out for follow-on pro-rata, in [0, 0.9].
    #[serde(default = "default_dry_powder_reserve")]
    pub dry_powder_reserve_for_pro_rata: f64,
    /// Fold primary-pool remainders back into the reserve instead of
    /// discarding them.
    #[serde(default = "default_true")]
    pub reinvest_unused_reserve: bool,
    /// Above this post-money valuation ($M) the fund declines pro-rata.
    #[serde(default = "default_pro_rata_max_valuation")]
    pub pro_rata_max_valuation: f64,

    pub stage_allocations: Vec<AllocationRow>,

    #[serde(default = "default_num_periods")]
    pub num_periods: u32,
    #[serde(default = "default_num_iterations")]
    pub num_iterations: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_fee_duration_years() -> f64 {
    10.0
}

fn default_dry_powder_reserve() -> f64 {
    0.3
}

fn default_true() -> bool {
    true
}

fn default_pro_rata_max_valuation() -> f64 {
    70.0
}

fn default_num_periods() -> u32 {
    8
}

fn default_num_iterations() -> u32 {
    3000
}

impl SimulationRequest {
    /// Minimal request with field defaults filled in, for building requests
    /// programmatically.
    pub fn with_allocations(fund_size_m: f64, stage_allocations: Vec<AllocationRow>) -> Self {
        Self {
            market_scenario: MarketScenario::default(),
            graduation_rates: None,
            stage_valuations: None,
            stage_dilution: None,
            m_and_a_outcomes: None,
            fund_size_m,
            management_fee_pct: 0.0,
            fee_duration_years: default_fee_duration_years(),
            recycled_capital_pct: 0.0,
            dry_powder_reserve_for_pro_rata: default_dry_powder_reserve(),
            reinvest_unused_reserve: true,
            pro_rata_max_valuation: default_pro_rata_max_valuation(),
            stage_allocations,
            num_periods: default_num_periods(),
            num_iterations: default_num_iterations(),
            seed: None,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }
}

/// Tagged error shape surfaced to collaborators: a machine-readable `kind`,
/// a human message, and where applicable a path into the request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&ConfigError> for ErrorEnvelope {
    fn from(err: &ConfigError) -> Self {
        let (kind, path) = match err {
            ConfigError::FieldRange { field, .. } => ("field_range", Some(field.to_string())),
            ConfigError::AllocationSum { .. } => {
                ("allocation_sum", Some("stage_allocations".to_string()))
            }
            ConfigError::UnknownStage { path, .. } => ("unknown_stage", Some(path.clone())),
            ConfigError::Probabilities { stage, .. } => (
                "probabilities",
                Some(format!("graduation_rates.{stage}")),
            ),
            ConfigError::MnaMixture { .. } => ("mna_mixture", Some("m_and_a_outcomes".to_string())),
        };
        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<&RuntimeError> for ErrorEnvelope {
    fn from(err: &RuntimeError) -> Self {
        let kind = match err {
            RuntimeError::Cancelled { .. } => "cancelled",
            RuntimeError::NoDeployableCapital => "no_deployable_capital",
        };
        Self {
            kind,
            message: err.to_string(),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_payload_with_defaults() {
        let json = r#"
        {
            "fund_size_m": 150,
            "stage_allocations": [
                {"stage": "Pre-seed", "pct": 50, "check_size_m": 1.75},
                {"stage": "Seed", "pct": 50, "check_size_m": 3.5}
            ]
        }"#;

        let request: SimulationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.market_scenario, MarketScenario::Market);
        assert_eq!(request.num_periods, 8);
        assert_eq!(request.num_iterations, 3000);
        assert_eq!(request.fee_duration_years, 10.0);
        assert!(request.reinvest_unused_reserve);
        assert_eq!(request.seed(), DEFAULT_SEED);
        assert_eq!(request.stage_allocations.len(), 2);
        assert_eq!(request.stage_allocations[1].stage, "Seed");
    }

    #[test]
    fn parses_scenario_and_overrides() {
        let json = r#"
        {
            "market_scenario": "BELOW_MARKET",
            "fund_size_m": 50,
            "stage_valuations": {"Seed": 40},
            "graduation_rates": {"Seed": [0.4, 0.4, 0.2]},
            "m_and_a_outcomes": [
                {"weight": 0.5, "multiplier": 2.0},
                {"weight": 0.5, "multiplier": 0.5}
            ],
            "stage_allocations": [{"stage": "Seed", "pct": 100, "check_size_m": 2.0}],
            "seed": 12648430
        }"#;

        let request: SimulationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.market_scenario, MarketScenario::BelowMarket);
        assert_eq!(request.seed(), 0xC0FFEE);
        assert_eq!(request.stage_valuations.unwrap()["Seed"], 40.0);
        assert_eq!(request.graduation_rates.unwrap()["Seed"], [0.4, 0.4, 0.2]);
        assert_eq!(request.m_and_a_outcomes.unwrap().len(), 2);
    }

    #[test]
    fn rejects_unknown_keys() {
        let json = r#"
        {
            "fund_size_m": 50,
            "stage_allocations": [{"stage": "Seed", "pct": 100, "check_size_m": 2.0}],
            "tender_offers": true
        }"#;

        assert!(serde_json::from_str::<SimulationRequest>(json).is_err());
    }

    #[test]
    fn envelope_carries_kind_and_path() {
        let err = ConfigError::AllocationSum { sum: 90 };
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.kind, "allocation_sum");
        assert_eq!(envelope.path.as_deref(), Some("stage_allocations"));
        assert!(envelope.message.contains("90"));

        let err = RuntimeError::Cancelled {
            completed_scenarios: 42,
        };
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.kind, "cancelled");
        assert!(envelope.path.is_none());
        assert!(envelope.message.contains("42"));
    }
}
