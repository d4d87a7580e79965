//! Validated fund construction and the capital quantities derived from it.

use std::error::Error;
use std::fmt;

use crate::market::{MarketModel, Transition};
use crate::request::SimulationRequest;

/// Requests below this iteration count produce percentile estimates too noisy
/// to report.
pub const MIN_ITERATIONS: u32 = 100;
/// Upper bound on the follow-on reserve fraction.
pub const MAX_DRY_POWDER_RESERVE: f64 = 0.9;

/// Request-time validation failures. Fatal to the request; surfaced via the
/// error envelope in `request.rs`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    FieldRange {
        field: &'static str,
        message: String,
    },
    AllocationSum {
        sum: u32,
    },
    UnknownStage {
        stage: String,
        path: String,
    },
    Probabilities {
        stage: String,
        message: String,
    },
    MnaMixture {
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FieldRange { field, message } => {
                write!(f, "field {field} out of range: {message}")
            }
            ConfigError::AllocationSum { sum } => {
                write!(f, "stage allocation percentages sum to {sum}, expected 100")
            }
            ConfigError::UnknownStage { stage, path } => {
                write!(f, "unknown stage {stage:?} at {path}")
            }
            ConfigError::Probabilities { stage, message } => {
                write!(f, "invalid transition probabilities for {stage}: {message}")
            }
            ConfigError::MnaMixture { message } => {
                write!(f, "invalid M&A outcome mixture: {message}")
            }
        }
    }
}

impl Error for ConfigError {}

/// One entry of the initial deployment plan: `count` whole checks of
/// `check_size_m` written at `stage`, each buying `ownership_at_entry` of the
/// company.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialCheck {
    pub stage: usize,
    pub count: u32,
    pub check_size_m: f64,
    pub ownership_at_entry: f64,
}

/// Validated fund construction. Every dollar quantity the scenarios need is
/// solved here once; per-scenario code never re-derives check counts.
#[derive(Debug, Clone)]
pub struct FundConfig {
    market: MarketModel,
    checks: Vec<InitialCheck>,

    pub fund_size_m: f64,
    pub deployable_capital_m: f64,
    /// Reserve after the primary remainder was folded in (when configured).
    pub reserve_m: f64,
    /// Primary pool before flooring into whole checks.
    pub primary_pool_m: f64,
    pub pro_rata_max_valuation_m: f64,

    pub num_periods: u32,
    pub num_iterations: u32,
    pub seed: u64,
}

impl FundConfig {
    pub fn new(request: &SimulationRequest) -> Result<Self, ConfigError> {
        validate_fields(request)?;

        let market = effective_market(request)?;
        let rows = merge_allocations(request, &market)?;

        let fund_size = request.fund_size_m;
        let fees = fund_size * request.management_fee_pct * request.fee_duration_years;
        let recycled = fund_size * request.recycled_capital_pct;
        let deployable = fund_size - fees + recycled;
        let reserve = fund_size * request.dry_powder_reserve_for_pro_rata;
        let primary_pool = (deployable - reserve).max(0.0);

        let mut reserve_m = reserve;
        let mut checks = Vec::with_capacity(rows.len());
        for row in &rows {
            let allocated = primary_pool * row.pct as f64 / 100.0;
            let count = (allocated / row.check_size_m).floor() as u32;
            let remainder = allocated - count as f64 * row.check_size_m;
            if request.reinvest_unused_reserve {
                reserve_m += remainder;
            }
            checks.push(InitialCheck {
                stage: row.stage,
                count,
                check_size_m: row.check_size_m,
                ownership_at_entry: row.check_size_m / market.valuation(row.stage),
            });
        }

        Ok(Self {
            market,
            checks,
            fund_size_m: fund_size,
            deployable_capital_m: deployable,
            reserve_m,
            primary_pool_m: primary_pool,
            pro_rata_max_valuation_m: request.pro_rata_max_valuation,
            num_periods: request.num_periods,
            num_iterations: request.num_iterations,
            seed: request.seed(),
        })
    }

    /// The preset model with request overrides applied.
    pub fn effective_market(&self) -> &MarketModel {
        &self.market
    }

    /// The initial deployment plan, in allocation order.
    pub fn initial_checks(&self) -> &[InitialCheck] {
        &self.checks
    }

    pub fn total_initial_companies(&self) -> u32 {
        self.checks.iter().map(|c| c.count).sum()
    }

    /// Dollar-weighted average entry ownership across all initial checks,
    /// in percent.
    pub fn avg_entry_ownership_pct(&self) -> f64 {
        let mut dollars = 0.0;
        let mut weighted = 0.0;
        for check in &self.checks {
            let d = check.count as f64 * check.check_size_m;
            dollars += d;
            weighted += d * check.ownership_at_entry;
        }
        if dollars > 0.0 {
            weighted / dollars * 100.0
        } else {
            0.0
        }
    }
}

fn validate_fields(request: &SimulationRequest) -> Result<(), ConfigError> {
    if !(request.fund_size_m > 0.0) {
        return Err(ConfigError::FieldRange {
            field: "fund_size_m",
            message: format!("must be > 0, got {}", request.fund_size_m),
        });
    }
    if request.management_fee_pct < 0.0 {
        return Err(ConfigError::FieldRange {
            field: "management_fee_pct",
            message: format!("must be >= 0, got {}", request.management_fee_pct),
        });
    }
    if request.fee_duration_years < 0.0 {
        return Err(ConfigError::FieldRange {
            field: "fee_duration_years",
            message: format!("must be >= 0, got {}", request.fee_duration_years),
        });
    }
    if request.recycled_capital_pct < 0.0 {
        return Err(ConfigError::FieldRange {
            field: "recycled_capital_pct",
            message: format!("must be >= 0, got {}", request.recycled_capital_pct),
        });
    }
    if !(0.0..=MAX_DRY_POWDER_RESERVE).contains(&request.dry_powder_reserve_for_pro_rata) {
        return Err(ConfigError::FieldRange {
            field: "dry_powder_reserve_for_pro_rata",
            message: format!(
                "must be within [0, {MAX_DRY_POWDER_RESERVE}], got {}",
                request.dry_powder_reserve_for_pro_rata
            ),
        });
    }
    if request.pro_rata_max_valuation < 0.0 {
        return Err(ConfigError::FieldRange {
            field: "pro_rata_max_valuation",
            message: format!("must be >= 0, got {}", request.pro_rata_max_valuation),
        });
    }
    if request.num_periods < 1 {
        return Err(ConfigError::FieldRange {
            field: "num_periods",
            message: "must be >= 1".to_string(),
        });
    }
    if request.num_iterations < MIN_ITERATIONS {
        return Err(ConfigError::FieldRange {
            field: "num_iterations",
            message: format!("must be >= {MIN_ITERATIONS}, got {}", request.num_iterations),
        });
    }
    if request.stage_allocations.is_empty() {
        return Err(ConfigError::FieldRange {
            field: "stage_allocations",
            message: "at least one allocation row is required".to_string(),
        });
    }
    for (idx, row) in request.stage_allocations.iter().enumerate() {
        if !(row.check_size_m > 0.0) {
            return Err(ConfigError::FieldRange {
                field: "stage_allocations",
                message: format!(
                    "check_size_m must be > 0, got {} at row {idx}",
                    row.check_size_m
                ),
            });
        }
    }
    Ok(())
}

/// Builds the effective market model: preset tables for the requested
/// scenario with per-stage overrides applied, then revalidated as a whole.
fn effective_market(request: &SimulationRequest) -> Result<MarketModel, ConfigError> {
    let preset = MarketModel::preset(request.market_scenario);
    let stages: Vec<String> = preset.stage_names().to_vec();
    let mut valuations: Vec<f64> = (0..stages.len()).map(|i| preset.valuation(i)).collect();
    let mut dilution: Vec<f64> = (0..stages.len()).map(|i| preset.dilution(i)).collect();
    let mut transitions: Vec<Transition> =
        (0..stages.len()).map(|i| preset.transition(i)).collect();
    let mut mixture = preset.mna_mixture().to_vec();

    if let Some(rates) = &request.graduation_rates {
        for (name, triple) in rates {
            let idx = preset
                .stage_index(name)
                .ok_or_else(|| ConfigError::UnknownStage {
                    stage: name.clone(),
                    path: format!("graduation_rates.{name}"),
                })?;
            transitions[idx] = Transition::new(triple[0], triple[1], triple[2]);
        }
    }
    if let Some(overrides) = &request.stage_valuations {
        for (name, valuation) in overrides {
            let idx = preset
                .stage_index(name)
                .ok_or_else(|| ConfigError::UnknownStage {
                    stage: name.clone(),
                    path: format!("stage_valuations.{name}"),
                })?;
            if !(*valuation > 0.0) {
                return Err(ConfigError::FieldRange {
                    field: "stage_valuations",
                    message: format!("valuation must be > 0, got {valuation} for {name}"),
                });
            }
            valuations[idx] = *valuation;
        }
    }
    if let Some(overrides) = &request.stage_dilution {
        for (name, d) in overrides {
            let idx = preset
                .stage_index(name)
                .ok_or_else(|| ConfigError::UnknownStage {
                    stage: name.clone(),
                    path: format!("stage_dilution.{name}"),
                })?;
            if !(0.0..1.0).contains(d) {
                return Err(ConfigError::FieldRange {
                    field: "stage_dilution",
                    message: format!("dilution must be within [0, 1), got {d} for {name}"),
                });
            }
            dilution[idx] = *d;
        }
    }
    if let Some(outcomes) = &request.m_and_a_outcomes {
        mixture = outcomes.clone();
    }

    MarketModel::new(stages, valuations, dilution, transitions, mixture)
}

struct MergedRow {
    stage: usize,
    pct: u32,
    check_size_m: f64,
}

/// Resolves stage names, checks the percentage sum, and merges duplicate
/// stages into one row with a share-weighted average check size. First
/// occurrence keeps its position.
fn merge_allocations(
    request: &SimulationRequest,
    market: &MarketModel,
) -> Result<Vec<MergedRow>, ConfigError> {
    let mut merged: Vec<(usize, u32, f64)> = Vec::new(); // (stage, pct, pct-weighted check sum)
    for (idx, row) in request.stage_allocations.iter().enumerate() {
        let stage = market
            .stage_index(&row.stage)
            .ok_or_else(|| ConfigError::UnknownStage {
                stage: row.stage.clone(),
                path: format!("stage_allocations[{idx}].stage"),
            })?;
        match merged.iter_mut().find(|(s, _, _)| *s == stage) {
            Some(slot) => {
                slot.1 += row.pct;
                slot.2 += row.pct as f64 * row.check_size_m;
            }
            None => merged.push((stage, row.pct, row.pct as f64 * row.check_size_m)),
        }
    }

    let sum: u32 = merged.iter().map(|(_, pct, _)| *pct).sum();
    if sum != 100 {
        return Err(ConfigError::AllocationSum { sum });
    }

    Ok(merged
        .into_iter()
        .map(|(stage, pct, weighted_check)| MergedRow {
            stage,
            pct,
            // A zero-pct row keeps its literal check size.
            check_size_m: if pct > 0 {
                weighted_check / pct as f64
            } else {
                weighted_check
            },
        })
        .collect())
}
