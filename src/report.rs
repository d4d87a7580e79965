//! Aggregation of scenario observations into the fund report.

use serde::Serialize;

use crate::config::FundConfig;
use crate::engine::RuntimeError;
use crate::fund::PortfolioBreakdown;
use crate::scenario::ScenarioResult;

/// Histogram geometry: uniform bins over [0, 10); observations at or above
/// the cap land in the final bin.
pub const NUM_BINS: usize = 24;
pub const BIN_CAP: f64 = 10.0;

const STATE_LABELS: [&str; 3] = ["alive", "acquired", "failed"];

/// Order statistics of one observation array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub median: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// One slice of a portfolio composition: companies of one state at one
/// stage, averaged over the scenarios the slice describes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub stage: String,
    pub count_mean: f64,
    pub value_mean: f64,
}

/// Portfolio composition for a set of scenarios (a histogram bin) or a
/// single representative scenario (a percentile pick).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownReport {
    pub segments: Vec<Segment>,
    pub total_scenarios: u32,
}

/// Representative portfolio compositions at the reporting percentiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileBreakdowns {
    pub p25: BreakdownReport,
    pub p50: BreakdownReport,
    pub p75: BreakdownReport,
    pub p90: BreakdownReport,
    pub p95: BreakdownReport,
}

/// Full simulation report: summary scalars, MOIC/TVPI distributions, the
/// raw observation list, and the portfolio decompositions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundReport {
    pub fund_size_m: f64,
    pub committed_capital_m: f64,
    pub num_iterations: u32,

    pub avg_primary_invested_m: f64,
    pub avg_follow_on_invested_m: f64,
    pub avg_total_companies: f64,
    pub avg_active_companies: f64,
    pub avg_acquired_companies: f64,
    pub avg_failed_companies: f64,
    pub avg_value_from_alive_m: f64,
    pub avg_value_from_acquired_m: f64,
    pub avg_entry_ownership_pct: f64,

    pub total_pro_rata_events: u64,
    pub total_pro_rata_skips_stage_too_late: u64,
    pub total_pro_rata_skips_reserve_exhausted: u64,

    pub moic: DistributionSummary,
    pub tvpi: DistributionSummary,
    /// All defined MOIC observations, sorted ascending.
    pub moic_distribution: Vec<f64>,

    pub bin_breakdowns: Vec<BreakdownReport>,
    pub portfolio_breakdown: PercentileBreakdowns,
}

/// Value at fraction `p` of a sorted array: `sorted[floor(p * len)]` clamped
/// to the last index.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn summarize_observations(sorted: &[f64]) -> DistributionSummary {
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    let p50 = percentile(sorted, 0.50);
    DistributionSummary {
        p25: percentile(sorted, 0.25),
        p50,
        p75: percentile(sorted, 0.75),
        p90: percentile(sorted, 0.90),
        median: p50,
        mean,
        std_dev: variance.sqrt(),
    }
}

fn bin_index(moic: f64) -> usize {
    let width = BIN_CAP / NUM_BINS as f64;
    ((moic / width) as usize).min(NUM_BINS - 1)
}

/// Mean stage x state grid over a set of scenarios, flattened into segments.
/// Zero-count slices are omitted; order is state-major, stages ascending.
struct BreakdownAccumulator {
    counts: Vec<[f64; 3]>,
    values_m: Vec<[f64; 3]>,
    scenarios: u32,
}

impl BreakdownAccumulator {
    fn new(num_stages: usize) -> Self {
        Self {
            counts: vec![[0.0; 3]; num_stages],
            values_m: vec![[0.0; 3]; num_stages],
            scenarios: 0,
        }
    }

    fn push(&mut self, breakdown: &PortfolioBreakdown) {
        for stage in 0..breakdown.num_stages() {
            for state in 0..3 {
                self.counts[stage][state] += breakdown.counts[stage][state] as f64;
                self.values_m[stage][state] += breakdown.values_m[stage][state];
            }
        }
        self.scenarios += 1;
    }

    fn into_report(self, stage_names: &[String]) -> BreakdownReport {
        let mut segments = Vec::new();
        if self.scenarios == 0 {
            return BreakdownReport {
                segments,
                total_scenarios: 0,
            };
        }
        let n = self.scenarios as f64;
        for (state, kind) in STATE_LABELS.into_iter().enumerate() {
            for stage in 0..self.counts.len() {
                let count_mean = self.counts[stage][state] / n;
                if count_mean > 0.0 {
                    segments.push(Segment {
                        kind,
                        stage: stage_names[stage].clone(),
                        count_mean,
                        value_mean: self.values_m[stage][state] / n,
                    });
                }
            }
        }
        BreakdownReport {
            segments,
            total_scenarios: self.scenarios,
        }
    }
}

/// Reduces N scenario observations into the fund report.
///
/// Percentiles are computed on the sorted MOIC/TVPI arrays; every other
/// aggregate is a commutative sum, so the output is invariant under
/// permutation of the input.
pub fn summarize(
    results: &[ScenarioResult],
    config: &FundConfig,
) -> Result<FundReport, RuntimeError> {
    let market = config.effective_market();
    let stage_names = market.stage_names();

    // (moic, input index) for scenarios where MOIC is defined.
    let mut observed: Vec<(f64, usize)> = results
        .iter()
        .enumerate()
        .filter_map(|(idx, r)| r.moic.map(|m| (m, idx)))
        .collect();
    if observed.is_empty() {
        return Err(RuntimeError::NoDeployableCapital);
    }
    observed.sort_by(|a, b| a.0.total_cmp(&b.0));
    let moics: Vec<f64> = observed.iter().map(|(m, _)| *m).collect();

    let mut tvpis: Vec<f64> = results.iter().map(|r| r.tvpi).collect();
    tvpis.sort_by(f64::total_cmp);

    // Histogram bins accumulate whole breakdown grids, not just counts.
    let mut bins: Vec<BreakdownAccumulator> = (0..NUM_BINS)
        .map(|_| BreakdownAccumulator::new(stage_names.len()))
        .collect();
    for &(moic, idx) in &observed {
        bins[bin_index(moic)].push(&results[idx].breakdown);
    }

    let n = results.len() as f64;
    fn mean<F: Fn(&ScenarioResult) -> f64>(results: &[ScenarioResult], n: f64, f: F) -> f64 {
        results.iter().map(f).sum::<f64>() / n
    }

    let report = FundReport {
        fund_size_m: config.fund_size_m,
        committed_capital_m: config.fund_size_m,
        num_iterations: config.num_iterations,

        avg_primary_invested_m: mean(results, n, |r| r.primary_invested_m),
        avg_follow_on_invested_m: mean(results, n, |r| r.follow_on_invested_m),
        avg_total_companies: mean(results, n, |r| r.total_companies as f64),
        avg_active_companies: mean(results, n, |r| r.alive as f64),
        avg_acquired_companies: mean(results, n, |r| r.acquired as f64),
        avg_failed_companies: mean(results, n, |r| r.failed as f64),
        avg_value_from_alive_m: mean(results, n, |r| r.value_from_alive_m),
        avg_value_from_acquired_m: mean(results, n, |r| r.value_from_acquired_m),
        avg_entry_ownership_pct: config.avg_entry_ownership_pct(),

        total_pro_rata_events: results.iter().map(|r| r.pro_rata_events as u64).sum(),
        total_pro_rata_skips_stage_too_late: results
            .iter()
            .map(|r| r.pro_rata_skips_stage_too_late as u64)
            .sum(),
        total_pro_rata_skips_reserve_exhausted: results
            .iter()
            .map(|r| r.pro_rata_skips_reserve_exhausted as u64)
            .sum(),

        moic: summarize_observations(&moics),
        tvpi: summarize_observations(&tvpis),
        moic_distribution: moics.clone(),

        bin_breakdowns: bins
            .into_iter()
            .map(|acc| acc.into_report(stage_names))
            .collect(),
        portfolio_breakdown: PercentileBreakdowns {
            p25: nearest_breakdown(&observed, results, 0.25, stage_names),
            p50: nearest_breakdown(&observed, results, 0.50, stage_names),
            p75: nearest_breakdown(&observed, results, 0.75, stage_names),
            p90: nearest_breakdown(&observed, results, 0.90, stage_names),
            p95: nearest_breakdown(&observed, results, 0.95, stage_names),
        },
    };
    Ok(report)
}

/// Reports the portfolio of the scenario whose MOIC is nearest to the
/// percentile value, verbatim. Ties go to the first occurrence in sort
/// order.
fn nearest_breakdown(
    observed: &[(f64, usize)],
    results: &[ScenarioResult],
    p: f64,
    stage_names: &[String],
) -> BreakdownReport {
    let target = percentile_of_pairs(observed, p);
    let mut best: Option<(f64, usize)> = None;
    for &(moic, idx) in observed {
        let dist = (moic - target).abs();
        if best.map_or(true, |(best_dist, _)| dist < best_dist) {
            best = Some((dist, idx));
        }
    }
    let (_, idx) = best.expect("observed is non-empty");
    let mut acc = BreakdownAccumulator::new(stage_names.len());
    acc.push(&results[idx].breakdown);
    acc.into_report(stage_names)
}

fn percentile_of_pairs(sorted: &[(f64, usize)], p: f64) -> f64 {
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx].0
}
