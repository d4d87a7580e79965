//! Per-stage market assumptions: valuations, dilution, transitions, M&A outcomes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Tolerance applied to probability sums before rejecting a transition table.
pub const PROB_EPSILON: f64 = 1e-9;
/// M&A mixture weights must sum to 1 within this tolerance.
pub const MIXTURE_EPSILON: f64 = 1e-6;

/// Canonical stage order. Index 0 is the earliest stage, the last index is
/// terminal and never promotes.
pub const DEFAULT_STAGES: [&str; 9] = [
    "Pre-seed",
    "Seed",
    "Series A",
    "Series B",
    "Series C",
    "Series D",
    "Series E",
    "Series F",
    "Series G",
];

/// Post-money valuations in $M, one per stage.
pub const DEFAULT_STAGE_VALUATIONS: [f64; 9] = [
    15.0, 30.0, 70.0, 200.0, 500.0, 750.0, 1500.0, 5000.0, 10000.0,
];

/// Dilution suffered on promotion into each stage. Entry into the earliest
/// stage dilutes nobody.
pub const DEFAULT_STAGE_DILUTION: [f64; 9] = [0.0, 0.20, 0.22, 0.20, 0.15, 0.10, 0.08, 0.08, 0.08];

/// One row of a transition table: probabilities of promoting, failing, and
/// exiting via M&A in a single period. Any residual mass means the company
/// stays alive at its current stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub promote: f64,
    pub fail: f64,
    pub mna: f64,
}

impl Transition {
    pub const fn new(promote: f64, fail: f64, mna: f64) -> Self {
        Self { promote, fail, mna }
    }

    pub fn sum(&self) -> f64 {
        self.promote + self.fail + self.mna
    }
}

// Transition tables per market regime, [promote, fail, mna] per stage.
// Series G is terminal, so its row is all zeros.

pub const MARKET: [Transition; 9] = [
    Transition::new(0.50, 0.35, 0.15),
    Transition::new(0.50, 0.35, 0.15),
    Transition::new(0.50, 0.30, 0.20),
    Transition::new(0.50, 0.25, 0.25),
    Transition::new(0.50, 0.25, 0.25),
    Transition::new(0.50, 0.25, 0.25),
    Transition::new(0.40, 0.30, 0.30),
    Transition::new(0.30, 0.30, 0.30),
    Transition::new(0.0, 0.0, 0.0),
];

pub const ABOVE_MARKET: [Transition; 9] = [
    Transition::new(0.60, 0.30, 0.10),
    Transition::new(0.60, 0.30, 0.10),
    Transition::new(0.60, 0.25, 0.15),
    Transition::new(0.55, 0.25, 0.20),
    Transition::new(0.55, 0.25, 0.20),
    Transition::new(0.55, 0.25, 0.20),
    Transition::new(0.40, 0.30, 0.30),
    Transition::new(0.30, 0.30, 0.30),
    Transition::new(0.0, 0.0, 0.0),
];

pub const BELOW_MARKET: [Transition; 9] = [
    Transition::new(0.45, 0.40, 0.15),
    Transition::new(0.45, 0.40, 0.15),
    Transition::new(0.50, 0.35, 0.15),
    Transition::new(0.50, 0.35, 0.15),
    Transition::new(0.50, 0.30, 0.20),
    Transition::new(0.50, 0.30, 0.20),
    Transition::new(0.40, 0.30, 0.30),
    Transition::new(0.30, 0.40, 0.20),
    Transition::new(0.0, 0.0, 0.0),
];

/// One component of the M&A exit mixture: with probability `weight` the exit
/// valuation is `multiplier` times the current valuation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MnaOutcome {
    pub weight: f64,
    pub multiplier: f64,
}

impl MnaOutcome {
    pub const fn new(weight: f64, multiplier: f64) -> Self {
        Self { weight, multiplier }
    }
}

/// Default mixture: rare unicorn exits, a thick acqui-hire middle, and a
/// fire-sale tail.
pub const DEFAULT_MNA_OUTCOMES: [MnaOutcome; 4] = [
    MnaOutcome::new(0.01, 10.0),
    MnaOutcome::new(0.05, 5.0),
    MnaOutcome::new(0.60, 1.0),
    MnaOutcome::new(0.34, 0.1),
];

/// Named transition-table presets selectable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketScenario {
    BelowMarket,
    #[default]
    Market,
    AboveMarket,
}

impl MarketScenario {
    pub fn transitions(&self) -> &'static [Transition; 9] {
        match self {
            MarketScenario::BelowMarket => &BELOW_MARKET,
            MarketScenario::Market => &MARKET,
            MarketScenario::AboveMarket => &ABOVE_MARKET,
        }
    }
}

/// Immutable per-stage market parameters for one request. Built from a preset
/// plus request overrides, validated once, then shared read-only by every
/// scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketModel {
    stages: Vec<String>,
    valuations: Vec<f64>,
    dilution: Vec<f64>,
    transitions: Vec<Transition>,
    mna_mixture: Vec<MnaOutcome>,
}

impl MarketModel {
    /// Validates and assembles a model. The four per-stage vectors must share
    /// the canonical stage order and length.
    pub fn new(
        stages: Vec<String>,
        valuations: Vec<f64>,
        dilution: Vec<f64>,
        transitions: Vec<Transition>,
        mna_mixture: Vec<MnaOutcome>,
    ) -> Result<Self, ConfigError> {
        assert_eq!(stages.len(), valuations.len());
        assert_eq!(stages.len(), dilution.len());
        assert_eq!(stages.len(), transitions.len());

        let terminal = stages.len() - 1;
        for (idx, t) in transitions.iter().enumerate() {
            if t.promote < 0.0 || t.fail < 0.0 || t.mna < 0.0 {
                return Err(ConfigError::Probabilities {
                    stage: stages[idx].clone(),
                    message: format!(
                        "negative transition component [{}, {}, {}]",
                        t.promote, t.fail, t.mna
                    ),
                });
            }
            if t.sum() > 1.0 + PROB_EPSILON {
                return Err(ConfigError::Probabilities {
                    stage: stages[idx].clone(),
                    message: format!("transition components sum to {}", t.sum()),
                });
            }
            if idx == terminal && t.promote != 0.0 {
                return Err(ConfigError::Probabilities {
                    stage: stages[idx].clone(),
                    message: format!("terminal stage must not promote, got {}", t.promote),
                });
            }
        }

        let weight_sum: f64 = mna_mixture.iter().map(|o| o.weight).sum();
        if (weight_sum - 1.0).abs() > MIXTURE_EPSILON {
            return Err(ConfigError::MnaMixture {
                message: format!("mixture weights sum to {weight_sum}, expected 1"),
            });
        }
        for outcome in &mna_mixture {
            if outcome.weight < 0.0 || outcome.multiplier < 0.0 {
                return Err(ConfigError::MnaMixture {
                    message: format!(
                        "negative mixture entry (weight {}, multiplier {})",
                        outcome.weight, outcome.multiplier
                    ),
                });
            }
        }

        Ok(Self {
            stages,
            valuations,
            dilution,
            transitions,
            mna_mixture,
        })
    }

    /// The canonical model for a preset scenario, before request overrides.
    pub fn preset(scenario: MarketScenario) -> Self {
        // Preset tables satisfy every constraint by construction.
        Self::new(
            DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_STAGE_VALUATIONS.to_vec(),
            DEFAULT_STAGE_DILUTION.to_vec(),
            scenario.transitions().to_vec(),
            DEFAULT_MNA_OUTCOMES.to_vec(),
        )
        .expect("preset market tables are valid")
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn terminal_stage(&self) -> usize {
        self.stages.len() - 1
    }

    pub fn stage_name(&self, stage: usize) -> &str {
        &self.stages[stage]
    }

    pub fn stage_names(&self) -> &[String] {
        &self.stages
    }

    /// Index of a stage by name, or `None` for an unknown stage.
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s == name)
    }

    pub fn valuation(&self, stage: usize) -> f64 {
        self.valuations[stage]
    }

    pub fn dilution(&self, stage: usize) -> f64 {
        self.dilution[stage]
    }

    pub fn transition(&self, stage: usize) -> Transition {
        self.transitions[stage]
    }

    pub fn mna_mixture(&self) -> &[MnaOutcome] {
        &self.mna_mixture
    }

    /// Draws an exit multiplier from the M&A mixture: a single uniform draw
    /// walked over the cumulative weights, lower index winning ties.
    pub fn sample_mna_multiplier<R: Rng>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for outcome in &self.mna_mixture {
            cumulative += outcome.weight;
            if u < cumulative {
                return outcome.multiplier;
            }
        }
        // Weight rounding can leave the last bin infinitesimally short.
        self.mna_mixture.last().map_or(1.0, |o| o.multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn presets_are_consistent() {
        for scenario in [
            MarketScenario::BelowMarket,
            MarketScenario::Market,
            MarketScenario::AboveMarket,
        ] {
            let market = MarketModel::preset(scenario);
            assert_eq!(market.num_stages(), 9);
            assert_eq!(market.stage_name(0), "Pre-seed");
            assert_eq!(market.stage_name(market.terminal_stage()), "Series G");
            assert_eq!(market.transition(market.terminal_stage()).sum(), 0.0);
            assert_eq!(market.dilution(0), 0.0);
        }
    }

    #[test]
    fn stage_lookup_by_name() {
        let market = MarketModel::preset(MarketScenario::Market);
        assert_eq!(market.stage_index("Pre-seed"), Some(0));
        assert_eq!(market.stage_index("Series G"), Some(8));
        assert_eq!(market.stage_index("Series H"), None);
    }

    #[test]
    fn rejects_negative_transition() {
        let mut transitions = MARKET.to_vec();
        transitions[2] = Transition::new(-0.1, 0.5, 0.2);
        let err = MarketModel::new(
            DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_STAGE_VALUATIONS.to_vec(),
            DEFAULT_STAGE_DILUTION.to_vec(),
            transitions,
            DEFAULT_MNA_OUTCOMES.to_vec(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Probabilities { ref stage, .. } if stage == "Series A"));
    }

    #[test]
    fn rejects_transition_sum_above_one() {
        let mut transitions = MARKET.to_vec();
        transitions[0] = Transition::new(0.6, 0.5, 0.2);
        let err = MarketModel::new(
            DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_STAGE_VALUATIONS.to_vec(),
            DEFAULT_STAGE_DILUTION.to_vec(),
            transitions,
            DEFAULT_MNA_OUTCOMES.to_vec(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Probabilities { .. }));
    }

    #[test]
    fn rejects_terminal_promotion_mass() {
        let mut transitions = MARKET.to_vec();
        transitions[8] = Transition::new(0.1, 0.0, 0.0);
        let err = MarketModel::new(
            DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_STAGE_VALUATIONS.to_vec(),
            DEFAULT_STAGE_DILUTION.to_vec(),
            transitions,
            DEFAULT_MNA_OUTCOMES.to_vec(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Probabilities { ref stage, .. } if stage == "Series G"));
    }

    #[test]
    fn rejects_bad_mixture() {
        let err = MarketModel::new(
            DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_STAGE_VALUATIONS.to_vec(),
            DEFAULT_STAGE_DILUTION.to_vec(),
            MARKET.to_vec(),
            vec![MnaOutcome::new(0.5, 2.0), MnaOutcome::new(0.4, 1.0)],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MnaMixture { .. }));

        let err = MarketModel::new(
            DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_STAGE_VALUATIONS.to_vec(),
            DEFAULT_STAGE_DILUTION.to_vec(),
            MARKET.to_vec(),
            vec![MnaOutcome::new(0.5, 2.0), MnaOutcome::new(0.5, -1.0)],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MnaMixture { .. }));
    }

    #[test]
    fn mna_sampling_walks_cumulative_bins() {
        let market = MarketModel::preset(MarketScenario::Market);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xC0FFEE);

        // Empirical frequencies over many draws should track the weights.
        let mut counts = [0u32; 4];
        let draws = 200_000;
        for _ in 0..draws {
            let m = market.sample_mna_multiplier(&mut rng);
            let idx = DEFAULT_MNA_OUTCOMES
                .iter()
                .position(|o| o.multiplier == m)
                .expect("multiplier not in mixture");
            counts[idx] += 1;
        }
        for (count, outcome) in counts.iter().zip(DEFAULT_MNA_OUTCOMES.iter()) {
            let freq = *count as f64 / draws as f64;
            assert!(
                approx_eq(freq, outcome.weight, 0.01),
                "multiplier {} expected freq {}, got {}",
                outcome.multiplier,
                outcome.weight,
                freq
            );
        }
    }

    #[test]
    fn mna_sampling_is_deterministic_per_seed() {
        let market = MarketModel::preset(MarketScenario::Market);
        let mut a = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut b = Xoshiro256PlusPlus::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(
                market.sample_mna_multiplier(&mut a),
                market.sample_mna_multiplier(&mut b)
            );
        }
    }
}
