//! Lifecycle state machine for a single portfolio position.

use rand::Rng;

use crate::market::MarketModel;

/// Company lifecycle state. Acquired and Failed are terminal; a company in
/// either state is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompanyState {
    Alive,
    Acquired { exit_valuation_m: f64 },
    Failed,
}

/// One portfolio position. Owned exclusively by its fund; stage index is
/// monotone non-decreasing and ownership moves only through dilution and
/// pro-rata purchases.
#[derive(Debug, Clone)]
pub struct Company {
    pub id: u32,
    pub entry_stage: usize,
    pub stage: usize,
    pub state: CompanyState,
    pub valuation_m: f64,
    pub ownership_frac: f64,
    pub invested_primary_m: f64,
    pub invested_follow_on_m: f64,
    pub age_periods: u32,
    pub pro_rata_events: u32,
    pub skips_stage_too_late: u32,
    pub skips_reserve_exhausted: u32,
}

impl Company {
    pub fn new(id: u32, stage: usize, check_size_m: f64, ownership: f64, valuation_m: f64) -> Self {
        Self {
            id,
            entry_stage: stage,
            stage,
            state: CompanyState::Alive,
            valuation_m,
            ownership_frac: ownership,
            invested_primary_m: check_size_m,
            invested_follow_on_m: 0.0,
            age_periods: 0,
            pro_rata_events: 0,
            skips_stage_too_late: 0,
            skips_reserve_exhausted: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == CompanyState::Alive
    }

    /// The fund's claim on this company at its current state: unrealized
    /// marks while alive, the exit value once acquired, nothing once failed.
    pub fn fund_value_m(&self) -> f64 {
        match self.state {
            CompanyState::Alive => self.valuation_m * self.ownership_frac,
            CompanyState::Acquired { exit_valuation_m } => exit_valuation_m * self.ownership_frac,
            CompanyState::Failed => 0.0,
        }
    }

    /// Advances one period. Draws a single uniform and tests fail, then M&A,
    /// then promote against the cumulative transition mass; residual mass
    /// leaves the company unchanged. Must only be called while Alive.
    /// Returns the follow-on dollars consumed by a pro-rata purchase.
    pub fn step<R: Rng>(
        &mut self,
        market: &MarketModel,
        reserve_remaining_m: f64,
        pro_rata_cap_m: f64,
        rng: &mut R,
    ) -> f64 {
        debug_assert!(self.is_alive());

        let t = market.transition(self.stage);
        let u: f64 = rng.random();

        let mut follow_on_spent = 0.0;
        if u < t.fail {
            self.fail();
        } else if u < t.fail + t.mna {
            self.m_and_a(market, rng);
        } else if u < t.fail + t.mna + t.promote {
            follow_on_spent = self.promote(market, reserve_remaining_m, pro_rata_cap_m);
        }
        self.age_periods += 1;
        follow_on_spent
    }

    fn fail(&mut self) {
        self.state = CompanyState::Failed;
        self.valuation_m = 0.0;
    }

    /// Exit via acquisition: the multiplier is drawn from the market's M&A
    /// mixture and the exit value is fixed at the event.
    fn m_and_a<R: Rng>(&mut self, market: &MarketModel, rng: &mut R) {
        let multiplier = market.sample_mna_multiplier(rng);
        self.state = CompanyState::Acquired {
            exit_valuation_m: self.valuation_m * multiplier,
        };
    }

    /// Advances to the next stage: re-marks at the new post-money, applies
    /// dilution, and evaluates the pro-rata purchase. Returns reserve dollars
    /// consumed.
    fn promote(&mut self, market: &MarketModel, reserve_remaining_m: f64, cap_m: f64) -> f64 {
        // The terminal row carries no promote mass, so this is unreachable
        // for any validated model.
        debug_assert!(self.stage < market.terminal_stage());
        if self.stage >= market.terminal_stage() {
            return 0.0;
        }

        let next = self.stage + 1;
        let new_valuation = market.valuation(next);
        let dilution = market.dilution(next);
        let target = self.ownership_frac;
        let post_dilution = target * (1.0 - dilution);

        self.stage = next;
        self.valuation_m = new_valuation;
        self.ownership_frac = post_dilution;

        // Maintain the pre-dilution share, up to the remaining reserve.
        if new_valuation > cap_m {
            self.skips_stage_too_late += 1;
            return 0.0;
        }
        let desired = (target - post_dilution) * new_valuation;
        if desired <= 0.0 || reserve_remaining_m <= 0.0 {
            self.skips_reserve_exhausted += 1;
            return 0.0;
        }

        let invested = desired.min(reserve_remaining_m);
        self.ownership_frac = post_dilution + invested / new_valuation;
        self.invested_follow_on_m += invested;
        self.pro_rata_events += 1;
        invested
    }
}
