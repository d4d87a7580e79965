//! Portfolio container and capital accounting for one scenario.

use rand::Rng;

use crate::company::{Company, CompanyState};
use crate::config::FundConfig;
use crate::market::MarketModel;

/// State axis of the breakdown grid.
pub const STATE_ALIVE: usize = 0;
pub const STATE_ACQUIRED: usize = 1;
pub const STATE_FAILED: usize = 2;

/// Portfolio composition over the stage x state grid. The value slot for a
/// failed company carries its sunk capital rather than a mark.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioBreakdown {
    pub counts: Vec<[u32; 3]>,
    pub values_m: Vec<[f64; 3]>,
}

impl PortfolioBreakdown {
    pub fn new(num_stages: usize) -> Self {
        Self {
            counts: vec![[0; 3]; num_stages],
            values_m: vec![[0.0; 3]; num_stages],
        }
    }

    pub fn num_stages(&self) -> usize {
        self.counts.len()
    }

    fn record(&mut self, company: &Company) {
        let (state, value) = match company.state {
            CompanyState::Alive => (STATE_ALIVE, company.fund_value_m()),
            CompanyState::Acquired { .. } => (STATE_ACQUIRED, company.fund_value_m()),
            CompanyState::Failed => (
                STATE_FAILED,
                company.invested_primary_m + company.invested_follow_on_m,
            ),
        };
        self.counts[company.stage][state] += 1;
        self.values_m[company.stage][state] += value;
    }
}

/// One scenario's fund: the portfolio plus the primary and follow-on capital
/// ledgers. The reserve only shrinks; both ledgers only grow.
#[derive(Debug)]
pub struct Fund {
    pub portfolio: Vec<Company>,
    pub primary_deployed_m: f64,
    pub follow_on_deployed_m: f64,
    pub reserve_remaining_m: f64,
}

impl Fund {
    /// Writes every initial check at t=0, in allocation order. All primary
    /// deployment happens here; the periods only spend reserve.
    pub fn new(config: &FundConfig) -> Self {
        let market = config.effective_market();
        let mut portfolio = Vec::with_capacity(config.total_initial_companies() as usize);
        let mut primary_deployed = 0.0;

        let mut id = 0u32;
        for check in config.initial_checks() {
            for _ in 0..check.count {
                portfolio.push(Company::new(
                    id,
                    check.stage,
                    check.check_size_m,
                    check.ownership_at_entry,
                    market.valuation(check.stage),
                ));
                id += 1;
            }
            primary_deployed += check.count as f64 * check.check_size_m;
        }

        Self {
            portfolio,
            primary_deployed_m: primary_deployed,
            follow_on_deployed_m: 0.0,
            reserve_remaining_m: config.reserve_m,
        }
    }

    /// Steps every alive company once, in insertion order. The reserve is
    /// re-read per company so an early pro-rata can exhaust it for the rest
    /// of the pass.
    pub fn step_period<R: Rng>(
        &mut self,
        market: &MarketModel,
        pro_rata_cap_m: f64,
        rng: &mut R,
    ) {
        for idx in 0..self.portfolio.len() {
            let reserve = self.reserve_remaining_m;
            let company = &mut self.portfolio[idx];
            if !company.is_alive() {
                continue;
            }
            let spent = company.step(market, reserve, pro_rata_cap_m, rng);
            self.follow_on_deployed_m += spent;
            self.reserve_remaining_m -= spent;
        }
    }

    pub fn capital_deployed_m(&self) -> f64 {
        self.primary_deployed_m + self.follow_on_deployed_m
    }

    /// Total fund claim across the portfolio: unrealized marks for alive
    /// companies plus fixed exit values for acquired ones.
    pub fn total_value_m(&self) -> f64 {
        self.portfolio.iter().map(|c| c.fund_value_m()).sum()
    }

    /// Return multiple on deployed dollars. Undefined when nothing was
    /// deployed; such scenarios are excluded from aggregation.
    pub fn moic(&self) -> Option<f64> {
        let deployed = self.capital_deployed_m();
        if deployed > 0.0 {
            Some(self.total_value_m() / deployed)
        } else {
            None
        }
    }

    /// Return multiple on committed fund size.
    pub fn tvpi(&self, committed_m: f64) -> f64 {
        self.total_value_m() / committed_m
    }

    pub fn breakdown(&self, num_stages: usize) -> PortfolioBreakdown {
        let mut breakdown = PortfolioBreakdown::new(num_stages);
        for company in &self.portfolio {
            breakdown.record(company);
        }
        breakdown
    }
}
