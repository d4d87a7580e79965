//! Crate entry points and public re-exports for venture fund simulation.

pub mod market;
pub mod request;
pub mod config;
pub mod company;
pub mod fund;
pub mod scenario;
pub mod engine;
pub mod report;
pub mod experiment;

pub use {
    company::{Company, CompanyState},
    config::{ConfigError, FundConfig, InitialCheck},
    engine::{RuntimeError, ScenarioEngine},
    experiment::{run_strategies, simulate, simulate_with, SimulationError, StrategyOutcome},
    fund::{Fund, PortfolioBreakdown},
    market::{MarketModel, MarketScenario, MnaOutcome, Transition, DEFAULT_STAGES},
    report::{summarize, BreakdownReport, DistributionSummary, FundReport, Segment},
    request::{AllocationRow, ErrorEnvelope, SimulationRequest, DEFAULT_SEED},
    scenario::{run_scenario, ScenarioResult},
};
