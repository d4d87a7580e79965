//! End-to-end entry points: one request, or a named batch of strategies.

use std::error::Error;
use std::fmt;

use crate::config::{ConfigError, FundConfig};
use crate::engine::{RuntimeError, ScenarioEngine};
use crate::report::{summarize, FundReport};
use crate::request::{ErrorEnvelope, SimulationRequest};

/// Any failure of a full request -> report run.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    Config(ConfigError),
    Runtime(RuntimeError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Config(e) => write!(f, "configuration error: {e}"),
            SimulationError::Runtime(e) => write!(f, "runtime error: {e}"),
        }
    }
}

impl Error for SimulationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SimulationError::Config(e) => Some(e),
            SimulationError::Runtime(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(value: ConfigError) -> Self {
        SimulationError::Config(value)
    }
}

impl From<RuntimeError> for SimulationError {
    fn from(value: RuntimeError) -> Self {
        SimulationError::Runtime(value)
    }
}

impl From<&SimulationError> for ErrorEnvelope {
    fn from(err: &SimulationError) -> Self {
        match err {
            SimulationError::Config(e) => ErrorEnvelope::from(e),
            SimulationError::Runtime(e) => ErrorEnvelope::from(e),
        }
    }
}

/// Validates and runs one request with a default engine.
pub fn simulate(request: &SimulationRequest) -> Result<FundReport, SimulationError> {
    simulate_with(&ScenarioEngine::new(), request)
}

/// Validates and runs one request with a caller-configured engine (cancel
/// flag, time budget).
pub fn simulate_with(
    engine: &ScenarioEngine,
    request: &SimulationRequest,
) -> Result<FundReport, SimulationError> {
    let config = FundConfig::new(request)?;
    let results = engine.run(&config)?;
    let report = summarize(&results, &config)?;
    Ok(report)
}

/// Result of one strategy in a comparison batch.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub name: String,
    pub outcome: Result<FundReport, ErrorEnvelope>,
}

/// Runs a list of named strategies and reports each outcome in input order.
/// An invalid strategy does not abort the batch; its error envelope is
/// reported in place.
pub fn run_strategies(strategies: &[(String, SimulationRequest)]) -> Vec<StrategyOutcome> {
    let engine = ScenarioEngine::new();
    strategies
        .iter()
        .map(|(name, request)| StrategyOutcome {
            name: name.clone(),
            outcome: simulate_with(&engine, request)
                .map_err(|err| ErrorEnvelope::from(&err)),
        })
        .collect()
}
