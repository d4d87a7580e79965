//! Batched scenario execution over a worker pool.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::config::FundConfig;
use crate::scenario::{run_scenario, ScenarioResult};

/// Execution-time failures. Config problems are caught earlier by
/// `FundConfig::new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Cooperative cancel or expired time budget. Completed scenarios are
    /// counted but no partial aggregation is produced.
    Cancelled { completed_scenarios: usize },
    /// The primary pool yields zero whole checks at every stage.
    NoDeployableCapital,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Cancelled {
                completed_scenarios,
            } => {
                write!(f, "cancelled after {completed_scenarios} completed scenarios")
            }
            RuntimeError::NoDeployableCapital => {
                write!(f, "primary pool yields zero whole checks at every stage")
            }
        }
    }
}

impl Error for RuntimeError {}

/// Derives the RNG stream seed for one scenario. SplitMix64 output mix over
/// the request seed and the scenario index, so streams are independent and
/// the mapping is identical on every platform.
fn stream_seed(seed: u64, scenario_index: u64) -> u64 {
    let mut z = seed.wrapping_add((scenario_index + 1).wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Runs N independent scenarios and collects their terminal observations.
///
/// Scenarios are data-parallel: each owns its RNG stream keyed by scenario
/// index and writes into its own pre-partitioned output slot, so the result
/// is bit-identical for any worker count. Cancellation and the time budget
/// are consulted between scenarios only.
pub struct ScenarioEngine {
    cancel: Option<Arc<AtomicBool>>,
    time_budget: Option<Duration>,
}

impl ScenarioEngine {
    pub fn new() -> Self {
        Self {
            cancel: None,
            time_budget: None,
        }
    }

    /// Shared flag checked between scenarios; setting it aborts the run.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Wall-clock budget, honored identically to cancellation.
    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn run(&self, config: &FundConfig) -> Result<Vec<ScenarioResult>, RuntimeError> {
        if config.total_initial_companies() == 0 {
            return Err(RuntimeError::NoDeployableCapital);
        }

        let n = config.num_iterations as usize;
        let mut slots: Vec<Option<ScenarioResult>> = Vec::with_capacity(n);
        slots.resize_with(n, || None);

        let started = Instant::now();
        let stopped = AtomicBool::new(false);

        let threads = rayon::current_num_threads().max(1);
        // Chunk by scenarios to keep per-thread work sizable.
        let chunk_len = (n / (threads * 4)).max(1);

        slots
            .par_chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(chunk_idx, out)| {
                let base = chunk_idx * chunk_len;
                for (offset, slot) in out.iter_mut().enumerate() {
                    if stopped.load(Ordering::Relaxed) {
                        return;
                    }
                    if self.should_stop(started) {
                        stopped.store(true, Ordering::Relaxed);
                        return;
                    }
                    let seed = stream_seed(config.seed, (base + offset) as u64);
                    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                    *slot = Some(run_scenario(config, &mut rng));
                }
            });

        if stopped.load(Ordering::Relaxed) {
            let completed = slots.iter().filter(|s| s.is_some()).count();
            return Err(RuntimeError::Cancelled {
                completed_scenarios: completed,
            });
        }

        Ok(slots
            .into_iter()
            .map(|s| s.expect("every slot filled on uncancelled run"))
            .collect())
    }

    fn should_stop(&self, started: Instant) -> bool {
        if let Some(cancel) = &self.cancel {
            if cancel.load(Ordering::Relaxed) {
                return true;
            }
        }
        if let Some(budget) = self.time_budget {
            if started.elapsed() >= budget {
                return true;
            }
        }
        false
    }
}

impl Default for ScenarioEngine {
    fn default() -> Self {
        Self::new()
    }
}
