//! Stress testing: fixed scenarios, reverse stress and historical replay.

mod catalog;
mod replay;
mod reverse;

pub use catalog::*;
pub use replay::*;
pub use reverse::*;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StressConfig;
use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::types::{InstrumentUniverse, PositionSnapshot};

/// P&L of one position under a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPnl {
    pub instrument: String,
    pub notional: f64,
    pub shock: f64,
    pub pnl: f64,
}

/// Outcome of applying one scenario to the current positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario_id: String,
    pub scenario_name: String,
    pub total_pnl: f64,
    pub pnl_pct_nav: f64,
    pub positions: Vec<PositionPnl>,
    /// Held instruments the scenario has no shock for
    pub unshocked: Vec<String>,
}

impl StressResult {
    /// Position with the largest loss.
    pub fn worst_position(&self) -> Option<&PositionPnl> {
        self.positions.iter().min_by(|a, b| a.pnl.total_cmp(&b.pnl))
    }
}

/// Stress report of one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StressReport {
    pub scenarios: Vec<StressResult>,
    pub reverse: Vec<ReverseStressOutcome>,
    pub replays: Vec<ReplayResult>,
    /// Replays that could not be run, with the reason
    #[serde(default)]
    pub failed_replays: Vec<FailedReplay>,
}

/// A requested replay that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedReplay {
    pub name: String,
    pub reason: String,
}

impl StressReport {
    /// Scenario with the most negative P&L.
    pub fn worst_scenario(&self) -> Option<&StressResult> {
        self.scenarios
            .iter()
            .min_by(|a, b| a.total_pnl.total_cmp(&b.total_pnl))
    }
}

/// Applies scenarios to position snapshots.
#[derive(Debug, Clone, Default)]
pub struct StressTester {
    config: StressConfig,
    universe: InstrumentUniverse,
}

impl StressTester {
    pub fn new(config: StressConfig, universe: InstrumentUniverse) -> Self {
        Self { config, universe }
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Linear scenario P&L.
    pub fn run_scenario(
        &self,
        scenario: &StressScenario,
        positions: &PositionSnapshot,
    ) -> Result<StressResult> {
        positions.validate()?;
        scenario
            .validate()
            .map_err(|e| Error::Config(format!("stress scenario: {}", e)))?;

        let mut rows = Vec::new();
        let mut unshocked = Vec::new();
        for (instrument, notional) in &positions.positions {
            if *notional == 0.0 {
                continue;
            }
            match scenario.shock_for(instrument, &self.universe) {
                Some(shock) => rows.push(PositionPnl {
                    instrument: instrument.clone(),
                    notional: *notional,
                    shock,
                    pnl: notional * shock,
                }),
                None => unshocked.push(instrument.clone()),
            }
        }
        let total_pnl: f64 = rows.iter().map(|r| r.pnl).sum();

        debug!(
            target: targets::RISK,
            scenario = %scenario.id,
            total_pnl,
            unshocked = unshocked.len(),
            "Scenario applied"
        );

        Ok(StressResult {
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            total_pnl,
            pnl_pct_nav: total_pnl / positions.nav,
            positions: rows,
            unshocked,
        })
    }

    /// Every scenario of the catalog, in catalog order.
    pub fn run_all(
        &self,
        catalog: &ScenarioCatalog,
        positions: &PositionSnapshot,
    ) -> Result<Vec<StressResult>> {
        let results = catalog
            .scenarios
            .iter()
            .map(|s| self.run_scenario(s, positions))
            .collect::<Result<Vec<_>>>()?;

        if let Some(worst) = results.iter().min_by(|a, b| a.total_pnl.total_cmp(&b.total_pnl)) {
            info!(
                target: targets::RISK,
                scenarios = results.len(),
                worst = %worst.scenario_id,
                worst_pnl_pct = worst.pnl_pct_nav,
                "Stress catalog evaluated"
            );
        }
        Ok(results)
    }
}
