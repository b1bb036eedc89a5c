//! Reverse stress: how severe must a scenario be to lose the target amount?
//!
//! Binary search of a shock multiplier `m ∈ [multiplier_min, multiplier_max]`
//! such that `P&L(m · scenario) = target_loss_pct · NAV`.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::Result;
use crate::infra::targets;
use crate::types::PositionSnapshot;

use super::{StressScenario, StressTester};

/// Why no multiplier reaches the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InfeasibleReason {
    /// No held position is shocked by the scenario
    NoExposure,
    /// The scenario makes money (or nets to zero) on the current book
    ScenarioGains { base_pnl: f64 },
    /// The required multiplier lies outside the search bounds
    MultiplierOutOfBounds { required: f64, min: f64, max: f64 },
    /// Search exhausted its iterations without meeting the tolerance
    NotConverged { best_multiplier: f64, best_pnl: f64 },
}

/// Result of a reverse stress search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReverseStressOutcome {
    Found {
        scenario_id: String,
        multiplier: f64,
        target_pnl: f64,
        achieved_pnl: f64,
        iterations: usize,
    },
    Infeasible {
        scenario_id: String,
        target_pnl: f64,
        reason: InfeasibleReason,
    },
}

impl ReverseStressOutcome {
    pub fn scenario_id(&self) -> &str {
        match self {
            ReverseStressOutcome::Found { scenario_id, .. }
            | ReverseStressOutcome::Infeasible { scenario_id, .. } => scenario_id,
        }
    }

    pub fn multiplier(&self) -> Option<f64> {
        match self {
            ReverseStressOutcome::Found { multiplier, .. } => Some(*multiplier),
            ReverseStressOutcome::Infeasible { .. } => None,
        }
    }

    pub fn is_feasible(&self) -> bool {
        matches!(self, ReverseStressOutcome::Found { .. })
    }
}

impl StressTester {
    /// Search with the configured target loss.
    pub fn reverse_stress(
        &self,
        scenario: &StressScenario,
        positions: &PositionSnapshot,
    ) -> Result<ReverseStressOutcome> {
        self.reverse_stress_to(scenario, positions, self.config().reverse_target_loss_pct)
    }

    /// Search for the multiplier losing `target_loss_pct` (signed, < 0) of NAV.
    pub fn reverse_stress_to(
        &self,
        scenario: &StressScenario,
        positions: &PositionSnapshot,
        target_loss_pct: f64,
    ) -> Result<ReverseStressOutcome> {
        let cfg = self.config();
        let target_pnl = -target_loss_pct.abs() * positions.nav;
        let infeasible = |reason: InfeasibleReason| {
            info!(
                target: targets::RISK,
                scenario = %scenario.id,
                reason = ?reason,
                "Reverse stress infeasible"
            );
            ReverseStressOutcome::Infeasible {
                scenario_id: scenario.id.clone(),
                target_pnl,
                reason,
            }
        };

        let base = self.run_scenario(scenario, positions)?;
        if base.positions.is_empty() {
            return Ok(infeasible(InfeasibleReason::NoExposure));
        }
        if base.total_pnl >= 0.0 {
            return Ok(infeasible(InfeasibleReason::ScenarioGains {
                base_pnl: base.total_pnl,
            }));
        }

        let pnl_at = |m: f64| -> Result<f64> {
            Ok(self.run_scenario(&scenario.scaled(m), positions)?.total_pnl)
        };

        let (mut lo, mut hi) = (cfg.multiplier_min, cfg.multiplier_max);
        let (pnl_lo, pnl_hi) = (pnl_at(lo)?, pnl_at(hi)?);
        // P&L falls as the multiplier grows
        if pnl_lo < target_pnl || pnl_hi > target_pnl {
            return Ok(infeasible(InfeasibleReason::MultiplierOutOfBounds {
                required: target_pnl / base.total_pnl,
                min: lo,
                max: hi,
            }));
        }

        let mut best = (lo, pnl_lo);
        for iteration in 1..=cfg.max_iterations {
            let mid = 0.5 * (lo + hi);
            let pnl = pnl_at(mid)?;
            if (pnl - target_pnl).abs() < (best.1 - target_pnl).abs() {
                best = (mid, pnl);
            }
            if ((pnl - target_pnl) / target_pnl).abs() <= cfg.tolerance {
                info!(
                    target: targets::RISK,
                    scenario = %scenario.id,
                    multiplier = mid,
                    achieved_pnl = pnl,
                    iterations = iteration,
                    "Reverse stress multiplier found"
                );
                return Ok(ReverseStressOutcome::Found {
                    scenario_id: scenario.id.clone(),
                    multiplier: mid,
                    target_pnl,
                    achieved_pnl: pnl,
                    iterations: iteration,
                });
            }
            if pnl > target_pnl {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        warn!(
            target: targets::RISK,
            scenario = %scenario.id,
            best_multiplier = best.0,
            "Reverse stress did not converge"
        );
        Ok(infeasible(InfeasibleReason::NotConverged {
            best_multiplier: best.0,
            best_pnl: best.1,
        }))
    }

    /// Reverse stress for every scenario of a catalog.
    pub fn reverse_all(
        &self,
        catalog: &super::ScenarioCatalog,
        positions: &PositionSnapshot,
    ) -> Result<Vec<ReverseStressOutcome>> {
        catalog
            .scenarios
            .iter()
            .map(|s| self.reverse_stress(s, positions))
            .collect()
    }
}
