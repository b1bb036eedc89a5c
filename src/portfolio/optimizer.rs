//! Black-Litterman views → risk-budgeted target weights.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{EngineConfig, LimitsConfig, OptimizerConfig, VaRConfig};
use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::risk::LedoitWolf;
use crate::types::{
    AggregatedSignal, AssetClass, InstrumentUniverse, PositionSnapshot, RegimeView, ReturnHistory,
};

use super::black_litterman::{BlackLitterman, BlackLittermanResult};
use super::solver::{AugmentedLagrangian, MeanVarianceProblem, RiskGroup, SolveOutcome, Solution};
use super::target::{LimitOverride, PortfolioTarget};

/// Tolerance on soft-limit comparisons of solver output.
const LIMIT_TOLERANCE: f64 = 1e-9;

/// Targets of one optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub as_of: NaiveDate,
    pub targets: Vec<PortfolioTarget>,
    /// `None` when there was nothing to optimize
    pub black_litterman: Option<BlackLittermanResult>,
    /// Posterior daily expected return of the target weights
    pub expected_return: f64,
    /// Posterior daily volatility of the target weights
    pub expected_volatility: f64,
    pub gross_leverage: f64,
    pub solution: Option<Solution>,
    /// Instruments left out for lack of return history
    pub excluded: Vec<String>,
}

impl OptimizationResult {
    pub fn target(&self, instrument: &str) -> Option<&PortfolioTarget> {
        self.targets.iter().find(|t| t.instrument == instrument)
    }

    pub fn overrides(&self) -> impl Iterator<Item = &LimitOverride> {
        self.targets.iter().flat_map(|t| t.overrides.iter())
    }
}

/// Optimizer outcome; infeasibility is reported, not raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OptimizationOutcome {
    Solved(OptimizationResult),
    NoSolution {
        max_violation: f64,
        outer_iterations: usize,
        reason: String,
        excluded: Vec<String>,
    },
}

impl OptimizationOutcome {
    pub fn result(&self) -> Option<&OptimizationResult> {
        match self {
            OptimizationOutcome::Solved(r) => Some(r),
            OptimizationOutcome::NoSolution { .. } => None,
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self, OptimizationOutcome::Solved(_))
    }
}

/// Mean-variance optimizer over the Black-Litterman posterior.
#[derive(Debug, Clone)]
pub struct PortfolioOptimizer {
    config: OptimizerConfig,
    limits: LimitsConfig,
    universe: InstrumentUniverse,
    shrinkage: LedoitWolf,
    lookback: usize,
    min_observations: usize,
    black_litterman: BlackLitterman,
    solver: AugmentedLagrangian,
}

impl PortfolioOptimizer {
    pub fn new(
        config: OptimizerConfig,
        limits: LimitsConfig,
        var: &VaRConfig,
        universe: InstrumentUniverse,
    ) -> Self {
        Self {
            shrinkage: LedoitWolf::new(var.shrinkage.clone()),
            lookback: var.historical_lookback,
            min_observations: var.min_historical_observations,
            black_litterman: BlackLitterman::new(config.clone()),
            solver: AugmentedLagrangian::new(config.solver.clone()),
            config,
            limits,
            universe,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.optimizer.clone(),
            config.limits.clone(),
            &config.var,
            config.universe.clone(),
        )
    }

    fn is_top_tier(&self, signal: Option<&AggregatedSignal>) -> bool {
        signal.is_some_and(|s| s.net_conviction.abs() >= self.config.top_tier_conviction)
    }

    /// Per-instrument and per-asset-class ceilings the solver enforces.
    ///
    /// The configured ceilings are raised to [`ceiling_floor`] when they are
    /// too tight for the number of groups; the relaxation is logged and any
    /// target beyond the configured ceiling later carries a `LimitOverride`.
    fn enforced_ceilings(&self, n_instruments: usize, n_classes: usize) -> EnforcedCeilings {
        let instrument = self.limits.instrument_risk_ceiling.max(ceiling_floor(n_instruments));
        let asset_class = self.limits.asset_class_risk_ceiling.max(ceiling_floor(n_classes));
        if self.config.enforce_risk_budget {
            if instrument > self.limits.instrument_risk_ceiling {
                warn!(
                    target: targets::PORTFOLIO,
                    configured = self.limits.instrument_risk_ceiling,
                    enforced = instrument,
                    instruments = n_instruments,
                    "Instrument risk ceiling relaxed for a small book"
                );
            }
            if asset_class > self.limits.asset_class_risk_ceiling {
                warn!(
                    target: targets::PORTFOLIO,
                    configured = self.limits.asset_class_risk_ceiling,
                    enforced = asset_class,
                    asset_classes = n_classes,
                    "Asset-class risk ceiling relaxed for a small book"
                );
            }
        }
        EnforcedCeilings {
            instrument,
            asset_class,
        }
    }

    /// Risk-share groups under the enforced ceilings.
    ///
    /// A group ceiling of 1 or more can never bind and is left out.
    fn risk_groups(
        &self,
        top_tier: &[bool],
        classes: &BTreeMap<AssetClass, Vec<usize>>,
        ceilings: EnforcedCeilings,
        instruments: &[String],
    ) -> Vec<RiskGroup> {
        if !self.config.enforce_risk_budget {
            return Vec::new();
        }
        let widen = 1.0 + self.config.override_margin;
        let mut groups = Vec::new();

        for (i, instrument) in instruments.iter().enumerate() {
            let ceiling = if top_tier[i] {
                ceilings.instrument * widen
            } else {
                ceilings.instrument
            };
            if ceiling < 1.0 {
                groups.push(RiskGroup {
                    name: instrument.clone(),
                    members: vec![i],
                    ceiling,
                });
            }
        }
        if ceilings.asset_class < 1.0 {
            for (class, members) in classes {
                groups.push(RiskGroup {
                    name: class.to_string(),
                    members: members.clone(),
                    ceiling: ceilings.asset_class,
                });
            }
        }
        groups
    }

    /// Why a risk share may sit above its configured ceiling.
    fn risk_justification(&self, top_tier: bool, configured: f64, enforced: f64, conviction: f64) -> String {
        if !self.config.enforce_risk_budget {
            "risk budget not enforced".to_string()
        } else if top_tier {
            format!("top-tier conviction {:+.2}", conviction)
        } else if enforced > configured {
            format!("ceiling relaxed to {:.2} for the number of risk groups", enforced)
        } else {
            "within solver feasibility tolerance".to_string()
        }
    }

    /// Target weights for the given views and current book.
    pub fn optimize(
        &self,
        signals: &[AggregatedSignal],
        regime: Option<&RegimeView>,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
    ) -> Result<OptimizationOutcome> {
        positions.validate()?;

        let candidates: BTreeSet<String> = signals
            .iter()
            .map(|s| s.instrument.clone())
            .chain(positions.active_instruments())
            .collect();
        let (instruments, excluded): (Vec<String>, Vec<String>) =
            candidates.into_iter().partition(|i| returns.contains(i));
        if !excluded.is_empty() {
            warn!(
                target: targets::PORTFOLIO,
                excluded = ?excluded,
                "Instruments without return history left out of the optimization"
            );
        }

        if instruments.is_empty() {
            return Ok(OptimizationOutcome::Solved(OptimizationResult {
                as_of: positions.as_of,
                targets: Vec::new(),
                black_litterman: None,
                expected_return: 0.0,
                expected_volatility: 0.0,
                gross_leverage: 0.0,
                solution: None,
                excluded,
            }));
        }

        let window = returns.aligned(&instruments, Some(self.lookback))?;
        if window.n_obs() < self.min_observations {
            return Err(Error::insufficient_data(
                "portfolio optimizer",
                self.min_observations,
                window.n_obs(),
            ));
        }
        let estimate = self.shrinkage.estimate(&window)?;
        let bl = self.black_litterman.posterior(&estimate, signals, regime)?;

        let by_instrument: BTreeMap<&str, &AggregatedSignal> =
            signals.iter().map(|s| (s.instrument.as_str(), s)).collect();
        let top_tier: Vec<bool> = instruments
            .iter()
            .map(|i| self.is_top_tier(by_instrument.get(i.as_str()).copied()))
            .collect();
        let widen = 1.0 + self.config.override_margin;
        let bounds = DVector::from_iterator(
            instruments.len(),
            top_tier.iter().map(|top| {
                if *top {
                    self.config.max_weight * widen
                } else {
                    self.config.max_weight
                }
            }),
        );

        let mut classes: BTreeMap<AssetClass, Vec<usize>> = BTreeMap::new();
        for (i, instrument) in instruments.iter().enumerate() {
            classes
                .entry(self.universe.asset_class(instrument))
                .or_default()
                .push(i);
        }
        let ceilings = self.enforced_ceilings(instruments.len(), classes.len());

        let problem = MeanVarianceProblem {
            expected_returns: bl.posterior_returns.clone(),
            covariance: bl.posterior_covariance.clone(),
            risk_aversion: self.config.risk_aversion,
            bounds,
            max_gross_leverage: self.config.max_gross_leverage,
            risk_groups: self.risk_groups(&top_tier, &classes, ceilings, &instruments),
        };

        let solution = match self.solver.solve(&problem)? {
            SolveOutcome::Solved(solution) => solution,
            SolveOutcome::NoSolution {
                max_violation,
                outer_iterations,
                reason,
            } => {
                warn!(
                    target: targets::PORTFOLIO,
                    max_violation,
                    outer_iterations,
                    "No feasible portfolio: {}",
                    reason
                );
                return Ok(OptimizationOutcome::NoSolution {
                    max_violation,
                    outer_iterations,
                    reason,
                    excluded,
                });
            }
        };

        let w = &solution.weights;
        let shares = instrument_risk_shares(&problem, w);
        let tolerance = self.config.solver.feasibility_tolerance;
        let mut class_overrides: BTreeMap<usize, LimitOverride> = BTreeMap::new();
        for (class, members) in &classes {
            let share: f64 = members.iter().map(|i| shares[*i]).sum();
            let configured = self.limits.asset_class_risk_ceiling;
            if share > configured + tolerance {
                let top_conviction = members
                    .iter()
                    .filter(|i| top_tier[**i])
                    .filter_map(|i| by_instrument.get(instruments[*i].as_str()))
                    .map(|s| s.net_conviction)
                    .next();
                let justification = self.risk_justification(
                    top_conviction.is_some(),
                    configured,
                    ceilings.asset_class,
                    top_conviction.unwrap_or(0.0),
                );
                let o = LimitOverride::new(
                    format!("asset_class_risk_ceiling:{}", class),
                    configured,
                    share,
                    justification,
                );
                for i in members {
                    class_overrides.insert(*i, o.clone());
                }
            }
        }

        let mut targets = Vec::with_capacity(instruments.len());
        for (i, instrument) in instruments.iter().enumerate() {
            let signal = by_instrument.get(instrument.as_str()).copied();
            let conviction = signal.map(|s| s.net_conviction).unwrap_or(0.0);
            let weight = w[i];
            let mut overrides = Vec::new();

            if weight.abs() > self.config.max_weight + LIMIT_TOLERANCE {
                overrides.push(LimitOverride::new(
                    format!("max_weight:{}", instrument),
                    self.config.max_weight,
                    weight.abs(),
                    format!("top-tier conviction {:+.2}", conviction),
                ));
            }
            let configured = self.limits.instrument_risk_ceiling;
            if shares[i] > configured + tolerance {
                overrides.push(LimitOverride::new(
                    format!("risk_ceiling:{}", instrument),
                    configured,
                    shares[i],
                    self.risk_justification(top_tier[i], configured, ceilings.instrument, conviction),
                ));
            }
            overrides.extend(class_overrides.remove(&i));
            for o in &overrides {
                warn!(
                    target: targets::PORTFOLIO,
                    limit_id = %o.limit_id,
                    limit = o.limit,
                    value = o.value,
                    "Soft limit exceeded under override: {}",
                    o.justification
                );
            }

            let target_notional = weight * positions.nav;
            let current_notional = positions.notional(instrument);
            targets.push(PortfolioTarget {
                instrument: instrument.clone(),
                asset_class: self.universe.asset_class(instrument),
                target_weight: weight,
                target_notional,
                current_weight: positions.weight(instrument),
                current_notional,
                trade_needed: target_notional - current_notional,
                strategy_attribution: signal
                    .map(|s| s.attribution().into_iter().collect())
                    .unwrap_or_default(),
                overrides,
            });
        }

        let expected_return = w.dot(&bl.posterior_returns);
        let expected_volatility = w.dot(&(&bl.posterior_covariance * w)).max(0.0).sqrt();
        let gross_leverage = w.abs().sum();

        info!(
            target: targets::PORTFOLIO,
            instruments = targets.len(),
            views = bl.views.len(),
            gross_leverage,
            expected_return,
            expected_volatility,
            "Portfolio optimized"
        );

        Ok(OptimizationOutcome::Solved(OptimizationResult {
            as_of: positions.as_of,
            targets,
            black_litterman: Some(bl),
            expected_return,
            expected_volatility,
            gross_leverage,
            solution: Some(solution),
            excluded,
        }))
    }
}

/// Ceilings the solver enforces after raising the configured ones.
#[derive(Debug, Clone, Copy)]
struct EnforcedCeilings {
    instrument: f64,
    asset_class: f64,
}

/// Lowest enforceable risk-share ceiling across `groups` groups.
///
/// Ceilings at the equal-risk share 1/n leave a single risk-parity ray as
/// the feasible set; 2/(n+1) keeps an interior while staying above it.
/// A configured ceiling below this value is overridden for the solve, so
/// with 3 instruments a 20% ceiling is enforced as 50%.
fn ceiling_floor(groups: usize) -> f64 {
    2.0 / (groups as f64 + 1.0)
}

/// Single-instrument risk shares under the problem covariance.
fn instrument_risk_shares(problem: &MeanVarianceProblem, w: &DVector<f64>) -> Vec<f64> {
    let s = &problem.covariance * w;
    let v = w.dot(&s);
    (0..w.len())
        .map(|i| if v > 0.0 { w[i] * s[i] / v } else { 0.0 })
        .collect()
}
