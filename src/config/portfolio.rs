//! Portfolio construction configuration: Black-Litterman, solver, sizing, rebalancing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Augmented-Lagrangian solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_outer_iterations: usize,
    pub max_inner_iterations: usize,
    /// Initial quadratic penalty weight.
    pub initial_penalty: f64,
    /// Penalty growth factor when constraint violation stalls.
    pub penalty_growth: f64,
    /// Convergence tolerance on the projected step.
    pub step_tolerance: f64,
    /// Maximum constraint violation accepted as feasible.
    pub feasibility_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_outer_iterations: 60,
            max_inner_iterations: 400,
            initial_penalty: 10.0,
            penalty_growth: 4.0,
            step_tolerance: 1e-9,
            feasibility_tolerance: 1e-4,
        }
    }
}

/// Black-Litterman and mean-variance optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Market risk aversion δ used in reverse optimization π = δΣw.
    pub equilibrium_risk_aversion: f64,
    /// Uncertainty scale τ on the equilibrium prior.
    pub tau: f64,
    /// Benchmark weights for the equilibrium; empty = zero prior returns.
    pub market_weights: BTreeMap<String, f64>,
    /// Daily expected return per unit conviction, in units of daily volatility.
    /// 0.0625 ≈ annual Sharpe 1 at full conviction.
    pub view_return_scale: f64,
    /// Views with effective confidence below this are dropped.
    pub min_view_confidence: f64,
    /// Risk aversion λ of the mean-variance solve.
    pub risk_aversion: f64,
    /// Soft limit on |weight| per instrument.
    pub max_weight: f64,
    /// Limit on Σ|weight|.
    pub max_gross_leverage: f64,
    /// Fractional widening of soft limits granted to top-tier convictions.
    pub override_margin: f64,
    /// |conviction| at or above which a view is top-tier.
    pub top_tier_conviction: f64,
    /// Impose instrument/asset-class risk-contribution ceilings in the solve.
    pub enforce_risk_budget: bool,
    pub solver: SolverConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            equilibrium_risk_aversion: 2.5,
            tau: 0.05,
            market_weights: BTreeMap::new(),
            view_return_scale: 0.0625,
            min_view_confidence: 1e-3,
            risk_aversion: 2.5,
            max_weight: 0.25,
            max_gross_leverage: 3.0,
            override_margin: 0.20,
            top_tier_conviction: 0.8,
            enforce_risk_budget: true,
            solver: SolverConfig::default(),
        }
    }
}

impl OptimizerConfig {
    /// Builder method to set δ.
    pub fn with_equilibrium_risk_aversion(mut self, delta: f64) -> Self {
        self.equilibrium_risk_aversion = delta;
        self
    }

    /// Builder method to set benchmark weights.
    pub fn with_market_weights(mut self, weights: BTreeMap<String, f64>) -> Self {
        self.market_weights = weights;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.equilibrium_risk_aversion <= 0.0 || self.risk_aversion <= 0.0 {
            return Err("risk aversion coefficients must be positive".to_string());
        }
        if self.tau <= 0.0 || self.tau > 1.0 {
            return Err(format!("tau must be in (0, 1], got {}", self.tau));
        }
        if self.view_return_scale <= 0.0 {
            return Err("view_return_scale must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.min_view_confidence) {
            return Err("min_view_confidence must be in [0, 1)".to_string());
        }
        if self.max_weight <= 0.0 || self.max_gross_leverage < self.max_weight {
            return Err(format!(
                "max_weight ({}) must be positive and not exceed max_gross_leverage ({})",
                self.max_weight, self.max_gross_leverage
            ));
        }
        if !(0.0..=1.0).contains(&self.override_margin) {
            return Err("override_margin must be in [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.top_tier_conviction) {
            return Err("top_tier_conviction must be in [0, 1]".to_string());
        }
        if self.market_weights.values().any(|w| !w.is_finite()) {
            return Err("market_weights must be finite".to_string());
        }
        let s = &self.solver;
        if s.max_outer_iterations == 0 || s.max_inner_iterations == 0 {
            return Err("solver iteration limits must be positive".to_string());
        }
        if s.initial_penalty <= 0.0 || s.penalty_growth <= 1.0 {
            return Err("solver penalty must be positive with growth > 1".to_string());
        }
        Ok(())
    }
}

/// Position sizing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    #[default]
    VolTarget,
    FractionalKelly,
    RiskBudget,
}

/// Position sizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub method: SizingMethod,
    /// Annualized volatility contribution per full-conviction position, as a fraction of NAV.
    pub target_vol_contribution: f64,
    /// Trading days per year for annualizing daily volatility.
    pub annualization_days: f64,
    /// Multiplier on full-Kelly size.
    pub kelly_fraction: f64,
    /// Daily expected return per unit conviction, in units of daily volatility.
    pub view_return_scale: f64,
    /// Portfolio VaR budget as a fraction of NAV (risk capital).
    pub risk_capital_pct: f64,
    /// Soft |notional| limit per position as a fraction of NAV.
    pub soft_position_limit_pct: f64,
    /// Fractional exceedance allowed for top-tier conviction.
    pub override_margin: f64,
    /// |conviction| at or above which a signal is top-tier.
    pub top_tier_conviction: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::VolTarget,
            target_vol_contribution: 0.02,
            annualization_days: 252.0,
            kelly_fraction: 0.5,
            view_return_scale: 0.0625,
            risk_capital_pct: 0.02,
            soft_position_limit_pct: 0.25,
            override_margin: 0.20,
            top_tier_conviction: 0.8,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.target_vol_contribution <= 0.0 {
            return Err("target_vol_contribution must be positive".to_string());
        }
        if self.annualization_days <= 0.0 {
            return Err("annualization_days must be positive".to_string());
        }
        if self.kelly_fraction <= 0.0 || self.kelly_fraction > 1.0 {
            return Err(format!("kelly_fraction must be in (0, 1], got {}", self.kelly_fraction));
        }
        if self.risk_capital_pct <= 0.0 || self.soft_position_limit_pct <= 0.0 {
            return Err("risk_capital_pct and soft_position_limit_pct must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.override_margin) {
            return Err("override_margin must be in [0, 1]".to_string());
        }
        Ok(())
    }
}

/// Rebalance trigger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Mean |Δ conviction| since last rebalance that triggers trading.
    pub signal_change_threshold: f64,
    /// Relative drift |current − target| / |target| that triggers trading.
    pub drift_threshold_pct: f64,
    /// Trades smaller than this fraction of NAV are not emitted.
    pub min_trade_pct_nav: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            signal_change_threshold: 0.15,
            drift_threshold_pct: 0.10,
            min_trade_pct_nav: 0.001,
        }
    }
}

impl RebalanceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.signal_change_threshold <= 0.0 || self.drift_threshold_pct <= 0.0 {
            return Err("rebalance thresholds must be positive".to_string());
        }
        if self.min_trade_pct_nav < 0.0 {
            return Err("min_trade_pct_nav must be non-negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(OptimizerConfig::default().validate().is_ok());
        assert!(SizingConfig::default().validate().is_ok());
        assert!(RebalanceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_kelly_fraction_default_is_half() {
        assert_eq!(SizingConfig::default().kelly_fraction, 0.5);
    }

    #[test]
    fn test_weight_above_leverage_rejected() {
        let cfg = OptimizerConfig {
            max_weight: 4.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
