//! Value-at-Risk and Conditional VaR.
//!
//! Three interchangeable estimators behind [`VaREstimator`]:
//!
//! | Estimator | Distribution | Minimum rows |
//! |-----------|--------------|--------------|
//! | [`HistoricalVaR`] | empirical portfolio P&L | 250 |
//! | [`ParametricVaR`] | Gaussian / Student-t on the shrinkage covariance | 756 |
//! | [`MonteCarloVaR`] | t marginals, Gaussian copula | 756 |
//!
//! # Sign convention
//!
//! VaR and CVaR are signed P&L figures in currency units: both ≤ 0 and
//! `cvar ≤ var`. Horizon scaling is `√h` for every estimator.

mod decomposition;
mod historical;
mod monte_carlo;
mod parametric;

pub use decomposition::*;
pub use historical::*;
pub use monte_carlo::*;
pub use parametric::*;

use std::fmt;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::types::{PositionSnapshot, ReturnHistory, ReturnMatrix};

/// Estimator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaRMethod {
    Historical,
    Parametric,
    MonteCarlo,
}

impl fmt::Display for VaRMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaRMethod::Historical => write!(f, "historical"),
            VaRMethod::Parametric => write!(f, "parametric"),
            VaRMethod::MonteCarlo => write!(f, "monte_carlo"),
        }
    }
}

/// VaR and CVaR at one confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VaRLevel {
    pub confidence: f64,
    pub var: f64,
    pub cvar: f64,
}

/// Output of one estimator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaRResult {
    pub method: VaRMethod,
    /// Requested confidence level
    pub confidence_level: f64,
    pub horizon_days: u32,
    /// VaR at the requested level (≤ 0)
    pub var: f64,
    /// CVaR at the requested level (≤ var)
    pub cvar: f64,
    /// Every reported level (95%, 99% and the requested one), ascending
    pub levels: Vec<VaRLevel>,
    /// Observations (or simulated paths) the figures rest on
    pub n_obs: usize,
    pub nav: f64,
}

impl VaRResult {
    /// Figures at a given level, if reported.
    pub fn level(&self, confidence: f64) -> Option<&VaRLevel> {
        self.levels
            .iter()
            .find(|l| (l.confidence - confidence).abs() < 1e-12)
    }

    /// VaR as a fraction of NAV (≤ 0).
    pub fn var_pct_nav(&self) -> f64 {
        self.var / self.nav
    }

    /// Result for a flat portfolio.
    pub(crate) fn flat(
        method: VaRMethod,
        confidence: f64,
        horizon_days: u32,
        report_levels: &[f64],
        nav: f64,
    ) -> Self {
        let levels = reported_levels(confidence, report_levels)
            .into_iter()
            .map(|c| VaRLevel {
                confidence: c,
                var: 0.0,
                cvar: 0.0,
            })
            .collect();
        Self {
            method,
            confidence_level: confidence,
            horizon_days,
            var: 0.0,
            cvar: 0.0,
            levels,
            n_obs: 0,
            nav,
        }
    }

    pub(crate) fn from_levels(
        method: VaRMethod,
        confidence: f64,
        horizon_days: u32,
        levels: Vec<VaRLevel>,
        n_obs: usize,
        nav: f64,
    ) -> Self {
        let headline = levels
            .iter()
            .find(|l| (l.confidence - confidence).abs() < 1e-12)
            .copied()
            .unwrap_or(VaRLevel {
                confidence,
                var: 0.0,
                cvar: 0.0,
            });
        Self {
            method,
            confidence_level: confidence,
            horizon_days,
            var: headline.var,
            cvar: headline.cvar,
            levels,
            n_obs,
            nav,
        }
    }
}

/// Common interface of the VaR estimators.
pub trait VaREstimator: Send + Sync {
    fn method(&self) -> VaRMethod;

    /// VaR/CVaR of the positions at `confidence` over `horizon_days`.
    fn compute(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
        confidence: f64,
        horizon_days: u32,
    ) -> Result<VaRResult>;
}

/// Requested level merged into the report levels, sorted and deduplicated.
pub fn reported_levels(confidence: f64, report_levels: &[f64]) -> Vec<f64> {
    let mut levels: Vec<f64> = report_levels.to_vec();
    levels.push(confidence);
    levels.sort_by(|a, b| a.total_cmp(b));
    levels.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
    levels
}

/// Empirical VaR and CVaR from P&L sorted ascending.
///
/// The VaR index is `k = ceil((1 − α)·n) − 1`; CVaR is the mean of the
/// `k + 1` worst outcomes. Positive quantiles clamp to zero.
pub fn empirical_var_cvar(sorted_pnl: &[f64], confidence: f64) -> (f64, f64) {
    let n = sorted_pnl.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    // Tolerance absorbs 1 − α rounding, e.g. (1 − 0.99)·100 = 1.0000000000000009
    let k = (((1.0 - confidence) * n as f64 - 1e-9).ceil() as usize)
        .saturating_sub(1)
        .min(n - 1);
    let var = sorted_pnl[k].min(0.0);
    let tail_mean = sorted_pnl[..=k].iter().sum::<f64>() / (k + 1) as f64;
    (var, tail_mean.min(var))
}

/// Empirical levels from unsorted P&L, scaled by √h.
pub(crate) fn empirical_levels(
    mut pnl: Vec<f64>,
    confidence: f64,
    report_levels: &[f64],
    horizon_days: u32,
) -> Vec<VaRLevel> {
    pnl.sort_by(|a, b| a.total_cmp(b));
    let scale = horizon_scale(horizon_days);
    reported_levels(confidence, report_levels)
        .into_iter()
        .map(|c| {
            let (var, cvar) = empirical_var_cvar(&pnl, c);
            VaRLevel {
                confidence: c,
                var: var * scale,
                cvar: cvar * scale,
            }
        })
        .collect()
}

/// √h.
pub fn horizon_scale(horizon_days: u32) -> f64 {
    (horizon_days.max(1) as f64).sqrt()
}

/// Aligned window and notional vector for the active positions.
///
/// Returns `None` for a flat portfolio.
pub(crate) fn portfolio_window(
    positions: &PositionSnapshot,
    returns: &ReturnHistory,
    lookback: usize,
    min_obs: usize,
    context: &str,
) -> Result<Option<(ReturnMatrix, DVector<f64>)>> {
    positions.validate()?;
    let instruments = positions.active_instruments();
    if instruments.is_empty() {
        return Ok(None);
    }
    let window = returns.aligned(&instruments, Some(lookback))?;
    if window.n_obs() < min_obs {
        return Err(Error::insufficient_data(context, min_obs, window.n_obs()));
    }
    let notionals = positions.vector(&instruments);
    Ok(Some((window, notionals)))
}

pub(crate) fn check_level(confidence: f64) -> Result<()> {
    if !(confidence > 0.5 && confidence < 1.0) {
        return Err(Error::Config(format!(
            "confidence must be in (0.5, 1.0), got {}",
            confidence
        )));
    }
    Ok(())
}

pub(crate) fn distribution_error(e: impl fmt::Display) -> Error {
    Error::Config(format!("distribution parameters: {}", e))
}
