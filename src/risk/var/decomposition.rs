//! Euler decomposition of parametric VaR.
//!
//! With zero-mean returns, VaR is homogeneous of degree one in the notionals:
//!
//! ```text
//! VaR        = −k · √(wᵀΣw) · √h
//! marginalᵢ  = ∂VaR/∂wᵢ = −k · (Σw)ᵢ / σ_p · √h
//! componentᵢ = wᵢ · marginalᵢ,     Σᵢ componentᵢ = VaR
//! ```

use std::collections::BTreeMap;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::risk::covariance::ShrinkageEstimate;
use crate::types::{AssetClass, InstrumentUniverse};

use super::horizon_scale;

/// One instrument's share of portfolio VaR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVaR {
    pub instrument: String,
    pub asset_class: AssetClass,
    pub notional: f64,
    /// ∂VaR/∂notional
    pub marginal_var: f64,
    /// notional × marginal
    pub component_var: f64,
    /// component / total; may be negative for hedges
    pub contribution_pct: f64,
}

/// Marginal and component VaR of a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaRDecomposition {
    pub confidence_level: f64,
    pub horizon_days: u32,
    /// Independently computed parametric VaR
    pub total_var: f64,
    pub components: Vec<ComponentVaR>,
    /// Component VaR summed per asset class
    pub by_asset_class: BTreeMap<AssetClass, f64>,
    pub component_sum: f64,
    /// |Σ components − total| / |total|
    pub relative_gap: f64,
    pub within_tolerance: bool,
}

impl VaRDecomposition {
    pub(crate) fn empty(confidence_level: f64, horizon_days: u32) -> Self {
        Self {
            confidence_level,
            horizon_days,
            total_var: 0.0,
            components: Vec::new(),
            by_asset_class: BTreeMap::new(),
            component_sum: 0.0,
            relative_gap: 0.0,
            within_tolerance: true,
        }
    }

    pub fn component(&self, instrument: &str) -> Option<&ComponentVaR> {
        self.components.iter().find(|c| c.instrument == instrument)
    }

    /// Share of total VaR per instrument.
    pub fn instrument_shares(&self) -> BTreeMap<String, f64> {
        self.components
            .iter()
            .map(|c| (c.instrument.clone(), c.contribution_pct))
            .collect()
    }

    /// Share of total VaR per asset class.
    pub fn asset_class_shares(&self) -> BTreeMap<AssetClass, f64> {
        self.by_asset_class
            .iter()
            .map(|(class, v)| {
                let share = if self.total_var != 0.0 { v / self.total_var } else { 0.0 };
                (*class, share)
            })
            .collect()
    }
}

/// Decompose `−k·σ_p·√h` into per-instrument contributions.
pub fn euler_decomposition(
    estimate: &ShrinkageEstimate,
    notionals: &DVector<f64>,
    k: f64,
    confidence_level: f64,
    horizon_days: u32,
    universe: &InstrumentUniverse,
    tolerance: f64,
) -> Result<VaRDecomposition> {
    let n = estimate.n_instruments();
    if notionals.len() != n {
        return Err(Error::dimension_mismatch("VaR decomposition", n, notionals.len()));
    }

    let sigma_w = &estimate.covariance * notionals;
    let sigma_p = notionals.dot(&sigma_w).max(0.0).sqrt();
    if sigma_p == 0.0 {
        return Ok(VaRDecomposition::empty(confidence_level, horizon_days));
    }

    let scale = horizon_scale(horizon_days);
    let total_var = -k * sigma_p * scale;

    let mut components = Vec::with_capacity(n);
    let mut by_asset_class: BTreeMap<AssetClass, f64> = BTreeMap::new();
    for (i, instrument) in estimate.instruments.iter().enumerate() {
        let marginal = -k * sigma_w[i] / sigma_p * scale;
        let component = notionals[i] * marginal;
        let asset_class = universe.asset_class(instrument);
        *by_asset_class.entry(asset_class).or_insert(0.0) += component;
        components.push(ComponentVaR {
            instrument: instrument.clone(),
            asset_class,
            notional: notionals[i],
            marginal_var: marginal,
            component_var: component,
            contribution_pct: component / total_var,
        });
    }

    let component_sum: f64 = components.iter().map(|c| c.component_var).sum();
    let relative_gap = ((component_sum - total_var) / total_var).abs();
    let within_tolerance = relative_gap <= tolerance;
    if !within_tolerance {
        warn!(
            target: targets::RISK,
            total_var,
            component_sum,
            relative_gap,
            tolerance,
            "Component VaR does not reconcile with total"
        );
    }
    debug!(
        target: targets::RISK,
        total_var,
        instruments = n,
        "VaR decomposed"
    );

    Ok(VaRDecomposition {
        confidence_level,
        horizon_days,
        total_var,
        components,
        by_asset_class,
        component_sum,
        relative_gap,
        within_tolerance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShrinkageTarget;
    use nalgebra::DMatrix;

    fn estimate() -> ShrinkageEstimate {
        ShrinkageEstimate {
            instruments: vec!["USDBRL".into(), "IBOV".into(), "SPX".into()],
            covariance: DMatrix::from_row_slice(
                3,
                3,
                &[
                    1.0e-4, -0.4e-4, -0.2e-4, //
                    -0.4e-4, 2.25e-4, 0.6e-4, //
                    -0.2e-4, 0.6e-4, 1.0e-4,
                ],
            ),
            target: ShrinkageTarget::ConstantCorrelation,
            intensity: 0.1,
            n_obs: 756,
        }
    }

    #[test]
    fn test_components_sum_to_total() {
        let w = DVector::from_vec(vec![100_000.0, 250_000.0, -80_000.0]);
        let dec = euler_decomposition(
            &estimate(),
            &w,
            2.326,
            0.99,
            1,
            &InstrumentUniverse::default(),
            0.02,
        )
        .unwrap();
        assert!(dec.relative_gap < 1e-12);
        assert!(dec.within_tolerance);
        let pct: f64 = dec.components.iter().map(|c| c.contribution_pct).sum();
        assert!((pct - 1.0).abs() < 1e-12);
        assert_eq!(dec.by_asset_class.len(), 2);
        let eq = dec.asset_class_shares()[&AssetClass::Equity];
        let fx = dec.asset_class_shares()[&AssetClass::Fx];
        assert!((eq + fx - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hedge_has_negative_contribution() {
        let w = DVector::from_vec(vec![0.0, 300_000.0, -50_000.0]);
        let dec = euler_decomposition(
            &estimate(),
            &w,
            2.326,
            0.99,
            1,
            &InstrumentUniverse::default(),
            0.02,
        )
        .unwrap();
        assert!(dec.component("SPX").unwrap().contribution_pct < 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let w = DVector::from_vec(vec![1.0]);
        assert!(euler_decomposition(
            &estimate(),
            &w,
            2.326,
            0.99,
            1,
            &InstrumentUniverse::default(),
            0.02
        )
        .is_err());
    }
}
