//! Black-Litterman posterior with regime-adjusted view uncertainty.
//!
//! ```text
//! π      = δ Σ w_mkt
//! Qᵢ     = convictionᵢ · σᵢ · view_return_scale
//! ωᵢ     = (P τΣ Pᵀ)ᵢᵢ · (1 − c) / c,      c = confidence · clarity
//! M      = P τΣ Pᵀ + Ω
//! μ      = π + τΣPᵀ M⁻¹ (Q − Pπ)
//! Σ_post = Σ + τΣ − τΣPᵀ M⁻¹ P τΣ
//! ```
//!
//! Views are absolute: each row of P selects one instrument. An ambiguous
//! regime lowers `c` for every view and pulls μ back toward π.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OptimizerConfig;
use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::risk::covariance::ShrinkageEstimate;
use crate::types::{AggregatedSignal, RegimeView};

/// One absolute view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub instrument: String,
    /// Column of the instrument in the covariance
    pub index: usize,
    pub conviction: f64,
    /// Signal confidence × regime clarity
    pub effective_confidence: f64,
    /// Expected daily return Q
    pub expected_return: f64,
    /// Diagonal entry of Ω
    pub uncertainty: f64,
}

/// Equilibrium and posterior moments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackLittermanResult {
    pub instruments: Vec<String>,
    pub equilibrium_returns: DVector<f64>,
    pub posterior_returns: DVector<f64>,
    pub posterior_covariance: DMatrix<f64>,
    pub views: Vec<View>,
    /// Clarity applied to every view (1 without a regime)
    pub clarity: f64,
}

/// Black-Litterman estimator.
#[derive(Debug, Clone, Default)]
pub struct BlackLitterman {
    config: OptimizerConfig,
}

impl BlackLitterman {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// π = δ Σ w_mkt; instruments without a market weight hold zero.
    pub fn equilibrium(&self, estimate: &ShrinkageEstimate) -> DVector<f64> {
        let w = DVector::from_iterator(
            estimate.n_instruments(),
            estimate
                .instruments
                .iter()
                .map(|i| self.config.market_weights.get(i).copied().unwrap_or(0.0)),
        );
        &estimate.covariance * w * self.config.equilibrium_risk_aversion
    }

    /// Views from aggregated signals on instruments the covariance covers.
    pub fn views(
        &self,
        estimate: &ShrinkageEstimate,
        signals: &[AggregatedSignal],
        clarity: f64,
    ) -> Vec<View> {
        let tau = self.config.tau;
        let mut views = Vec::new();
        for signal in signals {
            let Some(index) = estimate.index_of(&signal.instrument) else {
                continue;
            };
            let c = (signal.confidence * clarity).min(1.0);
            if signal.net_conviction == 0.0 || c < self.config.min_view_confidence || c <= 0.0 {
                continue;
            }
            let variance = estimate.covariance[(index, index)];
            let prior_variance = tau * variance;
            views.push(View {
                instrument: signal.instrument.clone(),
                index,
                conviction: signal.net_conviction,
                effective_confidence: c,
                expected_return: signal.net_conviction
                    * variance.sqrt()
                    * self.config.view_return_scale,
                uncertainty: prior_variance * (1.0 - c) / c,
            });
        }
        views
    }

    /// Posterior moments given signals and an optional regime.
    pub fn posterior(
        &self,
        estimate: &ShrinkageEstimate,
        signals: &[AggregatedSignal],
        regime: Option<&RegimeView>,
    ) -> Result<BlackLittermanResult> {
        let clarity = regime.map(|r| r.clarity()).unwrap_or(1.0);
        let pi = self.equilibrium(estimate);
        let sigma = &estimate.covariance;
        let tau_sigma = sigma * self.config.tau;
        let views = self.views(estimate, signals, clarity);

        if views.is_empty() {
            debug!(target: targets::PORTFOLIO, clarity, "No views; posterior equals equilibrium");
            return Ok(BlackLittermanResult {
                instruments: estimate.instruments.clone(),
                posterior_returns: pi.clone(),
                equilibrium_returns: pi,
                posterior_covariance: sigma + &tau_sigma,
                views,
                clarity,
            });
        }

        let n = estimate.n_instruments();
        let k = views.len();
        let mut p: DMatrix<f64> = DMatrix::zeros(k, n);
        let mut q: DVector<f64> = DVector::zeros(k);
        let mut omega: DMatrix<f64> = DMatrix::zeros(k, k);
        for (row, view) in views.iter().enumerate() {
            p[(row, view.index)] = 1.0;
            q[row] = view.expected_return;
            omega[(row, row)] = view.uncertainty;
        }

        let tau_sigma_pt = &tau_sigma * p.transpose();
        let m = &p * &tau_sigma_pt + omega;
        let m_chol = m
            .cholesky()
            .ok_or_else(|| Error::SingularMatrix("Black-Litterman view covariance".to_string()))?;

        let surprise = q - &p * &pi;
        let posterior_returns = &pi + &tau_sigma_pt * m_chol.solve(&surprise);
        let correction = &tau_sigma_pt * m_chol.solve(&tau_sigma_pt.transpose());
        let posterior_covariance = sigma + &tau_sigma - correction;

        debug!(
            target: targets::PORTFOLIO,
            views = k,
            clarity,
            "Black-Litterman posterior computed"
        );

        Ok(BlackLittermanResult {
            instruments: estimate.instruments.clone(),
            equilibrium_returns: pi,
            posterior_returns,
            posterior_covariance,
            views,
            clarity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShrinkageTarget;
    use crate::types::{AggregationMethod, AssetClass, Regime};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn estimate() -> ShrinkageEstimate {
        ShrinkageEstimate {
            instruments: vec!["A".into(), "B".into(), "C".into()],
            covariance: DMatrix::from_row_slice(
                3,
                3,
                &[
                    1.0e-4, 0.3e-4, 0.1e-4, //
                    0.3e-4, 2.25e-4, 0.2e-4, //
                    0.1e-4, 0.2e-4, 4.0e-4,
                ],
            ),
            target: ShrinkageTarget::ConstantCorrelation,
            intensity: 0.0,
            n_obs: 1_000,
        }
    }

    fn signal(instrument: &str, conviction: f64, confidence: f64) -> AggregatedSignal {
        AggregatedSignal {
            instrument: instrument.to_string(),
            asset_class: AssetClass::Other,
            timestamp: Utc::now(),
            net_conviction: conviction,
            confidence,
            contributors: Vec::new(),
            crowding_adjustment: 1.0,
            staleness_adjustment: 1.0,
            regime_tilt_applied: false,
            method: AggregationMethod::Bayesian,
        }
    }

    fn bl() -> BlackLitterman {
        let weights = BTreeMap::from([("A".to_string(), 0.5), ("B".to_string(), 0.3)]);
        BlackLitterman::new(OptimizerConfig::default().with_market_weights(weights))
    }

    #[test]
    fn test_zero_views_returns_equilibrium_exactly() {
        let bl = bl();
        let est = estimate();
        let result = bl.posterior(&est, &[], None).unwrap();
        assert_eq!(result.posterior_returns, result.equilibrium_returns);
        assert_eq!(result.posterior_returns, bl.equilibrium(&est));

        // Zero-conviction signals produce no views either
        let result = bl.posterior(&est, &[signal("A", 0.0, 0.9)], None).unwrap();
        assert!(result.views.is_empty());
        assert_eq!(result.posterior_returns, result.equilibrium_returns);
    }

    #[test]
    fn test_bullish_view_raises_posterior() {
        let bl = bl();
        let result = bl.posterior(&estimate(), &[signal("C", 0.8, 0.7)], None).unwrap();
        assert_eq!(result.views.len(), 1);
        assert!(result.posterior_returns[2] > result.equilibrium_returns[2]);
        let q = result.views[0].expected_return;
        // Shrunk toward the view but not past it
        assert!(result.posterior_returns[2] < q.max(result.equilibrium_returns[2]) + 1e-15);
    }

    #[test]
    fn test_ambiguous_regime_pulls_toward_equilibrium() {
        let bl = bl();
        let est = estimate();
        let signals = [signal("B", -0.9, 0.8)];
        let clear = bl
            .posterior(&est, &signals, Some(&RegimeView::certain(Regime::Stagflation)))
            .unwrap();
        let muddy_map = BTreeMap::from([
            (Regime::Goldilocks, 0.3),
            (Regime::Reflation, 0.3),
            (Regime::Stagflation, 0.2),
            (Regime::Deflation, 0.2),
        ]);
        let muddy = bl
            .posterior(&est, &signals, Some(&RegimeView::new(muddy_map).unwrap()))
            .unwrap();
        let pi = clear.equilibrium_returns[1];
        assert!((muddy.posterior_returns[1] - pi).abs() < (clear.posterior_returns[1] - pi).abs());
        assert!(muddy.views[0].uncertainty > clear.views[0].uncertainty);
    }

    #[test]
    fn test_uniform_regime_drops_all_views() {
        let result = bl()
            .posterior(&estimate(), &[signal("A", 0.5, 0.9)], Some(&RegimeView::uniform()))
            .unwrap();
        assert!(result.views.is_empty());
    }

    #[test]
    fn test_posterior_covariance_symmetric_and_shrinks_viewed_variance() {
        let est = estimate();
        let result = bl().posterior(&est, &[signal("A", 0.6, 0.6)], None).unwrap();
        let s = &result.posterior_covariance;
        assert!((s - s.transpose()).abs().max() < 1e-15);
        let prior = est.covariance[(0, 0)] * (1.0 + 0.05);
        assert!(s[(0, 0)] < prior);
    }
}
