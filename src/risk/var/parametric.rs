//! Parametric (variance-covariance) VaR on the shrinkage covariance.
//!
//! ```text
//! σ_p  = √(wᵀ Σ̂ w)
//! VaR  = −k_var · σ_p · √h
//! CVaR = −k_cvar · σ_p · √h
//! ```
//!
//! Gaussian: `k_var = Φ⁻¹(α)`, `k_cvar = φ(k_var)/(1 − α)`.
//! Student-t with ν dof, rescaled to unit variance by `c = √((ν − 2)/ν)`:
//! `k_var = c·q`, `k_cvar = c·f_ν(q)/(1 − α)·(ν + q²)/(ν − 1)`, `q = T_ν⁻¹(α)`.

use nalgebra::DVector;
use statrs::distribution::{Continuous, ContinuousCDF, Normal, StudentsT};
use tracing::debug;

use crate::config::{ParametricDistribution, VaRConfig};
use crate::errors::Result;
use crate::infra::targets;
use crate::risk::covariance::{LedoitWolf, ShrinkageEstimate};
use crate::types::{InstrumentUniverse, PositionSnapshot, ReturnHistory};

use super::decomposition::{euler_decomposition, VaRDecomposition};
use super::{
    check_level, distribution_error, horizon_scale, portfolio_window, reported_levels,
    VaREstimator, VaRLevel, VaRMethod, VaRResult,
};

/// Tail multipliers per unit of portfolio standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailFactors {
    pub var: f64,
    pub cvar: f64,
}

/// Gaussian or Student-t VaR with Ledoit–Wolf covariance.
#[derive(Debug, Clone, Default)]
pub struct ParametricVaR {
    config: VaRConfig,
    shrinkage: LedoitWolf,
}

impl ParametricVaR {
    pub fn new(config: VaRConfig) -> Self {
        let shrinkage = LedoitWolf::new(config.shrinkage.clone());
        Self { config, shrinkage }
    }

    /// Shrinkage covariance of the active positions and their notionals.
    ///
    /// `None` for a flat portfolio. Fails with `NotPositiveDefinite` when the
    /// shrunk matrix has no Cholesky factor.
    pub fn covariance(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
    ) -> Result<Option<(ShrinkageEstimate, DVector<f64>)>> {
        let Some((window, notionals)) = portfolio_window(
            positions,
            returns,
            self.config.historical_lookback,
            self.config.min_observations,
            "parametric VaR",
        )?
        else {
            return Ok(None);
        };
        let estimate = self.shrinkage.estimate(&window)?;
        estimate.cholesky()?;
        Ok(Some((estimate, notionals)))
    }

    /// Tail multipliers of the configured distribution at `confidence`.
    pub fn tail_factors(&self, confidence: f64) -> Result<TailFactors> {
        check_level(confidence)?;
        let tail = 1.0 - confidence;
        match self.config.parametric_distribution {
            ParametricDistribution::Gaussian => {
                let normal = Normal::new(0.0, 1.0).map_err(distribution_error)?;
                let z = normal.inverse_cdf(confidence);
                Ok(TailFactors {
                    var: z,
                    cvar: normal.pdf(z) / tail,
                })
            }
            ParametricDistribution::StudentT { dof } => {
                let t = StudentsT::new(0.0, 1.0, dof).map_err(distribution_error)?;
                let q = t.inverse_cdf(confidence);
                let unit_variance = ((dof - 2.0) / dof).sqrt();
                Ok(TailFactors {
                    var: unit_variance * q,
                    cvar: unit_variance * t.pdf(q) / tail * (dof + q * q) / (dof - 1.0),
                })
            }
        }
    }

    /// Euler decomposition of the parametric VaR into instrument contributions.
    pub fn decompose(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
        universe: &InstrumentUniverse,
        confidence: f64,
        horizon_days: u32,
    ) -> Result<VaRDecomposition> {
        let factors = self.tail_factors(confidence)?;
        match self.covariance(positions, returns)? {
            Some((estimate, notionals)) => euler_decomposition(
                &estimate,
                &notionals,
                factors.var,
                confidence,
                horizon_days,
                universe,
                self.config.decomposition_tolerance,
            ),
            None => Ok(VaRDecomposition::empty(confidence, horizon_days)),
        }
    }
}

impl VaREstimator for ParametricVaR {
    fn method(&self) -> VaRMethod {
        VaRMethod::Parametric
    }

    fn compute(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
        confidence: f64,
        horizon_days: u32,
    ) -> Result<VaRResult> {
        check_level(confidence)?;
        let Some((estimate, notionals)) = self.covariance(positions, returns)? else {
            return Ok(VaRResult::flat(
                self.method(),
                confidence,
                horizon_days,
                &self.config.report_levels,
                positions.nav,
            ));
        };

        let sigma = estimate.portfolio_variance(&notionals)?.max(0.0).sqrt();
        let scale = horizon_scale(horizon_days);

        let mut levels = Vec::new();
        for c in reported_levels(confidence, &self.config.report_levels) {
            let factors = self.tail_factors(c)?;
            let var = (-factors.var * sigma * scale).min(0.0);
            levels.push(VaRLevel {
                confidence: c,
                var,
                cvar: (-factors.cvar * sigma * scale).min(var),
            });
        }

        let result = VaRResult::from_levels(
            self.method(),
            confidence,
            horizon_days,
            levels,
            estimate.n_obs,
            positions.nav,
        );
        debug!(
            target: targets::RISK,
            method = %result.method,
            var = result.var,
            cvar = result.cvar,
            sigma,
            intensity = estimate.intensity,
            "VaR computed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::tests::fixtures;
    use crate::types::ReturnSeries;
    use chrono::{Duration, NaiveDate};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn history(n: usize) -> ReturnHistory {
        let mut rng = SmallRng::seed_from_u64(42);
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..n).map(|k| start + Duration::days(k as i64)).collect();
        let mut a = Vec::with_capacity(n);
        let mut b = Vec::with_capacity(n);
        for _ in 0..n {
            let z1: f64 = StandardNormal.sample(&mut rng);
            let z2: f64 = StandardNormal.sample(&mut rng);
            a.push(0.01 * z1);
            b.push(0.02 * (0.5 * z1 + 0.866 * z2));
        }
        ReturnHistory::from_series([
            ReturnSeries::new("A", dates.clone(), a),
            ReturnSeries::new("B", dates, b),
        ])
        .unwrap()
    }

    fn positions() -> PositionSnapshot {
        PositionSnapshot::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 1_000_000.0)
            .with_position("A", 300_000.0)
            .with_position("B", 100_000.0)
    }

    #[test]
    fn test_gaussian_factors() {
        let f = ParametricVaR::default().tail_factors(0.99).unwrap();
        assert!((f.var - 2.326_347_874).abs() < 1e-6);
        assert!((f.cvar - 2.665_214_5).abs() < 1e-4);
    }

    #[test]
    fn test_student_t_fatter_cvar_ratio() {
        let config = VaRConfig {
            parametric_distribution: ParametricDistribution::StudentT { dof: 4.0 },
            ..Default::default()
        };
        let t = ParametricVaR::new(config).tail_factors(0.99).unwrap();
        let g = ParametricVaR::default().tail_factors(0.99).unwrap();
        assert!(t.cvar / t.var > g.cvar / g.var);
    }

    #[test]
    fn test_parametric_ordering_and_levels() {
        let result = ParametricVaR::default()
            .compute(&positions(), &history(800), 0.99, 1)
            .unwrap();
        assert!(result.var < 0.0);
        assert!(result.cvar <= result.var);
        assert_eq!(result.levels.len(), 2);
        assert!(result.level(0.99).unwrap().var < result.level(0.95).unwrap().var);
    }

    #[test]
    fn test_requires_756_rows() {
        let err = ParametricVaR::default()
            .compute(&positions(), &history(500), 0.99, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::errors::Error::InsufficientData { required: 756, available: 500, .. }
        ));
    }

    #[test]
    fn test_decomposition_sums_to_total() {
        let est = ParametricVaR::default();
        let total = est.compute(&positions(), &history(800), 0.99, 1).unwrap();
        let universe = InstrumentUniverse::empty();
        let dec = est
            .decompose(&positions(), &history(800), &universe, 0.99, 1)
            .unwrap();
        let sum: f64 = dec.components.iter().map(|c| c.component_var).sum();
        assert!(((sum - total.var) / total.var).abs() < 0.02);
        assert!(dec.within_tolerance);
    }

    fn held_pair() -> PositionSnapshot {
        PositionSnapshot::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 1_000_000.0)
            .with_position("A", 200_000.0)
            .with_position("B", 100_000.0)
    }

    #[test]
    fn test_duplicate_column_is_not_positive_definite() {
        let returns = fixtures::derived_pair_history(800, |r| r);
        let est = ParametricVaR::default();
        assert!(matches!(
            est.compute(&held_pair(), &returns, 0.99, 1),
            Err(Error::NotPositiveDefinite(_))
        ));
        assert!(matches!(
            est.decompose(&held_pair(), &returns, &InstrumentUniverse::empty(), 0.99, 1),
            Err(Error::NotPositiveDefinite(_))
        ));
    }

    #[test]
    fn test_zero_variance_column_is_not_positive_definite() {
        let returns = fixtures::derived_pair_history(800, |_| 0.0);
        assert!(matches!(
            ParametricVaR::default().compute(&held_pair(), &returns, 0.99, 1),
            Err(Error::NotPositiveDefinite(_))
        ));
    }
}
