//! Ledoit–Wolf shrinkage covariance.
//!
//! ```text
//! Σ̂ = δ·F + (1 − δ)·S
//! ```
//!
//! `S` is the sample covariance (1/T normalization, demeaned), `F` a structured
//! target and `δ ∈ [0, 1]` the shrinkage intensity.
//!
//! # Targets
//!
//! - **Constant correlation** (Ledoit & Wolf 2003): sample variances on the
//!   diagonal, `r̄·√(sᵢᵢ·sⱼⱼ)` off-diagonal with r̄ the mean sample correlation.
//!   `δ = clamp((π − ρ) / (γ·T), 0, 1)`.
//! - **Scaled identity** (Ledoit & Wolf 2004): `μ·I`, μ = tr(S)/N.
//!   `δ = min(b̄², d²) / d²`.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ShrinkageConfig, ShrinkageTarget};
use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::types::ReturnMatrix;

/// Shrunk covariance of a return window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShrinkageEstimate {
    pub instruments: Vec<String>,
    pub covariance: DMatrix<f64>,
    pub target: ShrinkageTarget,
    /// Applied intensity δ
    pub intensity: f64,
    pub n_obs: usize,
}

impl ShrinkageEstimate {
    pub fn n_instruments(&self) -> usize {
        self.instruments.len()
    }

    pub fn index_of(&self, instrument: &str) -> Option<usize> {
        self.instruments.iter().position(|i| i == instrument)
    }

    /// Per-instrument daily volatility.
    pub fn volatilities(&self) -> DVector<f64> {
        self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
    }

    /// Correlation matrix implied by the shrunk covariance.
    pub fn correlation(&self) -> DMatrix<f64> {
        let vols = self.volatilities();
        let n = self.n_instruments();
        DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else if vols[i] > 0.0 && vols[j] > 0.0 {
                self.covariance[(i, j)] / (vols[i] * vols[j])
            } else {
                0.0
            }
        })
    }

    /// Cholesky factor of the covariance.
    pub fn cholesky(&self) -> Result<Cholesky<f64, Dyn>> {
        factorize(&self.covariance, "shrinkage covariance")
    }

    /// Cholesky factor of the correlation matrix.
    pub fn correlation_cholesky(&self) -> Result<Cholesky<f64, Dyn>> {
        factorize(&self.correlation(), "shrinkage correlation")
    }

    /// wᵀΣw.
    pub fn portfolio_variance(&self, weights: &DVector<f64>) -> Result<f64> {
        if weights.len() != self.n_instruments() {
            return Err(Error::dimension_mismatch(
                "portfolio variance",
                self.n_instruments(),
                weights.len(),
            ));
        }
        Ok(weights.dot(&(&self.covariance * weights)))
    }
}

fn factorize(matrix: &DMatrix<f64>, context: &str) -> Result<Cholesky<f64, Dyn>> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(Error::NotPositiveDefinite(format!("{} has non-finite entries", context)));
    }
    matrix
        .clone()
        .cholesky()
        .ok_or_else(|| Error::NotPositiveDefinite(context.to_string()))
}

/// Ledoit–Wolf estimator.
#[derive(Debug, Clone, Default)]
pub struct LedoitWolf {
    config: ShrinkageConfig,
}

impl LedoitWolf {
    pub fn new(config: ShrinkageConfig) -> Self {
        Self { config }
    }

    /// Estimate the shrunk covariance of a return window.
    pub fn estimate(&self, returns: &ReturnMatrix) -> Result<ShrinkageEstimate> {
        let t = returns.n_obs();
        if t < 2 {
            return Err(Error::insufficient_data("shrinkage covariance", 2, t));
        }

        let x = returns.demeaned();
        let sample = x.transpose() * &x / t as f64;

        let (target, optimal) = match self.config.target {
            ShrinkageTarget::ConstantCorrelation => constant_correlation(&x, &sample),
            ShrinkageTarget::ScaledIdentity => scaled_identity(&x, &sample),
        };
        let intensity = self.config.intensity.unwrap_or(optimal).clamp(0.0, 1.0);
        let covariance = &target * intensity + &sample * (1.0 - intensity);

        debug!(
            target: targets::RISK,
            instruments = returns.n_instruments(),
            n_obs = t,
            intensity,
            analytic_intensity = optimal,
            shrinkage_target = ?self.config.target,
            "Shrinkage covariance estimated"
        );

        Ok(ShrinkageEstimate {
            instruments: returns.instruments.clone(),
            covariance,
            target: self.config.target,
            intensity,
            n_obs: t,
        })
    }
}

/// Constant-correlation target and its optimal intensity.
fn constant_correlation(x: &DMatrix<f64>, s: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    let (t, n) = (x.nrows(), x.ncols());
    let tf = t as f64;
    let sd: Vec<f64> = (0..n).map(|i| s[(i, i)].max(0.0).sqrt()).collect();

    let mut r_sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            if sd[i] > 0.0 && sd[j] > 0.0 {
                r_sum += s[(i, j)] / (sd[i] * sd[j]);
            }
            pairs += 1;
        }
    }
    let r_bar = if pairs > 0 { r_sum / pairs as f64 } else { 0.0 };

    let target = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            s[(i, i)]
        } else {
            r_bar * sd[i] * sd[j]
        }
    });

    // π: Σᵢⱼ asymptotic variance of √T·sᵢⱼ
    let mut pi_mat = DMatrix::zeros(n, n);
    for k in 0..t {
        let row = x.row(k);
        for i in 0..n {
            for j in 0..n {
                let d = row[i] * row[j] - s[(i, j)];
                pi_mat[(i, j)] += d * d;
            }
        }
    }
    pi_mat /= tf;
    let pi: f64 = pi_mat.sum();

    // ρ: diagonal π plus the r̄-weighted θ cross terms
    let mut rho: f64 = pi_mat.diagonal().sum();
    for i in 0..n {
        for j in 0..n {
            if i == j || sd[i] <= 0.0 || sd[j] <= 0.0 {
                continue;
            }
            let (mut theta_ii, mut theta_jj) = (0.0, 0.0);
            for k in 0..t {
                let (xi, xj) = (x[(k, i)], x[(k, j)]);
                let cross = xi * xj - s[(i, j)];
                theta_ii += (xi * xi - s[(i, i)]) * cross;
                theta_jj += (xj * xj - s[(j, j)]) * cross;
            }
            theta_ii /= tf;
            theta_jj /= tf;
            rho += r_bar / 2.0 * ((sd[j] / sd[i]) * theta_ii + (sd[i] / sd[j]) * theta_jj);
        }
    }

    let gamma = (&target - s).norm_squared();
    let intensity = if gamma > 0.0 {
        ((pi - rho) / gamma / tf).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (target, intensity)
}

/// Scaled-identity target and its optimal intensity.
fn scaled_identity(x: &DMatrix<f64>, s: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    let (t, n) = (x.nrows(), x.ncols());
    let mu = s.trace() / n as f64;
    let target = DMatrix::identity(n, n) * mu;

    let d2 = (s - &target).norm_squared();
    let mut b_bar2 = 0.0;
    for k in 0..t {
        let row = x.row(k).transpose();
        b_bar2 += (&row * row.transpose() - s).norm_squared();
    }
    b_bar2 /= (t * t) as f64;

    let intensity = if d2 > 0.0 { b_bar2.min(d2) / d2 } else { 0.0 };
    (target, intensity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn synthetic(t: usize, n: usize, seed: u64) -> ReturnMatrix {
        let mut rng = SmallRng::seed_from_u64(seed);
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let dates = (0..t).map(|k| start + Duration::days(k as i64)).collect();
        let rows: Vec<Vec<f64>> = (0..t)
            .map(|_| {
                let common: f64 = StandardNormal.sample(&mut rng);
                (0..n)
                    .map(|j| {
                        let idio: f64 = StandardNormal.sample(&mut rng);
                        0.01 * (j as f64 + 1.0) * (0.6 * common + 0.8 * idio)
                    })
                    .collect()
            })
            .collect();
        let instruments = (0..n).map(|j| format!("I{}", j)).collect();
        ReturnMatrix::from_rows(instruments, dates, &rows).unwrap()
    }

    #[test]
    fn test_intensity_in_unit_interval_and_psd() {
        for target in [ShrinkageTarget::ConstantCorrelation, ShrinkageTarget::ScaledIdentity] {
            let lw = LedoitWolf::new(ShrinkageConfig {
                target,
                intensity: None,
            });
            let est = lw.estimate(&synthetic(120, 5, 7)).unwrap();
            assert!((0.0..=1.0).contains(&est.intensity));
            assert!(est.cholesky().is_ok());
            assert!(est.correlation_cholesky().is_ok());
            // symmetric
            let diff = (&est.covariance - est.covariance.transpose()).abs().max();
            assert!(diff < 1e-15);
        }
    }

    #[test]
    fn test_fixed_intensity_override() {
        let returns = synthetic(60, 3, 11);
        let full = LedoitWolf::new(ShrinkageConfig {
            target: ShrinkageTarget::ScaledIdentity,
            intensity: Some(1.0),
        })
        .estimate(&returns)
        .unwrap();
        assert_eq!(full.intensity, 1.0);
        let mu = full.covariance[(0, 0)];
        assert!(full.covariance[(0, 1)].abs() < 1e-18);
        assert!((full.covariance[(2, 2)] - mu).abs() < 1e-15);
    }

    #[test]
    fn test_constant_correlation_preserves_variances() {
        let returns = synthetic(200, 4, 3);
        let est = LedoitWolf::default().estimate(&returns).unwrap();
        let x = returns.demeaned();
        let sample = x.transpose() * &x / returns.n_obs() as f64;
        for i in 0..4 {
            assert!((est.covariance[(i, i)] - sample[(i, i)]).abs() < 1e-15);
        }
    }

    #[test]
    fn test_correlation_has_unit_diagonal() {
        let est = LedoitWolf::default().estimate(&synthetic(100, 3, 5)).unwrap();
        let corr = est.correlation();
        for i in 0..3 {
            assert_eq!(corr[(i, i)], 1.0);
        }
    }

    #[test]
    fn test_constant_series_not_positive_definite() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let dates = (0..10).map(|k| start + Duration::days(k)).collect();
        let rows: Vec<Vec<f64>> = (0..10).map(|k| vec![0.01 * (k as f64).sin(), 0.0]).collect();
        let returns =
            ReturnMatrix::from_rows(vec!["A".into(), "B".into()], dates, &rows).unwrap();
        let est = LedoitWolf::default().estimate(&returns).unwrap();
        assert!(matches!(est.cholesky(), Err(Error::NotPositiveDefinite(_))));
    }

    #[test]
    fn test_too_few_rows() {
        let returns = synthetic(1, 2, 1);
        assert!(matches!(
            LedoitWolf::default().estimate(&returns),
            Err(Error::InsufficientData { .. })
        ));
    }
}
