//! Risk engine configuration: VaR estimators, stress tests, limits.

use serde::{Deserialize, Serialize};

/// Structured target the sample covariance is shrunk toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShrinkageTarget {
    /// Sample variances with the average sample correlation off-diagonal
    #[default]
    ConstantCorrelation,
    /// Average variance on the diagonal, zero off-diagonal
    ScaledIdentity,
}

/// Ledoit–Wolf shrinkage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShrinkageConfig {
    pub target: ShrinkageTarget,
    /// Fixed intensity in [0, 1]; `None` uses the analytic optimum.
    pub intensity: Option<f64>,
}

impl Default for ShrinkageConfig {
    fn default() -> Self {
        Self {
            target: ShrinkageTarget::ConstantCorrelation,
            intensity: None,
        }
    }
}

/// Return distribution assumed by the parametric estimator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ParametricDistribution {
    #[default]
    Gaussian,
    StudentT { dof: f64 },
}

/// Monte Carlo estimator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of simulated paths (at least 10,000).
    pub n_paths: usize,
    /// Base seed; chunk k uses `seed + k`.
    pub seed: u64,
    /// Paths per parallel chunk.
    pub chunk_size: usize,
    /// Lower bound on fitted Student-t degrees of freedom.
    pub min_dof: f64,
    /// Upper bound on fitted Student-t degrees of freedom.
    pub max_dof: f64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_paths: 10_000,
            seed: 20_150_901,
            chunk_size: 1_000,
            min_dof: 3.0,
            max_dof: 30.0,
        }
    }
}

/// Minimum simulated paths accepted by validation.
pub const MIN_MONTE_CARLO_PATHS: usize = 10_000;

/// VaR/CVaR configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaRConfig {
    /// Confidence level of the headline figure.
    pub confidence: f64,
    /// Horizon in trading days (√h scaling).
    pub horizon_days: u32,
    /// Levels always reported alongside the headline figure.
    pub report_levels: Vec<f64>,
    /// Historical window (756 ≈ 3 years).
    pub historical_lookback: usize,
    /// Minimum rows for the historical estimator.
    pub min_historical_observations: usize,
    /// Minimum rows for the parametric and Monte Carlo estimators.
    pub min_observations: usize,
    pub parametric_distribution: ParametricDistribution,
    pub shrinkage: ShrinkageConfig,
    pub monte_carlo: MonteCarloConfig,
    /// Allowed relative gap between Σ component VaR and total parametric VaR.
    pub decomposition_tolerance: f64,
}

impl Default for VaRConfig {
    fn default() -> Self {
        Self {
            confidence: 0.99,
            horizon_days: 1,
            report_levels: vec![0.95, 0.99],
            historical_lookback: 756,
            min_historical_observations: 250,
            min_observations: 756,
            parametric_distribution: ParametricDistribution::Gaussian,
            shrinkage: ShrinkageConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
            decomposition_tolerance: 0.02,
        }
    }
}

impl VaRConfig {
    pub fn validate(&self) -> Result<(), String> {
        let level_ok = |c: f64| c > 0.5 && c < 1.0;
        if !level_ok(self.confidence) {
            return Err(format!("confidence must be in (0.5, 1.0), got {}", self.confidence));
        }
        if let Some(bad) = self.report_levels.iter().find(|c| !level_ok(**c)) {
            return Err(format!("report level must be in (0.5, 1.0), got {}", bad));
        }
        if self.horizon_days == 0 {
            return Err("horizon_days must be at least 1".to_string());
        }
        if self.historical_lookback < self.min_historical_observations {
            return Err(format!(
                "historical_lookback ({}) below min_historical_observations ({})",
                self.historical_lookback, self.min_historical_observations
            ));
        }
        if self.min_observations < 2 || self.min_historical_observations < 2 {
            return Err("observation minimums must be at least 2".to_string());
        }
        if let Some(i) = self.shrinkage.intensity {
            if !(0.0..=1.0).contains(&i) {
                return Err(format!("shrinkage intensity must be in [0, 1], got {}", i));
            }
        }
        if let ParametricDistribution::StudentT { dof } = self.parametric_distribution {
            if dof <= 2.0 {
                return Err(format!("Student-t dof must exceed 2, got {}", dof));
            }
        }
        let mc = &self.monte_carlo;
        if mc.n_paths < MIN_MONTE_CARLO_PATHS {
            return Err(format!(
                "monte_carlo.n_paths must be at least {}, got {}",
                MIN_MONTE_CARLO_PATHS, mc.n_paths
            ));
        }
        if mc.chunk_size == 0 {
            return Err("monte_carlo.chunk_size must be positive".to_string());
        }
        if mc.min_dof <= 2.0 || mc.max_dof < mc.min_dof {
            return Err(format!(
                "monte_carlo dof bounds invalid: [{}, {}]",
                mc.min_dof, mc.max_dof
            ));
        }
        if self.decomposition_tolerance <= 0.0 {
            return Err("decomposition_tolerance must be positive".to_string());
        }
        Ok(())
    }
}

/// Stress testing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Target loss for reverse stress, as a signed fraction of NAV.
    pub reverse_target_loss_pct: f64,
    pub multiplier_min: f64,
    pub multiplier_max: f64,
    pub max_iterations: usize,
    /// Relative tolerance on the achieved loss.
    pub tolerance: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            reverse_target_loss_pct: -0.10,
            multiplier_min: 0.01,
            multiplier_max: 5.0,
            max_iterations: 100,
            tolerance: 1e-4,
        }
    }
}

impl StressConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.reverse_target_loss_pct >= 0.0 {
            return Err(format!(
                "reverse_target_loss_pct must be negative, got {}",
                self.reverse_target_loss_pct
            ));
        }
        if self.multiplier_min <= 0.0 || self.multiplier_max <= self.multiplier_min {
            return Err(format!(
                "multiplier bounds invalid: [{}, {}]",
                self.multiplier_min, self.multiplier_max
            ));
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be positive".to_string());
        }
        if self.tolerance <= 0.0 {
            return Err("tolerance must be positive".to_string());
        }
        Ok(())
    }
}

/// Loss limits and risk budget ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Daily realized loss limit as a fraction of NAV.
    pub daily_loss_limit_pct: f64,
    /// Weekly realized loss limit as a fraction of NAV.
    pub weekly_loss_limit_pct: f64,
    /// Business days in the rolling loss window (FIFO capacity).
    pub weekly_window_days: usize,
    /// Ceiling on one instrument's share of portfolio risk.
    ///
    /// The optimizer enforces at least 2/(n+1) for n instruments, so a small
    /// book may be solved above this value; such targets carry a
    /// `risk_ceiling:` override against the configured figure.
    pub instrument_risk_ceiling: f64,
    /// Ceiling on one asset class's share of portfolio risk.
    ///
    /// Relaxed to 2/(n+1) for n classes in the same way, with an
    /// `asset_class_risk_ceiling:` override on every member.
    pub asset_class_risk_ceiling: f64,
    /// Utilization above which status becomes WARNING.
    pub warning_utilization: f64,
    /// Headroom required before more risk may be added.
    pub min_headroom: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit_pct: 0.02,
            weekly_loss_limit_pct: 0.05,
            weekly_window_days: 5,
            instrument_risk_ceiling: 0.20,
            asset_class_risk_ceiling: 0.40,
            warning_utilization: 0.80,
            min_headroom: 0.05,
        }
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> Result<(), String> {
        let frac_ok = |x: f64| x > 0.0 && x <= 1.0;
        if !frac_ok(self.daily_loss_limit_pct) || !frac_ok(self.weekly_loss_limit_pct) {
            return Err("loss limits must be in (0, 1]".to_string());
        }
        if self.weekly_window_days == 0 {
            return Err("weekly_window_days must be at least 1".to_string());
        }
        if !frac_ok(self.instrument_risk_ceiling) || !frac_ok(self.asset_class_risk_ceiling) {
            return Err("risk ceilings must be in (0, 1]".to_string());
        }
        if !frac_ok(self.warning_utilization) {
            return Err("warning_utilization must be in (0, 1]".to_string());
        }
        if self.min_headroom < 0.0 || self.min_headroom >= self.instrument_risk_ceiling {
            return Err(format!(
                "min_headroom must be in [0, instrument_risk_ceiling), got {}",
                self.min_headroom
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(VaRConfig::default().validate().is_ok());
        assert!(StressConfig::default().validate().is_ok());
        assert!(LimitsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_monte_carlo_path_floor() {
        let mut cfg = VaRConfig::default();
        cfg.monte_carlo.n_paths = 500;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_positive_reverse_target_rejected() {
        let cfg = StressConfig {
            reverse_target_loss_pct: 0.1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
