//! Historical-simulation VaR.

use tracing::debug;

use crate::config::VaRConfig;
use crate::errors::Result;
use crate::infra::targets;
use crate::types::{PositionSnapshot, ReturnHistory};

use super::{check_level, empirical_levels, portfolio_window, VaREstimator, VaRMethod, VaRResult};

/// Empirical loss quantile of realized portfolio P&L over the lookback window.
#[derive(Debug, Clone, Default)]
pub struct HistoricalVaR {
    config: VaRConfig,
}

impl HistoricalVaR {
    pub fn new(config: VaRConfig) -> Self {
        Self { config }
    }
}

impl VaREstimator for HistoricalVaR {
    fn method(&self) -> VaRMethod {
        VaRMethod::Historical
    }

    fn compute(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
        confidence: f64,
        horizon_days: u32,
    ) -> Result<VaRResult> {
        check_level(confidence)?;
        let Some((window, notionals)) = portfolio_window(
            positions,
            returns,
            self.config.historical_lookback,
            self.config.min_historical_observations,
            "historical VaR",
        )?
        else {
            return Ok(VaRResult::flat(
                self.method(),
                confidence,
                horizon_days,
                &self.config.report_levels,
                positions.nav,
            ));
        };

        let pnl = window.portfolio_pnl(&notionals)?;
        let n_obs = pnl.len();
        let levels = empirical_levels(pnl, confidence, &self.config.report_levels, horizon_days);
        let result = VaRResult::from_levels(
            self.method(),
            confidence,
            horizon_days,
            levels,
            n_obs,
            positions.nav,
        );

        debug!(
            target: targets::RISK,
            method = %result.method,
            var = result.var,
            cvar = result.cvar,
            n_obs,
            "VaR computed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::types::ReturnSeries;
    use chrono::{Duration, NaiveDate};

    fn history(n: usize) -> ReturnHistory {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..n).map(|k| start + Duration::days(k as i64)).collect();
        // Deterministic sawtooth between −2% and +2%
        let a: Vec<f64> = (0..n).map(|k| ((k % 41) as f64 - 20.0) / 1000.0).collect();
        let b: Vec<f64> = (0..n).map(|k| ((k % 17) as f64 - 8.0) / 800.0).collect();
        ReturnHistory::from_series([
            ReturnSeries::new("A", dates.clone(), a),
            ReturnSeries::new("B", dates, b),
        ])
        .unwrap()
    }

    fn positions() -> PositionSnapshot {
        PositionSnapshot::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 1_000_000.0)
            .with_position("A", 200_000.0)
            .with_position("B", -100_000.0)
    }

    #[test]
    fn test_cvar_below_var_below_zero() {
        let result = HistoricalVaR::default()
            .compute(&positions(), &history(800), 0.99, 1)
            .unwrap();
        assert_eq!(result.n_obs, 756);
        assert!(result.var <= 0.0);
        assert!(result.cvar <= result.var);
        for level in &result.levels {
            assert!(level.cvar <= level.var && level.var <= 0.0);
        }
        let v95 = result.level(0.95).unwrap();
        let v99 = result.level(0.99).unwrap();
        assert!(v99.var <= v95.var);
    }

    #[test]
    fn test_horizon_scales_by_sqrt() {
        let est = HistoricalVaR::default();
        let one = est.compute(&positions(), &history(400), 0.95, 1).unwrap();
        let ten = est.compute(&positions(), &history(400), 0.95, 10).unwrap();
        assert!((ten.var - one.var * 10f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_insufficient_history() {
        let err = HistoricalVaR::default()
            .compute(&positions(), &history(100), 0.99, 1)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientData { required: 250, .. }));
    }

    #[test]
    fn test_flat_portfolio_has_zero_var() {
        let flat = PositionSnapshot::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 1e6);
        let result = HistoricalVaR::default()
            .compute(&flat, &history(10), 0.99, 1)
            .unwrap();
        assert_eq!(result.var, 0.0);
        assert_eq!(result.levels.len(), 2);
    }
}
