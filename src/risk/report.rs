//! Risk engine: one consolidated risk report per run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{EngineConfig, LimitsConfig, StressConfig, VaRConfig};
use crate::errors::Result;
use crate::infra::targets;
use crate::types::{InstrumentUniverse, PositionSnapshot, ReturnHistory};

use super::limits::{
    AggregatedRisk, LossLimitStatus, LossRecord, RiskAggregator, RiskBudget, RiskState, RiskStatus,
};
use super::stress::{FailedReplay, ScenarioCatalog, StressReport, StressTester};
use super::var::{
    HistoricalVaR, MonteCarloVaR, ParametricVaR, TailFactors, VaRDecomposition, VaREstimator,
    VaRMethod, VaRResult,
};

/// Historical window to replay against the current positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRequest {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Consolidated VaR, stress and limit report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub as_of: NaiveDate,
    pub nav: f64,
    /// One result per estimator
    pub var: Vec<VaRResult>,
    pub decomposition: VaRDecomposition,
    pub stress: StressReport,
    pub loss: LossLimitStatus,
    pub budget: RiskBudget,
    pub limits: AggregatedRisk,
    pub status: RiskStatus,
    pub warnings: Vec<String>,
}

impl RiskReport {
    pub fn var_by(&self, method: VaRMethod) -> Option<&VaRResult> {
        self.var.iter().find(|v| v.method == method)
    }

    /// Most conservative headline VaR across estimators.
    pub fn worst_var(&self) -> Option<&VaRResult> {
        self.var.iter().min_by(|a, b| a.var.total_cmp(&b.var))
    }
}

/// Runs the three VaR estimators, the stress suite and the limit monitors.
pub struct RiskEngine {
    var_config: VaRConfig,
    limits: LimitsConfig,
    universe: InstrumentUniverse,
    estimators: Vec<Box<dyn VaREstimator>>,
    parametric: ParametricVaR,
    stress: StressTester,
    catalog: ScenarioCatalog,
    aggregator: RiskAggregator,
}

impl RiskEngine {
    pub fn new(
        var_config: VaRConfig,
        stress: StressConfig,
        limits: LimitsConfig,
        universe: InstrumentUniverse,
    ) -> Self {
        let estimators: Vec<Box<dyn VaREstimator>> = vec![
            Box::new(HistoricalVaR::new(var_config.clone())),
            Box::new(ParametricVaR::new(var_config.clone())),
            Box::new(MonteCarloVaR::new(var_config.clone())),
        ];
        Self {
            parametric: ParametricVaR::new(var_config.clone()),
            stress: StressTester::new(stress, universe.clone()),
            catalog: ScenarioCatalog::historical(),
            aggregator: RiskAggregator::standard(&limits),
            var_config,
            limits,
            universe,
            estimators,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.var.clone(),
            config.stress.clone(),
            config.limits.clone(),
            config.universe.clone(),
        )
    }

    /// Replace the scenario catalog.
    pub fn with_catalog(mut self, catalog: ScenarioCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    pub fn stress_tester(&self) -> &StressTester {
        &self.stress
    }

    pub fn var_config(&self) -> &VaRConfig {
        &self.var_config
    }

    /// Parametric tail multipliers at the configured confidence.
    pub fn tail_factors(&self) -> Result<TailFactors> {
        self.parametric.tail_factors(self.var_config.confidence)
    }

    /// Every estimator at the configured confidence and horizon.
    pub fn compute_var(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
    ) -> Result<Vec<VaRResult>> {
        self.estimators
            .iter()
            .map(|e| {
                e.compute(
                    positions,
                    returns,
                    self.var_config.confidence,
                    self.var_config.horizon_days,
                )
            })
            .collect()
    }

    /// Parametric decomposition and the risk budget it implies.
    pub fn risk_budget(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
    ) -> Result<(VaRDecomposition, RiskBudget)> {
        let decomposition = self.parametric.decompose(
            positions,
            returns,
            &self.universe,
            self.var_config.confidence,
            self.var_config.horizon_days,
        )?;
        let budget = RiskBudget::from_decomposition(&decomposition, &self.limits);
        Ok((decomposition, budget))
    }

    /// Fixed scenarios, reverse stress and the requested replays.
    ///
    /// A replay that fails is recorded in `failed_replays` and the rest of
    /// the report is kept.
    pub fn stress_report(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
        replays: &[ReplayRequest],
    ) -> Result<StressReport> {
        let scenarios = self.stress.run_all(&self.catalog, positions)?;
        let reverse = self.stress.reverse_all(&self.catalog, positions)?;
        let mut results = Vec::with_capacity(replays.len());
        let mut failed_replays = Vec::new();
        for request in replays {
            match self
                .stress
                .replay_window(&request.name, positions, returns, request.start, request.end)
            {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(
                        target: targets::RISK,
                        replay = %request.name,
                        start = %request.start,
                        end = %request.end,
                        error = %e,
                        "Replay skipped"
                    );
                    failed_replays.push(FailedReplay {
                        name: request.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(StressReport {
            scenarios,
            reverse,
            replays: results,
            failed_replays,
        })
    }

    /// Full risk assessment of one position snapshot.
    pub fn assess(
        &self,
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
        losses: &LossRecord,
        replays: &[ReplayRequest],
    ) -> Result<RiskReport> {
        positions.validate()?;
        let var = self.compute_var(positions, returns)?;
        let (decomposition, budget) = self.risk_budget(positions, returns)?;
        let stress = self.stress_report(positions, returns, replays)?;

        let state = RiskState::from_record(positions.nav, losses, budget, &self.limits);
        let limits = self.aggregator.evaluate(&state);

        let mut warnings = limits.warnings.clone();
        if !decomposition.within_tolerance {
            warnings.push(format!(
                "VaR decomposition gap {:.2}% exceeds tolerance",
                decomposition.relative_gap * 100.0
            ));
        }
        for r in stress.replays.iter().filter(|r| !r.missing_instruments.is_empty()) {
            warnings.push(format!(
                "Replay {} has no returns for {}",
                r.name,
                r.missing_instruments.join(", ")
            ));
        }
        for f in &stress.failed_replays {
            warnings.push(format!("Replay {} skipped: {}", f.name, f.reason));
        }
        if !warnings.is_empty() {
            warn!(target: targets::RISK, count = warnings.len(), "Risk report carries warnings");
        }

        let report = RiskReport {
            as_of: positions.as_of,
            nav: positions.nav,
            var,
            decomposition,
            stress,
            loss: state.loss,
            budget: state.budget,
            status: limits.status,
            limits,
            warnings,
        };
        info!(
            target: targets::RISK,
            as_of = %report.as_of,
            status = %report.status,
            worst_var = report.worst_var().map(|v| v.var),
            "Risk report built"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures;

    fn engine() -> RiskEngine {
        RiskEngine::new(
            VaRConfig::default(),
            StressConfig::default(),
            LimitsConfig::default(),
            InstrumentUniverse::default(),
        )
    }

    #[test]
    fn test_report_has_all_estimators_and_scenarios() {
        let returns = fixtures::return_history(&["USDBRL", "DI1F27", "IBOV"], 800, 7);
        let positions = PositionSnapshot::new(fixtures::as_of_date(), 1_000_000.0)
            .with_position("USDBRL", 100_000.0)
            .with_position("DI1F27", -80_000.0)
            .with_position("IBOV", 60_000.0);
        let report = engine()
            .assess(&positions, &returns, &LossRecord::new(5), &[])
            .unwrap();

        assert_eq!(report.var.len(), 3);
        for method in [VaRMethod::Historical, VaRMethod::Parametric, VaRMethod::MonteCarlo] {
            let v = report.var_by(method).unwrap();
            assert!(v.var <= 0.0);
            assert!(v.cvar <= v.var);
            assert!(v.level(0.95).is_some() && v.level(0.99).is_some());
        }
        assert_eq!(report.stress.scenarios.len(), 6);
        assert_eq!(report.stress.reverse.len(), 6);
        assert!(report.decomposition.within_tolerance);
    }

    #[test]
    fn test_concentrated_book_breaches_budget() {
        let returns = fixtures::return_history(&["USDBRL", "IBOV"], 800, 3);
        let positions = PositionSnapshot::new(fixtures::as_of_date(), 1_000_000.0)
            .with_position("USDBRL", 200_000.0)
            .with_position("IBOV", 5_000.0);
        let report = engine()
            .assess(&positions, &returns, &LossRecord::new(5), &[])
            .unwrap();
        assert_eq!(report.status, RiskStatus::Breached);
        assert!(report.budget.breached_instruments().contains(&"USDBRL"));
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_flat_book_is_ok() {
        let returns = fixtures::return_history(&["USDBRL"], 300, 1);
        let positions = PositionSnapshot::new(fixtures::as_of_date(), 1_000_000.0);
        let report = engine()
            .assess(&positions, &returns, &LossRecord::new(5), &[])
            .unwrap();
        assert_eq!(report.status, RiskStatus::Ok);
        assert!(report.var.iter().all(|v| v.var == 0.0));
    }

    #[test]
    fn test_out_of_range_replay_becomes_warning() {
        let returns = fixtures::return_history(&["USDBRL", "IBOV"], 800, 2);
        let positions = PositionSnapshot::new(fixtures::as_of_date(), 1_000_000.0)
            .with_position("USDBRL", 50_000.0)
            .with_position("IBOV", 40_000.0);
        let first = returns.get("USDBRL").unwrap().dates[0];
        let replays = [
            ReplayRequest {
                name: "before_history".into(),
                start: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(1990, 12, 31).unwrap(),
            },
            ReplayRequest {
                name: "opening_month".into(),
                start: first,
                end: first + chrono::Duration::days(30),
            },
        ];
        let report = engine()
            .assess(&positions, &returns, &LossRecord::new(5), &replays)
            .unwrap();

        assert_eq!(report.stress.replays.len(), 1);
        assert_eq!(report.stress.replays[0].name, "opening_month");
        assert_eq!(report.stress.failed_replays.len(), 1);
        assert_eq!(report.stress.failed_replays[0].name, "before_history");
        assert!(report
            .warnings
            .iter()
            .any(|w| w.starts_with("Replay before_history skipped")));
        assert_eq!(report.var.len(), 3);
    }

    #[test]
    fn test_short_history_is_insufficient_data() {
        let returns = fixtures::return_history(&["USDBRL"], 100, 1);
        let positions = PositionSnapshot::new(fixtures::as_of_date(), 1_000_000.0)
            .with_position("USDBRL", 10_000.0);
        let err = engine()
            .assess(&positions, &returns, &LossRecord::new(5), &[])
            .unwrap_err();
        assert!(matches!(err, crate::Error::InsufficientData { .. }));
    }
}
