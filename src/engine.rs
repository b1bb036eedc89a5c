//! Daily run orchestration.
//!
//! One [`DailyRun::run`] call takes the inputs of an as-of date through the
//! whole pipeline:
//!
//! ```text
//! validate → aggregate → monitor → VaR → stress → limits/budget
//!          → optimizer → sizer → rebalance gate → post-commit budget
//! ```
//!
//! Every stage reads the previous stages' immutable outputs; the only state
//! carried between runs is the [`LossLedger`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::portfolio::{
    OptimizationOutcome, PortfolioOptimizer, PositionSize, PositionSizer, RebalanceDecision,
    RebalanceTrigger, SizingInputs,
};
use crate::risk::limits::{DailyPnl, LossLedger, RiskBudget};
use crate::risk::{ReplayRequest, RiskEngine, RiskReport};
use crate::signals::{DailySummary, SignalAggregator, SignalMonitor};
use crate::types::{
    AggregatedSignal, PositionSnapshot, RegimeView, ReturnHistory, SignalSnapshot, StrategySignal,
};

/// Minimum observations for a sizing volatility.
const MIN_VOL_OBSERVATIONS: usize = 20;

/// Everything one as-of date needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyInputs {
    pub as_of: DateTime<Utc>,
    pub signals: Vec<StrategySignal>,
    /// Regime name → probability, as published by the regime estimator
    #[serde(default)]
    pub regime: Option<BTreeMap<String, f64>>,
    pub positions: PositionSnapshot,
    pub returns: ReturnHistory,
    /// Earlier aggregated snapshots, oldest first
    #[serde(default)]
    pub signal_history: Vec<SignalSnapshot>,
    /// Views at the last executed rebalance
    #[serde(default)]
    pub last_rebalance: Option<SignalSnapshot>,
    /// Realized P&L not yet in the ledger, oldest first
    #[serde(default)]
    pub realized_pnl: Vec<DailyPnl>,
    #[serde(default)]
    pub replays: Vec<ReplayRequest>,
}

/// Immutable result of one daily run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRunOutput {
    pub as_of: DateTime<Utc>,
    pub regime: Option<RegimeView>,
    pub signals: Vec<AggregatedSignal>,
    pub summary: DailySummary,
    pub risk: RiskReport,
    pub optimization: OptimizationOutcome,
    pub sizes: Vec<PositionSize>,
    /// `None` when the optimizer produced no targets to gate
    pub rebalance: Option<RebalanceDecision>,
    /// Risk budget of the committed targets
    pub post_trade_budget: Option<RiskBudget>,
    pub warnings: Vec<String>,
}

impl DailyRunOutput {
    /// Today's views as a snapshot, to feed the next run's history.
    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot::new(self.as_of, self.signals.clone())
    }
}

/// Wires every component for repeated daily runs.
pub struct DailyRun {
    config: EngineConfig,
    aggregator: SignalAggregator,
    monitor: SignalMonitor,
    risk: RiskEngine,
    optimizer: PortfolioOptimizer,
    sizer: PositionSizer,
    rebalance: RebalanceTrigger,
    ledger: LossLedger,
}

impl DailyRun {
    /// Validate the configuration and build every component.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            aggregator: SignalAggregator::new(config.aggregation.clone(), config.universe.clone()),
            monitor: SignalMonitor::new(config.monitor.clone()),
            risk: RiskEngine::from_config(&config),
            optimizer: PortfolioOptimizer::from_config(&config),
            sizer: PositionSizer::new(config.sizing.clone()),
            rebalance: RebalanceTrigger::new(config.rebalance.clone()),
            ledger: LossLedger::from_config(&config.limits),
            config,
        })
    }

    /// Share a ledger with other readers.
    pub fn with_ledger(mut self, ledger: LossLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn ledger(&self) -> &LossLedger {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn risk_engine(&self) -> &RiskEngine {
        &self.risk
    }

    fn validate_inputs(&self, inputs: &DailyInputs) -> Result<Option<RegimeView>> {
        inputs.positions.validate()?;
        inputs.returns.validate()?;
        for snapshot in inputs.signal_history.iter().chain(&inputs.last_rebalance) {
            snapshot.validate()?;
        }
        if inputs.positions.as_of != inputs.as_of.date_naive() {
            return Err(Error::InvalidPositions(format!(
                "snapshot dated {} for run on {}",
                inputs.positions.as_of,
                inputs.as_of.date_naive()
            )));
        }
        inputs
            .regime
            .as_ref()
            .map(|named| RegimeView::from_named(named.iter().map(|(k, v)| (k.as_str(), *v))))
            .transpose()
    }

    /// Run the full pipeline for one as-of date.
    pub fn run(&self, inputs: &DailyInputs) -> Result<DailyRunOutput> {
        let regime = self.validate_inputs(inputs)?;
        let positions = &inputs.positions;
        let returns = &inputs.returns;
        let mut warnings = Vec::new();

        info!(
            target: targets::ENGINE,
            as_of = %inputs.as_of,
            signals = inputs.signals.len(),
            positions = positions.positions.len(),
            regime = regime.as_ref().map(|r| r.dominant().0.as_str()),
            "Daily run started"
        );

        // Signals
        let signals = self
            .aggregator
            .aggregate_default(&inputs.signals, regime.as_ref(), inputs.as_of)?;
        let snapshot = SignalSnapshot::new(inputs.as_of, signals.clone());
        let mut history = inputs.signal_history.clone();
        history.push(snapshot.clone());
        let summary = self.monitor.daily_summary(&history, regime.as_ref())?;

        // Risk
        // Applied to a copy first; the ledger only sees a completed run
        let mut losses = self.ledger.snapshot();
        for day in &inputs.realized_pnl {
            losses.push(day.date, day.pnl)?;
        }
        let risk = self.risk.assess(positions, returns, &losses, &inputs.replays)?;
        warnings.extend(risk.warnings.iter().cloned());

        // Portfolio
        let optimization = self
            .optimizer
            .optimize(&signals, regime.as_ref(), positions, returns)?;
        let sizes = self.size_signals(&signals, positions, returns, &risk)?;

        let (rebalance, post_trade_budget) = match &optimization {
            OptimizationOutcome::Solved(result) => {
                let decision = self.rebalance.evaluate(
                    inputs.last_rebalance.as_ref(),
                    &snapshot,
                    &result.targets,
                    positions.nav,
                );
                let committed = result.targets.iter().fold(
                    PositionSnapshot::new(positions.as_of, positions.nav),
                    |book, t| book.with_position(t.instrument.clone(), t.target_notional),
                );
                let budget = match self.risk.risk_budget(&committed, returns) {
                    Ok((_, budget)) => Some(budget),
                    Err(e) => {
                        warn!(target: targets::ENGINE, error = %e, "Post-commit risk budget unavailable");
                        warnings.push(format!("post-commit risk budget unavailable: {}", e));
                        None
                    }
                };
                if let Some(b) = &budget {
                    for instrument in b.breached_instruments() {
                        warnings.push(format!("target book breaches risk ceiling on {}", instrument));
                    }
                }
                (Some(decision), budget)
            }
            OptimizationOutcome::NoSolution { reason, .. } => {
                warnings.push(format!("optimizer found no solution: {}", reason));
                (None, None)
            }
        };
        if let OptimizationOutcome::Solved(result) = &optimization {
            warnings.extend(result.overrides().map(|o| {
                format!("{} at {:.4} over limit {:.4}: {}", o.limit_id, o.value, o.limit, o.justification)
            }));
        }

        for day in &inputs.realized_pnl {
            self.ledger.record(day.date, day.pnl)?;
        }

        info!(
            target: targets::ENGINE,
            as_of = %inputs.as_of,
            instruments = signals.len(),
            risk_status = %risk.status,
            solved = optimization.is_solved(),
            trades = rebalance.as_ref().map(|d| d.trades.len()).unwrap_or(0),
            warnings = warnings.len(),
            "Daily run complete"
        );

        Ok(DailyRunOutput {
            as_of: inputs.as_of,
            regime,
            signals,
            summary,
            risk,
            optimization,
            sizes,
            rebalance,
            post_trade_budget,
            warnings,
        })
    }

    /// Size every view that has enough return history for a volatility.
    fn size_signals(
        &self,
        signals: &[AggregatedSignal],
        positions: &PositionSnapshot,
        returns: &ReturnHistory,
        risk: &RiskReport,
    ) -> Result<Vec<PositionSize>> {
        let tail = self.risk.tail_factors()?;
        let lookback = self.config.var.historical_lookback;
        self.sizer.size_all(signals, |signal| {
            let series = returns.get(&signal.instrument)?;
            let start = series.returns.len().saturating_sub(lookback);
            let window = &series.returns[start..];
            if window.len() < MIN_VOL_OBSERVATIONS {
                return None;
            }
            let vol = window.std_dev();
            (vol.is_finite() && vol > 0.0).then(|| {
                SizingInputs::from_risk(
                    &signal.instrument,
                    positions.nav,
                    vol,
                    tail.var,
                    &risk.decomposition,
                    &risk.budget,
                    &self.config.universe,
                )
            })
        })
    }
}
