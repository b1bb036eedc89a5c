//! Turnover gate between the optimizer and execution.
//!
//! Optimization runs every close; trades go out only when the views moved
//! enough since the last rebalance or a position drifted from target.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RebalanceConfig;
use crate::infra::targets;
use crate::types::SignalSnapshot;

use super::target::{PortfolioTarget, Trade};

/// Why a rebalance fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceReason {
    /// No earlier rebalance to compare against
    Initial,
    SignalChange,
    Drift,
    SignalChangeAndDrift,
    Quiet,
}

impl fmt::Display for RebalanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebalanceReason::Initial => "initial",
            RebalanceReason::SignalChange => "signal_change",
            RebalanceReason::Drift => "drift",
            RebalanceReason::SignalChangeAndDrift => "signal_change_and_drift",
            RebalanceReason::Quiet => "quiet",
        };
        f.write_str(s)
    }
}

/// Outcome of one trigger evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceDecision {
    pub triggered: bool,
    pub reason: RebalanceReason,
    pub mean_signal_change: f64,
    pub max_drift: f64,
    /// Instrument with the largest drift
    pub max_drift_instrument: Option<String>,
    pub trades: Vec<Trade>,
}

impl RebalanceDecision {
    pub fn turnover(&self) -> f64 {
        self.trades.iter().map(|t| t.notional).sum()
    }
}

/// Decides whether today's targets are traded.
#[derive(Debug, Clone, Default)]
pub struct RebalanceTrigger {
    config: RebalanceConfig,
}

impl RebalanceTrigger {
    pub fn new(config: RebalanceConfig) -> Self {
        Self { config }
    }

    /// Mean |Δ conviction| over every instrument seen in either snapshot.
    ///
    /// An instrument missing from one side counts with zero conviction there.
    pub fn signal_change(&self, last: &SignalSnapshot, current: &SignalSnapshot) -> f64 {
        let instruments: BTreeSet<&str> = last
            .signals
            .iter()
            .chain(&current.signals)
            .map(|s| s.instrument.as_str())
            .collect();
        if instruments.is_empty() {
            return 0.0;
        }
        let conviction = |snap: &SignalSnapshot, i: &str| snap.get(i).map(|s| s.net_conviction).unwrap_or(0.0);
        let total: f64 = instruments
            .iter()
            .map(|i| (conviction(current, i) - conviction(last, i)).abs())
            .sum();
        total / instruments.len() as f64
    }

    /// Gate the optimizer's targets.
    pub fn evaluate(
        &self,
        last_rebalance: Option<&SignalSnapshot>,
        current: &SignalSnapshot,
        targets: &[PortfolioTarget],
        nav: f64,
    ) -> RebalanceDecision {
        let mean_signal_change = last_rebalance
            .map(|last| self.signal_change(last, current))
            .unwrap_or(0.0);
        let (max_drift, max_drift_instrument) = targets
            .iter()
            .map(|t| (t.drift(), &t.instrument))
            .fold((0.0, None), |acc, (d, i)| if d > acc.0 { (d, Some(i.clone())) } else { acc });

        let signal_moved = mean_signal_change > self.config.signal_change_threshold;
        let drifted = max_drift > self.config.drift_threshold_pct;
        let reason = match (last_rebalance.is_some(), signal_moved, drifted) {
            (false, _, _) => RebalanceReason::Initial,
            (true, true, true) => RebalanceReason::SignalChangeAndDrift,
            (true, true, false) => RebalanceReason::SignalChange,
            (true, false, true) => RebalanceReason::Drift,
            (true, false, false) => RebalanceReason::Quiet,
        };
        let triggered = reason != RebalanceReason::Quiet;

        let min_trade = self.config.min_trade_pct_nav * nav;
        let trades: Vec<Trade> = if triggered {
            targets
                .iter()
                .filter(|t| t.trade_needed.abs() >= min_trade)
                .filter_map(Trade::from_target)
                .collect()
        } else {
            Vec::new()
        };

        info!(
            target: targets::PORTFOLIO,
            %reason,
            mean_signal_change,
            max_drift,
            trades = trades.len(),
            "Rebalance evaluated"
        );

        RebalanceDecision {
            triggered,
            reason,
            mean_signal_change,
            max_drift,
            max_drift_instrument,
            trades,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::TradeSide;
    use crate::tests::fixtures;
    use crate::types::AssetClass;
    use std::collections::BTreeMap;

    fn snapshot(views: &[(&str, f64)]) -> SignalSnapshot {
        SignalSnapshot::new(
            fixtures::as_of(),
            views
                .iter()
                .map(|(i, c)| fixtures::aggregated(i, *c, 0.8))
                .collect(),
        )
    }

    fn target(instrument: &str, current: f64, target: f64) -> PortfolioTarget {
        let nav = 1_000_000.0;
        PortfolioTarget {
            instrument: instrument.to_string(),
            asset_class: AssetClass::Fx,
            target_weight: target,
            target_notional: target * nav,
            current_weight: current,
            current_notional: current * nav,
            trade_needed: (target - current) * nav,
            strategy_attribution: BTreeMap::new(),
            overrides: Vec::new(),
        }
    }

    #[test]
    fn test_signal_change_counts_missing_as_zero() {
        let trigger = RebalanceTrigger::default();
        let last = snapshot(&[("A", 0.5), ("B", -0.2)]);
        let current = snapshot(&[("A", 0.3), ("C", 0.4)]);
        // |0.3 − 0.5| + |0 − (−0.2)| + |0.4 − 0| over three instruments
        assert!((trigger.signal_change(&last, &current) - 0.8 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_quiet_day_emits_no_trades() {
        let trigger = RebalanceTrigger::default();
        let last = snapshot(&[("A", 0.50), ("B", -0.30)]);
        let current = snapshot(&[("A", 0.52), ("B", -0.28)]);
        let targets = [target("A", 0.100, 0.104), target("B", -0.050, -0.052)];
        let decision = trigger.evaluate(Some(&last), &current, &targets, 1_000_000.0);
        assert!(!decision.triggered);
        assert_eq!(decision.reason, RebalanceReason::Quiet);
        assert!(decision.trades.is_empty());
    }

    #[test]
    fn test_signal_change_triggers() {
        let trigger = RebalanceTrigger::default();
        let last = snapshot(&[("A", 0.5), ("B", -0.3)]);
        let current = snapshot(&[("A", 0.1), ("B", 0.1)]);
        let targets = [target("A", 0.10, 0.02), target("B", -0.05, 0.02)];
        let decision = trigger.evaluate(Some(&last), &current, &targets, 1_000_000.0);
        assert_eq!(decision.reason, RebalanceReason::SignalChangeAndDrift);
        assert_eq!(decision.trades.len(), 2);
        assert_eq!(decision.trades[0].side, TradeSide::Sell);
        assert_eq!(decision.trades[1].side, TradeSide::Buy);
    }

    #[test]
    fn test_drift_alone_triggers() {
        let trigger = RebalanceTrigger::default();
        let views = snapshot(&[("A", 0.5)]);
        let targets = [target("A", 0.08, 0.10), target("B", 0.0500, 0.0502)];
        let decision = trigger.evaluate(Some(&views), &views, &targets, 1_000_000.0);
        assert_eq!(decision.reason, RebalanceReason::Drift);
        assert_eq!(decision.max_drift_instrument.as_deref(), Some("A"));
        // The 200 notional adjustment on B is below the minimum trade size
        assert_eq!(decision.trades.len(), 1);
        assert!((decision.turnover() - 20_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_first_run_trades() {
        let trigger = RebalanceTrigger::default();
        let decision = trigger.evaluate(None, &snapshot(&[("A", 0.5)]), &[target("A", 0.0, 0.1)], 1_000_000.0);
        assert_eq!(decision.reason, RebalanceReason::Initial);
        assert_eq!(decision.trades.len(), 1);
    }
}
