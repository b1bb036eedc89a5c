//! Multi-day runs through the whole pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::fixtures;
use crate::config::{EngineConfig, StressConfig};
use crate::engine::{DailyInputs, DailyRun};
use crate::portfolio::RebalanceReason;
use crate::risk::limits::DailyPnl;
use crate::risk::stress::{StressScenario, StressTester};
use crate::types::{Direction, InstrumentUniverse, PositionSnapshot, StrategySignal};

const BOOK: [&str; 3] = ["USDBRL", "DI1F27", "IBOV"];

fn signals_at(as_of: DateTime<Utc>) -> Vec<StrategySignal> {
    [
        fixtures::signal("FX_CARRY", "USDBRL", Direction::Long, 1.6, 0.8),
        fixtures::signal("FX_VALUE", "USDBRL", Direction::Long, 0.9, 0.6),
        fixtures::signal("RATES_SLOPE", "DI1F27", Direction::Short, 1.1, 0.7),
        fixtures::signal("EQ_MOMENTUM", "IBOV", Direction::Long, 0.7, 0.5),
    ]
    .into_iter()
    .map(|s| StrategySignal { timestamp: as_of, ..s })
    .collect()
}

fn day_inputs(as_of: DateTime<Utc>, positions: PositionSnapshot, pnl: f64) -> DailyInputs {
    DailyInputs {
        as_of,
        signals: signals_at(as_of),
        regime: Some(BTreeMap::from([
            ("reflation".to_string(), 0.7),
            ("goldilocks".to_string(), 0.3),
        ])),
        positions,
        returns: fixtures::return_history(&BOOK, 800, 23),
        signal_history: Vec::new(),
        last_rebalance: None,
        realized_pnl: vec![DailyPnl {
            date: as_of.date_naive(),
            pnl,
        }],
        replays: Vec::new(),
    }
}

#[test]
fn test_second_day_on_target_is_quiet() {
    let engine = DailyRun::new(EngineConfig::default()).unwrap();
    let day1 = fixtures::as_of();
    let flat = PositionSnapshot::new(day1.date_naive(), 1_000_000.0)
        .with_position("USDBRL", 10_000.0);
    let first = engine.run(&day_inputs(day1, flat, 1_500.0)).unwrap();
    let decision = first.rebalance.as_ref().unwrap();
    assert_eq!(decision.reason, RebalanceReason::Initial);
    assert!(!decision.trades.is_empty());

    // Next business day: book filled at target, views unchanged
    let day2 = day1 + Duration::days(3);
    let targets = &first.optimization.result().unwrap().targets;
    let filled = targets.iter().fold(
        PositionSnapshot::new(day2.date_naive(), 1_000_000.0),
        |book, t| book.with_position(t.instrument.clone(), t.target_notional),
    );
    let mut inputs = day_inputs(day2, filled, -2_000.0);
    inputs.signal_history = vec![first.snapshot()];
    inputs.last_rebalance = Some(first.snapshot());
    let second = engine.run(&inputs).unwrap();

    let decision = second.rebalance.as_ref().unwrap();
    assert_eq!(decision.reason, RebalanceReason::Quiet);
    assert!(decision.trades.is_empty());
    assert!(decision.mean_signal_change < 1e-12);
    assert_eq!(engine.ledger().snapshot().len(), 2);
    assert!((second.risk.loss.weekly_pnl + 500.0).abs() < 1e-9);
}

#[test]
fn test_scenario_example_pnl() {
    let tester = StressTester::new(StressConfig::default(), InstrumentUniverse::empty());
    let scenario = StressScenario::new("example", "Example", "two-asset shock")
        .with_shock("A", -0.10)
        .with_shock("B", 0.05);
    let positions = PositionSnapshot::new(fixtures::as_of_date(), 1_000.0)
        .with_position("A", 100.0)
        .with_position("B", -50.0);
    let result = tester.run_scenario(&scenario, &positions).unwrap();
    assert!((result.total_pnl + 12.5).abs() < 1e-12);
}

#[test]
fn test_one_view_per_instrument_through_engine() {
    let engine = DailyRun::new(EngineConfig::default()).unwrap();
    let positions = PositionSnapshot::new(fixtures::as_of_date(), 1_000_000.0);
    let out = engine
        .run(&day_inputs(fixtures::as_of(), positions, 0.0))
        .unwrap();
    let instruments: Vec<&str> = out.signals.iter().map(|s| s.instrument.as_str()).collect();
    assert_eq!(instruments, vec!["DI1F27", "IBOV", "USDBRL"]);
    assert!(out.regime.is_some());
    assert!(out.signals.iter().all(|s| s.regime_tilt_applied));
}
