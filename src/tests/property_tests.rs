//! Invariants over generated inputs.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;

use super::fixtures;
use crate::config::{
    AggregationConfig, LimitsConfig, OptimizerConfig, RebalanceConfig, ShrinkageTarget,
    SizingConfig, StressConfig,
};
use crate::portfolio::{project_box_l1, BlackLitterman, PositionSizer, RebalanceTrigger, SizingInputs};
use crate::risk::limits::LossRecord;
use crate::risk::stress::{StressScenario, StressTester};
use crate::risk::var::empirical_var_cvar;
use crate::risk::ShrinkageEstimate;
use crate::signals::SignalAggregator;
use crate::types::{Direction, InstrumentUniverse, PositionSnapshot, Regime, RegimeView, SignalSnapshot};

const INSTRUMENTS: [&str; 4] = ["USDBRL", "DI1F27", "NTNB35", "IBOV"];
const STRATEGIES: [&str; 5] = ["FX_CARRY", "RATES_SLOPE", "INF_BREAKEVEN", "EQ_VALUE", "MACRO_TREND"];

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short), Just(Direction::Neutral)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_one_bounded_view_per_instrument(
        picks in prop::collection::btree_map((0usize..5, 0usize..4), (direction(), 0.0f64..4.0, 0.0f64..=1.0), 1..20)
    ) {
        let signals: Vec<_> = picks
            .iter()
            .map(|((s, i), (d, z, c))| fixtures::signal(STRATEGIES[*s], INSTRUMENTS[*i], *d, *z, *c))
            .collect();
        let expected: BTreeSet<&str> = picks.keys().map(|(_, i)| INSTRUMENTS[*i]).collect();

        let aggregator = SignalAggregator::new(AggregationConfig::default(), InstrumentUniverse::default());
        let regime = RegimeView::certain(Regime::Stagflation);
        let out = aggregator.aggregate_default(&signals, Some(&regime), fixtures::as_of()).unwrap();

        let got: BTreeSet<&str> = out.iter().map(|a| a.instrument.as_str()).collect();
        prop_assert_eq!(out.len(), expected.len());
        prop_assert_eq!(got, expected);
        for view in &out {
            prop_assert!((-1.0..=1.0).contains(&view.net_conviction));
            prop_assert!((0.0..=1.0).contains(&view.confidence));
        }
    }

    #[test]
    fn prop_cvar_below_var_below_zero(
        mut pnl in prop::collection::vec(-1e4f64..1e4, 20..400),
        confidence in 0.9f64..0.995,
    ) {
        pnl.sort_by(|a, b| a.total_cmp(b));
        let (var, cvar) = empirical_var_cvar(&pnl, confidence);
        prop_assert!(var <= 0.0);
        prop_assert!(cvar <= var);
        prop_assert!(cvar.abs() >= var.abs());
    }

    #[test]
    fn prop_linear_scenario_pnl(
        a in -1e6f64..1e6, b in -1e6f64..1e6,
        sa in -0.5f64..0.5, sb in -0.5f64..0.5,
    ) {
        let tester = StressTester::new(StressConfig::default(), InstrumentUniverse::empty());
        let scenario = StressScenario::new("p", "Property", "generated")
            .with_shock("A", sa)
            .with_shock("B", sb);
        let positions = PositionSnapshot::new(fixtures::as_of_date(), 1e7)
            .with_position("A", a)
            .with_position("B", b);
        let result = tester.run_scenario(&scenario, &positions).unwrap();
        prop_assert!((result.total_pnl - (a * sa + b * sb)).abs() < 1e-6);
    }

    #[test]
    fn prop_zero_views_keep_equilibrium(w in prop::collection::vec(-1.0f64..1.0, 3)) {
        let estimate = ShrinkageEstimate {
            instruments: vec!["A".into(), "B".into(), "C".into()],
            covariance: DMatrix::from_row_slice(3, 3, &[
                1.0e-4, 0.2e-4, 0.0,
                0.2e-4, 2.0e-4, 0.1e-4,
                0.0, 0.1e-4, 3.0e-4,
            ]),
            target: ShrinkageTarget::ConstantCorrelation,
            intensity: 0.1,
            n_obs: 500,
        };
        let weights: BTreeMap<String, f64> = ["A", "B", "C"].iter().map(|s| s.to_string()).zip(w).collect();
        let bl = BlackLitterman::new(OptimizerConfig::default().with_market_weights(weights));
        let result = bl.posterior(&estimate, &[], None).unwrap();
        prop_assert_eq!(&result.posterior_returns, &result.equilibrium_returns);
    }

    #[test]
    fn prop_fractional_kelly_is_half(conviction in -1.0f64..1.0, vol in 1e-4f64..0.05) {
        let sizer = PositionSizer::new(SizingConfig::default());
        let inputs = SizingInputs::standalone(1e6, vol, 2.326, 0.1);
        prop_assert_eq!(sizer.fractional_kelly(conviction, &inputs), 0.5 * sizer.full_kelly(conviction, &inputs));
    }

    #[test]
    fn prop_quiet_rebalance_has_no_trades(
        base in prop::collection::vec(-0.9f64..0.9, 1..4),
        nudge in -0.1f64..0.1,
        drift in -0.05f64..0.05,
    ) {
        let trigger = RebalanceTrigger::new(RebalanceConfig::default());
        let snapshot = |shift: f64| SignalSnapshot::new(
            fixtures::as_of(),
            base.iter()
                .enumerate()
                .map(|(i, c)| fixtures::aggregated(INSTRUMENTS[i], (c + shift).clamp(-1.0, 1.0), 0.8))
                .collect(),
        );
        let targets: Vec<_> = base
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let target = 0.1;
                let current = target * (1.0 + drift);
                crate::portfolio::PortfolioTarget {
                    instrument: INSTRUMENTS[i].to_string(),
                    asset_class: crate::types::AssetClass::Fx,
                    target_weight: target,
                    target_notional: target * 1e6,
                    current_weight: current,
                    current_notional: current * 1e6,
                    trade_needed: (target - current) * 1e6,
                    strategy_attribution: BTreeMap::new(),
                    overrides: Vec::new(),
                }
            })
            .collect();
        let decision = trigger.evaluate(Some(&snapshot(0.0)), &snapshot(nudge), &targets, 1e6);
        prop_assert!(!decision.triggered);
        prop_assert!(decision.trades.is_empty());
    }

    #[test]
    fn prop_loss_record_bounded(capacity in 1usize..10, days in 0usize..40) {
        let mut record = LossRecord::new(capacity);
        for d in 0..days {
            let date = fixtures::as_of_date() + chrono::Duration::days(d as i64);
            record.push(date, (d as f64).sin() * 1_000.0).unwrap();
            prop_assert!(record.len() <= capacity);
        }
        prop_assert_eq!(record.len(), days.min(capacity));
    }

    #[test]
    fn prop_projection_feasible(
        v in prop::collection::vec(-2.0f64..2.0, 1..8),
        bound in 0.05f64..1.0,
        budget in 0.1f64..3.0,
    ) {
        let n = v.len();
        let p = project_box_l1(&DVector::from_vec(v), &DVector::from_element(n, bound), budget);
        prop_assert!(p.iter().all(|x| x.abs() <= bound + 1e-12));
        prop_assert!(p.abs().sum() <= budget + 1e-9);
    }

    #[test]
    fn prop_regime_clarity_bounded(raw in prop::collection::vec(0.0f64..1.0, 4)) {
        let total: f64 = raw.iter().sum();
        prop_assume!(total > 1e-6);
        let probabilities: BTreeMap<Regime, f64> = Regime::ALL
            .iter()
            .copied()
            .zip(raw.iter().map(|p| p / total))
            .collect();
        let view = RegimeView::new(probabilities).unwrap();
        prop_assert!((0.0..=1.0).contains(&view.clarity()));
    }

    #[test]
    fn prop_budget_line_breach_matches_ceiling(share in -0.5f64..1.5) {
        let limits = LimitsConfig::default();
        let line = crate::risk::limits::BudgetLine::new(share, limits.instrument_risk_ceiling);
        prop_assert!(line.utilization >= 0.0);
        prop_assert!(line.headroom <= limits.instrument_risk_ceiling);
        if (share - limits.instrument_risk_ceiling).abs() > 1e-9 {
            prop_assert_eq!(line.is_breached(), share > limits.instrument_risk_ceiling);
        }
    }
}
