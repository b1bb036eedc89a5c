//! Shared test data.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::types::{
    AggregatedSignal, AggregationMethod, Contribution, Direction, InstrumentUniverse,
    ReturnHistory, ReturnSeries, StrategyFamily, StrategySignal,
};

pub(crate) fn as_of_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

pub(crate) fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 18, 0, 0).unwrap()
}

/// Daily returns driven by one common factor, vols rising with column index.
pub(crate) fn return_history(instruments: &[&str], n: usize, seed: u64) -> ReturnHistory {
    let mut rng = SmallRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..n).map(|k| start + Duration::days(k as i64)).collect();
    let mut columns = vec![Vec::with_capacity(n); instruments.len()];
    for _ in 0..n {
        let f: f64 = StandardNormal.sample(&mut rng);
        for (j, column) in columns.iter_mut().enumerate() {
            let e: f64 = StandardNormal.sample(&mut rng);
            let vol = 0.008 + 0.002 * j as f64;
            column.push(vol * (0.5 * f + 0.866 * e));
        }
    }
    ReturnHistory::from_series(
        instruments
            .iter()
            .zip(columns)
            .map(|(i, c)| ReturnSeries::new(*i, dates.clone(), c)),
    )
    .unwrap()
}

/// `A` from the common-factor history plus a `B` column derived from it.
pub(crate) fn derived_pair_history(n: usize, derive: impl Fn(f64) -> f64) -> ReturnHistory {
    let a = return_history(&["A"], n, 11).get("A").unwrap().clone();
    let b = ReturnSeries::new("B", a.dates.clone(), a.returns.iter().map(|r| derive(*r)).collect());
    ReturnHistory::from_series([a, b]).unwrap()
}

pub(crate) fn signal(
    strategy: &str,
    instrument: &str,
    direction: Direction,
    z: f64,
    confidence: f64,
) -> StrategySignal {
    StrategySignal {
        strategy_id: strategy.to_string(),
        timestamp: as_of(),
        instrument: instrument.to_string(),
        direction,
        z_score: z,
        confidence,
        raw_value: z,
    }
}

/// Aggregated view with two equally weighted contributors.
pub(crate) fn aggregated(instrument: &str, conviction: f64, confidence: f64) -> AggregatedSignal {
    let contributor = |strategy: &str| Contribution {
        strategy_id: strategy.to_string(),
        family: StrategyFamily::CrossAsset,
        weight: 0.5,
        implied_conviction: conviction,
        confidence,
        staleness_factor: 1.0,
        regime_tilt: 1.0,
    };
    AggregatedSignal {
        instrument: instrument.to_string(),
        asset_class: InstrumentUniverse::default().asset_class(instrument),
        timestamp: as_of(),
        net_conviction: conviction,
        confidence,
        contributors: vec![contributor("MACRO_TREND"), contributor("MACRO_VALUE")],
        crowding_adjustment: 1.0,
        staleness_adjustment: 1.0,
        regime_tilt_applied: false,
        method: AggregationMethod::Bayesian,
    }
}
