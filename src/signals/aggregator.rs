//! Per-instrument signal aggregation.
//!
//! Combines the signals of many strategies into one `AggregatedSignal` per
//! referenced instrument.
//!
//! # Methods
//!
//! ```text
//! confidence-weighted:  c = Σ conf·stale·implied / Σ conf
//! rank-based:           implied → sign × rank(|implied|)/n, then confidence-weighted
//! bayesian:             p = conf/(1−conf),  w = tilt·p·stale
//!                       c = Σ w·implied / Σ tilt·p,   confidence = W/(1+W), W = Σ w
//! ```
//!
//! Staleness enters the numerator only, so an old signal shrinks the view
//! toward zero instead of merely losing relative weight. A lone fresh
//! contributor therefore reproduces its own conviction, and for the Bayesian
//! method its own confidence, because p/(1+p) = conf.
//!
//! # Post-processing
//!
//! - **Crowding**: more than `crowding_threshold` of live contributors on one
//!   side cuts conviction by `crowding_penalty`
//! - **Staleness**: weight × max(0, 1 − business_days / horizon)

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::AggregationConfig;
use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::types::{
    business_days_between, AggregatedSignal, AggregationMethod, Contribution, InstrumentUniverse,
    RegimeView, StrategySignal,
};

/// Regime-aware, crowding- and staleness-adjusted signal aggregator.
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    config: AggregationConfig,
    universe: InstrumentUniverse,
}

impl SignalAggregator {
    pub fn new(config: AggregationConfig, universe: InstrumentUniverse) -> Self {
        Self { config, universe }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Boundary validation of a whole signal batch.
    ///
    /// Rejects invalid records, signals dated after the as-of date and duplicate
    /// (strategy, instrument) pairs.
    pub fn validate(signals: &[StrategySignal], as_of: DateTime<Utc>) -> Result<()> {
        let mut seen = HashSet::with_capacity(signals.len());
        for signal in signals {
            signal.validate()?;
            if signal.timestamp.date_naive() > as_of.date_naive() {
                return Err(Error::invalid_signal(
                    &signal.strategy_id,
                    &signal.instrument,
                    format!(
                        "timestamp {} is after as-of date {}",
                        signal.timestamp,
                        as_of.date_naive()
                    ),
                ));
            }
            if !seen.insert((signal.strategy_id.as_str(), signal.instrument.as_str())) {
                return Err(Error::invalid_signal(
                    &signal.strategy_id,
                    &signal.instrument,
                    "duplicate signal for strategy and instrument",
                ));
            }
        }
        Ok(())
    }

    /// Aggregate with the configured default method.
    pub fn aggregate_default(
        &self,
        signals: &[StrategySignal],
        regime: Option<&RegimeView>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<AggregatedSignal>> {
        self.aggregate(signals, regime, self.config.method, as_of)
    }

    /// One `AggregatedSignal` per distinct referenced instrument, sorted by instrument.
    pub fn aggregate(
        &self,
        signals: &[StrategySignal],
        regime: Option<&RegimeView>,
        method: AggregationMethod,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<AggregatedSignal>> {
        Self::validate(signals, as_of)?;
        if signals.is_empty() {
            return Ok(Vec::new());
        }

        let implied = self.implied_convictions(signals, method);

        let mut by_instrument: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, signal) in signals.iter().enumerate() {
            by_instrument
                .entry(signal.instrument.as_str())
                .or_default()
                .push(i);
        }

        let mut out = Vec::with_capacity(by_instrument.len());
        for (instrument, indices) in by_instrument {
            let aggregated =
                self.aggregate_instrument(instrument, &indices, signals, &implied, regime, method, as_of);
            if aggregated.staleness_adjustment == 0.0 {
                warn!(
                    target: targets::SIGNALS,
                    instrument,
                    contributors = indices.len(),
                    "All contributing signals are stale; emitting zero view"
                );
            }
            out.push(aggregated);
        }

        info!(
            target: targets::SIGNALS,
            signals = signals.len(),
            instruments = out.len(),
            method = ?method,
            regime_supplied = regime.is_some(),
            "Signals aggregated"
        );
        Ok(out)
    }

    /// Per-signal implied conviction, rank-transformed for the rank-based method.
    fn implied_convictions(&self, signals: &[StrategySignal], method: AggregationMethod) -> Vec<f64> {
        let raw: Vec<f64> = signals
            .iter()
            .map(|s| s.implied_conviction(self.config.z_saturation))
            .collect();
        match method {
            AggregationMethod::RankBased => rank_normalize(&raw),
            _ => raw,
        }
    }

    /// Linear decay to zero over the staleness horizon.
    pub fn staleness_factor(&self, signal_time: DateTime<Utc>, as_of: DateTime<Utc>) -> f64 {
        let age = business_days_between(signal_time.date_naive(), as_of.date_naive());
        let horizon = self.config.staleness_horizon_days as f64;
        (1.0 - age as f64 / horizon).max(0.0)
    }

    #[allow(clippy::too_many_arguments)]
    fn aggregate_instrument(
        &self,
        instrument: &str,
        indices: &[usize],
        signals: &[StrategySignal],
        implied: &[f64],
        regime: Option<&RegimeView>,
        method: AggregationMethod,
        as_of: DateTime<Utc>,
    ) -> AggregatedSignal {
        let tilt_active = method == AggregationMethod::Bayesian;
        let cap = self.config.max_evidence_confidence;

        let mut contributors = Vec::with_capacity(indices.len());
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut conf_total = 0.0;
        let mut conf_retained = 0.0;
        let mut stale_total = 0.0;

        for &i in indices {
            let signal = &signals[i];
            let family = self.universe.family(&signal.strategy_id);
            let stale = self.staleness_factor(signal.timestamp, as_of);
            let tilt = if tilt_active {
                self.config.tilt_table.tilt(regime, family)
            } else {
                1.0
            };

            let (base, weight) = match method {
                AggregationMethod::Bayesian => {
                    let c = signal.confidence.min(cap);
                    let precision = tilt * c / (1.0 - c);
                    (precision, precision * stale)
                }
                AggregationMethod::ConfidenceWeighted | AggregationMethod::RankBased => {
                    (signal.confidence, signal.confidence * stale)
                }
            };

            numerator += weight * implied[i];
            denominator += base;
            conf_total += signal.confidence;
            conf_retained += signal.confidence * stale;
            stale_total += stale;

            contributors.push(Contribution {
                strategy_id: signal.strategy_id.clone(),
                family,
                weight,
                implied_conviction: implied[i],
                confidence: signal.confidence,
                staleness_factor: stale,
                regime_tilt: tilt,
            });
        }

        let n = indices.len() as f64;
        let mut conviction = if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        };

        let confidence = match method {
            AggregationMethod::Bayesian => {
                let evidence: f64 = contributors.iter().map(|c| c.weight).sum();
                evidence / (1.0 + evidence)
            }
            _ => conf_retained / n,
        };

        let staleness_adjustment = if conf_total > 0.0 {
            conf_retained / conf_total
        } else {
            stale_total / n
        };

        let crowding_adjustment = self.crowding_adjustment(&contributors);
        conviction *= crowding_adjustment;

        debug!(
            target: targets::SIGNALS,
            instrument,
            conviction,
            confidence,
            contributors = contributors.len(),
            crowding_adjustment,
            staleness_adjustment,
            "Instrument aggregated"
        );

        AggregatedSignal {
            instrument: instrument.to_string(),
            asset_class: self.universe.asset_class(instrument),
            timestamp: as_of,
            net_conviction: conviction.clamp(-1.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            contributors,
            crowding_adjustment,
            staleness_adjustment,
            regime_tilt_applied: tilt_active && regime.is_some(),
            method,
        }
    }

    /// 1 − penalty when more than the threshold of live contributors agree.
    fn crowding_adjustment(&self, contributors: &[Contribution]) -> f64 {
        let live: Vec<&Contribution> = contributors.iter().filter(|c| c.weight > 0.0).collect();
        if live.len() < self.config.crowding_min_contributors {
            return 1.0;
        }
        let longs = live.iter().filter(|c| c.implied_conviction > 0.0).count();
        let shorts = live.iter().filter(|c| c.implied_conviction < 0.0).count();
        let agreement = longs.max(shorts) as f64 / live.len() as f64;
        if agreement > self.config.crowding_threshold {
            1.0 - self.config.crowding_penalty
        } else {
            1.0
        }
    }
}

/// Replace each value by sign × (average rank of |value|) / n.
///
/// Ranks run from 1 (smallest magnitude) to n, ties share their average rank,
/// so the largest outlier maps to ±1 no matter how extreme it is.
pub fn rank_normalize(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].abs().total_cmp(&values[b].abs()));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]].abs() == values[order[start]].abs() {
            end += 1;
        }
        // 1-based average rank over the tie block [start, end)
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg_rank;
        }
        start = end;
    }

    values
        .iter()
        .zip(ranks)
        .map(|(v, r)| if *v == 0.0 { 0.0 } else { v.signum() * r / n as f64 })
        .collect()
}
