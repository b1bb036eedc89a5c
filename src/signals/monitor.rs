//! Signal monitor: flips, conviction surges and cross-strategy divergence.
//!
//! Stateless. Every operation reads a caller-supplied history of
//! `SignalSnapshot`s ordered oldest first; the last element is "today".

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::types::{AssetClass, RegimeView, SignalSnapshot};

use super::summary::DailySummary;

/// Alert raised by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalAlert {
    /// Net conviction changed sign between consecutive snapshots
    Flip {
        instrument: String,
        at: DateTime<Utc>,
        previous: f64,
        current: f64,
        /// Flips of this instrument inside the rolling window, this one included
        flips_in_window: usize,
    },
    /// |Δ conviction| above the surge threshold
    Surge {
        instrument: String,
        at: DateTime<Utc>,
        previous: f64,
        current: f64,
        change: f64,
    },
    /// Two strategies of one asset class disagree by more than the threshold
    Divergence {
        asset_class: AssetClass,
        at: DateTime<Utc>,
        strategy_a: String,
        strategy_b: String,
        conviction_a: f64,
        conviction_b: f64,
        gap: f64,
    },
}

impl SignalAlert {
    pub fn instrument(&self) -> Option<&str> {
        match self {
            SignalAlert::Flip { instrument, .. } | SignalAlert::Surge { instrument, .. } => {
                Some(instrument)
            }
            SignalAlert::Divergence { .. } => None,
        }
    }

    /// One-line human-readable description.
    pub fn describe(&self) -> String {
        match self {
            SignalAlert::Flip {
                instrument,
                previous,
                current,
                flips_in_window,
                ..
            } => format!(
                "FLIP {}: {:+.2} -> {:+.2} ({} flip(s) in window)",
                instrument, previous, current, flips_in_window
            ),
            SignalAlert::Surge {
                instrument,
                previous,
                current,
                change,
                ..
            } => format!(
                "SURGE {}: {:+.2} -> {:+.2} (change {:+.2})",
                instrument, previous, current, change
            ),
            SignalAlert::Divergence {
                asset_class,
                strategy_a,
                strategy_b,
                conviction_a,
                conviction_b,
                gap,
                ..
            } => format!(
                "DIVERGENCE {}: {} {:+.2} vs {} {:+.2} (gap {:.2})",
                asset_class, strategy_a, conviction_a, strategy_b, conviction_b, gap
            ),
        }
    }
}

/// A single sign change in an instrument's net conviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlipEvent {
    pub instrument: String,
    pub at: DateTime<Utc>,
    pub previous: f64,
    pub current: f64,
}

/// Analysis over a history of aggregated views.
#[derive(Debug, Clone, Default)]
pub struct SignalMonitor {
    config: MonitorConfig,
}

impl SignalMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Every flip across consecutive snapshot pairs of the history.
    ///
    /// Only strictly opposite non-zero signs count; passing through zero is not a flip.
    pub fn detect_flips(&self, history: &[SignalSnapshot]) -> Vec<FlipEvent> {
        let mut flips = Vec::new();
        for pair in history.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            for signal in &cur.signals {
                if let Some(before) = prev.get(&signal.instrument) {
                    if before.net_conviction * signal.net_conviction < 0.0 {
                        flips.push(FlipEvent {
                            instrument: signal.instrument.clone(),
                            at: cur.as_of,
                            previous: before.net_conviction,
                            current: signal.net_conviction,
                        });
                    }
                }
            }
        }
        flips
    }

    /// Flip count per instrument over the window ending at the latest snapshot.
    pub fn flip_counts(&self, history: &[SignalSnapshot]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        let Some(latest) = history.last() else {
            return counts;
        };
        let window_start = latest.as_of - Duration::days(self.config.flip_window_days);
        for flip in self.detect_flips(history) {
            if flip.at > window_start && flip.at <= latest.as_of {
                *counts.entry(flip.instrument).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Surges between the last two snapshots.
    pub fn detect_surges(&self, history: &[SignalSnapshot]) -> Vec<SignalAlert> {
        let [.., prev, cur] = history else {
            return Vec::new();
        };
        cur.signals
            .iter()
            .filter_map(|signal| {
                let before = prev.get(&signal.instrument)?;
                let change = signal.net_conviction - before.net_conviction;
                (change.abs() > self.config.surge_threshold).then(|| SignalAlert::Surge {
                    instrument: signal.instrument.clone(),
                    at: cur.as_of,
                    previous: before.net_conviction,
                    current: signal.net_conviction,
                    change,
                })
            })
            .collect()
    }

    /// Pairwise strategy divergence within each asset class of one snapshot.
    ///
    /// A strategy's conviction for a class is the mean of its implied
    /// convictions across the class's instruments.
    pub fn detect_divergences(&self, snapshot: &SignalSnapshot) -> Vec<SignalAlert> {
        let mut by_class: BTreeMap<AssetClass, BTreeMap<&str, (f64, usize)>> = BTreeMap::new();
        for signal in &snapshot.signals {
            let strategies = by_class.entry(signal.asset_class).or_default();
            for c in &signal.contributors {
                let entry = strategies.entry(c.strategy_id.as_str()).or_insert((0.0, 0));
                entry.0 += c.implied_conviction;
                entry.1 += 1;
            }
        }

        let mut alerts = Vec::new();
        for (asset_class, strategies) in by_class {
            let means: Vec<(&str, f64)> = strategies
                .into_iter()
                .map(|(id, (sum, n))| (id, sum / n as f64))
                .collect();
            for (i, (a, ca)) in means.iter().enumerate() {
                for (b, cb) in &means[i + 1..] {
                    let gap = (ca - cb).abs();
                    if gap > self.config.divergence_threshold {
                        alerts.push(SignalAlert::Divergence {
                            asset_class,
                            at: snapshot.as_of,
                            strategy_a: a.to_string(),
                            strategy_b: b.to_string(),
                            conviction_a: *ca,
                            conviction_b: *cb,
                            gap,
                        });
                    }
                }
            }
        }
        alerts
    }

    /// All alerts for the latest snapshot: flips and surges against the
    /// previous snapshot, divergences within the latest one.
    pub fn alerts(&self, history: &[SignalSnapshot]) -> Vec<SignalAlert> {
        let Some(latest) = history.last() else {
            return Vec::new();
        };
        let counts = self.flip_counts(history);

        let mut alerts: Vec<SignalAlert> = self
            .detect_flips(history)
            .into_iter()
            .filter(|f| f.at == latest.as_of)
            .map(|f| SignalAlert::Flip {
                flips_in_window: counts.get(&f.instrument).copied().unwrap_or(1),
                instrument: f.instrument,
                at: f.at,
                previous: f.previous,
                current: f.current,
            })
            .collect();
        alerts.extend(self.detect_surges(history));
        alerts.extend(self.detect_divergences(latest));

        for alert in &alerts {
            warn!(target: targets::SIGNALS, alert = %alert.describe(), "Signal alert");
        }
        debug!(
            target: targets::SIGNALS,
            snapshots = history.len(),
            alerts = alerts.len(),
            "Monitor pass complete"
        );
        alerts
    }

    /// Daily report for the latest snapshot in the history.
    pub fn daily_summary(
        &self,
        history: &[SignalSnapshot],
        regime: Option<&RegimeView>,
    ) -> Result<DailySummary> {
        let latest = history
            .last()
            .ok_or_else(|| Error::insufficient_data("daily summary", 1, 0))?;
        let previous = history.len().checked_sub(2).map(|i| &history[i]);
        let alerts = self.alerts(history);
        let flip_counts = self.flip_counts(history);
        Ok(DailySummary::build(latest, previous, regime, alerts, flip_counts))
    }
}
