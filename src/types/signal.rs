//! Strategy signals and aggregated per-instrument views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

use super::universe::{AssetClass, StrategyFamily};

/// Directional call of a strategy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// +1 for long, -1 for short, 0 for neutral.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    /// Direction implied by the sign of a conviction value.
    pub fn from_conviction(conviction: f64) -> Self {
        if conviction > 0.0 {
            Direction::Long
        } else if conviction < 0.0 {
            Direction::Short
        } else {
            Direction::Neutral
        }
    }
}

/// Standardized forecast record emitted by one strategy for one instrument.
///
/// Produced externally and never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub strategy_id: String,
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub direction: Direction,
    /// Standardized signal strength
    pub z_score: f64,
    /// Strategy's own confidence in [0, 1]
    pub confidence: f64,
    /// Raw indicator value before standardization
    pub raw_value: f64,
}

impl StrategySignal {
    /// Boundary validation; never clamps.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Error::invalid_signal(&self.strategy_id, &self.instrument, reason);

        if self.strategy_id.trim().is_empty() {
            return Err(fail("empty strategy id".to_string()));
        }
        if self.instrument.trim().is_empty() {
            return Err(fail("empty instrument".to_string()));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(fail(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if !self.z_score.is_finite() {
            return Err(fail(format!("non-finite z-score {}", self.z_score)));
        }
        if !self.raw_value.is_finite() {
            return Err(fail(format!("non-finite raw value {}", self.raw_value)));
        }
        Ok(())
    }

    /// Strength in [0, 1]: `min(|z| / z_saturation, 1)`.
    pub fn strength(&self, z_saturation: f64) -> f64 {
        if z_saturation <= 0.0 {
            return if self.z_score != 0.0 { 1.0 } else { 0.0 };
        }
        (self.z_score.abs() / z_saturation).min(1.0)
    }

    /// Implied conviction in [-1, 1]: direction sign × strength.
    pub fn implied_conviction(&self, z_saturation: f64) -> f64 {
        self.direction.sign() * self.strength(z_saturation)
    }
}

/// Selectable aggregation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    ConfidenceWeighted,
    RankBased,
    #[default]
    Bayesian,
}

/// One strategy's contribution to an aggregated signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub strategy_id: String,
    pub family: StrategyFamily,
    /// Effective combination weight after tilt and staleness
    pub weight: f64,
    /// Conviction implied by the strategy's signal (after rank transform, if any)
    pub implied_conviction: f64,
    pub confidence: f64,
    /// Linear staleness factor in [0, 1]
    pub staleness_factor: f64,
    /// Regime tilt multiplier applied to the weight
    pub regime_tilt: f64,
}

/// One aggregated view per instrument, created once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSignal {
    pub instrument: String,
    pub asset_class: AssetClass,
    /// As-of time of the run that produced this view
    pub timestamp: DateTime<Utc>,
    /// Net conviction in [-1, 1]
    pub net_conviction: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub contributors: Vec<Contribution>,
    /// Multiplier applied by the crowding penalty (1.0 when not crowded)
    pub crowding_adjustment: f64,
    /// Fraction of confidence mass retained after staleness decay
    pub staleness_adjustment: f64,
    pub regime_tilt_applied: bool,
    pub method: AggregationMethod,
}

impl AggregatedSignal {
    /// Reject views read back from storage with out-of-range fields.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Error::invalid_signal("aggregate", &self.instrument, reason);

        if self.instrument.trim().is_empty() {
            return Err(fail("empty instrument".to_string()));
        }
        if !self.net_conviction.is_finite() || !(-1.0..=1.0).contains(&self.net_conviction) {
            return Err(fail(format!(
                "net conviction {} outside [-1, 1]",
                self.net_conviction
            )));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(fail(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        Direction::from_conviction(self.net_conviction)
    }

    /// Contributor weights normalized to sum to one (by absolute weight).
    pub fn attribution(&self) -> Vec<(String, f64)> {
        let total: f64 = self.contributors.iter().map(|c| c.weight.abs()).sum();
        if total <= 0.0 {
            return Vec::new();
        }
        self.contributors
            .iter()
            .filter(|c| c.weight.abs() > 0.0)
            .map(|c| (c.strategy_id.clone(), c.weight.abs() / total))
            .collect()
    }

    /// Were any crowding penalties applied?
    pub fn is_crowded(&self) -> bool {
        self.crowding_adjustment < 1.0
    }
}

/// All aggregated signals of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub as_of: DateTime<Utc>,
    pub signals: Vec<AggregatedSignal>,
}

impl SignalSnapshot {
    pub fn new(as_of: DateTime<Utc>, signals: Vec<AggregatedSignal>) -> Self {
        Self { as_of, signals }
    }

    /// Look up an instrument's view.
    pub fn get(&self, instrument: &str) -> Option<&AggregatedSignal> {
        self.signals.iter().find(|s| s.instrument == instrument)
    }

    pub fn validate(&self) -> Result<()> {
        self.signals.iter().try_for_each(AggregatedSignal::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(confidence: f64, z: f64) -> StrategySignal {
        StrategySignal {
            strategy_id: "FX_CARRY".to_string(),
            timestamp: Utc::now(),
            instrument: "USDBRL".to_string(),
            direction: Direction::Short,
            z_score: z,
            confidence,
            raw_value: 0.4,
        }
    }

    #[test]
    fn test_implied_conviction_saturates() {
        assert!((signal(0.5, 1.0).implied_conviction(2.0) + 0.5).abs() < 1e-12);
        assert!((signal(0.5, -5.0).implied_conviction(2.0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_validation_rejects_out_of_range_confidence() {
        assert!(signal(1.2, 1.0).validate().is_err());
        assert!(signal(-0.1, 1.0).validate().is_err());
        assert!(signal(f64::NAN, 1.0).validate().is_err());
        assert!(signal(1.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_non_finite_z() {
        assert!(signal(0.5, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_aggregated_view_bounds_checked() {
        use crate::tests::fixtures::aggregated;

        assert!(aggregated("USDBRL", -1.0, 1.0).validate().is_ok());
        for bad in [
            aggregated("USDBRL", f64::NAN, 0.5),
            aggregated("USDBRL", 1.5, 0.5),
            aggregated("USDBRL", 0.5, -0.1),
        ] {
            assert!(matches!(bad.validate(), Err(Error::InvalidSignal { .. })));
        }
        let snapshot = SignalSnapshot::new(
            Utc::now(),
            vec![aggregated("A", 0.2, 0.5), aggregated("B", 2.0, 0.5)],
        );
        assert!(snapshot.validate().is_err());
    }
}
