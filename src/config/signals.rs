//! Signal aggregation and monitoring configuration.

use serde::{Deserialize, Serialize};

use crate::signals::RegimeTiltTable;
use crate::types::AggregationMethod;

/// Configuration for the signal aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Combination method applied when the caller does not pick one.
    pub method: AggregationMethod,

    /// |z| at which a signal reaches full strength.
    /// strength = min(|z| / z_saturation, 1)
    pub z_saturation: f64,

    /// Business days over which a signal's weight decays linearly to zero.
    pub staleness_horizon_days: u32,

    /// Agreement fraction above which the crowding penalty applies.
    /// 0.8 = more than 80% of contributors on the same side.
    pub crowding_threshold: f64,

    /// Fractional conviction reduction when crowded (0.2 = -20%).
    pub crowding_penalty: f64,

    /// Minimum live contributors before crowding is assessed.
    pub crowding_min_contributors: usize,

    /// Confidence cap used when converting confidence to evidence precision.
    /// precision = c / (1 - c) diverges at c = 1.
    pub max_evidence_confidence: f64,

    /// Regime × family weight multipliers.
    pub tilt_table: RegimeTiltTable,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            method: AggregationMethod::Bayesian,
            z_saturation: 2.0,
            staleness_horizon_days: 5,
            crowding_threshold: 0.8,
            crowding_penalty: 0.2,
            crowding_min_contributors: 3,
            max_evidence_confidence: 0.999,
            tilt_table: RegimeTiltTable::default(),
        }
    }
}

impl AggregationConfig {
    /// Builder method to set the default method.
    pub fn with_method(mut self, method: AggregationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.z_saturation <= 0.0 {
            return Err(format!("z_saturation must be positive, got {}", self.z_saturation));
        }
        if self.staleness_horizon_days == 0 {
            return Err("staleness_horizon_days must be at least 1".to_string());
        }
        if !(0.5..1.0).contains(&self.crowding_threshold) {
            return Err(format!(
                "crowding_threshold must be in [0.5, 1.0), got {}",
                self.crowding_threshold
            ));
        }
        if !(0.0..1.0).contains(&self.crowding_penalty) {
            return Err(format!(
                "crowding_penalty must be in [0.0, 1.0), got {}",
                self.crowding_penalty
            ));
        }
        if self.max_evidence_confidence <= 0.0 || self.max_evidence_confidence >= 1.0 {
            return Err(format!(
                "max_evidence_confidence must be in (0.0, 1.0), got {}",
                self.max_evidence_confidence
            ));
        }
        self.tilt_table.validate()
    }
}

/// Configuration for the signal monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Absolute day-over-day conviction change that counts as a surge.
    pub surge_threshold: f64,

    /// Implied-conviction gap between two strategies of one asset class
    /// that counts as divergence.
    pub divergence_threshold: f64,

    /// Calendar days covered by the rolling flip count.
    pub flip_window_days: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            surge_threshold: 0.3,
            divergence_threshold: 0.5,
            flip_window_days: 7,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.surge_threshold <= 0.0 {
            return Err(format!("surge_threshold must be positive, got {}", self.surge_threshold));
        }
        if self.divergence_threshold <= 0.0 || self.divergence_threshold > 2.0 {
            return Err(format!(
                "divergence_threshold must be in (0.0, 2.0], got {}",
                self.divergence_threshold
            ));
        }
        if self.flip_window_days <= 0 {
            return Err("flip_window_days must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(AggregationConfig::default().validate().is_ok());
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_crowding_threshold() {
        let cfg = AggregationConfig {
            crowding_threshold: 1.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
