//! Limit monitor trait and assessment types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::RiskState;

/// Type alias for boxed monitor.
pub type LimitMonitorBox = Box<dyn LimitMonitor>;

/// Overall limit status, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskStatus {
    #[default]
    Ok,
    /// Some utilization above the warning level
    Warning,
    /// A hard limit is exceeded
    Breached,
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskStatus::Ok => write!(f, "OK"),
            RiskStatus::Warning => write!(f, "WARNING"),
            RiskStatus::Breached => write!(f, "BREACHED"),
        }
    }
}

/// Result of a limit monitor evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Name of the monitor that produced this assessment
    pub monitor: String,
    pub status: RiskStatus,
    /// Human-readable description (empty when OK)
    pub description: String,
    /// Utilization or other metric behind the status
    pub metric_value: Option<f64>,
    /// Threshold the metric is compared with
    pub threshold: Option<f64>,
}

impl RiskAssessment {
    pub fn ok(monitor: &str) -> Self {
        Self {
            monitor: monitor.to_string(),
            status: RiskStatus::Ok,
            description: String::new(),
            metric_value: None,
            threshold: None,
        }
    }

    pub fn warn(monitor: &str, description: impl Into<String>) -> Self {
        Self {
            status: RiskStatus::Warning,
            description: description.into(),
            ..Self::ok(monitor)
        }
    }

    pub fn breach(monitor: &str, description: impl Into<String>) -> Self {
        Self {
            status: RiskStatus::Breached,
            description: description.into(),
            ..Self::ok(monitor)
        }
    }

    /// Builder-style method to add metric value.
    pub fn with_metric(mut self, value: f64) -> Self {
        self.metric_value = Some(value);
        self
    }

    /// Builder-style method to add threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == RiskStatus::Ok
    }
}

/// One limit check.
///
/// Monitors are stateless; everything they look at is captured in [`RiskState`].
pub trait LimitMonitor: Send + Sync {
    fn evaluate(&self, state: &RiskState) -> RiskAssessment;

    /// Monitor name for logging and reports.
    fn name(&self) -> &'static str;

    /// Priority for ordering (lower = evaluated first).
    fn priority(&self) -> u32 {
        100
    }

    /// Disabled monitors are skipped during evaluation.
    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(RiskStatus::Ok < RiskStatus::Warning);
        assert!(RiskStatus::Warning < RiskStatus::Breached);
        assert_eq!(RiskStatus::Breached.to_string(), "BREACHED");
    }

    #[test]
    fn test_assessment_builders() {
        let a = RiskAssessment::warn("m", "close to limit")
            .with_metric(0.9)
            .with_threshold(0.8);
        assert_eq!(a.status, RiskStatus::Warning);
        assert_eq!(a.metric_value, Some(0.9));
        assert!(!a.is_ok());
        assert!(RiskAssessment::ok("m").is_ok());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&RiskStatus::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }
}
