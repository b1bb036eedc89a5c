//! Folds limit monitors into one status.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    AssetClassBudgetMonitor, DailyLossMonitor, InstrumentBudgetMonitor, LimitMonitorBox,
    RiskAssessment, RiskState, RiskStatus, WeeklyLossMonitor,
};
use crate::config::LimitsConfig;
use crate::infra::targets;

/// Aggregated limit evaluation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedRisk {
    /// Individual assessments in monitor priority order
    pub assessments: Vec<RiskAssessment>,
    /// Highest status across all monitors
    pub status: RiskStatus,
    /// Description of every non-OK assessment
    pub warnings: Vec<String>,
}

impl AggregatedRisk {
    /// Assessments that hit a hard limit.
    pub fn breaches(&self) -> impl Iterator<Item = &RiskAssessment> {
        self.assessments
            .iter()
            .filter(|a| a.status == RiskStatus::Breached)
    }

    /// Get summary string for logging.
    pub fn summary(&self) -> String {
        match self.status {
            RiskStatus::Breached => format!(
                "BREACHED: {} limits - {:?}",
                self.breaches().count(),
                self.breaches().map(|a| a.monitor.as_str()).collect::<Vec<_>>()
            ),
            RiskStatus::Warning => format!("WARNING: {} warnings", self.warnings.len()),
            RiskStatus::Ok => format!("OK: {} monitors", self.assessments.len()),
        }
    }
}

/// Collects limit monitors and provides a single evaluation point.
///
/// ```ignore
/// let aggregator = RiskAggregator::new()
///     .with_monitor(Box::new(DailyLossMonitor::new(0.8)))
///     .with_monitor(Box::new(InstrumentBudgetMonitor::new(0.8)));
/// let result = aggregator.evaluate(&state);
/// ```
pub struct RiskAggregator {
    /// Registered monitors (sorted by priority)
    monitors: Vec<LimitMonitorBox>,
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskAggregator {
    pub fn new() -> Self {
        Self {
            monitors: Vec::new(),
        }
    }

    /// Loss and budget monitors at the configured warning level.
    pub fn standard(limits: &LimitsConfig) -> Self {
        let w = limits.warning_utilization;
        Self::new()
            .with_monitor(Box::new(DailyLossMonitor::new(w)))
            .with_monitor(Box::new(WeeklyLossMonitor::new(w)))
            .with_monitor(Box::new(InstrumentBudgetMonitor::new(w)))
            .with_monitor(Box::new(AssetClassBudgetMonitor::new(w)))
    }

    /// Add a monitor (maintains priority ordering).
    pub fn with_monitor(mut self, monitor: LimitMonitorBox) -> Self {
        self.add_monitor(monitor);
        self
    }

    pub fn add_monitor(&mut self, monitor: LimitMonitorBox) {
        self.monitors.push(monitor);
        self.monitors.sort_by_key(|m| m.priority());
    }

    /// Evaluate all enabled monitors against one state.
    pub fn evaluate(&self, state: &RiskState) -> AggregatedRisk {
        let mut result = AggregatedRisk::default();

        for monitor in self.monitors.iter().filter(|m| m.is_enabled()) {
            let assessment = monitor.evaluate(state);
            result.status = result.status.max(assessment.status);
            if !assessment.is_ok() {
                warn!(
                    target: targets::RISK,
                    monitor = %assessment.monitor,
                    status = %assessment.status,
                    metric = assessment.metric_value,
                    "{}",
                    assessment.description
                );
                result.warnings.push(assessment.description.clone());
            }
            result.assessments.push(assessment);
        }

        info!(target: targets::RISK, status = %result.status, "{}", result.summary());
        result
    }

    pub fn monitor_names(&self) -> Vec<&'static str> {
        self.monitors.iter().map(|m| m.name()).collect()
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::limits::{LimitMonitor, LossRecord, RiskBudget};
    use chrono::NaiveDate;

    struct Fixed(RiskStatus, &'static str, u32);

    impl LimitMonitor for Fixed {
        fn evaluate(&self, _state: &RiskState) -> RiskAssessment {
            match self.0 {
                RiskStatus::Ok => RiskAssessment::ok(self.1),
                RiskStatus::Warning => RiskAssessment::warn(self.1, "near"),
                RiskStatus::Breached => RiskAssessment::breach(self.1, "over"),
            }
        }

        fn name(&self) -> &'static str {
            self.1
        }

        fn priority(&self) -> u32 {
            self.2
        }
    }

    fn quiet_state() -> RiskState {
        let limits = LimitsConfig::default();
        RiskState::from_record(1e6, &LossRecord::new(5), RiskBudget::unused(&limits), &limits)
    }

    #[test]
    fn test_monitors_sorted_by_priority() {
        let agg = RiskAggregator::new()
            .with_monitor(Box::new(Fixed(RiskStatus::Ok, "late", 50)))
            .with_monitor(Box::new(Fixed(RiskStatus::Ok, "early", 1)));
        assert_eq!(agg.monitor_names(), vec!["early", "late"]);
    }

    #[test]
    fn test_worst_status_wins() {
        let agg = RiskAggregator::new()
            .with_monitor(Box::new(Fixed(RiskStatus::Warning, "w", 1)))
            .with_monitor(Box::new(Fixed(RiskStatus::Breached, "b", 2)))
            .with_monitor(Box::new(Fixed(RiskStatus::Ok, "o", 3)));
        let result = agg.evaluate(&quiet_state());
        assert_eq!(result.status, RiskStatus::Breached);
        assert_eq!(result.warnings, vec!["near".to_string(), "over".to_string()]);
        assert_eq!(result.breaches().count(), 1);
        assert!(result.summary().starts_with("BREACHED"));
    }

    #[test]
    fn test_standard_monitors_quiet_book_is_ok() {
        let limits = LimitsConfig::default();
        let agg = RiskAggregator::standard(&limits);
        assert_eq!(agg.monitor_count(), 4);
        let result = agg.evaluate(&quiet_state());
        assert_eq!(result.status, RiskStatus::Ok);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_standard_monitors_daily_breach() {
        let limits = LimitsConfig::default();
        let mut record = LossRecord::new(5);
        record
            .push(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), -30_000.0)
            .unwrap();
        let state = RiskState::from_record(1e6, &record, RiskBudget::unused(&limits), &limits);
        let result = RiskAggregator::standard(&limits).evaluate(&state);
        assert_eq!(result.status, RiskStatus::Breached);
        assert_eq!(result.assessments[0].monitor, "DailyLossMonitor");
    }
}
