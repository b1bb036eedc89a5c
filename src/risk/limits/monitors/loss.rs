//! Daily and weekly realized loss monitors.

use crate::risk::limits::{LimitMonitor, RiskAssessment, RiskState};

fn evaluate_loss(
    name: &'static str,
    horizon: &str,
    pnl: f64,
    limit: f64,
    breached: bool,
    warning_utilization: f64,
) -> RiskAssessment {
    let loss = -pnl;
    if loss <= 0.0 {
        return RiskAssessment::ok(name);
    }

    let utilization = loss / limit;
    if breached {
        return RiskAssessment::breach(
            name,
            format!("{} loss {:.2} exceeds limit {:.2}", horizon, loss, limit),
        )
        .with_metric(utilization)
        .with_threshold(1.0);
    }
    if utilization > warning_utilization {
        return RiskAssessment::warn(
            name,
            format!(
                "{} loss {:.2} is {:.0}% of limit {:.2}",
                horizon,
                loss,
                utilization * 100.0,
                limit
            ),
        )
        .with_metric(utilization)
        .with_threshold(warning_utilization);
    }
    RiskAssessment::ok(name)
}

/// Latest day's realized P&L against the daily limit.
pub struct DailyLossMonitor {
    warning_utilization: f64,
}

impl DailyLossMonitor {
    pub fn new(warning_utilization: f64) -> Self {
        Self {
            warning_utilization: warning_utilization.clamp(0.0, 1.0),
        }
    }
}

impl LimitMonitor for DailyLossMonitor {
    fn evaluate(&self, state: &RiskState) -> RiskAssessment {
        let loss = &state.loss;
        evaluate_loss(
            self.name(),
            "Daily",
            loss.daily_pnl,
            loss.daily_limit,
            loss.daily_breached,
            self.warning_utilization,
        )
    }

    fn name(&self) -> &'static str {
        "DailyLossMonitor"
    }

    fn priority(&self) -> u32 {
        0
    }
}

/// Rolling-window realized P&L against the weekly limit.
pub struct WeeklyLossMonitor {
    warning_utilization: f64,
}

impl WeeklyLossMonitor {
    pub fn new(warning_utilization: f64) -> Self {
        Self {
            warning_utilization: warning_utilization.clamp(0.0, 1.0),
        }
    }
}

impl LimitMonitor for WeeklyLossMonitor {
    fn evaluate(&self, state: &RiskState) -> RiskAssessment {
        let loss = &state.loss;
        evaluate_loss(
            self.name(),
            "Weekly",
            loss.weekly_pnl,
            loss.weekly_limit,
            loss.weekly_breached,
            self.warning_utilization,
        )
    }

    fn name(&self) -> &'static str {
        "WeeklyLossMonitor"
    }

    fn priority(&self) -> u32 {
        1
    }
}
