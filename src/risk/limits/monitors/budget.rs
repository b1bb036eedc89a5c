//! Risk-contribution budget monitors.

use crate::risk::limits::{BudgetLine, LimitMonitor, RiskAssessment, RiskState};

fn evaluate_lines<'a>(
    name: &'static str,
    kind: &str,
    lines: impl Iterator<Item = (String, &'a BudgetLine)>,
    warning_utilization: f64,
) -> RiskAssessment {
    let mut breached = Vec::new();
    let mut warned = Vec::new();
    let mut worst = 0.0_f64;
    for (key, line) in lines {
        worst = worst.max(line.utilization);
        if line.is_breached() {
            breached.push(format!("{} {:.0}%", key, line.share * 100.0));
        } else if line.utilization > warning_utilization {
            warned.push(format!("{} {:.0}%", key, line.share * 100.0));
        }
    }

    if !breached.is_empty() {
        return RiskAssessment::breach(
            name,
            format!("{} risk share above ceiling: {}", kind, breached.join(", ")),
        )
        .with_metric(worst)
        .with_threshold(1.0);
    }
    if !warned.is_empty() {
        return RiskAssessment::warn(
            name,
            format!("{} risk share near ceiling: {}", kind, warned.join(", ")),
        )
        .with_metric(worst)
        .with_threshold(warning_utilization);
    }
    RiskAssessment::ok(name).with_metric(worst)
}

/// Per-instrument share of portfolio risk against its ceiling.
pub struct InstrumentBudgetMonitor {
    warning_utilization: f64,
}

impl InstrumentBudgetMonitor {
    pub fn new(warning_utilization: f64) -> Self {
        Self {
            warning_utilization: warning_utilization.clamp(0.0, 1.0),
        }
    }
}

impl LimitMonitor for InstrumentBudgetMonitor {
    fn evaluate(&self, state: &RiskState) -> RiskAssessment {
        evaluate_lines(
            self.name(),
            "Instrument",
            state.budget.instruments.iter().map(|(k, l)| (k.clone(), l)),
            self.warning_utilization,
        )
    }

    fn name(&self) -> &'static str {
        "InstrumentBudgetMonitor"
    }

    fn priority(&self) -> u32 {
        10
    }
}

/// Per-asset-class share of portfolio risk against its ceiling.
pub struct AssetClassBudgetMonitor {
    warning_utilization: f64,
}

impl AssetClassBudgetMonitor {
    pub fn new(warning_utilization: f64) -> Self {
        Self {
            warning_utilization: warning_utilization.clamp(0.0, 1.0),
        }
    }
}

impl LimitMonitor for AssetClassBudgetMonitor {
    fn evaluate(&self, state: &RiskState) -> RiskAssessment {
        evaluate_lines(
            self.name(),
            "Asset class",
            state.budget.asset_classes.iter().map(|(k, l)| (k.to_string(), l)),
            self.warning_utilization,
        )
    }

    fn name(&self) -> &'static str {
        "AssetClassBudgetMonitor"
    }

    fn priority(&self) -> u32 {
        11
    }
}
