//! Snapshot every limit monitor evaluates.

use serde::{Deserialize, Serialize};

use super::{LossLimitStatus, LossRecord, RiskBudget};
use crate::config::LimitsConfig;

/// Immutable limit inputs of one run.
///
/// All monitors evaluate the same snapshot, so one run's status is
/// internally consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub nav: f64,
    pub loss: LossLimitStatus,
    pub budget: RiskBudget,
}

impl RiskState {
    pub fn new(nav: f64, loss: LossLimitStatus, budget: RiskBudget) -> Self {
        Self { nav, loss, budget }
    }

    /// Evaluate a loss window and pair it with a budget.
    pub fn from_record(nav: f64, record: &LossRecord, budget: RiskBudget, limits: &LimitsConfig) -> Self {
        Self::new(nav, record.evaluate(nav, limits), budget)
    }
}
