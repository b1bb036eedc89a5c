//! Loss limits and risk budget.
//!
//! Each check is a [`LimitMonitor`] evaluating one immutable [`RiskState`];
//! the [`RiskAggregator`] folds their assessments into a [`RiskStatus`]
//! (OK / WARNING / BREACHED) and the list of warnings. Limits are advisory:
//! breaches surface in the report, they never stop a run.

mod aggregator;
mod budget;
mod loss;
mod monitor;
mod monitors;
mod state;

pub use aggregator::*;
pub use budget::*;
pub use loss::*;
pub use monitor::*;
pub use monitors::*;
pub use state::*;
