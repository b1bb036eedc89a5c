//! Built-in limit monitors.
//!
//! - `DailyLossMonitor` / `WeeklyLossMonitor`: realized loss against NAV limits
//! - `InstrumentBudgetMonitor` / `AssetClassBudgetMonitor`: risk-contribution ceilings

mod budget;
mod loss;

pub use budget::*;
pub use loss::*;
