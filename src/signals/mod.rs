//! Signal layer: aggregation of strategy signals and monitoring of the results.
//!
//! - [`SignalAggregator`]: strategy signals → one regime-aware view per instrument
//! - [`SignalMonitor`]: flips, surges, divergence and the daily summary

mod aggregator;
mod monitor;
mod summary;
mod tilt;

pub use aggregator::*;
pub use monitor::*;
pub use summary::*;
pub use tilt::*;
