#![deny(unreachable_pub)]

//! Quantitative risk and portfolio core for a multi-strategy macro book.
//!
//! Strategy signals and an optional regime estimate become one aggregated
//! view per instrument; the risk engine measures the current book with
//! three VaR estimators, stress tests and loss/budget limits; the portfolio
//! layer turns the views into risk-budgeted targets and gated trades.
//!
//! [`engine::DailyRun`] wires every component for one as-of date.

// Core modules
mod errors;
pub mod types;

// Components
pub mod config;
pub mod engine;
pub mod infra;
pub mod portfolio;
pub mod risk;
pub mod signals;

#[cfg(test)]
mod tests;

// Re-exports
pub use config::EngineConfig;
pub use engine::{DailyInputs, DailyRun, DailyRunOutput};
pub use errors::{Error, Result};
