//! Configuration types for the risk core.
//!
//! This module is organized into focused submodules:
//!
//! - `core`: Top-level `EngineConfig`, TOML loading and validation
//! - `signals`: Aggregation and monitor thresholds
//! - `risk`: VaR estimators, shrinkage, stress tests, loss limits, risk budget
//! - `portfolio`: Black-Litterman, solver, position sizing, rebalance trigger

mod core;
mod portfolio;
mod risk;
mod signals;

pub use core::*;
pub use portfolio::*;
pub use risk::*;
pub use signals::*;
