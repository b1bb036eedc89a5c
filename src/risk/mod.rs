//! Risk engine: shrinkage covariance, VaR/CVaR, stress tests and limits.
//!
//! [`RiskEngine::assess`] runs every component against one position
//! snapshot and folds the results into an immutable [`RiskReport`].

pub mod covariance;
pub mod limits;
mod report;
pub mod stress;
pub mod var;

pub use covariance::{LedoitWolf, ShrinkageEstimate};
pub use report::*;
