//! Portfolio construction: Black-Litterman views, constrained mean-variance
//! targets, position sizing and the rebalance gate.

mod black_litterman;
mod optimizer;
mod rebalance;
mod sizing;
mod solver;
mod target;

pub use black_litterman::*;
pub use optimizer::*;
pub use rebalance::*;
pub use sizing::*;
pub use solver::*;
pub use target::*;
