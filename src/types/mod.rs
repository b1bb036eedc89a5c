//! Plain data records exchanged between the aggregator, risk engine and optimizer.
//!
//! All records are immutable once built and serde-serializable so the surrounding
//! orchestration can move them over whatever transport it chooses.

mod calendar;
mod market;
mod regime;
mod signal;
mod universe;

pub use calendar::*;
pub use market::*;
pub use regime::*;
pub use signal::*;
pub use universe::*;
