//! Infrastructure shared by the library and the `daily_run` binary.

pub mod logging;

pub use logging::{init_logging, targets, LogConfig, LogFormat};
