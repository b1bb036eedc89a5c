//! Structured logging setup.
//!
//! Stdout logging in pretty, compact or JSON form, plus an optional daily
//! rolling audit file. The audit file receives every `WARN+` event, which
//! includes limit breaches, soft-limit overrides and decomposition mismatches.
//!
//! # Component Targets
//!
//! | Target | Description |
//! |--------|-------------|
//! | `risk_core::signals` | Aggregation and monitor alerts |
//! | `risk_core::risk` | VaR, stress, limits, budget |
//! | `risk_core::portfolio` | Black-Litterman, solver, sizing, rebalance |
//! | `risk_core::engine` | Daily run lifecycle |
//!
//! ```bash
//! RUST_LOG=warn,risk_core::portfolio=debug daily_run run --input snapshot.json
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::errors::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(Error::Config(format!("unknown log format '{}'", other))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,

    /// Format for stdout logging
    pub stdout_format: LogFormat,

    /// Directory for the rolling audit log; `None` disables it
    pub audit_dir: Option<PathBuf>,

    /// Level for the audit log
    pub audit_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stdout_format: LogFormat::Pretty,
            audit_dir: None,
            audit_level: "warn".to_string(),
        }
    }
}

impl LogConfig {
    /// Create a config for development (pretty stdout, no files).
    pub fn development() -> Self {
        Self::default()
    }

    /// Create a config for production (JSON stdout, audit file).
    pub fn production(audit_dir: PathBuf) -> Self {
        Self {
            stdout_format: LogFormat::Json,
            audit_dir: Some(audit_dir),
            ..Default::default()
        }
    }
}

fn base_filter(config: &LogConfig, override_level: Option<&str>) -> EnvFilter {
    match override_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
    }
}

/// Initialize the global subscriber.
///
/// Returns the worker guards of non-blocking writers; they must stay alive for
/// the duration of the program so buffered events are flushed.
pub fn init_logging(config: &LogConfig, override_level: Option<&str>) -> Result<Vec<WorkerGuard>> {
    let mut guards = Vec::new();
    let filter = base_filter(config, override_level);

    let audit_layer = match &config.audit_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "risk-audit.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(&config.audit_level)),
            )
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(audit_layer);
    let init = match config.stdout_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_filter(filter))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_filter(filter))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_filter(filter))
            .try_init(),
    };
    init.map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    Ok(guards)
}

/// Log target constants for component-specific logging.
///
/// ```ignore
/// tracing::warn!(target: targets::RISK, status = %status, "Risk budget breached");
/// ```
pub mod targets {
    /// Aggregation and monitor alerts
    pub const SIGNALS: &str = "risk_core::signals";
    /// VaR, stress, limits and budget
    pub const RISK: &str = "risk_core::risk";
    /// Black-Litterman, solver, sizing, rebalance
    pub const PORTFOLIO: &str = "risk_core::portfolio";
    /// Daily run lifecycle
    pub const ENGINE: &str = "risk_core::engine";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.stdout_format, LogFormat::Pretty);
        assert!(config.audit_dir.is_none());
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_log_config_production() {
        let config = LogConfig::production(PathBuf::from("/var/log/risk"));
        assert_eq!(config.stdout_format, LogFormat::Json);
        assert_eq!(config.audit_dir, Some(PathBuf::from("/var/log/risk")));
    }

    #[test]
    fn test_log_format_parse_and_serde() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());

        let json = serde_json::to_string(&LogFormat::Compact).unwrap();
        assert_eq!(json, "\"compact\"");
    }
}
