//! Top-level engine configuration and TOML loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::infra::LogConfig;
use crate::types::InstrumentUniverse;

use super::portfolio::{OptimizerConfig, RebalanceConfig, SizingConfig};
use super::risk::{LimitsConfig, StressConfig, VaRConfig};
use super::signals::{AggregationConfig, MonitorConfig};

/// Complete configuration for one daily run.
///
/// Every section falls back to its defaults when omitted from the file, so a
/// minimal TOML only lists what differs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub logging: LogConfig,
    pub universe: InstrumentUniverse,
    pub aggregation: AggregationConfig,
    pub monitor: MonitorConfig,
    pub var: VaRConfig,
    pub stress: StressConfig,
    pub limits: LimitsConfig,
    pub optimizer: OptimizerConfig,
    pub sizing: SizingConfig,
    pub rebalance: RebalanceConfig,
}

impl EngineConfig {
    /// Parse from TOML text and validate.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Render as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every section, prefixing errors with the section name.
    pub fn validate(&self) -> Result<()> {
        let sections: [(&str, std::result::Result<(), String>); 8] = [
            ("aggregation", self.aggregation.validate()),
            ("monitor", self.monitor.validate()),
            ("var", self.var.validate()),
            ("stress", self.stress.validate()),
            ("limits", self.limits.validate()),
            ("optimizer", self.optimizer.validate()),
            ("sizing", self.sizing.validate()),
            ("rebalance", self.rebalance.validate()),
        ];
        for (name, result) in sections {
            if let Err(msg) = result {
                return Err(Error::Config(format!("[{}] {}", name, msg)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShrinkageTarget;
    use crate::types::AggregationMethod;
    use std::io::Write;

    #[test]
    fn test_default_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [aggregation]
            method = "rank_based"

            [var]
            confidence = 0.975

            [var.shrinkage]
            target = "scaled_identity"
            intensity = 0.3
        "#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.aggregation.method, AggregationMethod::RankBased);
        assert_eq!(config.aggregation.crowding_penalty, 0.2);
        assert_eq!(config.var.confidence, 0.975);
        assert_eq!(config.var.shrinkage.target, ShrinkageTarget::ScaledIdentity);
        assert_eq!(config.var.shrinkage.intensity, Some(0.3));
        assert_eq!(config.limits.weekly_window_days, 5);
    }

    #[test]
    fn test_invalid_section_named_in_error() {
        let toml = r#"
            [limits]
            daily_loss_limit_pct = 0.0
        "#;
        let err = EngineConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("[limits]"));
    }

    #[test]
    fn test_round_trip_through_file() {
        let config = EngineConfig::default();
        let text = config.to_toml_string().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let loaded = EngineConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
