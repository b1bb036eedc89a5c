//! Position targets, soft-limit overrides and rebalance trades.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::AssetClass;

/// Explicit record of a target beyond a configured soft limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOverride {
    /// e.g. `max_weight:USDBRL`
    pub limit_id: String,
    pub limit: f64,
    pub value: f64,
    /// value − limit (> 0)
    pub breach_magnitude: f64,
    pub justification: String,
}

impl LimitOverride {
    pub fn new(limit_id: impl Into<String>, limit: f64, value: f64, justification: impl Into<String>) -> Self {
        Self {
            limit_id: limit_id.into(),
            limit,
            value,
            breach_magnitude: value - limit,
            justification: justification.into(),
        }
    }

    /// Breach as a fraction of the limit.
    pub fn breach_pct(&self) -> f64 {
        if self.limit == 0.0 {
            return 0.0;
        }
        self.breach_magnitude / self.limit
    }
}

/// Target position of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTarget {
    pub instrument: String,
    pub asset_class: AssetClass,
    pub target_weight: f64,
    pub target_notional: f64,
    pub current_weight: f64,
    pub current_notional: f64,
    /// target − current notional
    pub trade_needed: f64,
    /// Normalized contributor weights of the instrument's aggregated signal
    pub strategy_attribution: BTreeMap<String, f64>,
    pub overrides: Vec<LimitOverride>,
}

impl PortfolioTarget {
    pub fn has_override(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Relative distance of the current position from target.
    ///
    /// A zero target with a live position counts as 100% drift.
    pub fn drift(&self) -> f64 {
        let gap = (self.current_weight - self.target_weight).abs();
        if self.target_weight.abs() > 1e-12 {
            gap / self.target_weight.abs()
        } else if self.current_weight.abs() > 1e-12 {
            1.0
        } else {
            0.0
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Notional change handed to the execution layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub instrument: String,
    pub side: TradeSide,
    /// Absolute notional to trade
    pub notional: f64,
    pub from_weight: f64,
    pub to_weight: f64,
}

impl Trade {
    /// Trade closing the gap of a target, if any.
    pub fn from_target(target: &PortfolioTarget) -> Option<Self> {
        if target.trade_needed == 0.0 {
            return None;
        }
        Some(Self {
            instrument: target.instrument.clone(),
            side: if target.trade_needed > 0.0 {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            },
            notional: target.trade_needed.abs(),
            from_weight: target.current_weight,
            to_weight: target.target_weight,
        })
    }

    /// Signed notional (+ buy, − sell).
    pub fn signed_notional(&self) -> f64 {
        match self.side {
            TradeSide::Buy => self.notional,
            TradeSide::Sell => -self.notional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(current: f64, target: f64) -> PortfolioTarget {
        PortfolioTarget {
            instrument: "X".to_string(),
            asset_class: AssetClass::Fx,
            target_weight: target,
            target_notional: target * 100.0,
            current_weight: current,
            current_notional: current * 100.0,
            trade_needed: (target - current) * 100.0,
            strategy_attribution: BTreeMap::new(),
            overrides: Vec::new(),
        }
    }

    #[test]
    fn test_drift() {
        assert!((target(0.11, 0.10).drift() - 0.1).abs() < 1e-9);
        assert_eq!(target(0.05, 0.0).drift(), 1.0);
        assert_eq!(target(0.0, 0.0).drift(), 0.0);
    }

    #[test]
    fn test_trade_side() {
        let sell = Trade::from_target(&target(0.2, 0.1)).unwrap();
        assert_eq!(sell.side, TradeSide::Sell);
        assert!((sell.signed_notional() + 10.0).abs() < 1e-9);
        assert!(Trade::from_target(&target(0.1, 0.1)).is_none());
    }

    #[test]
    fn test_override_magnitude() {
        let o = LimitOverride::new("max_weight:X", 0.25, 0.28, "top-tier");
        assert!((o.breach_magnitude - 0.03).abs() < 1e-12);
        assert!((o.breach_pct() - 0.12).abs() < 1e-9);
    }
}
