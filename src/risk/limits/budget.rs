//! Risk budget on risk-contribution shares.
//!
//! Shares come from the Euler decomposition of parametric VaR, so they sum
//! to one across the book. Hedges carry negative shares; they use no budget.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::risk::var::VaRDecomposition;
use crate::types::{AssetClass, InstrumentUniverse};

/// Ceiling and usage of one budget bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    /// Share of total VaR (negative for hedges)
    pub share: f64,
    pub ceiling: f64,
    /// max(share, 0) / ceiling
    pub utilization: f64,
    /// ceiling − max(share, 0)
    pub headroom: f64,
}

impl BudgetLine {
    pub fn new(share: f64, ceiling: f64) -> Self {
        let used = share.max(0.0);
        Self {
            share,
            ceiling,
            utilization: used / ceiling,
            headroom: ceiling - used,
        }
    }

    pub fn is_breached(&self) -> bool {
        self.utilization > 1.0
    }
}

/// Advisory per-instrument and per-asset-class risk budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBudget {
    pub instruments: BTreeMap<String, BudgetLine>,
    pub asset_classes: BTreeMap<AssetClass, BudgetLine>,
    pub instrument_ceiling: f64,
    pub asset_class_ceiling: f64,
    pub min_headroom: f64,
}

impl RiskBudget {
    /// Budget with nothing used.
    pub fn unused(limits: &LimitsConfig) -> Self {
        Self {
            instruments: BTreeMap::new(),
            asset_classes: BTreeMap::new(),
            instrument_ceiling: limits.instrument_risk_ceiling,
            asset_class_ceiling: limits.asset_class_risk_ceiling,
            min_headroom: limits.min_headroom,
        }
    }

    pub fn from_shares(
        instrument_shares: &BTreeMap<String, f64>,
        asset_class_shares: &BTreeMap<AssetClass, f64>,
        limits: &LimitsConfig,
    ) -> Self {
        let mut budget = Self::unused(limits);
        budget.instruments = instrument_shares
            .iter()
            .map(|(i, s)| (i.clone(), BudgetLine::new(*s, limits.instrument_risk_ceiling)))
            .collect();
        budget.asset_classes = asset_class_shares
            .iter()
            .map(|(c, s)| (*c, BudgetLine::new(*s, limits.asset_class_risk_ceiling)))
            .collect();
        budget
    }

    pub fn from_decomposition(decomposition: &VaRDecomposition, limits: &LimitsConfig) -> Self {
        Self::from_shares(
            &decomposition.instrument_shares(),
            &decomposition.asset_class_shares(),
            limits,
        )
    }

    /// Budget line of an instrument; unheld instruments have the full ceiling.
    pub fn instrument_line(&self, instrument: &str) -> BudgetLine {
        self.instruments
            .get(instrument)
            .copied()
            .unwrap_or_else(|| BudgetLine::new(0.0, self.instrument_ceiling))
    }

    pub fn asset_class_line(&self, class: AssetClass) -> BudgetLine {
        self.asset_classes
            .get(&class)
            .copied()
            .unwrap_or_else(|| BudgetLine::new(0.0, self.asset_class_ceiling))
    }

    /// Both the instrument and its asset class have headroom above the minimum.
    pub fn can_add_risk(&self, instrument: &str, universe: &InstrumentUniverse) -> bool {
        self.instrument_line(instrument).headroom > self.min_headroom
            && self.asset_class_line(universe.asset_class(instrument)).headroom > self.min_headroom
    }

    /// Smaller of the instrument and asset-class headroom, floored at zero.
    pub fn headroom(&self, instrument: &str, universe: &InstrumentUniverse) -> f64 {
        self.instrument_line(instrument)
            .headroom
            .min(self.asset_class_line(universe.asset_class(instrument)).headroom)
            .max(0.0)
    }

    pub fn max_utilization(&self) -> f64 {
        self.instruments
            .values()
            .chain(self.asset_classes.values())
            .map(|l| l.utilization)
            .fold(0.0, f64::max)
    }

    pub fn breached_instruments(&self) -> Vec<&str> {
        self.instruments
            .iter()
            .filter(|(_, l)| l.is_breached())
            .map(|(i, _)| i.as_str())
            .collect()
    }

    pub fn breached_asset_classes(&self) -> Vec<AssetClass> {
        self.asset_classes
            .iter()
            .filter(|(_, l)| l.is_breached())
            .map(|(c, _)| *c)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> RiskBudget {
        let instruments = BTreeMap::from([
            ("USDBRL".to_string(), 0.50),
            ("DI1F27".to_string(), 0.17),
            ("IBOV".to_string(), 0.45),
            ("SPX".to_string(), -0.12),
        ]);
        let classes = BTreeMap::from([
            (AssetClass::Fx, 0.50),
            (AssetClass::Rates, 0.17),
            (AssetClass::Equity, 0.33),
        ]);
        RiskBudget::from_shares(&instruments, &classes, &LimitsConfig::default())
    }

    #[test]
    fn test_utilization_and_breach() {
        let b = budget();
        let usd = b.instrument_line("USDBRL");
        assert!((usd.utilization - 2.5).abs() < 1e-12);
        assert!(usd.is_breached());
        assert_eq!(b.breached_instruments(), vec!["IBOV", "USDBRL"]);
        assert_eq!(b.breached_asset_classes(), vec![AssetClass::Fx]);
        assert!((b.max_utilization() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_hedge_uses_no_budget() {
        let spx = budget().instrument_line("SPX");
        assert_eq!(spx.utilization, 0.0);
        assert!((spx.headroom - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_can_add_risk_needs_both_headrooms() {
        let b = budget();
        let universe = InstrumentUniverse::default();
        // Instrument headroom 0.03 < 0.05
        assert!(!b.can_add_risk("DI1F27", &universe));
        // Instrument fine, Fx class is over budget
        assert!(!b.can_add_risk("USDMXN", &universe));
        // Rates class headroom 0.23, DI1F30 unheld
        assert!(b.can_add_risk("DI1F30", &universe));
        // Equity class headroom 0.07, SPX hedge
        assert!(b.can_add_risk("SPX", &universe));
    }

    #[test]
    fn test_unused_budget_allows_everything() {
        let b = RiskBudget::unused(&LimitsConfig::default());
        assert!(b.can_add_risk("ANY", &InstrumentUniverse::default()));
        assert_eq!(b.max_utilization(), 0.0);
    }
}
