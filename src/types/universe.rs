//! Instrument and strategy taxonomy.
//!
//! Asset classes group instruments for divergence checks and risk budgets.
//! Strategy families select the row of the regime tilt table a strategy's
//! evidence is scaled by.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Asset class of a tradable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Fx,
    Rates,
    Inflation,
    Sovereign,
    Equity,
    Commodity,
    /// Instruments not mapped in the universe
    Other,
}

impl AssetClass {
    /// All asset classes, in reporting order.
    pub const ALL: [AssetClass; 7] = [
        AssetClass::Fx,
        AssetClass::Rates,
        AssetClass::Inflation,
        AssetClass::Sovereign,
        AssetClass::Equity,
        AssetClass::Commodity,
        AssetClass::Other,
    ];

    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Fx => "fx",
            AssetClass::Rates => "rates",
            AssetClass::Inflation => "inflation",
            AssetClass::Sovereign => "sovereign",
            AssetClass::Equity => "equity",
            AssetClass::Commodity => "commodity",
            AssetClass::Other => "other",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family a strategy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    Fx,
    Rates,
    Inflation,
    Sovereign,
    Equity,
    CrossAsset,
}

impl StrategyFamily {
    /// All families, in tilt-table column order.
    pub const ALL: [StrategyFamily; 6] = [
        StrategyFamily::Fx,
        StrategyFamily::Rates,
        StrategyFamily::Inflation,
        StrategyFamily::Sovereign,
        StrategyFamily::Equity,
        StrategyFamily::CrossAsset,
    ];

    /// Column index into the regime tilt table.
    pub fn index(&self) -> usize {
        match self {
            StrategyFamily::Fx => 0,
            StrategyFamily::Rates => 1,
            StrategyFamily::Inflation => 2,
            StrategyFamily::Sovereign => 3,
            StrategyFamily::Equity => 4,
            StrategyFamily::CrossAsset => 5,
        }
    }

    /// Infer the family from a strategy id prefix.
    ///
    /// `FX_CARRY_BRL` → Fx, `RATES_SLOPE` / `IR_…` → Rates, `INF_BREAKEVEN` → Inflation,
    /// `SOV_…` / `CDS_…` / `CREDIT_…` → Sovereign, `EQ_…` → Equity, anything else → CrossAsset.
    pub fn from_strategy_id(strategy_id: &str) -> Self {
        let upper = strategy_id.to_ascii_uppercase();
        let prefix = upper.split(['_', '-', '.']).next().unwrap_or_default();
        match prefix {
            "FX" => StrategyFamily::Fx,
            "RATES" | "IR" => StrategyFamily::Rates,
            "INF" | "INFL" => StrategyFamily::Inflation,
            "SOV" | "CDS" | "CREDIT" => StrategyFamily::Sovereign,
            "EQ" | "EQUITY" => StrategyFamily::Equity,
            _ => StrategyFamily::CrossAsset,
        }
    }
}

impl fmt::Display for StrategyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyFamily::Fx => "fx",
            StrategyFamily::Rates => "rates",
            StrategyFamily::Inflation => "inflation",
            StrategyFamily::Sovereign => "sovereign",
            StrategyFamily::Equity => "equity",
            StrategyFamily::CrossAsset => "cross_asset",
        };
        f.write_str(s)
    }
}

/// Instrument → asset class and strategy → family mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentUniverse {
    /// Asset class per instrument id
    pub instruments: BTreeMap<String, AssetClass>,
    /// Explicit family per strategy id (overrides prefix inference)
    pub strategy_families: BTreeMap<String, StrategyFamily>,
}

impl Default for InstrumentUniverse {
    /// Brazil-centred macro book plus the global hedges the stress catalog shocks.
    fn default() -> Self {
        let instruments = [
            ("USDBRL", AssetClass::Fx),
            ("EURUSD", AssetClass::Fx),
            ("USDMXN", AssetClass::Fx),
            ("DI1F27", AssetClass::Rates),
            ("DI1F30", AssetClass::Rates),
            ("UST10Y", AssetClass::Rates),
            ("NTNB35", AssetClass::Inflation),
            ("CDS_BR_5Y", AssetClass::Sovereign),
            ("IBOV", AssetClass::Equity),
            ("SPX", AssetClass::Equity),
            ("BRENT", AssetClass::Commodity),
            ("GOLD", AssetClass::Commodity),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            instruments,
            strategy_families: BTreeMap::new(),
        }
    }
}

impl InstrumentUniverse {
    /// Empty universe: every instrument maps to `Other`, families by prefix.
    pub fn empty() -> Self {
        Self {
            instruments: BTreeMap::new(),
            strategy_families: BTreeMap::new(),
        }
    }

    /// Builder method to map an instrument.
    pub fn with_instrument(mut self, instrument: impl Into<String>, class: AssetClass) -> Self {
        self.instruments.insert(instrument.into(), class);
        self
    }

    /// Builder method to pin a strategy's family.
    pub fn with_strategy_family(
        mut self,
        strategy_id: impl Into<String>,
        family: StrategyFamily,
    ) -> Self {
        self.strategy_families.insert(strategy_id.into(), family);
        self
    }

    /// Asset class of an instrument (`Other` when unmapped).
    pub fn asset_class(&self, instrument: &str) -> AssetClass {
        self.instruments
            .get(instrument)
            .copied()
            .unwrap_or(AssetClass::Other)
    }

    /// Family of a strategy (explicit mapping first, then prefix inference).
    pub fn family(&self, strategy_id: &str) -> StrategyFamily {
        self.strategy_families
            .get(strategy_id)
            .copied()
            .unwrap_or_else(|| StrategyFamily::from_strategy_id(strategy_id))
    }
}
