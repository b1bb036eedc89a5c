//! Historical stress scenario catalog.
//!
//! Shocks are fractional price moves applied linearly to signed notionals:
//! `P&L = Σ notional × shock`. Instrument shocks take precedence; instruments
//! without one fall back to the shock of their asset class.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{AssetClass, InstrumentUniverse};

/// Named shock vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub id: String,
    pub name: String,
    /// Calendar window of the episode the shocks are calibrated to
    pub episode: String,
    pub instrument_shocks: BTreeMap<String, f64>,
    pub asset_class_shocks: BTreeMap<AssetClass, f64>,
}

impl StressScenario {
    pub fn new(id: impl Into<String>, name: impl Into<String>, episode: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            episode: episode.into(),
            instrument_shocks: BTreeMap::new(),
            asset_class_shocks: BTreeMap::new(),
        }
    }

    /// Builder method to add an instrument shock.
    pub fn with_shock(mut self, instrument: impl Into<String>, shock: f64) -> Self {
        self.instrument_shocks.insert(instrument.into(), shock);
        self
    }

    /// Builder method to add an asset-class fallback shock.
    pub fn with_class_shock(mut self, class: AssetClass, shock: f64) -> Self {
        self.asset_class_shocks.insert(class, shock);
        self
    }

    /// Shock applied to an instrument, if the scenario covers it.
    pub fn shock_for(&self, instrument: &str, universe: &InstrumentUniverse) -> Option<f64> {
        self.instrument_shocks
            .get(instrument)
            .or_else(|| self.asset_class_shocks.get(&universe.asset_class(instrument)))
            .copied()
    }

    /// Every shock multiplied by `m`.
    pub fn scaled(&self, m: f64) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            episode: self.episode.clone(),
            instrument_shocks: self
                .instrument_shocks
                .iter()
                .map(|(k, v)| (k.clone(), v * m))
                .collect(),
            asset_class_shocks: self
                .asset_class_shocks
                .iter()
                .map(|(k, v)| (*k, v * m))
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("scenario id must not be empty".to_string());
        }
        let all = self
            .instrument_shocks
            .values()
            .chain(self.asset_class_shocks.values());
        for shock in all {
            if !shock.is_finite() || *shock <= -1.0 {
                return Err(format!("scenario {}: shock {} out of range", self.id, shock));
            }
        }
        Ok(())
    }
}

/// Ordered collection of scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCatalog {
    pub scenarios: Vec<StressScenario>,
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::historical()
    }
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<StressScenario>) -> Self {
        Self { scenarios }
    }

    pub fn get(&self, id: &str) -> Option<&StressScenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// The six calibrated historical episodes.
    pub fn historical() -> Self {
        use AssetClass::*;

        let br_fiscal = StressScenario::new(
            "BR_FISCAL_2015",
            "Brazil fiscal crisis",
            "2015-05 to 2015-09",
        )
        .with_shock("USDBRL", 0.30)
        .with_shock("USDMXN", 0.12)
        .with_shock("EURUSD", -0.05)
        .with_shock("DI1F27", -0.08)
        .with_shock("DI1F30", -0.10)
        .with_shock("NTNB35", -0.12)
        .with_shock("CDS_BR_5Y", 0.135)
        .with_shock("IBOV", -0.25)
        .with_shock("SPX", -0.05)
        .with_shock("UST10Y", 0.01)
        .with_shock("BRENT", -0.35)
        .with_shock("GOLD", -0.08)
        .with_class_shock(Fx, 0.10)
        .with_class_shock(Rates, -0.06)
        .with_class_shock(Inflation, -0.10)
        .with_class_shock(Sovereign, 0.10)
        .with_class_shock(Equity, -0.20)
        .with_class_shock(Commodity, -0.25);

        let covid = StressScenario::new(
            "GLOBAL_RISK_OFF_2020",
            "Global risk-off (COVID)",
            "2020-02-20 to 2020-03-23",
        )
        .with_shock("USDBRL", 0.25)
        .with_shock("USDMXN", 0.28)
        .with_shock("EURUSD", -0.03)
        .with_shock("DI1F27", -0.05)
        .with_shock("DI1F30", -0.07)
        .with_shock("NTNB35", -0.10)
        .with_shock("CDS_BR_5Y", 0.10)
        .with_shock("IBOV", -0.45)
        .with_shock("SPX", -0.34)
        .with_shock("UST10Y", 0.06)
        .with_shock("BRENT", -0.60)
        .with_shock("GOLD", -0.03)
        .with_class_shock(Fx, 0.12)
        .with_class_shock(Rates, -0.04)
        .with_class_shock(Inflation, -0.08)
        .with_class_shock(Sovereign, 0.08)
        .with_class_shock(Equity, -0.35)
        .with_class_shock(Commodity, -0.40);

        let election = StressScenario::new(
            "BR_ELECTION_2002",
            "Brazil election confidence crisis",
            "2002-04 to 2002-10",
        )
        .with_shock("USDBRL", 0.45)
        .with_shock("USDMXN", 0.08)
        .with_shock("DI1F27", -0.10)
        .with_shock("DI1F30", -0.14)
        .with_shock("NTNB35", -0.15)
        .with_shock("CDS_BR_5Y", 0.60)
        .with_shock("IBOV", -0.35)
        .with_shock("SPX", -0.15)
        .with_shock("UST10Y", 0.04)
        .with_class_shock(Fx, 0.15)
        .with_class_shock(Rates, -0.08)
        .with_class_shock(Inflation, -0.12)
        .with_class_shock(Sovereign, 0.30)
        .with_class_shock(Equity, -0.25)
        .with_class_shock(Commodity, -0.05);

        let gfc = StressScenario::new(
            "GFC_2008",
            "Global financial crisis",
            "2008-09 to 2008-11",
        )
        .with_shock("USDBRL", 0.45)
        .with_shock("USDMXN", 0.40)
        .with_shock("EURUSD", -0.15)
        .with_shock("DI1F27", -0.07)
        .with_shock("DI1F30", -0.09)
        .with_shock("NTNB35", -0.12)
        .with_shock("CDS_BR_5Y", 0.25)
        .with_shock("IBOV", -0.50)
        .with_shock("SPX", -0.45)
        .with_shock("UST10Y", 0.10)
        .with_shock("BRENT", -0.70)
        .with_shock("GOLD", -0.05)
        .with_class_shock(Fx, 0.20)
        .with_class_shock(Rates, -0.05)
        .with_class_shock(Inflation, -0.10)
        .with_class_shock(Sovereign, 0.20)
        .with_class_shock(Equity, -0.45)
        .with_class_shock(Commodity, -0.50);

        let taper = StressScenario::new(
            "TAPER_TANTRUM_2013",
            "Taper tantrum",
            "2013-05-22 to 2013-08-31",
        )
        .with_shock("USDBRL", 0.15)
        .with_shock("USDMXN", 0.08)
        .with_shock("EURUSD", -0.01)
        .with_shock("DI1F27", -0.06)
        .with_shock("DI1F30", -0.08)
        .with_shock("NTNB35", -0.10)
        .with_shock("CDS_BR_5Y", 0.05)
        .with_shock("IBOV", -0.15)
        .with_shock("SPX", -0.06)
        .with_shock("UST10Y", -0.08)
        .with_shock("BRENT", 0.02)
        .with_shock("GOLD", -0.12)
        .with_class_shock(Fx, 0.07)
        .with_class_shock(Rates, -0.05)
        .with_class_shock(Inflation, -0.08)
        .with_class_shock(Sovereign, 0.04)
        .with_class_shock(Equity, -0.10)
        .with_class_shock(Commodity, -0.05);

        let joesley = StressScenario::new(
            "JOESLEY_DAY_2017",
            "Brazil political shock (Joesley Day)",
            "2017-05-18",
        )
        .with_shock("USDBRL", 0.08)
        .with_shock("DI1F27", -0.03)
        .with_shock("DI1F30", -0.04)
        .with_shock("NTNB35", -0.04)
        .with_shock("CDS_BR_5Y", 0.04)
        .with_shock("IBOV", -0.088)
        .with_class_shock(Fx, 0.02)
        .with_class_shock(Rates, -0.02)
        .with_class_shock(Inflation, -0.03)
        .with_class_shock(Sovereign, 0.03)
        .with_class_shock(Equity, -0.02);

        Self::new(vec![br_fiscal, covid, election, gfc, taper, joesley])
    }

    pub fn validate(&self) -> Result<(), String> {
        for (i, s) in self.scenarios.iter().enumerate() {
            s.validate()?;
            if self.scenarios[..i].iter().any(|o| o.id == s.id) {
                return Err(format!("duplicate scenario id {}", s.id));
            }
        }
        Ok(())
    }
}
