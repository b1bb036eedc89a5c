//! Conviction → notional position size.
//!
//! ```text
//! vol target    N = conv · tvc · NAV / (σ_d · √D)
//! full Kelly    N = conv · scale · NAV / σ_d          (μ/σ² with μ = conv·scale·σ_d)
//! fractional    N = kelly_fraction · full Kelly
//! risk budget   N = conv · headroom · risk_capital · NAV / VaR per unit
//! ```
//!
//! Every method is then held to the soft position limit; top-tier convictions
//! may exceed it by the override margin, with a `LimitOverride` attached.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{SizingConfig, SizingMethod};
use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::risk::limits::RiskBudget;
use crate::risk::var::{horizon_scale, VaRDecomposition};
use crate::types::{AggregatedSignal, InstrumentUniverse};

use super::target::LimitOverride;

/// Per-instrument risk inputs to the sizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingInputs {
    pub nav: f64,
    /// Daily return volatility
    pub daily_vol: f64,
    /// |∂VaR/∂notional|
    pub var_per_unit: f64,
    /// Free risk-budget share (instrument and asset class)
    pub headroom: f64,
}

impl SizingInputs {
    /// Inputs for an instrument outside the decomposed book.
    ///
    /// VaR per unit is the standalone `k · σ_d`.
    pub fn standalone(nav: f64, daily_vol: f64, tail_factor: f64, headroom: f64) -> Self {
        Self {
            nav,
            daily_vol,
            var_per_unit: tail_factor * daily_vol,
            headroom,
        }
    }

    /// Inputs from the current risk report.
    ///
    /// Held instruments use their marginal VaR; instruments with no position
    /// (or a zero marginal) fall back to the standalone `k · σ_d · √h`.
    pub fn from_risk(
        instrument: &str,
        nav: f64,
        daily_vol: f64,
        tail_factor: f64,
        decomposition: &VaRDecomposition,
        budget: &RiskBudget,
        universe: &InstrumentUniverse,
    ) -> Self {
        let standalone = tail_factor * daily_vol * horizon_scale(decomposition.horizon_days);
        let var_per_unit = decomposition
            .component(instrument)
            .map(|c| c.marginal_var.abs())
            .filter(|m| *m > 0.0)
            .unwrap_or(standalone);
        Self {
            nav,
            daily_vol,
            var_per_unit,
            headroom: budget.headroom(instrument, universe),
        }
    }

    fn validate(&self, instrument: &str) -> Result<()> {
        if !(self.nav.is_finite() && self.nav > 0.0) {
            return Err(Error::InvalidPositions(format!("nav must be positive, got {}", self.nav)));
        }
        if !(self.daily_vol.is_finite() && self.daily_vol > 0.0) {
            return Err(Error::InvalidReturns {
                instrument: instrument.to_string(),
                reason: format!("daily volatility must be positive, got {}", self.daily_vol),
            });
        }
        if !self.var_per_unit.is_finite() || self.var_per_unit < 0.0 || !self.headroom.is_finite() {
            return Err(Error::InvalidReturns {
                instrument: instrument.to_string(),
                reason: "VaR per unit and headroom must be finite".to_string(),
            });
        }
        Ok(())
    }
}

/// Sized position for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub instrument: String,
    pub method: SizingMethod,
    pub conviction: f64,
    /// Size before the soft limit
    pub raw_notional: f64,
    pub notional: f64,
    pub weight: f64,
    pub limit_override: Option<LimitOverride>,
}

impl PositionSize {
    pub fn was_capped(&self) -> bool {
        self.notional.abs() < self.raw_notional.abs()
    }
}

/// Converts aggregated conviction into notional size.
#[derive(Debug, Clone, Default)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn method(&self) -> SizingMethod {
        self.config.method
    }

    /// Scale conviction so the position's annualized volatility is
    /// `|conviction| × target_vol_contribution` of NAV.
    pub fn vol_target(&self, conviction: f64, inputs: &SizingInputs) -> f64 {
        let annual_vol = inputs.daily_vol * self.config.annualization_days.sqrt();
        conviction * self.config.target_vol_contribution * inputs.nav
            / annual_vol
    }

    /// Growth-optimal notional μ/σ² · NAV with μ = conviction · scale · σ_d.
    pub fn full_kelly(&self, conviction: f64, inputs: &SizingInputs) -> f64 {
        conviction * self.config.view_return_scale / inputs.daily_vol * inputs.nav
    }

    pub fn fractional_kelly(&self, conviction: f64, inputs: &SizingInputs) -> f64 {
        self.config.kelly_fraction * self.full_kelly(conviction, inputs)
    }

    /// Spend the free budget share of the risk capital, in VaR units.
    pub fn risk_budget(&self, conviction: f64, inputs: &SizingInputs) -> f64 {
        if inputs.var_per_unit <= 0.0 || inputs.headroom <= 0.0 {
            return 0.0;
        }
        let risk_capital = self.config.risk_capital_pct * inputs.nav;
        conviction * inputs.headroom * risk_capital / inputs.var_per_unit
    }

    /// Size one aggregated signal with the configured method.
    pub fn size(&self, signal: &AggregatedSignal, inputs: &SizingInputs) -> Result<PositionSize> {
        inputs.validate(&signal.instrument)?;
        let conviction = signal.net_conviction;
        let raw_notional = if conviction == 0.0 {
            0.0
        } else {
            match self.config.method {
                SizingMethod::VolTarget => self.vol_target(conviction, inputs),
                SizingMethod::FractionalKelly => self.fractional_kelly(conviction, inputs),
                SizingMethod::RiskBudget => self.risk_budget(conviction, inputs),
            }
        };

        let (notional, limit_override) = self.apply_soft_limit(&signal.instrument, conviction, raw_notional, inputs.nav);
        debug!(
            target: targets::PORTFOLIO,
            instrument = %signal.instrument,
            method = ?self.config.method,
            conviction,
            raw_notional,
            notional,
            "Position sized"
        );

        Ok(PositionSize {
            instrument: signal.instrument.clone(),
            method: self.config.method,
            conviction,
            raw_notional,
            notional,
            weight: notional / inputs.nav,
            limit_override,
        })
    }

    /// Clamp to the soft limit, or to the widened limit under top-tier conviction.
    fn apply_soft_limit(
        &self,
        instrument: &str,
        conviction: f64,
        raw: f64,
        nav: f64,
    ) -> (f64, Option<LimitOverride>) {
        let soft = self.config.soft_position_limit_pct * nav;
        if raw.abs() <= soft {
            return (raw, None);
        }
        if conviction.abs() < self.config.top_tier_conviction {
            return (raw.signum() * soft, None);
        }

        let hard = soft * (1.0 + self.config.override_margin);
        let notional = raw.signum() * raw.abs().min(hard);
        let o = LimitOverride::new(
            format!("soft_position_limit:{}", instrument),
            self.config.soft_position_limit_pct,
            notional.abs() / nav,
            format!("top-tier conviction {:+.2}", conviction),
        );
        warn!(
            target: targets::PORTFOLIO,
            instrument,
            limit = o.limit,
            value = o.value,
            "Soft position limit exceeded under override"
        );
        (notional, Some(o))
    }

    /// Size every signal; inputs are looked up per instrument.
    pub fn size_all<'a, F>(&self, signals: &'a [AggregatedSignal], mut inputs: F) -> Result<Vec<PositionSize>>
    where
        F: FnMut(&'a AggregatedSignal) -> Option<SizingInputs>,
    {
        let mut sizes = Vec::with_capacity(signals.len());
        for signal in signals {
            match inputs(signal) {
                Some(i) => sizes.push(self.size(signal, &i)?),
                None => warn!(
                    target: targets::PORTFOLIO,
                    instrument = %signal.instrument,
                    "No risk inputs; signal not sized"
                ),
            }
        }
        Ok(sizes)
    }
}
