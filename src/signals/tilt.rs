//! Regime × strategy-family tilt table.
//!
//! Each strategy's evidence weight is scaled by the expected tilt of its family
//! under the current regime distribution:
//!
//! ```text
//! tilt(family) = Σ_r P(r) × T[r][family]
//! ```
//!
//! Inflation-sensitive families are tilted up under stagflation and down under
//! goldilocks. An absent regime view means a flat prior: every tilt is 1.

use serde::{Deserialize, Serialize};

use crate::types::{Regime, RegimeView, StrategyFamily};

/// Number of regimes (table rows).
pub const TILT_ROWS: usize = 4;
/// Number of strategy families (table columns).
pub const TILT_COLS: usize = 6;

/// Fixed lookup table of weight multipliers, rows = regimes, columns = families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTiltTable {
    rows: [[f64; TILT_COLS]; TILT_ROWS],
}

impl Default for RegimeTiltTable {
    fn default() -> Self {
        //            fx    rates  infl   sov    eq     cross
        Self {
            rows: [
                [1.10, 1.00, 0.70, 1.00, 1.20, 1.10], // goldilocks
                [1.00, 0.90, 1.25, 1.00, 1.10, 1.00], // reflation
                [0.90, 0.80, 1.40, 1.20, 0.75, 0.85], // stagflation
                [0.90, 1.30, 0.60, 1.10, 0.80, 0.95], // deflation
            ],
        }
    }
}

impl RegimeTiltTable {
    /// Table where every multiplier is 1.
    pub fn flat() -> Self {
        Self {
            rows: [[1.0; TILT_COLS]; TILT_ROWS],
        }
    }

    /// Build from explicit rows (ordered as `Regime::ALL` × `StrategyFamily::ALL`).
    pub fn from_rows(rows: [[f64; TILT_COLS]; TILT_ROWS]) -> Self {
        Self { rows }
    }

    /// Multiplier for one regime and family.
    pub fn multiplier(&self, regime: Regime, family: StrategyFamily) -> f64 {
        self.rows[regime.index()][family.index()]
    }

    /// Probability-weighted tilt for a family; 1 when no regime is supplied.
    pub fn tilt(&self, regime: Option<&RegimeView>, family: StrategyFamily) -> f64 {
        match regime {
            None => 1.0,
            Some(view) => view
                .iter()
                .map(|(r, p)| p * self.multiplier(r, family))
                .sum(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (i, row) in self.rows.iter().enumerate() {
            for (j, m) in row.iter().enumerate() {
                if !m.is_finite() || *m < 0.0 {
                    return Err(format!(
                        "tilt multiplier [{}][{}] must be finite and non-negative, got {}",
                        Regime::ALL[i],
                        StrategyFamily::ALL[j],
                        m
                    ));
                }
            }
        }
        Ok(())
    }
}
