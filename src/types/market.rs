//! Positions and historical returns consumed by the risk engine.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

// ============================================================================
// Positions
// ============================================================================

/// Current position snapshot: instrument → signed notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub as_of: NaiveDate,
    /// Net asset value the weights and loss limits are expressed against
    pub nav: f64,
    pub positions: BTreeMap<String, f64>,
}

impl PositionSnapshot {
    pub fn new(as_of: NaiveDate, nav: f64) -> Self {
        Self {
            as_of,
            nav,
            positions: BTreeMap::new(),
        }
    }

    /// Builder method to add a position.
    pub fn with_position(mut self, instrument: impl Into<String>, notional: f64) -> Self {
        self.positions.insert(instrument.into(), notional);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.nav.is_finite() || self.nav <= 0.0 {
            return Err(Error::InvalidPositions(format!(
                "nav must be positive, got {}",
                self.nav
            )));
        }
        for (instrument, notional) in &self.positions {
            if !notional.is_finite() {
                return Err(Error::InvalidPositions(format!(
                    "non-finite notional for {}",
                    instrument
                )));
            }
        }
        Ok(())
    }

    /// Signed notional (zero when flat).
    pub fn notional(&self, instrument: &str) -> f64 {
        self.positions.get(instrument).copied().unwrap_or(0.0)
    }

    /// Signed notional as a fraction of NAV.
    pub fn weight(&self, instrument: &str) -> f64 {
        self.notional(instrument) / self.nav
    }

    /// Σ |notional|.
    pub fn gross(&self) -> f64 {
        self.positions.values().map(|n| n.abs()).sum()
    }

    /// Instruments with a non-zero position, sorted.
    pub fn active_instruments(&self) -> Vec<String> {
        self.positions
            .iter()
            .filter(|(_, n)| **n != 0.0)
            .map(|(i, _)| i.clone())
            .collect()
    }

    /// Notionals ordered by `instruments` (zero for missing entries).
    pub fn vector(&self, instruments: &[String]) -> DVector<f64> {
        DVector::from_iterator(instruments.len(), instruments.iter().map(|i| self.notional(i)))
    }
}

// ============================================================================
// Returns
// ============================================================================

/// Ordered historical returns of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub instrument: String,
    pub dates: Vec<NaiveDate>,
    pub returns: Vec<f64>,
}

impl ReturnSeries {
    pub fn new(instrument: impl Into<String>, dates: Vec<NaiveDate>, returns: Vec<f64>) -> Self {
        Self {
            instrument: instrument.into(),
            dates,
            returns,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Error::InvalidReturns {
            instrument: self.instrument.clone(),
            reason,
        };
        if self.dates.len() != self.returns.len() {
            return Err(fail(format!(
                "{} dates but {} returns",
                self.dates.len(),
                self.returns.len()
            )));
        }
        if self.dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(fail("dates must be strictly increasing".to_string()));
        }
        if let Some(pos) = self.returns.iter().position(|r| !r.is_finite()) {
            return Err(fail(format!("non-finite return on {}", self.dates[pos])));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

/// Per-instrument return cache held by the risk engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnHistory {
    series: BTreeMap<String, ReturnSeries>,
}

impl ReturnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and build from a list of series.
    pub fn from_series(series: impl IntoIterator<Item = ReturnSeries>) -> Result<Self> {
        let mut history = Self::new();
        for s in series {
            history.insert(s)?;
        }
        Ok(history)
    }

    /// Insert (or replace) a validated series.
    pub fn insert(&mut self, series: ReturnSeries) -> Result<()> {
        series.validate()?;
        self.series.insert(series.instrument.clone(), series);
        Ok(())
    }

    pub fn get(&self, instrument: &str) -> Option<&ReturnSeries> {
        self.series.get(instrument)
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.series.contains_key(instrument)
    }

    pub fn instruments(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Re-check every series, e.g. after deserialization.
    pub fn validate(&self) -> Result<()> {
        for (key, series) in &self.series {
            if key != &series.instrument {
                return Err(Error::InvalidReturns {
                    instrument: key.clone(),
                    reason: format!("keyed series belongs to {}", series.instrument),
                });
            }
            series.validate()?;
        }
        Ok(())
    }

    /// Date-aligned window over `instruments`.
    ///
    /// Only dates present in every requested series are kept; `lookback`
    /// keeps the most recent rows.
    pub fn aligned(&self, instruments: &[String], lookback: Option<usize>) -> Result<ReturnMatrix> {
        if instruments.is_empty() {
            return Ok(ReturnMatrix::empty());
        }

        let mut common: Option<BTreeSet<NaiveDate>> = None;
        for instrument in instruments {
            let series = self
                .series
                .get(instrument)
                .ok_or_else(|| Error::UnknownInstrument(instrument.clone()))?;
            let dates: BTreeSet<NaiveDate> = series.dates.iter().copied().collect();
            common = Some(match common {
                None => dates,
                Some(prev) => prev.intersection(&dates).copied().collect(),
            });
        }

        let mut dates: Vec<NaiveDate> = common.unwrap_or_default().into_iter().collect();
        if let Some(n) = lookback {
            if dates.len() > n {
                dates = dates.split_off(dates.len() - n);
            }
        }

        let t = dates.len();
        let n = instruments.len();
        let mut values = DMatrix::zeros(t, n);
        for (j, instrument) in instruments.iter().enumerate() {
            let series = &self.series[instrument];
            let lookup: BTreeMap<NaiveDate, f64> = series
                .dates
                .iter()
                .copied()
                .zip(series.returns.iter().copied())
                .collect();
            for (i, date) in dates.iter().enumerate() {
                values[(i, j)] = lookup[date];
            }
        }

        Ok(ReturnMatrix {
            instruments: instruments.to_vec(),
            dates,
            values,
        })
    }
}

/// Date-aligned T×N return window (rows = dates, columns = instruments).
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnMatrix {
    pub instruments: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub values: DMatrix<f64>,
}

impl ReturnMatrix {
    pub fn empty() -> Self {
        Self {
            instruments: Vec::new(),
            dates: Vec::new(),
            values: DMatrix::zeros(0, 0),
        }
    }

    /// Build directly from rows; used by tests and replay paths.
    pub fn from_rows(instruments: Vec<String>, dates: Vec<NaiveDate>, rows: &[Vec<f64>]) -> Result<Self> {
        let n = instruments.len();
        if dates.len() != rows.len() {
            return Err(Error::dimension_mismatch("return rows", dates.len(), rows.len()));
        }
        let mut values = DMatrix::zeros(rows.len(), n);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(Error::dimension_mismatch("return row width", n, row.len()));
            }
            for (j, v) in row.iter().enumerate() {
                values[(i, j)] = *v;
            }
        }
        Ok(Self {
            instruments,
            dates,
            values,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_instruments(&self) -> usize {
        self.values.ncols()
    }

    pub fn index_of(&self, instrument: &str) -> Option<usize> {
        self.instruments.iter().position(|i| i == instrument)
    }

    /// Most recent `n` rows.
    pub fn tail(&self, n: usize) -> Self {
        let t = self.n_obs();
        if n >= t {
            return self.clone();
        }
        let start = t - n;
        Self {
            instruments: self.instruments.clone(),
            dates: self.dates[start..].to_vec(),
            values: self.values.rows(start, n).into_owned(),
        }
    }

    /// Column means.
    pub fn means(&self) -> DVector<f64> {
        let t = self.n_obs().max(1) as f64;
        DVector::from_iterator(
            self.n_instruments(),
            (0..self.n_instruments()).map(|j| self.values.column(j).sum() / t),
        )
    }

    /// Demeaned copy of the return matrix.
    pub fn demeaned(&self) -> DMatrix<f64> {
        let means = self.means();
        let mut x = self.values.clone();
        for j in 0..x.ncols() {
            let m = means[j];
            for v in x.column_mut(j).iter_mut() {
                *v -= m;
            }
        }
        x
    }

    /// Daily portfolio P&L for notionals aligned with `instruments`.
    pub fn portfolio_pnl(&self, notionals: &DVector<f64>) -> Result<Vec<f64>> {
        if notionals.len() != self.n_instruments() {
            return Err(Error::dimension_mismatch(
                "portfolio P&L",
                self.n_instruments(),
                notionals.len(),
            ));
        }
        Ok((&self.values * notionals).iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_alignment_uses_common_dates() {
        let history = ReturnHistory::from_series([
            ReturnSeries::new("A", vec![d(2), d(3), d(4)], vec![0.01, 0.02, 0.03]),
            ReturnSeries::new("B", vec![d(3), d(4), d(5)], vec![-0.01, -0.02, -0.03]),
        ])
        .unwrap();

        let m = history
            .aligned(&["A".to_string(), "B".to_string()], None)
            .unwrap();
        assert_eq!(m.dates, vec![d(3), d(4)]);
        assert_eq!(m.values[(0, 0)], 0.02);
        assert_eq!(m.values[(1, 1)], -0.02);
    }

    #[test]
    fn test_lookback_keeps_latest_rows() {
        let history = ReturnHistory::from_series([ReturnSeries::new(
            "A",
            vec![d(2), d(3), d(4), d(5)],
            vec![0.1, 0.2, 0.3, 0.4],
        )])
        .unwrap();
        let m = history.aligned(&["A".to_string()], Some(2)).unwrap();
        assert_eq!(m.dates, vec![d(4), d(5)]);
    }

    #[test]
    fn test_unknown_instrument() {
        let history = ReturnHistory::new();
        let err = history.aligned(&["Z".to_string()], None).unwrap_err();
        assert_eq!(err, Error::UnknownInstrument("Z".to_string()));
    }

    #[test]
    fn test_unsorted_dates_rejected() {
        let series = ReturnSeries::new("A", vec![d(3), d(2)], vec![0.0, 0.0]);
        assert!(series.validate().is_err());
    }

    #[test]
    fn test_portfolio_pnl() {
        let m = ReturnMatrix::from_rows(
            vec!["A".into(), "B".into()],
            vec![d(2)],
            &[vec![-0.10, 0.05]],
        )
        .unwrap();
        let pnl = m.portfolio_pnl(&DVector::from_vec(vec![100.0, -50.0])).unwrap();
        assert!((pnl[0] + 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_position_validation() {
        let snap = PositionSnapshot::new(d(2), 0.0);
        assert!(snap.validate().is_err());
        let snap = PositionSnapshot::new(d(2), 1e6).with_position("A", f64::NAN);
        assert!(snap.validate().is_err());
    }
}
