//! Historical replay of a dated return sequence against current positions.
//!
//! Notionals are held static through the episode. Drawdown is measured from
//! the running peak of cumulative P&L, which starts at zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::infra::targets;
use crate::types::{PositionSnapshot, ReturnHistory, ReturnMatrix};

use super::StressTester;

/// One day of a replay path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPoint {
    pub date: NaiveDate,
    pub daily_pnl: f64,
    pub cumulative_pnl: f64,
    /// Cumulative P&L minus the running peak (≤ 0)
    pub drawdown: f64,
}

/// Path and summary of a historical replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub name: String,
    pub path: Vec<ReplayPoint>,
    /// Most negative drawdown along the path (≤ 0)
    pub worst_drawdown: f64,
    pub worst_drawdown_date: NaiveDate,
    pub worst_drawdown_index: usize,
    pub final_pnl: f64,
    /// Held instruments absent from the replayed returns
    pub missing_instruments: Vec<String>,
}

impl ReplayResult {
    pub fn worst_drawdown_pct_nav(&self, nav: f64) -> f64 {
        self.worst_drawdown / nav
    }
}

impl StressTester {
    /// Replay an aligned return window day by day.
    pub fn replay(
        &self,
        name: &str,
        positions: &PositionSnapshot,
        returns: &ReturnMatrix,
    ) -> Result<ReplayResult> {
        positions.validate()?;
        if returns.n_obs() == 0 {
            return Err(Error::insufficient_data(
                format!("historical replay {}", name),
                1,
                0,
            ));
        }

        let missing: Vec<String> = positions
            .active_instruments()
            .into_iter()
            .filter(|i| returns.index_of(i).is_none())
            .collect();
        if !missing.is_empty() {
            warn!(
                target: targets::RISK,
                replay = name,
                missing = ?missing,
                "Replay returns missing for held instruments"
            );
        }

        let notionals = positions.vector(&returns.instruments);
        let daily = returns.portfolio_pnl(&notionals)?;

        let mut path = Vec::with_capacity(daily.len());
        let (mut cumulative, mut peak) = (0.0_f64, 0.0_f64);
        let (mut worst, mut worst_idx) = (0.0_f64, 0usize);
        for (i, (date, pnl)) in returns.dates.iter().zip(daily).enumerate() {
            cumulative += pnl;
            peak = peak.max(cumulative);
            let drawdown = cumulative - peak;
            if drawdown < worst {
                worst = drawdown;
                worst_idx = i;
            }
            path.push(ReplayPoint {
                date: *date,
                daily_pnl: pnl,
                cumulative_pnl: cumulative,
                drawdown,
            });
        }

        let result = ReplayResult {
            name: name.to_string(),
            worst_drawdown: worst,
            worst_drawdown_date: path[worst_idx].date,
            worst_drawdown_index: worst_idx,
            final_pnl: cumulative,
            path,
            missing_instruments: missing,
        };
        debug!(
            target: targets::RISK,
            replay = name,
            days = result.path.len(),
            worst_drawdown = result.worst_drawdown,
            final_pnl = result.final_pnl,
            "Historical replay complete"
        );
        Ok(result)
    }

    /// Replay the `[start, end]` window of the return history.
    ///
    /// Uses every held instrument the history knows; the rest are reported
    /// as missing.
    pub fn replay_window(
        &self,
        name: &str,
        positions: &PositionSnapshot,
        history: &ReturnHistory,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ReplayResult> {
        let known: Vec<String> = positions
            .active_instruments()
            .into_iter()
            .filter(|i| history.contains(i))
            .collect();
        let aligned = history.aligned(&known, None)?;

        let keep: Vec<usize> = aligned
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= start && **d <= end)
            .map(|(i, _)| i)
            .collect();
        let dates = keep.iter().map(|i| aligned.dates[*i]).collect();
        let rows: Vec<Vec<f64>> = keep
            .iter()
            .map(|i| aligned.values.row(*i).iter().copied().collect())
            .collect();
        let window = ReturnMatrix::from_rows(aligned.instruments.clone(), dates, &rows)?;
        self.replay(name, positions, &window)
    }
}
