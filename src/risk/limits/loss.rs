//! Realized loss tracking against daily and weekly limits.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LimitsConfig;
use crate::errors::{Error, Result};
use crate::infra::targets;

/// One realized trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub pnl: f64,
}

/// Bounded FIFO of realized daily P&L.
///
/// Never holds more than `capacity` entries; the oldest day is evicted first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    capacity: usize,
    entries: VecDeque<DailyPnl>,
}

impl LossRecord {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a day; dates must strictly increase.
    pub fn push(&mut self, date: NaiveDate, pnl: f64) -> Result<()> {
        if !pnl.is_finite() {
            return Err(Error::InvalidPositions(format!(
                "non-finite realized P&L on {}",
                date
            )));
        }
        if let Some(last) = self.entries.back() {
            if date <= last.date {
                return Err(Error::LedgerOutOfOrder {
                    last: last.date.to_string(),
                    attempted: date.to_string(),
                });
            }
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(DailyPnl { date, pnl });
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&DailyPnl> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DailyPnl> {
        self.entries.iter()
    }

    /// Most recent day's P&L (0 when empty).
    pub fn daily_pnl(&self) -> f64 {
        self.latest().map(|d| d.pnl).unwrap_or(0.0)
    }

    /// P&L summed over the window.
    pub fn window_pnl(&self) -> f64 {
        self.entries.iter().map(|d| d.pnl).sum()
    }

    /// Compare realized losses with the limits.
    pub fn evaluate(&self, nav: f64, limits: &LimitsConfig) -> LossLimitStatus {
        let daily_limit = limits.daily_loss_limit_pct * nav;
        let weekly_limit = limits.weekly_loss_limit_pct * nav;
        let daily_pnl = self.daily_pnl();
        let weekly_pnl = self.window_pnl();
        let daily_loss = (-daily_pnl).max(0.0);
        let weekly_loss = (-weekly_pnl).max(0.0);

        LossLimitStatus {
            daily_pnl,
            weekly_pnl,
            daily_limit,
            weekly_limit,
            daily_utilization: daily_loss / daily_limit,
            weekly_utilization: weekly_loss / weekly_limit,
            daily_breached: daily_loss > daily_limit,
            weekly_breached: weekly_loss > weekly_limit,
            days_in_window: self.len(),
        }
    }
}

/// Loss limit evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossLimitStatus {
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    /// Limits in currency units (positive)
    pub daily_limit: f64,
    pub weekly_limit: f64,
    pub daily_utilization: f64,
    pub weekly_utilization: f64,
    pub daily_breached: bool,
    pub weekly_breached: bool,
    pub days_in_window: usize,
}

impl LossLimitStatus {
    pub fn any_breached(&self) -> bool {
        self.daily_breached || self.weekly_breached
    }
}

/// Cross-run loss record shared between one writer and many readers.
#[derive(Debug, Clone)]
pub struct LossLedger {
    inner: Arc<RwLock<LossRecord>>,
}

impl LossLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LossRecord::new(capacity))),
        }
    }

    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self::new(limits.weekly_window_days)
    }

    /// Record one realized trading day.
    pub fn record(&self, date: NaiveDate, pnl: f64) -> Result<()> {
        let mut record = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match record.push(date, pnl) {
            Ok(()) => {
                debug!(
                    target: targets::RISK,
                    %date,
                    pnl,
                    window_pnl = record.window_pnl(),
                    "Realized P&L recorded"
                );
                Ok(())
            }
            Err(e) => {
                warn!(target: targets::RISK, %date, error = %e, "Loss ledger update rejected");
                Err(e)
            }
        }
    }

    /// Consistent copy of the current window.
    pub fn snapshot(&self) -> LossRecord {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
