//! Daily signal summary report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AssetClass, Direction, Regime, RegimeView, SignalSnapshot};

use super::monitor::SignalAlert;

/// Regime context attached to the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeContext {
    pub dominant: Regime,
    pub dominant_probability: f64,
    pub clarity: f64,
    pub distribution: BTreeMap<String, f64>,
}

impl RegimeContext {
    pub fn from_view(view: &RegimeView) -> Self {
        let (dominant, dominant_probability) = view.dominant();
        Self {
            dominant,
            dominant_probability,
            clarity: view.clarity(),
            distribution: Regime::ALL
                .iter()
                .map(|r| (r.as_str().to_string(), view.probability(*r)))
                .collect(),
        }
    }
}

/// One instrument's line in the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentLine {
    pub instrument: String,
    pub direction: Direction,
    pub conviction: f64,
    pub confidence: f64,
    /// Change against the previous snapshot, if the instrument was present
    pub change: Option<f64>,
    pub crowded: bool,
    pub contributors: usize,
    /// Strategy with the largest attribution share
    pub top_contributor: Option<String>,
}

/// Instruments of one asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetClassSection {
    pub asset_class: AssetClass,
    pub mean_conviction: f64,
    pub instruments: Vec<InstrumentLine>,
}

/// One report per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub as_of: DateTime<Utc>,
    pub regime: Option<RegimeContext>,
    pub sections: Vec<AssetClassSection>,
    pub alerts: Vec<SignalAlert>,
    pub flip_counts: BTreeMap<String, usize>,
}

impl DailySummary {
    pub(crate) fn build(
        latest: &SignalSnapshot,
        previous: Option<&SignalSnapshot>,
        regime: Option<&RegimeView>,
        alerts: Vec<SignalAlert>,
        flip_counts: BTreeMap<String, usize>,
    ) -> Self {
        let mut grouped: BTreeMap<AssetClass, Vec<InstrumentLine>> = BTreeMap::new();
        for signal in &latest.signals {
            let change = previous
                .and_then(|p| p.get(&signal.instrument))
                .map(|p| signal.net_conviction - p.net_conviction);
            let top_contributor = signal
                .attribution()
                .into_iter()
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id);

            grouped.entry(signal.asset_class).or_default().push(InstrumentLine {
                instrument: signal.instrument.clone(),
                direction: signal.direction(),
                conviction: signal.net_conviction,
                confidence: signal.confidence,
                change,
                crowded: signal.is_crowded(),
                contributors: signal.contributors.len(),
                top_contributor,
            });
        }

        let sections = grouped
            .into_iter()
            .map(|(asset_class, instruments)| {
                let mean_conviction =
                    instruments.iter().map(|l| l.conviction).sum::<f64>() / instruments.len() as f64;
                AssetClassSection {
                    asset_class,
                    mean_conviction,
                    instruments,
                }
            })
            .collect();

        Self {
            as_of: latest.as_of,
            regime: regime.map(RegimeContext::from_view),
            sections,
            alerts,
            flip_counts,
        }
    }

    /// Total instruments covered.
    pub fn instrument_count(&self) -> usize {
        self.sections.iter().map(|s| s.instruments.len()).sum()
    }

    /// Plain-text rendering.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DailySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Signal summary {}", self.as_of.format("%Y-%m-%d"))?;
        match &self.regime {
            Some(r) => {
                write!(
                    f,
                    "Regime: {} ({:.0}%), clarity {:.2} [",
                    r.dominant,
                    r.dominant_probability * 100.0,
                    r.clarity
                )?;
                let parts: Vec<String> = r
                    .distribution
                    .iter()
                    .map(|(name, p)| format!("{} {:.2}", name, p))
                    .collect();
                writeln!(f, "{}]", parts.join(", "))?;
            }
            None => writeln!(f, "Regime: not supplied")?,
        }

        for section in &self.sections {
            writeln!(
                f,
                "\n[{}] mean conviction {:+.2}",
                section.asset_class, section.mean_conviction
            )?;
            for line in &section.instruments {
                let change = line
                    .change
                    .map(|c| format!("{:+.2}", c))
                    .unwrap_or_else(|| "new".to_string());
                writeln!(
                    f,
                    "  {:<12} {:>6} conv {:+.2} conf {:.2} chg {}{}{}",
                    line.instrument,
                    format!("{:?}", line.direction).to_uppercase(),
                    line.conviction,
                    line.confidence,
                    change,
                    if line.crowded { " CROWDED" } else { "" },
                    line.top_contributor
                        .as_deref()
                        .map(|s| format!(" top {}", s))
                        .unwrap_or_default(),
                )?;
            }
        }

        if self.alerts.is_empty() {
            writeln!(f, "\nAlerts: none")?;
        } else {
            writeln!(f, "\nAlerts ({}):", self.alerts.len())?;
            for alert in &self.alerts {
                writeln!(f, "  {}", alert.describe())?;
            }
        }
        Ok(())
    }
}
