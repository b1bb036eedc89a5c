//! Macro regime distribution supplied by the external regime estimator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Tolerance on the probability sum.
pub const REGIME_SUM_TOLERANCE: f64 = 1e-6;

/// Mutually exclusive macro regimes (growth × inflation quadrants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Growth up, inflation down
    Goldilocks,
    /// Growth up, inflation up
    Reflation,
    /// Growth down, inflation up
    Stagflation,
    /// Growth down, inflation down
    Deflation,
}

impl Regime {
    pub const ALL: [Regime; 4] = [
        Regime::Goldilocks,
        Regime::Reflation,
        Regime::Stagflation,
        Regime::Deflation,
    ];

    /// Row index into the regime tilt table.
    pub fn index(&self) -> usize {
        match self {
            Regime::Goldilocks => 0,
            Regime::Reflation => 1,
            Regime::Stagflation => 2,
            Regime::Deflation => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Goldilocks => "goldilocks",
            Regime::Reflation => "reflation",
            Regime::Stagflation => "stagflation",
            Regime::Deflation => "deflation",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Regime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "goldilocks" => Ok(Regime::Goldilocks),
            "reflation" => Ok(Regime::Reflation),
            "stagflation" => Ok(Regime::Stagflation),
            "deflation" => Ok(Regime::Deflation),
            other => Err(Error::InvalidRegime(format!("unknown regime '{}'", other))),
        }
    }
}

/// Validated probability distribution over regimes.
///
/// Regimes absent from the input map have probability zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct RegimeView {
    probabilities: BTreeMap<Regime, f64>,
}

impl RegimeView {
    /// Validate and build from typed probabilities.
    pub fn new(probabilities: BTreeMap<Regime, f64>) -> Result<Self> {
        if probabilities.is_empty() {
            return Err(Error::InvalidRegime("empty probability map".to_string()));
        }
        for (regime, p) in &probabilities {
            if !p.is_finite() || !(0.0..=1.0).contains(p) {
                return Err(Error::InvalidRegime(format!(
                    "probability {} for {} outside [0, 1]",
                    p, regime
                )));
            }
        }
        let sum: f64 = probabilities.values().sum();
        if (sum - 1.0).abs() > REGIME_SUM_TOLERANCE {
            return Err(Error::InvalidRegime(format!(
                "probabilities sum to {:.8}, expected 1",
                sum
            )));
        }
        Ok(Self { probabilities })
    }

    /// Validate and build from the estimator's name → probability map.
    pub fn from_named<I, S>(named: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut probabilities = BTreeMap::new();
        for (name, p) in named {
            let regime: Regime = name.as_ref().parse()?;
            if probabilities.insert(regime, p).is_some() {
                return Err(Error::InvalidRegime(format!(
                    "duplicate regime '{}'",
                    name.as_ref()
                )));
            }
        }
        Self::new(probabilities)
    }

    /// Point mass on one regime.
    pub fn certain(regime: Regime) -> Self {
        Self {
            probabilities: BTreeMap::from([(regime, 1.0)]),
        }
    }

    /// Uniform distribution over all regimes.
    pub fn uniform() -> Self {
        let p = 1.0 / Regime::ALL.len() as f64;
        Self {
            probabilities: Regime::ALL.iter().map(|r| (*r, p)).collect(),
        }
    }

    /// Probability of a regime (zero if absent).
    pub fn probability(&self, regime: Regime) -> f64 {
        self.probabilities.get(&regime).copied().unwrap_or(0.0)
    }

    /// Iterate over (regime, probability) pairs with non-zero mass.
    pub fn iter(&self) -> impl Iterator<Item = (Regime, f64)> + '_ {
        self.probabilities
            .iter()
            .filter(|(_, p)| **p > 0.0)
            .map(|(r, p)| (*r, *p))
    }

    /// Most probable regime (ties resolved by declaration order).
    pub fn dominant(&self) -> (Regime, f64) {
        Regime::ALL
            .iter()
            .map(|r| (*r, self.probability(*r)))
            .fold((Regime::Goldilocks, f64::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            })
    }

    /// How peaked the distribution is, in [0, 1].
    ///
    /// `clarity = 1 − H(p) / ln(K)` with K the number of regimes:
    /// a point mass gives 1, the uniform distribution gives 0.
    pub fn clarity(&self) -> f64 {
        let k = Regime::ALL.len() as f64;
        let entropy: f64 = self
            .probabilities
            .values()
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        (1.0 - entropy / k.ln()).clamp(0.0, 1.0)
    }
}

impl TryFrom<BTreeMap<String, f64>> for RegimeView {
    type Error = Error;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        RegimeView::from_named(map)
    }
}

impl From<RegimeView> for BTreeMap<String, f64> {
    fn from(view: RegimeView) -> Self {
        view.probabilities
            .into_iter()
            .map(|(r, p)| (r.as_str().to_string(), p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_view() {
        let view = RegimeView::from_named([("stagflation", 0.7), ("goldilocks", 0.3)]).unwrap();
        assert_eq!(view.probability(Regime::Stagflation), 0.7);
        assert_eq!(view.probability(Regime::Deflation), 0.0);
        assert_eq!(view.dominant(), (Regime::Stagflation, 0.7));
    }

    #[test]
    fn test_sum_must_be_one() {
        let err = RegimeView::from_named([("stagflation", 0.7), ("goldilocks", 0.2)]);
        assert!(matches!(err, Err(Error::InvalidRegime(_))));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = RegimeView::from_named([("stagflation", 1.2), ("goldilocks", -0.2)]);
        assert!(matches!(err, Err(Error::InvalidRegime(_))));
    }

    #[test]
    fn test_unknown_regime_rejected() {
        let err = RegimeView::from_named([("boom", 1.0)]);
        assert!(matches!(err, Err(Error::InvalidRegime(_))));
    }

    #[test]
    fn test_clarity_extremes() {
        assert!((RegimeView::certain(Regime::Reflation).clarity() - 1.0).abs() < 1e-12);
        assert!(RegimeView::uniform().clarity().abs() < 1e-12);

        let peaked = RegimeView::from_named([("reflation", 0.85), ("goldilocks", 0.15)]).unwrap();
        let flat = RegimeView::from_named([("reflation", 0.5), ("goldilocks", 0.5)]).unwrap();
        assert!(peaked.clarity() > flat.clarity());
    }

    #[test]
    fn test_serde_round_trip_through_names() {
        let json = r#"{"deflation":0.25,"goldilocks":0.75}"#;
        let view: RegimeView = serde_json::from_str(json).unwrap();
        assert_eq!(view.probability(Regime::Goldilocks), 0.75);

        let bad = r#"{"deflation":0.5}"#;
        assert!(serde_json::from_str::<RegimeView>(bad).is_err());
    }
}
