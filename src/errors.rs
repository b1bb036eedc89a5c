use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
///
/// Boundary validation failures carry enough context to identify the offending
/// record. Numerical failures name the computation that could not proceed.
/// Expected business outcomes (infeasible reverse stress, optimizer without a
/// solution, limit breaches) are not errors and never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A strategy signal failed boundary validation
    #[error("Invalid signal from {strategy_id} on {instrument}: {reason}")]
    InvalidSignal {
        strategy_id: String,
        instrument: String,
        reason: String,
    },

    /// Regime probability map failed validation
    #[error("Invalid regime view: {0}")]
    InvalidRegime(String),

    /// Position snapshot failed validation
    #[error("Invalid position snapshot: {0}")]
    InvalidPositions(String),

    /// Return history failed validation
    #[error("Invalid return series for {instrument}: {reason}")]
    InvalidReturns { instrument: String, reason: String },

    /// Not enough aligned observations for the requested computation
    #[error("Insufficient data for {context}: required {required}, available {available}")]
    InsufficientData {
        context: String,
        required: usize,
        available: usize,
    },

    /// Instrument referenced but absent from the supplied data
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Matrix/vector shapes do not agree
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Cholesky factorization failed after shrinkage
    #[error("Matrix not positive definite: {0}")]
    NotPositiveDefinite(String),

    /// Matrix inversion failed
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    /// Configuration failed validation or could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Loss ledger updates must be strictly sequential by date
    #[error("Loss ledger out of order: last recorded {last}, attempted {attempted}")]
    LedgerOutOfOrder { last: String, attempted: String },
}

// Convenience constructors for common error patterns
impl Error {
    /// Create a signal validation error
    pub fn invalid_signal(
        strategy_id: impl Into<String>,
        instrument: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidSignal {
            strategy_id: strategy_id.into(),
            instrument: instrument.into(),
            reason: reason.into(),
        }
    }

    /// Create an insufficient-data error
    pub fn insufficient_data(context: impl Into<String>, required: usize, available: usize) -> Self {
        Error::InsufficientData {
            context: context.into(),
            required,
            available,
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_signal_message() {
        let err = Error::invalid_signal("FX_CARRY", "USDBRL", "confidence 1.2 outside [0, 1]");
        assert_eq!(
            err.to_string(),
            "Invalid signal from FX_CARRY on USDBRL: confidence 1.2 outside [0, 1]"
        );
    }

    #[test]
    fn test_insufficient_data_message() {
        let err = Error::insufficient_data("parametric VaR", 756, 120);
        assert!(err.to_string().contains("required 756"));
        assert!(err.to_string().contains("available 120"));
    }
}
