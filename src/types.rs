//! Core data types shared by the analysis pipeline and its collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for a single OHLCV row
#[derive(Debug, Error)]
pub enum PricePointValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("OHLCV fields must be finite numbers")]
    NonFinite,
}

/// One bar of a daily (or intraday) price series.
///
/// A series is a `Vec<PricePoint>` ordered by strictly increasing `datetime`;
/// the position of a point is its 0-based index in that vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    /// Create a new point with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, PricePointValidationError> {
        let point = Self::new_unchecked(datetime, open, high, low, close, volume);
        point.validate()?;
        Ok(point)
    }

    /// Create a point without validation (synthetic series, trusted sources)
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn validate(&self) -> Result<(), PricePointValidationError> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(PricePointValidationError::NonFinite);
        }

        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(PricePointValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(PricePointValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(PricePointValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(PricePointValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(PricePointValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Read one of the price fields
    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
        }
    }
}

/// Ticker symbol, normalised to upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(s.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which price of a bar a computation reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

// ============================================================================
// Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    Support,
    Resistance,
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKind::Support => write!(f, "support"),
            LevelKind::Resistance => write!(f, "resistance"),
        }
    }
}

/// A candidate level taken from one detected extremum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Series position of the extremum the level came from
    pub position: usize,
    pub datetime: DateTime<Utc>,
    pub price: f64,
    pub kind: LevelKind,
}

/// A level that survived touch-count filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLevel {
    pub level: Level,
    /// `level.price` rounded to `precision` decimal digits
    pub rounded: f64,
    /// Number of extrema of the same kind sharing `rounded`
    pub touches: usize,
    pub precision: u32,
}

// ============================================================================
// Extrema, anchors and breakouts
// ============================================================================

/// Local highs and local lows of a series, each in ascending position order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtremumSet {
    pub highs: Vec<usize>,
    pub lows: Vec<usize>,
}

impl ExtremumSet {
    pub fn is_empty(&self) -> bool {
        self.highs.is_empty() && self.lows.is_empty()
    }
}

/// Two extremum positions spanning the widest distance, `first < second`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPair {
    pub first: usize,
    pub second: usize,
}

impl AnchorPair {
    pub fn span(&self) -> usize {
        self.second - self.first
    }
}

/// Side of a trend line on which price counts as a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakDirection {
    /// Support line: breakout when price < line
    Below,
    /// Resistance line: breakout when price > line
    Above,
}

impl BreakDirection {
    pub fn violates(&self, actual: f64, trend: f64) -> bool {
        match self {
            BreakDirection::Below => actual < trend,
            BreakDirection::Above => actual > trend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakoutSeverity {
    ConfirmedBreakout,
    PotentialBreakout,
}

impl fmt::Display for BreakoutSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakoutSeverity::ConfirmedBreakout => write!(f, "confirmed-breakout"),
            BreakoutSeverity::PotentialBreakout => write!(f, "potential-breakout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutEvent {
    pub position: usize,
    pub datetime: DateTime<Utc>,
    /// Actual price of the scanned field at `position`
    pub price: f64,
    /// Trend-line value at `position`
    pub trend_value: f64,
    pub severity: BreakoutSeverity,
}

impl BreakoutEvent {
    pub fn is_confirmed(&self) -> bool {
        self.severity == BreakoutSeverity::ConfirmedBreakout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(open: f64, high: f64, low: f64, close: f64) -> PricePoint {
        PricePoint::new_unchecked(Utc::now(), open, high, low, close, 1000.0)
    }

    #[test]
    fn test_valid_point() {
        assert!(point(100.0, 105.0, 95.0, 102.0).is_valid());
    }

    #[test]
    fn test_high_below_low_rejected() {
        let err = point(100.0, 90.0, 95.0, 92.0).validate().unwrap_err();
        assert!(matches!(err, PricePointValidationError::HighLessThanLow { .. }));
    }

    #[test]
    fn test_checked_constructor() {
        let now = Utc::now();
        assert!(PricePoint::new(now, 100.0, 105.0, 95.0, 102.0, 10.0).is_ok());
        assert!(matches!(
            PricePoint::new(now, 100.0, 105.0, 95.0, 102.0, -1.0),
            Err(PricePointValidationError::NegativeVolume(v)) if v == -1.0
        ));
    }

    #[test]
    fn test_anchor_span() {
        assert_eq!(AnchorPair { first: 10, second: 30 }.span(), 20);
    }

    #[test]
    fn test_nan_rejected() {
        let err = point(f64::NAN, 105.0, 95.0, 102.0).validate().unwrap_err();
        assert!(matches!(err, PricePointValidationError::NonFinite));
    }

    #[test]
    fn test_price_field_access() {
        let p = point(100.0, 105.0, 95.0, 102.0);
        assert_eq!(p.price(PriceField::High), 105.0);
        assert_eq!(p.price(PriceField::Low), 95.0);
    }

    #[test]
    fn test_break_direction() {
        assert!(BreakDirection::Below.violates(98.0, 100.0));
        assert!(!BreakDirection::Below.violates(100.0, 100.0));
        assert!(BreakDirection::Above.violates(101.0, 100.0));
    }

    #[test]
    fn test_symbol_normalised() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
    }
}
