//! Trend-line geometry: anchor selection and two-point line fitting

use chrono::{DateTime, Utc};
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::{AnchorPair, PriceField, PricePoint};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Map a timestamp onto the numeric time axis: fractional days since the
/// Unix epoch.
pub fn date_to_num(datetime: DateTime<Utc>) -> f64 {
    datetime.timestamp_millis() as f64 / 1000.0 / SECONDS_PER_DAY
}

/// Pick the two positions with the widest separation.
///
/// That pair is always the minimum and the maximum value, whatever order the
/// input is in. Returns `None` with fewer than two distinct positions.
pub fn most_separated(positions: &[usize]) -> Option<AnchorPair> {
    match positions.iter().copied().minmax() {
        MinMaxResult::MinMax(first, second) if second > first => {
            Some(AnchorPair { first, second })
        }
        _ => None,
    }
}

/// Straight line `y = slope * x + intercept` over the numeric time axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    /// Fit the line through `(x1, y1)` and `(x2, y2)`
    pub fn fit(p1: (f64, f64), p2: (f64, f64)) -> AnalysisResult<Self> {
        let (x1, y1) = p1;
        let (x2, y2) = p2;
        if x1 == x2 {
            return Err(AnalysisError::DegenerateInput { x: x1 });
        }

        let slope = (y2 - y1) / (x2 - x1);
        Ok(TrendLine {
            slope,
            intercept: y1 - slope * x1,
        })
    }

    /// Fit the line through two points of a series, reading `field`
    pub fn through(
        series: &[PricePoint],
        anchor: AnchorPair,
        field: PriceField,
    ) -> AnalysisResult<Self> {
        let point = |i: usize| {
            series.get(i).ok_or_else(|| AnalysisError::InvalidParameter {
                name: "anchor",
                reason: format!("position {} outside series of {} points", i, series.len()),
            })
        };
        let a = point(anchor.first)?;
        let b = point(anchor.second)?;

        Self::fit(
            (date_to_num(a.datetime), a.price(field)),
            (date_to_num(b.datetime), b.price(field)),
        )
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Line value at a timestamp
    pub fn value_at(&self, datetime: DateTime<Utc>) -> f64 {
        self.evaluate(date_to_num(datetime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_most_separated_is_min_max() {
        assert_eq!(
            most_separated(&[3, 7, 20, 5]),
            Some(AnchorPair { first: 3, second: 20 })
        );
    }

    #[test]
    fn test_most_separated_needs_two_distinct() {
        assert_eq!(most_separated(&[]), None);
        assert_eq!(most_separated(&[4]), None);
        assert_eq!(most_separated(&[4, 4, 4]), None);
        assert_eq!(
            most_separated(&[4, 4, 9, 9]),
            Some(AnchorPair { first: 4, second: 9 })
        );
    }

    #[test]
    fn test_fit_and_evaluate_midpoint() {
        let line = TrendLine::fit((0.0, 100.0), (10.0, 150.0)).unwrap();
        assert_relative_eq!(line.evaluate(5.0), 125.0);
        assert_relative_eq!(line.slope, 5.0);
        assert_relative_eq!(line.intercept, 100.0);
    }

    #[test]
    fn test_fit_degenerate() {
        let err = TrendLine::fit((5.0, 10.0), (5.0, 20.0)).unwrap_err();
        assert_eq!(err, AnalysisError::DegenerateInput { x: 5.0 });
    }

    #[test]
    fn test_date_to_num_days() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_relative_eq!(date_to_num(epoch), 0.0);
        assert_relative_eq!(date_to_num(epoch + Duration::hours(36)), 1.5);
    }

    #[test]
    fn test_through_series_points() {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        let series: Vec<PricePoint> = (0..11)
            .map(|i| {
                let low = 100.0 + i as f64;
                PricePoint::new_unchecked(start + Duration::days(i), low + 1.0, low + 2.0, low, low + 1.0, 1.0)
            })
            .collect();

        let line = TrendLine::through(&series, AnchorPair { first: 0, second: 10 }, PriceField::Low).unwrap();
        assert_relative_eq!(line.slope, 1.0, epsilon = 1e-9);
        assert_relative_eq!(line.value_at(series[5].datetime), 105.0, epsilon = 1e-6);
    }

    #[test]
    fn test_through_rejects_out_of_range_anchor() {
        let series: Vec<PricePoint> = Vec::new();
        let result = TrendLine::through(&series, AnchorPair { first: 0, second: 1 }, PriceField::High);
        assert!(matches!(result, Err(AnalysisError::InvalidParameter { .. })));
    }
}
