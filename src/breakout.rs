//! Breakout detection against a fitted trend line
//!
//! Points after the second anchor are scanned in order. The first one on the
//! wrong side of the line is a confirmed breakout and ends the scan. If none
//! crosses, the point closest to the line is reported as a potential breakout.

use tracing::debug;

use crate::trend::TrendLine;
use crate::{AnchorPair, BreakDirection, BreakoutEvent, BreakoutSeverity, PriceField, PricePoint};

/// Scan `series` after `anchor.second` for a breakout of `line`.
///
/// Returns `None` only when no points follow the anchor.
pub fn scan(
    series: &[PricePoint],
    anchor: AnchorPair,
    line: &TrendLine,
    field: PriceField,
    direction: BreakDirection,
) -> Option<BreakoutEvent> {
    let start = anchor.second + 1;
    if start >= series.len() {
        return None;
    }

    let event = |position: usize, price: f64, trend_value: f64, severity| BreakoutEvent {
        position,
        datetime: series[position].datetime,
        price,
        trend_value,
        severity,
    };

    let mut closest: Option<(usize, f64, f64)> = None;
    for (position, point) in series.iter().enumerate().skip(start) {
        let actual = point.price(field);
        let trend_value = line.value_at(point.datetime);

        if direction.violates(actual, trend_value) {
            debug!(
                "Confirmed {:?} breakout at {}: {:.4} vs line {:.4}",
                direction, position, actual, trend_value
            );
            return Some(event(
                position,
                actual,
                trend_value,
                BreakoutSeverity::ConfirmedBreakout,
            ));
        }

        let distance = (actual - trend_value).abs();
        if closest.map_or(true, |(_, _, best)| distance < best) {
            closest = Some((position, actual, distance));
        }
    }

    closest.map(|(position, actual, _)| {
        let trend_value = line.value_at(series[position].datetime);
        debug!(
            "No {:?} breakout; closest approach at {}: {:.4} vs line {:.4}",
            direction, position, actual, trend_value
        );
        event(
            position,
            actual,
            trend_value,
            BreakoutSeverity::PotentialBreakout,
        )
    })
}
