//! Support/resistance level aggregation
//!
//! Every detected extremum contributes one candidate [`Level`]. Levels are
//! bucketed by their price rounded to a fixed number of decimal digits and by
//! kind; only the most-touched buckets of each kind survive.
//!
//! # Rounding
//!
//! Prices are rounded half away from zero on the scaled value
//! (`(price * 10^digits).round() / 10^digits`). A price whose scaled binary
//! value sits exactly on a midpoint, such as `100.125` at two digits, goes up
//! to `100.13`. At 16 or more digits an `f64` price is already as precise as
//! it gets, so it is returned unchanged.
//!
//! # Ranking
//!
//! Within a kind, buckets are ordered by descending touch count. Buckets with
//! equal counts keep the order in which their rounded price first appeared in
//! the input.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::{ExtremumSet, Level, LevelKind, PricePoint, RankedLevel};

/// Digit count from which rounding leaves an `f64` untouched
const MAX_ROUNDING_DIGITS: u32 = 16;

/// Round `price` to `digits` decimal places, half away from zero
pub fn round_price(price: f64, digits: u32) -> f64 {
    if digits >= MAX_ROUNDING_DIGITS {
        return price;
    }
    let scale = 10f64.powi(digits as i32);
    let scaled = price * scale;
    if !scaled.is_finite() {
        return price;
    }
    scaled.round() / scale
}

/// Turn detected extrema into candidate levels.
///
/// Resistance levels (from highs) come first, then support levels (from
/// lows), each in ascending position order.
pub fn levels_from_extrema(series: &[PricePoint], extrema: &ExtremumSet) -> Vec<Level> {
    let resistance = extrema.highs.iter().filter_map(|&i| {
        series.get(i).map(|p| Level {
            position: i,
            datetime: p.datetime,
            price: p.high,
            kind: LevelKind::Resistance,
        })
    });
    let support = extrema.lows.iter().filter_map(|&i| {
        series.get(i).map(|p| Level {
            position: i,
            datetime: p.datetime,
            price: p.low,
            kind: LevelKind::Support,
        })
    });

    resistance.chain(support).collect()
}

type BucketKey = (OrderedFloat<f64>, LevelKind);

/// Keep the levels belonging to the `top_n` most-touched rounded prices of
/// each kind.
///
/// The result preserves input order and may hold several levels for one
/// bucket; each carries its bucket's touch count.
pub fn filter_levels(levels: &[Level], rounding: u32, top_n: usize) -> Vec<RankedLevel> {
    if levels.is_empty() || top_n == 0 {
        return Vec::new();
    }

    let keys: Vec<BucketKey> = levels
        .iter()
        .map(|l| (OrderedFloat(round_price(l.price, rounding)), l.kind))
        .collect();

    // Bucket counts, plus first-seen order for stable tie-breaking
    let mut counts: HashMap<BucketKey, usize> = HashMap::new();
    let mut first_seen: Vec<BucketKey> = Vec::new();
    for key in &keys {
        let count = counts.entry(*key).or_insert(0);
        if *count == 0 {
            first_seen.push(*key);
        }
        *count += 1;
    }

    let mut ranked = first_seen;
    // sort_by is stable, so equal counts keep first-seen order
    ranked.sort_by(|a, b| counts[b].cmp(&counts[a]));

    let mut taken: HashMap<LevelKind, usize> = HashMap::new();
    let selected: Vec<BucketKey> = ranked
        .into_iter()
        .filter(|(_, kind)| {
            let n = taken.entry(*kind).or_insert(0);
            *n += 1;
            *n <= top_n
        })
        .collect();

    let result: Vec<RankedLevel> = levels
        .iter()
        .zip(&keys)
        .filter(|(_, key)| selected.contains(*key))
        .map(|(level, key)| RankedLevel {
            level: level.clone(),
            rounded: key.0.into_inner(),
            touches: counts[key],
            precision: rounding,
        })
        .collect();

    debug!(
        "Kept {} of {} levels in {} buckets (rounding {}, top {} per kind)",
        result.len(),
        levels.len(),
        selected.len(),
        rounding,
        top_n
    );

    result
}
