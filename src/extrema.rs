//! Local extrema detection
//!
//! Peaks are found the conventional way: a point (or the middle of a flat
//! plateau) strictly above both neighbours. Peaks closer than the minimum
//! separation are then thinned greedily, tallest first, so that every kept
//! peak is at least `min_separation` positions away from any other. Equal
//! heights are resolved in favour of the earlier position.

use crate::{ExtremumSet, PricePoint};
use tracing::debug;

/// Find all local maxima of `values`.
///
/// Endpoints are never peaks. For a plateau of equal values bounded by lower
/// values on both sides the middle position (rounded down) is reported.
pub fn local_maxima(values: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if values.len() < 3 {
        return peaks;
    }

    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks
}

/// Drop peaks lying fewer than `distance` positions from a higher (or equal,
/// earlier) peak. `peaks` must be ascending; the result stays ascending.
pub fn select_by_distance(peaks: &[usize], values: &[f64], distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }

    let mut priority: Vec<usize> = (0..peaks.len()).collect();
    priority.sort_by(|&a, &b| {
        values[peaks[b]]
            .total_cmp(&values[peaks[a]])
            .then(a.cmp(&b))
    });

    let mut keep = vec![true; peaks.len()];
    for &j in &priority {
        if !keep[j] {
            continue;
        }

        let mut k = j;
        while k > 0 {
            k -= 1;
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }

        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}

/// Peaks of `values` honouring a minimum separation
pub fn find_peaks(values: &[f64], min_separation: usize) -> Vec<usize> {
    let peaks = local_maxima(values);
    select_by_distance(&peaks, values, min_separation)
}

/// Detect local highs (on `high`) and local lows (on `low`) of a series.
///
/// Lows are the peaks of the negated low series. A `min_separation` of 0 is
/// treated as 1.
pub fn detect(series: &[PricePoint], min_separation: usize) -> ExtremumSet {
    let min_separation = min_separation.max(1);

    let highs: Vec<f64> = series.iter().map(|p| p.high).collect();
    let neg_lows: Vec<f64> = series.iter().map(|p| -p.low).collect();

    let extrema = ExtremumSet {
        highs: find_peaks(&highs, min_separation),
        lows: find_peaks(&neg_lows, min_separation),
    };

    debug!(
        "Detected {} local highs and {} local lows over {} points (min separation {})",
        extrema.highs.len(),
        extrema.lows.len(),
        series.len(),
        min_separation
    );

    extrema
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series_from(highs: &[f64], lows: &[f64]) -> Vec<PricePoint> {
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        highs
            .iter()
            .zip(lows)
            .enumerate()
            .map(|(i, (&h, &l))| {
                let mid = (h + l) / 2.0;
                PricePoint::new_unchecked(start + Duration::days(i as i64), mid, h, l, mid, 1.0)
            })
            .collect()
    }

    #[test]
    fn test_simple_peaks() {
        let values = vec![1.0, 3.0, 2.0, 5.0, 1.0, 4.0, 4.5];
        assert_eq!(local_maxima(&values), vec![1, 3]);
    }

    #[test]
    fn test_endpoints_are_not_peaks() {
        assert!(local_maxima(&[5.0, 1.0, 5.0]).is_empty());
        assert!(local_maxima(&[1.0, 2.0]).is_empty());
        assert!(local_maxima(&[]).is_empty());
    }

    #[test]
    fn test_plateau_reports_middle() {
        let values = vec![1.0, 2.0, 2.0, 2.0, 1.0];
        assert_eq!(local_maxima(&values), vec![2]);

        let even = vec![1.0, 2.0, 2.0, 1.0];
        assert_eq!(local_maxima(&even), vec![1]);

        // a plateau running into the last point is not bounded, so no peak
        let open_ended = vec![1.0, 2.0, 2.0, 2.0];
        assert!(local_maxima(&open_ended).is_empty());
    }

    #[test]
    fn test_distance_keeps_tallest() {
        let values = vec![0.0, 5.0, 0.0, 7.0, 0.0, 6.0, 0.0, 0.0, 0.0, 4.0, 0.0];
        let peaks = local_maxima(&values);
        assert_eq!(peaks, vec![1, 3, 5, 9]);
        assert_eq!(select_by_distance(&peaks, &values, 3), vec![3, 9]);
    }

    #[test]
    fn test_distance_tie_prefers_earlier() {
        let values = vec![0.0, 5.0, 0.0, 5.0, 0.0];
        assert_eq!(find_peaks(&values, 3), vec![1]);
    }

    #[test]
    fn test_distance_one_is_no_filter() {
        let values = vec![0.0, 5.0, 0.0, 5.0, 0.0];
        assert_eq!(find_peaks(&values, 1), vec![1, 3]);
    }

    #[test]
    fn test_detect_highs_and_lows() {
        let highs = vec![10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0];
        let lows = vec![9.0, 8.0, 9.5, 8.5, 10.0, 9.0, 11.0];
        let series = series_from(&highs, &lows);

        let extrema = detect(&series, 1);
        assert_eq!(extrema.highs, vec![1, 3, 5]);
        assert_eq!(extrema.lows, vec![1, 3, 5]);

        let spaced = detect(&series, 3);
        assert_eq!(spaced.highs, vec![1, 5]);
        assert_eq!(spaced.lows, vec![1, 5]);
    }

    #[test]
    fn test_detect_is_deterministic() {
        let highs: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 7) % 11) as f64).collect();
        let lows: Vec<f64> = highs.iter().map(|h| h - 3.0).collect();
        let series = series_from(&highs, &lows);

        assert_eq!(detect(&series, 5), detect(&series, 5));
    }

    #[test]
    fn test_detect_empty_series() {
        assert!(detect(&[], 5).is_empty());
    }
}
