//! Table lookups shared by the tabular conversions.
//!
//! Inputs below the first or above the last key clamp to the boundary entry;
//! nothing is extrapolated.

/// Value to value with linear interpolation. `table` is sorted by key.
pub fn interpolate(table: &[(f64, f64)], raw: f64) -> Option<f64> {
    let (first, last) = (table.first()?, table.last()?);
    if raw <= first.0 {
        return Some(first.1);
    }
    if raw >= last.0 {
        return Some(last.1);
    }
    let (lo, hi) = bracket(table, raw)?;
    let span = hi.0 - lo.0;
    if span == 0.0 {
        return Some(lo.1);
    }
    Some(lo.1 + (raw - lo.0) / span * (hi.1 - lo.1))
}

/// Value to value without interpolation: the value of the nearest key, the
/// lower key on a tie.
pub fn nearest(table: &[(f64, f64)], raw: f64) -> Option<f64> {
    let (first, last) = (table.first()?, table.last()?);
    if raw <= first.0 {
        return Some(first.1);
    }
    if raw >= last.0 {
        return Some(last.1);
    }
    let (lo, hi) = bracket(table, raw)?;
    Some(if raw - lo.0 <= hi.0 - raw { lo.1 } else { hi.1 })
}

/// Index of the range containing `raw`. Integer inputs match inclusive upper
/// bounds, float inputs exclusive ones.
pub fn find_range<T>(ranges: &[(f64, f64, T)], raw: f64, integer: bool) -> Option<usize> {
    ranges.iter().position(|(min, max, _)| {
        if integer {
            raw >= *min && raw <= *max
        } else {
            raw >= *min && raw < *max
        }
    })
}

/// Index of the exact key `raw`.
pub fn find_key<T>(table: &[(f64, T)], raw: f64) -> Option<usize> {
    table.iter().position(|(key, _)| *key == raw)
}

/// Strictly increasing or strictly decreasing.
pub fn is_strictly_monotonic(values: impl Iterator<Item = f64> + Clone) -> bool {
    let pairs = values.clone().zip(values.skip(1));
    let increasing = pairs.clone().all(|(a, b)| b > a);
    let decreasing = pairs.clone().all(|(a, b)| b < a);
    increasing || decreasing
}

fn bracket(table: &[(f64, f64)], raw: f64) -> Option<((f64, f64), (f64, f64))> {
    table
        .windows(2)
        .find(|w| raw >= w[0].0 && raw <= w[1].0)
        .map(|w| (w[0], w[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: [(f64, f64); 3] = [(0.0, 0.0), (10.0, 100.0), (20.0, 150.0)];

    #[test]
    fn interpolation_clamps_at_the_ends() {
        assert_eq!(interpolate(&TABLE, -5.0), Some(0.0));
        assert_eq!(interpolate(&TABLE, 5.0), Some(50.0));
        assert_eq!(interpolate(&TABLE, 15.0), Some(125.0));
        assert_eq!(interpolate(&TABLE, 99.0), Some(150.0));
        assert_eq!(interpolate(&[], 1.0), None);
    }

    #[test]
    fn nearest_key() {
        assert_eq!(nearest(&TABLE, 4.0), Some(0.0));
        assert_eq!(nearest(&TABLE, 5.0), Some(0.0));
        assert_eq!(nearest(&TABLE, 6.0), Some(100.0));
        assert_eq!(nearest(&TABLE, 25.0), Some(150.0));
    }

    #[test]
    fn ranges_respect_integer_bounds() {
        let ranges = [(0.0, 10.0, 'a'), (10.0, 20.0, 'b')];
        assert_eq!(find_range(&ranges, 10.0, true), Some(0));
        assert_eq!(find_range(&ranges, 10.0, false), Some(1));
        assert_eq!(find_range(&ranges, 25.0, false), None);
    }

    #[test]
    fn monotonic() {
        assert!(is_strictly_monotonic([1.0, 2.0, 3.0].into_iter()));
        assert!(is_strictly_monotonic([3.0, 2.0].into_iter()));
        assert!(!is_strictly_monotonic([1.0, 2.0, 2.0].into_iter()));
        assert!(!is_strictly_monotonic([1.0, 3.0, 2.0].into_iter()));
    }
}
