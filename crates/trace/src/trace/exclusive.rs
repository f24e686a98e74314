/// Total length covered by a set of half-open `[start, end)` intervals.
///
/// Intervals are sorted by start and swept once; overlapping or touching
/// intervals are merged before their lengths are summed.
pub fn covered_length(mut intervals: Vec<(f64, f64)>) -> f64 {
    intervals.retain(|(start, end)| end > start);
    if intervals.is_empty() {
        return 0.0;
    }
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut total = 0.0;
    let (mut cur_start, mut cur_end) = intervals[0];
    for &(start, end) in &intervals[1..] {
        if start <= cur_end {
            cur_end = cur_end.max(end);
        } else {
            total += cur_end - cur_start;
            cur_start = start;
            cur_end = end;
        }
    }
    total + (cur_end - cur_start)
}

pub fn exclusive_duration(duration: f64, children: Vec<(f64, f64)>) -> f64 {
    let covered = covered_length(children);
    duration - duration.min(covered)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn no_children() {
        assert_eq!(exclusive_duration(10.0, vec![]), 10.0);
    }

    #[test]
    fn nested_interval_counts_once() {
        assert_eq!(covered_length(vec![(0.0, 22.0), (5.0, 10.0)]), 22.0);
    }

    #[test]
    fn partial_overlap_and_gap() {
        let covered = covered_length(vec![
            (0.0, 22.0),
            (5.0, 10.0),
            (11.0, 33.0),
            (35.0, 39.0),
        ]);
        assert_eq!(covered, 37.0);
        assert_eq!(
            exclusive_duration(
                42.0,
                vec![(0.0, 22.0), (5.0, 10.0), (11.0, 33.0), (35.0, 39.0)]
            ),
            5.0
        );
    }

    #[test]
    fn adjacent_intervals_merge() {
        assert_eq!(covered_length(vec![(5.0, 10.0), (0.0, 5.0)]), 10.0);
    }

    #[test]
    fn children_longer_than_parent_clamp_to_zero() {
        assert_eq!(exclusive_duration(10.0, vec![(0.0, 30.0)]), 0.0);
    }

    fn brute_force_cover(intervals: &[(f64, f64)]) -> f64 {
        // unit grid; the strategy below only produces integer bounds
        (0..200)
            .filter(|t| {
                let t = f64::from(*t);
                intervals.iter().any(|(s, e)| t >= *s && t < *e)
            })
            .count() as f64
    }

    proptest! {
        #[test]
        fn exclusive_never_exceeds_duration(
            duration in 0u32..200,
            raw in proptest::collection::vec((0u32..150, 0u32..50), 0..12),
        ) {
            let intervals: Vec<(f64, f64)> = raw
                .iter()
                .map(|(s, len)| (f64::from(*s), f64::from(s + len)))
                .collect();
            let duration = f64::from(duration);
            let exclusive = exclusive_duration(duration, intervals.clone());
            prop_assert!(exclusive <= duration);
            prop_assert!(exclusive >= 0.0);
            prop_assert_eq!(covered_length(intervals.clone()), brute_force_cover(&intervals));
        }
    }
}
