//! Rolling-window concurrency from quota surplus and time pressure.
//!
//! The score is the geometric mean of the quota ratio and the time ratio:
//! either factor collapsing to zero collapses concurrency to the
//! sequential floor, while a healthy surplus late in the window still
//! allows a burst.

/// Concurrency allowed by the rolling window.
///
/// `remaining_pct` is the window's remaining quota percentage (0-100);
/// `hours_until_reset` and `window_hours` define the time ratio, clamped
/// to 1. Thresholds: score >= 0.75 -> 4, >= 0.50 -> 3, >= 0.25 -> 2,
/// else 1. The result is clamped to [1, cap].
pub fn window_parallelism(
    remaining_pct: f64,
    hours_until_reset: f64,
    window_hours: f64,
    cap: usize,
) -> usize {
    let quota_ratio = (remaining_pct / 100.0).clamp(0.0, 1.0);
    let time_ratio = if window_hours > 0.0 {
        (hours_until_reset / window_hours).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let score = (quota_ratio * time_ratio).sqrt();

    let parallel = if score >= 0.75 {
        4
    } else if score >= 0.50 {
        3
    } else if score >= 0.25 {
        2
    } else {
        1
    };

    parallel.clamp(1, cap.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_quota_full_window_gives_four() {
        assert_eq!(window_parallelism(100.0, 5.0, 5.0, 4), 4);
        assert_eq!(window_parallelism(100.0, 5.0, 5.0, 8), 4);
    }

    #[test]
    fn test_zero_quota_gives_one() {
        assert_eq!(window_parallelism(0.0, 5.0, 5.0, 4), 1);
        assert_eq!(window_parallelism(0.0, 0.1, 5.0, 4), 1);
    }

    #[test]
    fn test_zero_time_gives_one() {
        assert_eq!(window_parallelism(100.0, 0.0, 5.0, 4), 1);
        assert_eq!(window_parallelism(50.0, 0.0, 5.0, 4), 1);
    }

    #[test]
    fn test_geometric_mean_midpoints() {
        // 100% quota, half the window left: sqrt(0.5) ~ 0.707 -> 3
        assert_eq!(window_parallelism(100.0, 2.5, 5.0, 4), 3);
        // 25% quota, full window: sqrt(0.25) = 0.5 -> 3
        assert_eq!(window_parallelism(25.0, 5.0, 5.0, 4), 3);
        // 25% quota, half window: sqrt(0.125) ~ 0.354 -> 2
        assert_eq!(window_parallelism(25.0, 2.5, 5.0, 4), 2);
        // 10% quota, 10% window: sqrt(0.01) = 0.1 -> 1
        assert_eq!(window_parallelism(10.0, 0.5, 5.0, 4), 1);
    }

    #[test]
    fn test_cap_respected() {
        assert_eq!(window_parallelism(100.0, 5.0, 5.0, 2), 2);
        assert_eq!(window_parallelism(100.0, 5.0, 5.0, 1), 1);
    }

    #[test]
    fn test_time_ratio_clamped_to_one() {
        // Hours until reset beyond the window length do not inflate the score
        assert_eq!(
            window_parallelism(100.0, 50.0, 5.0, 4),
            window_parallelism(100.0, 5.0, 5.0, 4)
        );
    }

    #[test]
    fn test_out_of_range_inputs_clamped() {
        assert_eq!(window_parallelism(150.0, 5.0, 5.0, 4), 4);
        assert_eq!(window_parallelism(-10.0, 5.0, 5.0, 4), 1);
    }

    #[test]
    fn test_result_always_in_bounds() {
        for pct in [0.0, 10.0, 33.0, 50.0, 75.0, 100.0] {
            for hours in [0.0, 1.0, 2.5, 5.0] {
                for cap in [1, 2, 4, 8] {
                    let n = window_parallelism(pct, hours, 5.0, cap);
                    assert!((1..=cap).contains(&n), "pct={} hours={} cap={}", pct, hours, cap);
                }
            }
        }
    }
}
