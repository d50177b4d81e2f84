//! Peak risk window search
//!
//! Exhaustive scan over every start hour and every window length 3-6 with
//! wraparound at midnight. The domain is 24 x 4 candidates, so brute force.

use crate::types::{HourlyRiskProfile, PeakWindow, Trigger, HOURS_PER_DAY};

pub const MIN_WINDOW_HOURS: u8 = 3;
pub const MAX_WINDOW_HOURS: u8 = 6;

/// Find the contiguous span with the highest mean base risk.
///
/// Scan order is increasing start, then increasing length; the first maximum
/// wins ties.
pub fn find_peak_window(profile: &HourlyRiskProfile, triggers: &[Trigger]) -> PeakWindow {
    let mut best_start = 0u8;
    let mut best_length = MIN_WINDOW_HOURS;
    let mut best_mean = f64::MIN;

    for start in 0..HOURS_PER_DAY {
        for length in MIN_WINDOW_HOURS..=MAX_WINDOW_HOURS {
            let mean = window_mean(profile, start, length);
            if mean > best_mean {
                best_mean = mean;
                best_start = start;
                best_length = length;
            }
        }
    }

    PeakWindow {
        start_hour: best_start,
        end_hour: (best_start + best_length - 1) % HOURS_PER_DAY,
        length: best_length,
        avg_risk: best_mean.round() as u8,
        triggers: triggers.to_vec(),
    }
}

/// Hours covered by a window, in order
pub fn window_hours(start: u8, length: u8) -> Vec<u8> {
    (0..length).map(|i| (start + i) % HOURS_PER_DAY).collect()
}

fn window_mean(profile: &HourlyRiskProfile, start: u8, length: u8) -> f64 {
    let sum: u32 = window_hours(start, length)
        .into_iter()
        .map(|hour| profile.risk_at(hour as u32) as u32)
        .sum();
    sum as f64 / length as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_with(hot: &[(u8, i32)], rest: i32) -> HourlyRiskProfile {
        let mut scores = [rest; 24];
        for &(hour, score) in hot {
            scores[hour as usize] = score;
        }
        HourlyRiskProfile::from_scores(scores)
    }

    #[test]
    fn test_latenight_peak_wraps_midnight() {
        let curve = curve_with(&[(22, 60), (23, 60), (0, 60), (1, 60)], 25);
        let peak = find_peak_window(&curve, &[Trigger::Fatigue]);

        assert_eq!(peak.start_hour, 22);
        assert_eq!(peak.avg_risk, 60);
        // Length 3 and 4 both average 60; the shorter one is scanned first
        assert_eq!(peak.length, 3);
        assert_eq!(peak.end_hour, 0);
        assert_eq!(peak.triggers, vec![Trigger::Fatigue]);
    }

    #[test]
    fn test_flat_curve_picks_first_window() {
        let peak = find_peak_window(&HourlyRiskProfile::flat(20), &[]);
        assert_eq!(peak.start_hour, 0);
        assert_eq!(peak.length, 3);
        assert_eq!(peak.end_hour, 2);
        assert_eq!(peak.avg_risk, 20);
    }

    #[test]
    fn test_plateau_beats_ramp() {
        // Three 90s in a row beat every window that includes the ramp
        let curve = curve_with(&[(19, 70), (20, 80), (21, 90), (22, 90), (23, 90)], 10);
        let peak = find_peak_window(&curve, &[]);
        assert_eq!(peak.start_hour, 21);
        assert_eq!(peak.length, 3);
        assert_eq!(peak.avg_risk, 90);
    }

    #[test]
    fn test_bounds_hold_for_wraparound_start() {
        let curve = curve_with(&[(22, 95), (23, 95), (0, 95)], 5);
        let peak = find_peak_window(&curve, &[]);

        assert!((MIN_WINDOW_HOURS..=MAX_WINDOW_HOURS).contains(&peak.length));
        assert!(peak.start_hour < 24 && peak.end_hour < 24);
        assert_eq!(peak.start_hour, 22);
        assert_eq!(peak.end_hour, 0);
        assert_eq!(peak.avg_risk, 95);
    }

    #[test]
    fn test_window_hours_wraps() {
        assert_eq!(window_hours(22, 5), vec![22, 23, 0, 1, 2]);
    }
}
