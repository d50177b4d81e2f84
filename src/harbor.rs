//! Safe-harbor forecast
//!
//! Scans forward hour by hour for the first hour whose risk drops under the
//! safe threshold. `None` means nothing safe is forecastable inside the
//! horizon; callers should stay cautious rather than treat it as an error.

use chrono::{DateTime, FixedOffset, Timelike};

use crate::types::{SafeHarbor, HOURS_PER_DAY};

/// Scan `1..=horizon_hours` ahead of `now` for an hour with risk below
/// `threshold`.
///
/// `risk_at` returns `None` for hours whose risk cannot be determined; those
/// hours are never treated as safe.
pub fn find_safe_harbor<F>(
    risk_at: F,
    now: DateTime<FixedOffset>,
    horizon_hours: u32,
    threshold: u8,
) -> Option<SafeHarbor>
where
    F: Fn(u8) -> Option<u8>,
{
    let current_hour = now.hour();
    let current_minute = now.minute();

    for offset in 1..=horizon_hours {
        let check_hour = ((current_hour + offset) % HOURS_PER_DAY as u32) as u8;
        match risk_at(check_hour) {
            Some(risk) if risk < threshold => {
                let (hours_until, minutes_until) = time_until(offset, current_minute);
                return Some(SafeHarbor {
                    safe_hour: check_hour,
                    hours_until,
                    minutes_until,
                    label: hour_label(check_hour),
                });
            }
            _ => continue,
        }
    }

    None
}

/// Distance to the top of the hour `offset` hours ahead
fn time_until(offset: u32, current_minute: u32) -> (u32, u32) {
    let remainder = 60 - current_minute;
    if remainder == 60 {
        (offset, 0)
    } else {
        (offset - 1, remainder)
    }
}

/// 12-hour clock label, e.g. "3 PM"
pub fn hour_label(hour: u8) -> String {
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let display = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, hour, minute, 0)
            .unwrap()
    }

    fn curve(risky: &[u8]) -> impl Fn(u8) -> Option<u8> + '_ {
        move |hour| Some(if risky.contains(&hour) { 60 } else { 25 })
    }

    #[test]
    fn test_first_safe_hour_forward() {
        let harbor = find_safe_harbor(curve(&[22, 23, 0, 1]), at(22, 45), 24, 40).unwrap();

        assert_eq!(harbor.safe_hour, 2);
        // 2:00 is 3h15m after 22:45
        assert_eq!(harbor.hours_until, 3);
        assert_eq!(harbor.minutes_until, 15);
        assert_eq!(harbor.label, "2 AM");
    }

    #[test]
    fn test_top_of_hour_keeps_full_hours() {
        let harbor = find_safe_harbor(curve(&[22, 23, 0, 1]), at(23, 0), 24, 40).unwrap();
        assert_eq!(harbor.safe_hour, 2);
        assert_eq!(harbor.hours_until, 3);
        assert_eq!(harbor.minutes_until, 0);
    }

    #[test]
    fn test_next_hour_safe() {
        let harbor = find_safe_harbor(curve(&[]), at(14, 20), 12, 40).unwrap();
        assert_eq!(harbor.safe_hour, 15);
        assert_eq!(harbor.hours_until, 0);
        assert_eq!(harbor.minutes_until, 40);
        assert_eq!(harbor.label, "3 PM");
    }

    #[test]
    fn test_current_hour_is_not_considered() {
        // Only the current hour is safe
        let risky: Vec<u8> = (0..24).filter(|h| *h != 10).collect();
        assert!(find_safe_harbor(curve(&risky), at(10, 0), 23, 40).is_none());
        assert!(find_safe_harbor(curve(&risky), at(10, 0), 24, 40).is_some());
    }

    #[test]
    fn test_none_when_every_hour_risky() {
        let all: Vec<u8> = (0..24).collect();
        assert!(find_safe_harbor(curve(&all), at(8, 30), 24, 40).is_none());
    }

    #[test]
    fn test_horizon_limits_scan() {
        // Safe only at 9:00, which is 13 hours after 20:00
        let risky: Vec<u8> = (0..24).filter(|h| *h != 9).collect();
        assert!(find_safe_harbor(curve(&risky), at(20, 0), 12, 40).is_none());
        assert_eq!(
            find_safe_harbor(curve(&risky), at(20, 0), 24, 40).unwrap().safe_hour,
            9
        );
    }

    #[test]
    fn test_unknown_hours_are_not_safe() {
        let harbor = find_safe_harbor(
            |hour| if hour == 5 { Some(10) } else { None },
            at(1, 0),
            12,
            40,
        )
        .unwrap();
        assert_eq!(harbor.safe_hour, 5);
    }

    #[test]
    fn test_hour_labels() {
        assert_eq!(hour_label(0), "12 AM");
        assert_eq!(hour_label(11), "11 AM");
        assert_eq!(hour_label(12), "12 PM");
        assert_eq!(hour_label(23), "11 PM");
    }
}
