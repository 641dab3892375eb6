//! Hour arithmetic shared by grants, voids and recalculations.

use chrono::{DateTime, Utc};

/// Round to 2 decimal places.
pub fn round_hours(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Hours between check-in and check-out, capped by the activity duration
/// (`duration <= 0` means uncapped) and rounded. A check-out before the
/// check-in yields 0.
pub fn calc_granted_hours(duration: f64, check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> f64 {
    if check_out < check_in {
        return 0.0;
    }

    let elapsed = (check_out - check_in).num_milliseconds() as f64 / 3_600_000.0;
    let hours = if duration > 0.0 && elapsed > duration {
        duration
    } else {
        elapsed
    };

    round_hours(hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_duration_cap_applies() {
        assert_eq!(calc_granted_hours(4.0, at(9, 0), at(15, 0)), 4.0);
        assert_eq!(calc_granted_hours(4.0, at(9, 0), at(11, 30)), 2.5);
    }

    #[test]
    fn test_zero_duration_is_uncapped() {
        assert_eq!(calc_granted_hours(0.0, at(9, 0), at(15, 0)), 6.0);
    }

    #[test]
    fn test_checkout_before_checkin_grants_nothing() {
        assert_eq!(calc_granted_hours(4.0, at(12, 0), at(9, 0)), 0.0);
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        // 20 minutes
        assert_eq!(calc_granted_hours(8.0, at(9, 0), at(9, 20)), 0.33);
        assert_eq!(round_hours(2.456), 2.46);
        assert_eq!(round_hours(-2.499), -2.5);
    }

    proptest! {
        #[test]
        fn granted_hours_stay_within_bounds(
            minutes in 0i64..(48 * 60),
            duration in 0.0f64..24.0,
        ) {
            let check_in = at(0, 0);
            let hours = calc_granted_hours(duration, check_in, check_in + Duration::minutes(minutes));
            prop_assert!(hours >= 0.0);
            if duration > 0.0 {
                prop_assert!(hours <= round_hours(duration));
            }
            prop_assert_eq!(round_hours(hours), hours);
        }
    }
}
