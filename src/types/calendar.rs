//! Weekday-only date arithmetic.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Is this date a Monday–Friday?
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Number of business days in `(from, to]`.
///
/// Weekends are skipped, holidays are not modelled. Returns 0 when `to <= from`.
///
/// ```text
/// Fri → Mon = 1,  Mon → Mon(+7) = 5,  Sat → Mon = 1
/// ```
pub fn business_days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }

    let total_days = (to - from).num_days();
    let full_weeks = total_days / 7;
    let mut count = (full_weeks * 5) as u32;

    let mut day = from + Duration::days(full_weeks * 7);
    while day < to {
        day += Duration::days(1);
        if is_business_day(day) {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_same_day_is_zero() {
        assert_eq!(business_days_between(d(2024, 3, 4), d(2024, 3, 4)), 0);
    }

    #[test]
    fn test_weekend_is_skipped() {
        // Friday → Monday
        assert_eq!(business_days_between(d(2024, 3, 8), d(2024, 3, 11)), 1);
        // Saturday → Monday
        assert_eq!(business_days_between(d(2024, 3, 9), d(2024, 3, 11)), 1);
    }

    #[test]
    fn test_full_week() {
        assert_eq!(business_days_between(d(2024, 3, 4), d(2024, 3, 11)), 5);
        assert_eq!(business_days_between(d(2024, 3, 4), d(2024, 3, 25)), 15);
    }

    #[test]
    fn test_reverse_order_is_zero() {
        assert_eq!(business_days_between(d(2024, 3, 11), d(2024, 3, 4)), 0);
    }
}
