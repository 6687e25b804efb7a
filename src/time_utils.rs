// SPDX-License-Identifier: MIT
// Copyright 2026 Sweatpact Authors

//! Shared helpers for week and workout-day calendar math.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

/// Hour (local time) before which a workout counts toward the previous day.
const EARLY_MORNING_CUTOFF_HOUR: u32 = 3;

/// Start of the week containing `date`.
///
/// `week_start_day` uses 1=Monday ... 7=Sunday (app convention).
pub fn start_of_week(date: NaiveDate, week_start_day: u8) -> NaiveDate {
    let current = date.weekday().number_from_monday() as i64; // 1=Mon..7=Sun
    let days_back = (current - i64::from(week_start_day) + 7) % 7;
    date - Duration::days(days_back)
}

/// Effective calendar day for a workout captured at `local` device time.
///
/// Sessions logged between midnight and 03:00 are attributed to the previous
/// day; the capture timestamp itself is kept separately.
pub fn effective_workout_date(local: NaiveDateTime) -> NaiveDate {
    if local.hour() < EARLY_MORNING_CUTOFF_HOUR {
        local.date() - Duration::days(1)
    } else {
        local.date()
    }
}

/// Whether `date` falls inside the 7-day week starting at `week_start`.
pub fn week_contains(week_start: NaiveDate, date: NaiveDate) -> bool {
    date >= week_start && date < week_start + Duration::days(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_start_of_week_monday_convention() {
        // 2026-08-05 is a Wednesday; Monday-start week begins 2026-08-03.
        assert_eq!(start_of_week(d(2026, 8, 5), 1), d(2026, 8, 3));
        // On the start day itself, the week starts today.
        assert_eq!(start_of_week(d(2026, 8, 3), 1), d(2026, 8, 3));
    }

    #[test]
    fn test_start_of_week_sunday_convention() {
        // Sunday-start week containing Wednesday 2026-08-05 begins 2026-08-02.
        assert_eq!(start_of_week(d(2026, 8, 5), 7), d(2026, 8, 2));
        assert_eq!(start_of_week(d(2026, 8, 2), 7), d(2026, 8, 2));
        // Saturday belongs to the week that started the previous Sunday.
        assert_eq!(start_of_week(d(2026, 8, 8), 7), d(2026, 8, 2));
    }

    #[test]
    fn test_start_of_week_crosses_month_boundary() {
        // 2026-08-01 is a Saturday; its Monday-start week began 2026-07-27.
        assert_eq!(start_of_week(d(2026, 8, 1), 1), d(2026, 7, 27));
    }

    #[test]
    fn test_effective_date_early_morning_counts_as_previous_day() {
        // 02:30 on Wednesday attributes to Tuesday.
        let wed_0230 = d(2026, 8, 5).and_hms_opt(2, 30, 0).unwrap();
        assert_eq!(effective_workout_date(wed_0230), d(2026, 8, 4));
    }

    #[test]
    fn test_effective_date_after_cutoff_is_same_day() {
        let wed_0301 = d(2026, 8, 5).and_hms_opt(3, 1, 0).unwrap();
        assert_eq!(effective_workout_date(wed_0301), d(2026, 8, 5));

        let wed_2359 = d(2026, 8, 5).and_hms_opt(23, 59, 0).unwrap();
        assert_eq!(effective_workout_date(wed_2359), d(2026, 8, 5));
    }

    #[test]
    fn test_effective_date_midnight_exactly() {
        let thu_0000 = d(2026, 8, 6).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(effective_workout_date(thu_0000), d(2026, 8, 5));
    }

    #[test]
    fn test_week_contains() {
        let ws = d(2026, 8, 3);
        assert!(week_contains(ws, d(2026, 8, 3)));
        assert!(week_contains(ws, d(2026, 8, 9)));
        assert!(!week_contains(ws, d(2026, 8, 10)));
        assert!(!week_contains(ws, d(2026, 8, 2)));
    }
}
