//! Next-due-date arithmetic for recurring templates.
//!
//! Day-of-month anchors are clamped to 28 so every month has the target
//! day; templates can therefore never be scheduled on the 29th–31st.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc, Weekday};

use crate::types::Frequency;

/// Highest day-of-month a template may be anchored to.
pub const MAX_DAY_OF_MONTH: u32 = 28;

/// Clamp a day-of-month anchor into `1..=28`.
pub fn clamp_day_of_month(day: u32) -> u32 {
    day.clamp(1, MAX_DAY_OF_MONTH)
}

/// Compute the next due instant strictly after `now`.
///
/// Weekly and biweekly schedules land on `day_of_week`; the calendar-based
/// ones add whole months and then pin the day to the clamped anchor. The
/// time of day is carried over from `now`.
pub fn next_date(
    frequency: Frequency,
    day_of_month: u32,
    day_of_week: Weekday,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match frequency {
        Frequency::Weekly => now + Duration::days(days_until(now.weekday(), day_of_week, 7)),
        Frequency::Biweekly => now + Duration::days(days_until(now.weekday(), day_of_week, 14)),
        Frequency::Monthly => add_months_anchored(now, 1, day_of_month),
        Frequency::Quarterly => add_months_anchored(now, 3, day_of_month),
        Frequency::Yearly => add_months_anchored(now, 12, day_of_month),
    }
}

/// Days from `from` to the next `to`; a full `cycle` when they coincide.
fn days_until(from: Weekday, to: Weekday, cycle: i64) -> i64 {
    let ahead =
        (to.num_days_from_monday() as i64 - from.num_days_from_monday() as i64).rem_euclid(7);
    if ahead == 0 {
        cycle
    } else {
        ahead
    }
}

fn add_months_anchored(now: DateTime<Utc>, months: u32, day_of_month: u32) -> DateTime<Utc> {
    let day = clamp_day_of_month(day_of_month);
    // Step from the 1st so a long month never overflows into the one after.
    now.date_naive()
        .with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(months)))
        .and_then(|d| d.with_day(day))
        .map(|d| d.and_time(now.time()).and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Last calendar day of the month containing `date`.
pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next_first| next_first.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    #[test]
    fn monthly_clamps_day_31_to_28() {
        let next = next_date(Frequency::Monthly, 31, Weekday::Mon, at(2024, 1, 15));
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
    }

    #[test]
    fn monthly_from_end_of_january_stays_in_february() {
        let next = next_date(Frequency::Monthly, 28, Weekday::Mon, at(2024, 1, 31));
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
    }

    #[test]
    fn monthly_keeps_time_of_day() {
        let next = next_date(Frequency::Monthly, 15, Weekday::Mon, at(2024, 3, 16));
        assert_eq!(next, at(2024, 4, 15));
    }

    #[test]
    fn every_frequency_clamps_anchors_above_28() {
        let now = at(2024, 5, 17);
        for frequency in Frequency::ALL {
            let clamped = next_date(frequency, 28, Weekday::Wed, now);
            for anchor in 29..=40 {
                assert_eq!(
                    next_date(frequency, anchor, Weekday::Wed, now),
                    clamped,
                    "{frequency} with anchor {anchor}"
                );
            }
            if matches!(frequency, Frequency::Monthly | Frequency::Quarterly | Frequency::Yearly) {
                assert_eq!(clamped.day(), 28);
            }
        }
    }

    #[test]
    fn zero_anchor_is_raised_to_first() {
        let next = next_date(Frequency::Monthly, 0, Weekday::Mon, at(2024, 1, 15));
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn weekly_on_anchor_day_advances_a_full_week() {
        // 2024-01-15 is a Monday.
        let monday = at(2024, 1, 15);
        assert_eq!(monday.weekday(), Weekday::Mon);
        let next = next_date(Frequency::Weekly, 1, Weekday::Mon, monday);
        assert_eq!(next, at(2024, 1, 22));
        assert_ne!(next, monday);
    }

    #[test]
    fn weekly_moves_to_next_anchor_occurrence() {
        // Wednesday -> Friday of the same week, Friday -> Monday after the weekend.
        assert_eq!(
            next_date(Frequency::Weekly, 1, Weekday::Fri, at(2024, 1, 17)),
            at(2024, 1, 19)
        );
        assert_eq!(
            next_date(Frequency::Weekly, 1, Weekday::Mon, at(2024, 1, 19)),
            at(2024, 1, 22)
        );
    }

    #[test]
    fn biweekly_on_anchor_day_advances_two_weeks() {
        let next = next_date(Frequency::Biweekly, 1, Weekday::Mon, at(2024, 1, 15));
        assert_eq!(next, at(2024, 1, 29));
    }

    #[test]
    fn biweekly_off_anchor_goes_to_next_occurrence_only() {
        let next = next_date(Frequency::Biweekly, 1, Weekday::Mon, at(2024, 1, 17));
        assert_eq!(next, at(2024, 1, 22));
    }

    #[test]
    fn quarterly_and_yearly_add_calendar_months() {
        assert_eq!(
            next_date(Frequency::Quarterly, 10, Weekday::Mon, at(2024, 11, 20)),
            at(2025, 2, 10)
        );
        assert_eq!(
            next_date(Frequency::Yearly, 31, Weekday::Mon, at(2024, 2, 29)),
            at(2025, 2, 28)
        );
    }

    #[test]
    fn next_date_is_always_after_now() {
        let now = at(2024, 12, 31);
        for frequency in Frequency::ALL {
            for anchor in [1, 15, 28, 31] {
                assert!(next_date(frequency, anchor, Weekday::Tue, now) > now);
            }
        }
    }

    #[test]
    fn last_day_handles_leap_years() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(last_day_of_month(d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(last_day_of_month(d(2023, 2, 1)), d(2023, 2, 28));
        assert_eq!(last_day_of_month(d(2024, 12, 31)), d(2024, 12, 31));
    }
}
