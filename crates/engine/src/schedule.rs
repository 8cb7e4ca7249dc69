//! Schedule calculator — pure interval arithmetic, no store access.

use chrono::{DateTime, Duration, Months, Utc};
use tracing::warn;

use crate::types::{IntervalKind, IntervalSpec};

/// Computes the next eligible run time after `reference`, respecting an
/// optional end date.
///
/// - daily: reference + `every` days
/// - weekly: reference + `every` * 7 days
/// - monthly: calendar month arithmetic; day-of-month is clamped to the last
///   day of the target month (Jan 31 + 1 month = Feb 29/28)
/// - custom: daily fallback until a real cron engine is plugged in
///
/// Returns `None` when the computed time would exceed `end`, meaning the
/// campaign has no further firings.
pub fn next_occurrence(
    interval: &IntervalSpec,
    reference: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let every = interval.every.max(1);

    let next = match &interval.kind {
        IntervalKind::Daily => reference.checked_add_signed(Duration::days(every as i64))?,
        IntervalKind::Weekly => {
            reference.checked_add_signed(Duration::days(every as i64 * 7))?
        }
        IntervalKind::Monthly => reference.checked_add_months(Months::new(every))?,
        IntervalKind::Custom { descriptor } => {
            warn!(
                descriptor = %descriptor,
                "Custom schedule descriptors are not implemented, falling back to daily"
            );
            reference.checked_add_signed(Duration::days(every as i64))?
        }
    };

    match end {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn spec(kind: IntervalKind, every: u32) -> IntervalSpec {
        IntervalSpec { kind, every }
    }

    #[test]
    fn test_daily_multiplier() {
        let next = next_occurrence(&spec(IntervalKind::Daily, 2), utc(2024, 1, 1), None);
        assert_eq!(next, Some(utc(2024, 1, 3)));
    }

    #[test]
    fn test_weekly_exceeds_end_date() {
        let next = next_occurrence(
            &spec(IntervalKind::Weekly, 1),
            utc(2024, 1, 1),
            Some(utc(2024, 1, 5)),
        );
        assert_eq!(next, None);
    }

    #[test]
    fn test_weekly_within_end_date() {
        let next = next_occurrence(
            &spec(IntervalKind::Weekly, 2),
            utc(2024, 1, 1),
            Some(utc(2024, 2, 1)),
        );
        assert_eq!(next, Some(utc(2024, 1, 15)));
    }

    #[test]
    fn test_monthly_preserves_day() {
        let next = next_occurrence(&spec(IntervalKind::Monthly, 1), utc(2024, 3, 15), None);
        assert_eq!(next, Some(utc(2024, 4, 15)));
    }

    #[test]
    fn test_monthly_clamps_overflow_day() {
        // 2024 is a leap year.
        let next = next_occurrence(&spec(IntervalKind::Monthly, 1), utc(2024, 1, 31), None);
        assert_eq!(next, Some(utc(2024, 2, 29)));

        let next = next_occurrence(&spec(IntervalKind::Monthly, 1), utc(2023, 1, 31), None);
        assert_eq!(next, Some(utc(2023, 2, 28)));
    }

    #[test]
    fn test_monthly_multiplier() {
        let next = next_occurrence(&spec(IntervalKind::Monthly, 3), utc(2024, 1, 10), None);
        assert_eq!(next, Some(utc(2024, 4, 10)));
    }

    #[test]
    fn test_custom_falls_back_to_daily() {
        let next = next_occurrence(
            &spec(
                IntervalKind::Custom {
                    descriptor: "0 9 * * MON".to_string(),
                },
                1,
            ),
            utc(2024, 1, 1),
            None,
        );
        assert_eq!(next, Some(utc(2024, 1, 2)));
    }

    #[test]
    fn test_end_date_boundary_inclusive() {
        // Landing exactly on the end date still fires.
        let next = next_occurrence(
            &spec(IntervalKind::Daily, 4),
            utc(2024, 1, 1),
            Some(utc(2024, 1, 5)),
        );
        assert_eq!(next, Some(utc(2024, 1, 5)));
    }

    #[test]
    fn test_zero_multiplier_treated_as_one() {
        let next = next_occurrence(&spec(IntervalKind::Daily, 0), utc(2024, 1, 1), None);
        assert_eq!(next, Some(utc(2024, 1, 2)));
    }
}
