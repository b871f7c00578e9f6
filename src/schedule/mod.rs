//! Five-field cron schedules with real next-fire computation.
//!
//! Supported grammar per field: `*`, single values, names for months and
//! weekdays (`jan`, `mon`), lists (`1,15`), ranges (`1-5`), and steps
//! (`*/15`, `2-10/2`, `5/15`). Day-of-month and day-of-week follow the
//! classic cron rule: when both are restricted, a day matching *either*
//! fires. Weekday 7 is an alias for Sunday.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use crate::core::errors::{DswError, Result};

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Upper bound on the next-fire search. Four years plus slack covers
/// leap-day-only schedules from any starting point.
const SEARCH_HORIZON_DAYS: i64 = 1_466;

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    expression: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    days_of_week: BTreeSet<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl Schedule {
    /// Parse a five-field cron expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                expression,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let (minutes, _) =
            parse_field(fields[0], 0, 59, &[], 0).map_err(|d| invalid(expression, d))?;
        let (hours, _) =
            parse_field(fields[1], 0, 23, &[], 0).map_err(|d| invalid(expression, d))?;
        let (days_of_month, dom_restricted) =
            parse_field(fields[2], 1, 31, &[], 0).map_err(|d| invalid(expression, d))?;
        let (months, _) =
            parse_field(fields[3], 1, 12, &MONTH_NAMES, 1).map_err(|d| invalid(expression, d))?;
        let (mut days_of_week, dow_restricted) =
            parse_field(fields[4], 0, 7, &DAY_NAMES, 0).map_err(|d| invalid(expression, d))?;

        // 7 is an alias for Sunday.
        if days_of_week.remove(&7) {
            days_of_week.insert(0);
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted,
            dow_restricted,
        })
    }

    /// The original expression text.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`, or `None` when no day
    /// within the search horizon matches (e.g. February 31st).
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = truncate_to_minute(after + Duration::minutes(1))?;
        let limit = after + Duration::days(SEARCH_HORIZON_DAYS);

        while t <= limit {
            if !self.months.contains(&t.month()) {
                t = start_of_next_month(&t)?;
                continue;
            }
            if !self.day_matches(&t) {
                t = start_of_next_day(&t)?;
                continue;
            }
            if !self.hours.contains(&t.hour()) {
                t = start_of_next_hour(&t)?;
                continue;
            }
            if self.minutes.contains(&t.minute()) {
                return Some(t);
            }
            t += Duration::minutes(1);
        }
        None
    }

    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let dom = self.days_of_month.contains(&t.day());
        let dow = self
            .days_of_week
            .contains(&t.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn invalid(expression: &str, details: impl Into<String>) -> DswError {
    DswError::InvalidSchedule {
        expression: expression.to_string(),
        details: details.into(),
    }
}

/// Parse one cron field into its value set plus whether it restricts
/// anything (`*` alone does not).
fn parse_field(
    field: &str,
    min: u32,
    max: u32,
    names: &[&str],
    name_base: u32,
) -> std::result::Result<(BTreeSet<u32>, bool), String> {
    if field == "*" {
        return Ok(((min..=max).collect(), false));
    }

    let mut values = BTreeSet::new();
    for item in field.split(',') {
        if item.is_empty() {
            return Err(format!("empty list item in {field:?}"));
        }

        let (spec, step) = match item.split_once('/') {
            Some((spec, step_text)) => {
                let step: u32 = step_text
                    .parse()
                    .map_err(|_| format!("invalid step in {item:?}"))?;
                if step == 0 {
                    return Err(format!("step must be positive in {item:?}"));
                }
                (spec, step)
            }
            None => (item, 1),
        };

        let (lo, hi) = if spec == "*" {
            (min, max)
        } else if let Some((a, b)) = spec.split_once('-') {
            (
                parse_value(a, names, name_base)?,
                parse_value(b, names, name_base)?,
            )
        } else {
            let v = parse_value(spec, names, name_base)?;
            // "5/15" means "from 5 to the end, every 15", per classic cron.
            if step == 1 { (v, v) } else { (v, max) }
        };

        if lo < min || hi > max {
            return Err(format!("value out of range {min}-{max} in {item:?}"));
        }
        if lo > hi {
            return Err(format!("inverted range in {item:?}"));
        }

        let mut v = lo;
        while v <= hi {
            values.insert(v);
            v = match v.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    }

    Ok((values, true))
}

fn parse_value(
    text: &str,
    names: &[&str],
    name_base: u32,
) -> std::result::Result<u32, String> {
    if let Ok(v) = text.parse::<u32>() {
        return Ok(v);
    }
    names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(text))
        .and_then(|idx| u32::try_from(idx).ok())
        .map(|idx| idx + name_base)
        .ok_or_else(|| format!("invalid value {text:?}"))
}

fn truncate_to_minute(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    t.with_second(0)?.with_nanosecond(0)
}

fn start_of_next_hour(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next = *t + Duration::hours(1);
    Utc.with_ymd_and_hms(next.year(), next.month(), next.day(), next.hour(), 0, 0)
        .single()
}

fn start_of_next_day(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next = *t + Duration::days(1);
    Utc.with_ymd_and_hms(next.year(), next.month(), next.day(), 0, 0, 0)
        .single()
}

fn start_of_next_month(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn five_fields_required() {
        for expr in ["", "0 3 * *", "0 3 * * * *", "0  3"] {
            let err = Schedule::parse(expr).unwrap_err();
            assert_eq!(err.code(), "DSW-1004", "{expr:?}");
        }
    }

    #[test]
    fn invalid_fields_rejected() {
        for expr in [
            "61 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * 32 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "a * * * *",
            "1,,2 * * * *",
            "* * * janx *",
        ] {
            assert!(Schedule::parse(expr).is_err(), "{expr:?} should be rejected");
        }
    }

    #[test]
    fn daily_at_three() {
        let schedule = Schedule::parse("0 3 * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 2, 59)),
            Some(at(2026, 8, 21, 3, 0))
        );
        // Strictly after: a fire time maps to the next day.
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 3, 0)),
            Some(at(2026, 8, 22, 3, 0))
        );
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 4, 30)),
            Some(at(2026, 8, 22, 3, 0))
        );
    }

    #[test]
    fn quarter_hour_steps() {
        let schedule = Schedule::parse("*/15 * * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 10, 7)),
            Some(at(2026, 8, 21, 10, 15))
        );
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 10, 45)),
            Some(at(2026, 8, 21, 11, 0))
        );
    }

    #[test]
    fn offset_step_runs_to_end_of_range() {
        // "5/15" = 5, 20, 35, 50.
        let schedule = Schedule::parse("5/15 * * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 10, 21)),
            Some(at(2026, 8, 21, 10, 35))
        );
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 10, 51)),
            Some(at(2026, 8, 21, 11, 5))
        );
    }

    #[test]
    fn oversized_step_yields_single_value() {
        let schedule = Schedule::parse("5/4294967295 * * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 10, 6)),
            Some(at(2026, 8, 21, 11, 5))
        );
    }

    #[test]
    fn day_of_month_list() {
        let schedule = Schedule::parse("0 0 1,15 * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 1, 16, 12, 0)),
            Some(at(2026, 2, 1, 0, 0))
        );
        assert_eq!(
            schedule.next_after(at(2026, 2, 1, 0, 0)),
            Some(at(2026, 2, 15, 0, 0))
        );
    }

    #[test]
    fn weekday_range() {
        // 2026-08-22 is a Saturday.
        let schedule = Schedule::parse("30 9 * * 1-5").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 8, 22, 0, 0)),
            Some(at(2026, 8, 24, 9, 30))
        );
    }

    #[test]
    fn stepped_hour_range() {
        let schedule = Schedule::parse("0 */6 * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 0, 0)),
            Some(at(2026, 8, 21, 6, 0))
        );
        assert_eq!(
            schedule.next_after(at(2026, 8, 21, 19, 0)),
            Some(at(2026, 8, 22, 0, 0))
        );
    }

    #[test]
    fn month_and_weekday_names() {
        // 2026-01-01 is a Thursday; the first Monday of 2026 is Jan 5.
        let schedule = Schedule::parse("0 9 * jan mon").unwrap();
        assert_eq!(
            schedule.next_after(at(2025, 12, 31, 0, 0)),
            Some(at(2026, 1, 5, 9, 0))
        );
        assert_eq!(
            schedule.next_after(at(2026, 1, 5, 9, 0)),
            Some(at(2026, 1, 12, 9, 0))
        );
    }

    #[test]
    fn seven_aliases_sunday() {
        let seven = Schedule::parse("0 0 * * 7").unwrap();
        let zero = Schedule::parse("0 0 * * 0").unwrap();
        // 2026-08-21 is a Friday; next Sunday is the 23rd.
        let after = at(2026, 8, 21, 12, 0);
        assert_eq!(seven.next_after(after), Some(at(2026, 8, 23, 0, 0)));
        assert_eq!(seven.next_after(after), zero.next_after(after));
    }

    #[test]
    fn dom_and_dow_fire_on_either() {
        // The 13th of any month, or any Friday.
        let schedule = Schedule::parse("0 0 13 * 5").unwrap();
        // 2026-08-13 is a Thursday and comes before Friday the 14th.
        assert_eq!(
            schedule.next_after(at(2026, 8, 9, 0, 0)),
            Some(at(2026, 8, 13, 0, 0))
        );
        assert_eq!(
            schedule.next_after(at(2026, 8, 13, 0, 0)),
            Some(at(2026, 8, 14, 0, 0))
        );
    }

    #[test]
    fn dom_alone_when_dow_unrestricted() {
        let schedule = Schedule::parse("0 0 13 * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 8, 14, 0, 0)),
            Some(at(2026, 9, 13, 0, 0))
        );
    }

    #[test]
    fn leap_day_schedule_waits_for_leap_year() {
        let schedule = Schedule::parse("0 0 29 2 *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 1, 1, 0, 0)),
            Some(at(2028, 2, 29, 0, 0))
        );
    }

    #[test]
    fn impossible_date_returns_none() {
        let schedule = Schedule::parse("0 0 31 2 *").unwrap();
        assert_eq!(schedule.next_after(at(2026, 1, 1, 0, 0)), None);
    }

    #[test]
    fn seconds_are_truncated() {
        let schedule = Schedule::parse("*/5 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 8, 21, 10, 4, 30).unwrap();
        assert_eq!(schedule.next_after(after), Some(at(2026, 8, 21, 10, 5)));
    }

    #[test]
    fn expression_is_preserved() {
        let schedule = Schedule::parse("0 3 * * *").unwrap();
        assert_eq!(schedule.expression(), "0 3 * * *");
        assert_eq!(schedule.to_string(), "0 3 * * *");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Daily schedules fire at exactly the requested wall-clock time,
        /// strictly after the reference point, within one day.
        #[test]
        fn daily_fire_matches_fields(
            minute in 0u32..60,
            hour in 0u32..24,
            offset_mins in 0i64..20_000,
        ) {
            let schedule = Schedule::parse(&format!("{minute} {hour} * * *")).unwrap();
            let after = at(2026, 3, 1, 0, 0) + Duration::minutes(offset_mins);
            let next = schedule.next_after(after).unwrap();
            prop_assert!(next > after);
            prop_assert_eq!(next.minute(), minute);
            prop_assert_eq!(next.hour(), hour);
            prop_assert!(next - after <= Duration::days(1));
        }

        /// Weekly schedules land on the requested weekday within seven days.
        #[test]
        fn weekly_fire_lands_on_weekday(
            dow in 0u32..7,
            offset_hours in 0i64..2_000,
        ) {
            let schedule = Schedule::parse(&format!("0 0 * * {dow}")).unwrap();
            let after = at(2026, 3, 1, 0, 0) + Duration::hours(offset_hours);
            let next = schedule.next_after(after).unwrap();
            prop_assert!(next > after);
            prop_assert_eq!(next.weekday().num_days_from_sunday(), dow);
            prop_assert!(next - after <= Duration::days(7));
        }
    }
}
