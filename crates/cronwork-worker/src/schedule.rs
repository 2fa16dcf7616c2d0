//! Five-field cron expressions.
//!
//! Expressions use the classic `minute hour day-of-month month day-of-week`
//! layout with Sunday as `0` (or `7`). They are translated into the
//! seconds-first dialect of the `cron` crate, which numbers weekdays from
//! Sunday = 1, by pinning seconds to `0` and spelling numeric weekdays out
//! as names.
//!
//! When both day-of-month and day-of-week are restricted (neither starts
//! with `*` or `?`), a day matches if *either* field matches. The `cron`
//! crate requires both, so such expressions are split into a day-of-month
//! schedule and a day-of-week schedule and the earlier fire time wins.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use cronwork_core::error::AppError;
use cronwork_core::result::AppResult;

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A validated cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedules: Vec<Schedule>,
}

impl CronSchedule {
    /// Parse and validate a five-field expression.
    ///
    /// Fails with a configuration error when the expression is malformed or
    /// can never fire (e.g. February 30th).
    pub fn parse(expression: &str) -> AppResult<Self> {
        let schedules = translate(expression)?
            .iter()
            .map(|translated| {
                Schedule::from_str(translated).map_err(|e| {
                    AppError::configuration(format!(
                        "Invalid cron expression '{expression}': {e}"
                    ))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let parsed = Self {
            expression: expression.split_whitespace().collect::<Vec<_>>().join(" "),
            schedules,
        };

        if parsed.next_after(Utc::now()).is_none() {
            return Err(AppError::configuration(format!(
                "Cron expression '{expression}' never fires"
            )));
        }

        Ok(parsed)
    }

    /// The expression as written, whitespace-normalized.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching instant strictly after `anchor`.
    pub fn next_after(&self, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&anchor).next())
            .min()
    }
}

impl FromStr for CronSchedule {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Translate into one `cron` crate expression, or two when the day fields
/// are alternatives.
fn translate(expression: &str) -> AppResult<Vec<String>> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(AppError::configuration(format!(
            "Invalid cron expression '{expression}': expected 5 fields \
             (minute hour day-of-month month day-of-week), got {}",
            fields.len()
        )));
    }

    let day_of_week = translate_day_of_week(fields[4]).map_err(|reason| {
        AppError::configuration(format!("Invalid cron expression '{expression}': {reason}"))
    })?;

    let (minute, hour, day_of_month, month) = (fields[0], fields[1], fields[2], fields[3]);

    if is_restricted(day_of_month) && is_restricted(fields[4]) {
        return Ok(vec![
            format!("0 {minute} {hour} {day_of_month} {month} *"),
            format!("0 {minute} {hour} * {month} {day_of_week}"),
        ]);
    }

    Ok(vec![format!(
        "0 {minute} {hour} {day_of_month} {month} {day_of_week}"
    )])
}

/// A day field starting with `*` or `?` leaves the other day field in charge.
fn is_restricted(field: &str) -> bool {
    !field.starts_with(['*', '?'])
}

/// Rewrite numeric weekday items as names; named items pass through.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    let mut items: Vec<String> = Vec::new();

    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("bad day-of-week step '{step}'"))?;
                if step == 0 {
                    return Err("day-of-week step must be positive".to_string());
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let bounds = match range {
            "*" | "?" => match step {
                None => {
                    items.push("*".to_string());
                    continue;
                }
                Some(_) => Some((0, 6)),
            },
            _ => match range.split_once('-') {
                Some((start, end)) => match (weekday_number(start)?, weekday_number(end)?) {
                    (Some(start), Some(end)) => Some((start, end)),
                    (None, None) => None,
                    _ => return Err(format!("cannot mix names and numbers in '{range}'")),
                },
                None => weekday_number(range)?.map(|n| if step.is_some() { (n, 6) } else { (n, n) }),
            },
        };

        match bounds {
            Some((start, end)) => {
                if start > end {
                    return Err(format!("day-of-week range '{range}' is reversed"));
                }
                for day in (start..=end).step_by(step.unwrap_or(1) as usize) {
                    let name = WEEKDAYS[(day % 7) as usize].to_string();
                    if !items.contains(&name) {
                        items.push(name);
                    }
                }
            }
            None => items.push(item.to_string()),
        }
    }

    Ok(items.join(","))
}

/// `Ok(Some(n))` for `0..=7`, `Ok(None)` for a non-numeric token.
fn weekday_number(token: &str) -> Result<Option<u32>, String> {
    if !token.chars().all(|c| c.is_ascii_digit()) || token.is_empty() {
        return Ok(None);
    }
    match token.parse::<u32>() {
        Ok(n) if n <= 7 => Ok(Some(n)),
        _ => Err(format!("day-of-week value '{token}' out of range 0-7")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().expect("valid date")
    }

    #[test]
    fn test_every_minute_is_strictly_after_anchor() {
        let schedule = CronSchedule::parse("* * * * *").expect("parse");
        let on_boundary = utc(2024, 3, 1, 12, 0, 0);
        assert_eq!(
            schedule.next_after(on_boundary),
            Some(utc(2024, 3, 1, 12, 1, 0))
        );

        let mid_minute = utc(2024, 3, 1, 12, 0, 30);
        assert_eq!(
            schedule.next_after(mid_minute),
            Some(utc(2024, 3, 1, 12, 1, 0))
        );
    }

    #[test]
    fn test_consecutive_fires_strictly_increase_and_match() {
        let schedule = CronSchedule::parse("*/15 9-17 * * 1-5").expect("parse");
        let mut anchor = utc(2024, 3, 1, 16, 50, 0);

        for _ in 0..50 {
            let next = schedule.next_after(anchor).expect("fires");
            assert!(next > anchor);
            assert_eq!(next.second(), 0);
            assert_eq!(next.minute() % 15, 0);
            assert!((9..=17).contains(&next.hour()));
            assert!(!matches!(next.weekday(), Weekday::Sat | Weekday::Sun));
            anchor = next;
        }
    }

    #[test]
    fn test_sunday_as_zero_and_seven() {
        // 2024-03-01 is a Friday.
        let friday = utc(2024, 3, 1, 0, 0, 0);
        for expr in ["0 8 * * 0", "0 8 * * 7", "0 8 * * SUN"] {
            let next = CronSchedule::parse(expr)
                .expect("parse")
                .next_after(friday)
                .expect("fires");
            assert_eq!(next, utc(2024, 3, 3, 8, 0, 0), "{expr}");
        }
    }

    #[test]
    fn test_weekday_range_wrapping_to_seven() {
        let schedule = CronSchedule::parse("0 0 * * 5-7").expect("parse");
        let thursday = utc(2024, 2, 29, 12, 0, 0);
        let fires: Vec<Weekday> = std::iter::successors(schedule.next_after(thursday), |t| {
            schedule.next_after(*t)
        })
        .take(3)
        .map(|t| t.weekday())
        .collect();
        assert_eq!(fires, vec![Weekday::Fri, Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn test_restricted_day_fields_match_either() {
        // 2024-09-30 is a Monday; the 1st of October comes first.
        let schedule = CronSchedule::parse("0 0 1 * 1").expect("parse");
        let monday_noon = utc(2024, 9, 30, 12, 0, 0);

        let first = schedule.next_after(monday_noon).expect("fires");
        assert_eq!(first, utc(2024, 10, 1, 0, 0, 0));

        let second = schedule.next_after(first).expect("fires");
        assert_eq!(second, utc(2024, 10, 7, 0, 0, 0));
    }

    #[test]
    fn test_day_lists_with_weekday_fire_on_every_match() {
        let schedule = CronSchedule::parse("0 0 1,15 * 5").expect("parse");
        let fires: Vec<DateTime<Utc>> =
            std::iter::successors(schedule.next_after(utc(2024, 2, 29, 12, 0, 0)), |t| {
                schedule.next_after(*t)
            })
            .take(5)
            .collect();

        assert_eq!(
            fires,
            vec![
                utc(2024, 3, 1, 0, 0, 0),
                utc(2024, 3, 8, 0, 0, 0),
                utc(2024, 3, 15, 0, 0, 0),
                utc(2024, 3, 22, 0, 0, 0),
                utc(2024, 3, 29, 0, 0, 0),
            ]
        );
    }

    #[test]
    fn test_starred_day_field_keeps_single_schedule() {
        assert_eq!(
            translate("0 0 1 * *").unwrap(),
            vec!["0 0 0 1 * *".to_string()]
        );
        assert_eq!(
            translate("0 0 1 * */2").unwrap(),
            vec!["0 0 0 1 * SUN,TUE,THU,SAT".to_string()]
        );
        assert_eq!(translate("30 6 13 * FRI").unwrap().len(), 2);
    }

    #[test]
    fn test_impossible_day_still_fires_on_weekday() {
        // February 30th never exists, but Mondays in February do.
        let schedule = CronSchedule::parse("0 0 30 2 1").expect("parse");
        let next = schedule
            .next_after(utc(2024, 1, 31, 0, 0, 0))
            .expect("fires");
        assert_eq!(next, utc(2024, 2, 5, 0, 0, 0));
    }

    #[test]
    fn test_day_of_week_translation() {
        assert_eq!(translate_day_of_week("*").unwrap(), "*");
        assert_eq!(translate_day_of_week("1-5").unwrap(), "MON,TUE,WED,THU,FRI");
        assert_eq!(translate_day_of_week("*/2").unwrap(), "SUN,TUE,THU,SAT");
        assert_eq!(translate_day_of_week("0,7").unwrap(), "SUN");
        assert_eq!(translate_day_of_week("MON-FRI").unwrap(), "MON-FRI");
        assert!(translate_day_of_week("8").is_err());
        assert!(translate_day_of_week("5-1").is_err());
        assert!(translate_day_of_week("MON-5").is_err());
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        for expr in ["", "* * * *", "0 * * * * *", "0 0 * * * * 2030"] {
            let err = CronSchedule::parse(expr).unwrap_err();
            assert_eq!(err.kind, cronwork_core::ErrorKind::Configuration, "{expr}");
        }
    }

    #[test]
    fn test_out_of_range_fields_rejected() {
        assert!(CronSchedule::parse("61 * * * *").is_err());
        assert!(CronSchedule::parse("* 25 * * *").is_err());
        assert!(CronSchedule::parse("* * * 13 *").is_err());
        assert!(CronSchedule::parse("every minute please").is_err());
    }

    #[test]
    fn test_never_firing_expression_rejected() {
        let err = CronSchedule::parse("0 0 30 2 *").unwrap_err();
        assert!(err.message.contains("never fires"));
    }

    #[test]
    fn test_expression_is_whitespace_normalized() {
        let schedule: CronSchedule = "0   6  * * *".parse().expect("parse");
        assert_eq!(schedule.expression(), "0 6 * * *");
        assert_eq!(schedule.to_string(), "0 6 * * *");
    }
}
