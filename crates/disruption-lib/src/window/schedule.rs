//! Five-field cron schedules for disruption windows, evaluated in UTC.
//!
//! The `cron` crate requires a leading seconds field and numbers weekdays
//! 1-7 from Sunday, while window annotations use the classic five-field
//! form with weekdays 0-7. Expressions are normalized before parsing:
//! seconds are pinned to 0, the weekday field is rewritten with names, and
//! a schedule restricting both day-of-month and day-of-week is split in two
//! so that either one matching fires the schedule.

use chrono::{DateTime, Duration, DurationRound, Utc};
use cron::Schedule;
use std::str::FromStr;

use super::duration::parse_duration;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// A parsed disruption window schedule
#[derive(Debug, Clone)]
pub struct WindowSchedule {
    kind: ScheduleKind,
}

#[derive(Debug, Clone)]
enum ScheduleKind {
    /// Fires whenever any of the schedules fires
    Cron(Vec<Schedule>),
    /// `@every <duration>`
    Every(Duration),
}

impl WindowSchedule {
    /// First firing strictly after `after`, if the schedule fires again at all
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Cron(schedules) => schedules
                .iter()
                .filter_map(|schedule| schedule.after(&after).next())
                .min(),
            ScheduleKind::Every(delay) => {
                let base = after.duration_trunc(Duration::seconds(1)).unwrap_or(after);
                Some(base + *delay)
            }
        }
    }
}

impl FromStr for WindowSchedule {
    type Err = String;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let expr = expr.trim();

        if let Some(descriptor) = expr.strip_prefix('@') {
            return parse_descriptor(descriptor);
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!("expected exactly 5 fields, found {}", fields.len()));
        }

        let minute = question_to_star(fields[0]);
        let hour = question_to_star(fields[1]);
        let dom = question_to_star(fields[2]);
        let month = question_to_star(fields[3]);
        let dow = normalize_weekdays(fields[4])?;

        let dom_restricted = !is_wildcard(&dom);
        let dow_restricted = dow != "*";

        let expressions = if dom_restricted && dow_restricted {
            vec![
                format!("0 {minute} {hour} {dom} {month} *"),
                format!("0 {minute} {hour} * {month} {dow}"),
            ]
        } else {
            vec![format!("0 {minute} {hour} {dom} {month} {dow}")]
        };

        let schedules = expressions
            .iter()
            .map(|e| Schedule::from_str(e).map_err(|err| err.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kind: ScheduleKind::Cron(schedules),
        })
    }
}

fn parse_descriptor(descriptor: &str) -> Result<WindowSchedule, String> {
    if let Some(delay) = descriptor.strip_prefix("every ") {
        let delay = parse_duration(delay.trim())?;
        if delay < Duration::zero() {
            return Err(format!("negative delay in @every: {delay}"));
        }
        // Whole seconds only, at least one
        let secs = delay.num_seconds().max(1);
        return Ok(WindowSchedule {
            kind: ScheduleKind::Every(Duration::seconds(secs)),
        });
    }

    let expanded = match descriptor {
        "yearly" | "annually" => "0 0 1 1 *",
        "monthly" => "0 0 1 * *",
        "weekly" => "0 0 * * 0",
        "daily" | "midnight" => "0 0 * * *",
        "hourly" => "0 * * * *",
        other => return Err(format!("unrecognized descriptor: @{other}")),
    };
    WindowSchedule::from_str(expanded)
}

fn question_to_star(field: &str) -> String {
    field.replace('?', "*")
}

/// A field is a wildcard when any of its items covers the full range with step 1
fn is_wildcard(field: &str) -> bool {
    field.split(',').any(|item| {
        let mut parts = item.splitn(2, '/');
        let range = parts.next().unwrap_or("");
        let step = parts.next();
        (range == "*" || range == "?") && matches!(step, None | Some("1"))
    })
}

fn weekday_number(token: &str) -> Result<u32, String> {
    if let Some(index) = WEEKDAYS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
    {
        return Ok(index as u32);
    }
    let value: u32 = token
        .parse()
        .map_err(|_| format!("invalid day of week {token:?}"))?;
    if value > 7 {
        return Err(format!("day of week {value} out of range 0-7"));
    }
    Ok(value)
}

/// Rewrite the weekday field as an explicit list of names, or `*`
fn normalize_weekdays(field: &str) -> Result<String, String> {
    if is_wildcard(field) {
        return Ok("*".to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step in {item:?}"))?;
                if step == 0 {
                    return Err(format!("step of zero in {item:?}"));
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if range == "*" || range == "?" {
            (0, 6)
        } else if let Some((low, high)) = range.split_once('-') {
            (weekday_number(low)?, weekday_number(high)?)
        } else {
            let start = weekday_number(range)?;
            // `N/step` runs to the end of the week
            if step.is_some() {
                (start, 6)
            } else {
                (start, start)
            }
        };

        if start > end {
            return Err(format!("range start exceeds end in {item:?}"));
        }

        let mut day = start;
        while day <= end {
            days[(day % 7) as usize] = true;
            day += step.unwrap_or(1);
        }
    }

    let names: Vec<&str> = days
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .map(|(i, _)| WEEKDAYS[i])
        .collect();
    Ok(names.join(","))
}
