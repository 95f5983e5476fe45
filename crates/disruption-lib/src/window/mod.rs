//! Disruption window evaluation
//!
//! A window opens at every firing of the workload's schedule and stays open
//! for the configured duration (at least three hours). Evaluation walks back
//! by the duration and asks whether the schedule fired between that
//! checkpoint and now. Misconfiguration fails open: an unparsable schedule
//! never blocks disruption.

mod duration;
mod schedule;

pub use duration::parse_duration;
pub use schedule::WindowSchedule;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::WindowError;
use crate::observability::{AnnotationType, MetricsSink};

/// Minimum window length, also used when no valid duration is configured
pub fn minimum_window_duration() -> Duration {
    Duration::hours(3)
}

/// Parse a schedule annotation
pub fn parse_schedule(expr: &str) -> Result<WindowSchedule, WindowError> {
    WindowSchedule::from_str(expr).map_err(|reason| WindowError::InvalidSchedule {
        expr: expr.to_string(),
        reason,
    })
}

/// Parse a duration annotation and enforce the floor
pub fn parse_window_duration(value: &str) -> Result<Duration, WindowError> {
    let parsed = parse_duration(value).map_err(|reason| WindowError::InvalidDuration {
        value: value.to_string(),
        reason,
    })?;
    if parsed < minimum_window_duration() {
        return Err(WindowError::DurationBelowFloor {
            value: value.to_string(),
            floor: "3h".to_string(),
        });
    }
    Ok(parsed)
}

/// Why a window is considered active or closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// No schedule configured
    Unrestricted,
    /// Schedule failed to parse, failing open
    InvalidSchedule,
    /// Schedule never fires again, failing open
    NeverFires,
    /// Inside the window opened at `anchor`
    Open,
    /// Outside any window; the next one opens at `anchor`
    Closed,
}

/// Result of evaluating one workload's window
#[derive(Debug, Clone, Serialize)]
pub struct WindowStatus {
    pub active: bool,
    pub state: WindowState,
    /// Effective window length after defaults are applied
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    /// The firing the decision hinged on: when the current window opened,
    /// or when the next one will
    pub anchor: Option<DateTime<Utc>>,
}

fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_seconds())
}

/// Evaluates disruption windows, reporting malformed annotations
pub struct WindowEvaluator<'a> {
    metrics: &'a dyn MetricsSink,
}

impl<'a> WindowEvaluator<'a> {
    pub fn new(metrics: &'a dyn MetricsSink) -> Self {
        Self { metrics }
    }

    /// Whether `now` falls inside a window of `schedule`
    ///
    /// `subject` names the workload on parse-failure metrics and logs.
    pub fn is_active(&self, subject: &str, schedule: &str, duration: &str, now: DateTime<Utc>) -> bool {
        self.evaluate(subject, schedule, duration, now).active
    }

    /// Full evaluation including the effective duration and anchor firing
    pub fn evaluate(
        &self,
        subject: &str,
        schedule: &str,
        duration: &str,
        now: DateTime<Utc>,
    ) -> WindowStatus {
        if schedule.is_empty() {
            return WindowStatus {
                active: true,
                state: WindowState::Unrestricted,
                duration: minimum_window_duration(),
                anchor: None,
            };
        }

        let parsed = match parse_schedule(schedule) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(subject = %subject, error = %e, "Failed to parse disruption window schedule");
                self.metrics
                    .inc_annotation_parse_failed(AnnotationType::DisruptionWindowSchedule, subject);
                return WindowStatus {
                    active: true,
                    state: WindowState::InvalidSchedule,
                    duration: minimum_window_duration(),
                    anchor: None,
                };
            }
        };

        let window = self.resolve_duration(subject, duration);
        let checkpoint = now - window;
        match parsed.next_after(checkpoint) {
            Some(firing) if firing <= now => WindowStatus {
                active: true,
                state: WindowState::Open,
                duration: window,
                anchor: Some(firing),
            },
            Some(firing) => {
                debug!(subject = %subject, next_window = %firing, "Disruption window closed");
                WindowStatus {
                    active: false,
                    state: WindowState::Closed,
                    duration: window,
                    anchor: Some(firing),
                }
            }
            None => {
                warn!(subject = %subject, schedule = %schedule, "Disruption window schedule never fires, treating window as open");
                WindowStatus {
                    active: true,
                    state: WindowState::NeverFires,
                    duration: window,
                    anchor: None,
                }
            }
        }
    }

    fn resolve_duration(&self, subject: &str, duration: &str) -> Duration {
        if duration.is_empty() {
            return minimum_window_duration();
        }
        match parse_window_duration(duration) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(subject = %subject, error = %e, "Invalid or too short disruption window duration, using default of 3 hours");
                self.metrics
                    .inc_annotation_parse_failed(AnnotationType::DisruptionWindowDuration, subject);
                minimum_window_duration()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::InMemoryMetrics;
    use chrono::TimeZone;

    const SUBJECT: &str = "test-namespace/test-pod";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_empty_schedule_is_always_active() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        for hour in 0..24 {
            let t = Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap();
            assert!(evaluator.is_active(SUBJECT, "", "", t));
        }
        assert_eq!(
            metrics.parse_failure_count(AnnotationType::DisruptionWindowDuration, SUBJECT),
            0
        );
    }

    #[test]
    fn test_every_minute_schedule_is_active() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);
        assert!(evaluator.is_active(SUBJECT, "* * * * *", "3h", now()));
        assert!(evaluator.is_active(SUBJECT, "* * * * *", "", now()));
    }

    #[test]
    fn test_invalid_schedule_fails_open_and_is_counted_once() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        let status = evaluator.evaluate(SUBJECT, "hello", "", now());

        assert!(status.active);
        assert_eq!(status.state, WindowState::InvalidSchedule);
        assert_eq!(
            metrics.parse_failure_count(AnnotationType::DisruptionWindowSchedule, SUBJECT),
            1
        );
    }

    #[test]
    fn test_weekday_seven_is_sunday_not_a_parse_failure() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);
        // 2024-05-05 is a Sunday
        let sunday = Utc.with_ymd_and_hms(2024, 5, 5, 10, 0, 0).unwrap();

        let status = evaluator.evaluate(SUBJECT, "0 9 * * 7", "3h", sunday);

        assert!(status.active);
        assert_eq!(status.state, WindowState::Open);
        assert_eq!(
            status.anchor,
            Some(Utc.with_ymd_and_hms(2024, 5, 5, 9, 0, 0).unwrap())
        );
        assert!(metrics.parse_failures().is_empty());

        let closed = evaluator.evaluate(SUBJECT, "0 9 * * 7", "3h", now());
        assert_eq!(closed.state, WindowState::Closed);
        assert!(metrics.parse_failures().is_empty());
    }

    #[test]
    fn test_duration_ignored_without_schedule() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        assert!(evaluator.is_active(SUBJECT, "", "1h", now()));
        assert_eq!(
            metrics.parse_failure_count(AnnotationType::DisruptionWindowDuration, SUBJECT),
            0
        );
    }

    #[test]
    fn test_short_duration_uses_default_and_is_counted() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        let status = evaluator.evaluate(SUBJECT, "* * * * *", "1h", now());

        assert!(status.active);
        assert_eq!(status.duration, Duration::hours(3));
        assert_eq!(
            metrics.parse_failure_count(AnnotationType::DisruptionWindowDuration, SUBJECT),
            1
        );
    }

    #[test]
    fn test_unparsable_duration_uses_default_and_is_counted() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        let status = evaluator.evaluate(SUBJECT, "* * * * *", "three hours", now());

        assert_eq!(status.duration, Duration::hours(3));
        assert_eq!(
            metrics.parse_failure_count(AnnotationType::DisruptionWindowDuration, SUBJECT),
            1
        );
    }

    #[test]
    fn test_duration_at_floor_is_accepted() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        let status = evaluator.evaluate(SUBJECT, "* * * * *", "3h", now());

        assert_eq!(status.duration, Duration::hours(3));
        assert_eq!(
            metrics.parse_failure_count(AnnotationType::DisruptionWindowDuration, SUBJECT),
            0
        );
    }

    #[test]
    fn test_window_opened_four_hours_ago_is_closed() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        // Fires at 08:30, now is 12:30
        assert!(!evaluator.is_active(SUBJECT, "30 8 * * *", "3h", now()));
        assert!(!evaluator.is_active(SUBJECT, "30 8 * * *", "4h", now()));

        let status = evaluator.evaluate(SUBJECT, "30 8 * * *", "4h", now());
        assert_eq!(status.state, WindowState::Closed);
        assert_eq!(
            status.anchor,
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_window_inside_duration_is_open() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        let status = evaluator.evaluate(SUBJECT, "30 8 * * *", "5h", now());
        assert!(status.active);
        assert_eq!(
            status.anchor,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap())
        );

        // Firing exactly now opens the window
        assert!(evaluator.is_active(SUBJECT, "30 12 * * *", "3h", now()));
    }

    #[test]
    fn test_activity_is_stable_within_the_minute() {
        let metrics = InMemoryMetrics::new();
        let evaluator = WindowEvaluator::new(&metrics);

        for second in [0, 15, 59] {
            let t = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, second).unwrap();
            assert!(evaluator.is_active(SUBJECT, "0 9 * * *", "3h", t));
        }
    }

    #[test]
    fn test_parse_window_duration_errors() {
        assert!(matches!(
            parse_window_duration("1h"),
            Err(WindowError::DurationBelowFloor { .. })
        ));
        assert!(matches!(
            parse_window_duration("soon"),
            Err(WindowError::InvalidDuration { .. })
        ));
        assert_eq!(parse_window_duration("3h").unwrap(), Duration::hours(3));
    }
}
