//! Offline evaluation of a disruption window

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use disruption_lib::{InMemoryMetrics, WindowEvaluator, WindowState, WindowStatus};
use serde::Serialize;

use crate::output::{
    color_status, format_duration, format_instant, print_info, print_json, print_success,
    print_warning, OutputFormat,
};

const SUBJECT: &str = "dwctl";

#[derive(Serialize)]
struct WindowReport {
    schedule: String,
    duration: String,
    evaluated_at: DateTime<Utc>,
    #[serde(flatten)]
    status: WindowStatus,
    parse_failures: Vec<String>,
}

/// Parse `--at`, defaulting to the current time
pub fn evaluation_time(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid --at timestamp {:?}, expected RFC 3339", raw))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// Evaluate a schedule and duration at a point in time
pub fn show_window(
    schedule: &str,
    duration: Option<&str>,
    at: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let now = evaluation_time(at)?;
    let duration = duration.unwrap_or_default();

    let metrics = InMemoryMetrics::new();
    let status = WindowEvaluator::new(&metrics).evaluate(SUBJECT, schedule, duration, now);
    let parse_failures = metrics
        .parse_failures()
        .into_iter()
        .map(|(annotation, _, _)| annotation.to_string())
        .collect();

    let report = WindowReport {
        schedule: schedule.to_string(),
        duration: duration.to_string(),
        evaluated_at: now,
        status,
        parse_failures,
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &WindowReport) {
    println!("{}", "Disruption Window".bold());
    println!("{}", "=".repeat(50));
    println!("Schedule:     {}", report.schedule.cyan());
    println!("Evaluated at: {}", format_instant(Some(report.evaluated_at)));
    println!("Duration:     {}", format_duration(report.status.duration));
    println!("State:        {}", color_status(state_label(report.status.state)));

    match report.status.state {
        WindowState::Open => println!("Opened at:    {}", format_instant(report.status.anchor)),
        WindowState::Closed => println!("Next opens:   {}", format_instant(report.status.anchor)),
        _ => {}
    }
    println!();

    for failure in &report.parse_failures {
        print_warning(&format!("{} failed to parse, default applied", failure));
    }
    if report.status.state == WindowState::NeverFires {
        print_warning("Schedule never fires, window treated as open");
    }

    if report.status.active {
        print_success("Window is active: do-not-disrupt would be removed");
    } else {
        print_info("Window is closed: do-not-disrupt would be kept");
    }
}

pub fn state_label(state: WindowState) -> &'static str {
    match state {
        WindowState::Unrestricted => "unrestricted",
        WindowState::InvalidSchedule => "invalid_schedule",
        WindowState::NeverFires => "never_fires",
        WindowState::Open => "open",
        WindowState::Closed => "closed",
    }
}
