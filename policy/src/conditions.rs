//! Rule condition evaluation.
//!
//! A rule's optional `conditions` block holds up to three predicates:
//! `env`, `time_range`, and `day_of_week`. Present keys are AND-ed, a
//! missing key passes, unknown keys are ignored. The reference clock is
//! injected so tests can pin the wall time.
//!
//! `time_range.tz` is currently not honored — evaluation runs in UTC and
//! the field is retained for a future local-time enhancement.

use chrono::{DateTime, Timelike, Utc};
use guard_core::{Environment, RuleConditions};

/// Return true when every present condition holds at `now` (UTC) for an
/// agent running in `environment`.
pub fn evaluate_conditions(
    conditions: &RuleConditions,
    environment: Environment,
    now: DateTime<Utc>,
) -> bool {
    if let Some(allowed_envs) = &conditions.env {
        if !allowed_envs.iter().any(|env| env == environment.as_str()) {
            return false;
        }
    }

    if let Some(time_range) = &conditions.time_range {
        let (start_h, start_m) = parse_hhmm(&time_range.start);
        let (end_h, end_m) = parse_hhmm(&time_range.end);
        let current_minutes = now.hour() * 60 + now.minute();
        let start_minutes = start_h * 60 + start_m;
        let end_minutes = end_h * 60 + end_m;
        if !(start_minutes <= current_minutes && current_minutes <= end_minutes) {
            return false;
        }
    }

    if let Some(allowed_days) = &conditions.day_of_week {
        let today = now.date_naive().format("%a").to_string();
        if !allowed_days.iter().any(|day| *day == today) {
            return false;
        }
    }

    true
}

/// Parse `"HH:MM"` into `(hour, minute)`, falling back to `(0, 0)` on any
/// malformed input.
fn parse_hhmm(value: &str) -> (u32, u32) {
    let mut parts = value.split(':');
    let hour = parts.next().and_then(|p| p.parse().ok());
    let minute = parts.next().and_then(|p| p.parse().ok());
    match (hour, minute) {
        (Some(h), Some(m)) => (h, m),
        _ => (0, 0),
    }
}
