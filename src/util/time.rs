//! Human-readable durations for the command-line host.

use chrono::{DateTime, Utc};

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Countdown to `target`, e.g. `in 3h 20m`; `now` once reached.
#[must_use]
pub fn format_countdown(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = target.signed_duration_since(now);
    if remaining.num_seconds() <= 0 {
        return "now".to_string();
    }

    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;
    if hours >= 24 {
        let days = hours / 24;
        format!("in {days} day{}", plural(days))
    } else if hours > 0 {
        format!("in {hours}h {minutes}m")
    } else if minutes > 0 {
        format!("in {minutes}m")
    } else {
        format!("in {}s", remaining.num_seconds())
    }
}

/// Past or future distance from `now`, e.g. `5 minutes ago`.
#[must_use]
pub fn format_relative_time(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(target);
    if elapsed.num_seconds().abs() < 60 {
        return "just now".to_string();
    }

    let suffix = if elapsed.num_seconds() > 0 { "ago" } else { "from now" };
    let days = elapsed.num_days().abs();
    let hours = elapsed.num_hours().abs();
    let minutes = elapsed.num_minutes().abs();

    if days > 0 {
        format!("{days} day{} {suffix}", plural(days))
    } else if hours > 0 {
        format!("{hours} hour{} {suffix}", plural(hours))
    } else {
        format!("{minutes} minute{} {suffix}", plural(minutes))
    }
}

/// Token expiry summary: `expires in 3h 20m` or `expired 5 minutes ago`.
#[must_use]
pub fn describe_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if expires_at > now {
        format!("expires {}", format_countdown(expires_at, now))
    } else {
        format!("expired {}", format_relative_time(expires_at, now))
    }
}
