//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the application.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// Format a timestamp in the given offset, e.g. `16 Oct, 07:05`
pub fn readable_datetime(timestamp: DateTime<Utc>, offset: &FixedOffset) -> String {
    offset
        .from_utc_datetime(&timestamp.naive_utc())
        .format("%d %b, %H:%M")
        .to_string()
}

/// Format an hour and minute as a clock reading, e.g. `07:05`
pub fn format_clock(hour: u32, minute: u32) -> String {
    format!("{:02}:{:02}", hour, minute)
}

/// Format a duration given in minutes, e.g. `7h 45m`
pub fn format_duration_minutes(minutes: i64) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Minutes slept between a bedtime and a wake-up clock reading.
/// A wake-up at or before the bedtime is taken to be on the next day.
pub fn minutes_between_clock(sleep: (u32, u32), wake: (u32, u32)) -> i64 {
    let start = (sleep.0 * 60 + sleep.1) as i64;
    let end = (wake.0 * 60 + wake.1) as i64;
    if end > start {
        end - start
    } else {
        end + 24 * 60 - start
    }
}

/// Parse a stored offset such as `+5:30`, `-10:00` or `+0:00`
pub fn parse_offset(offset: &str) -> Option<FixedOffset> {
    let offset = offset.trim();
    let (sign, rest) = match offset.chars().next()? {
        '+' => (1, &offset[1..]),
        '-' => (-1, &offset[1..]),
        _ => (1, offset),
    };

    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Truncate text to a maximum number of characters with ellipsis
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Hide most of an email's local part, e.g. `a***@example.com`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

/// Sanitize free text typed by a user: trims, drops NUL bytes and
/// collapses runs of whitespace into a single space.
pub fn sanitize_text(text: &str) -> String {
    text.replace('\0', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Like [`sanitize_text`], but keeps one line per non-empty input line
pub fn sanitize_multiline(text: &str) -> String {
    text.lines()
        .map(sanitize_text)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Glasses of water in an amount, one glass being 250 ml
pub fn glasses(amount_ml: u32) -> f64 {
    f64::from(amount_ml) / 250.0
}
