//! Reply rendering
//!
//! Pure functions turning engine results and stored data into message text,
//! so every reply can be checked without Telegram.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::models::record::{FlowKind, JournalEntry, Record, Registration, SleepLog, TimezoneSelection, WaterIntake};
use crate::models::timezone::{find_timezone, utc_offset, UserTimezone};
use crate::models::user::User;
use crate::services::Unmet;
use crate::state::EngineResult;
use crate::utils::helpers::{
    format_clock, format_duration_minutes, glasses, mask_email, minutes_between_clock, readable_datetime,
    truncate_text,
};

pub const WELCOME: &str = "Welcome to Blueberry! I help you keep track of your sleep and daily habits.\n\n\
    Quick start:\n\
    1. /register to create your profile\n\
    2. /set_timezone so your logs use your local time\n\
    3. /sleep or /wakesleep to log a night, /water for a drink, /thought for your journal\n\
    4. /mysleep, /mywater or /mythoughts to see your latest entries\n\n\
    Send /help to see every command.";

pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";
pub const NO_CONVERSATION: &str = "I'm not expecting anything right now. Send /help to see what I can do.";
pub const RATE_LIMITED: &str = "Too many attempts. Please wait a minute before trying again.";
const NOTES_PREVIEW_CHARS: usize = 40;
const JOURNAL_PREVIEW_CHARS: usize = 150;

pub const SOMETHING_WENT_WRONG: &str = "Something went wrong. Please try again later.";

/// Human name of a flow, as used in replies
pub fn flow_label(flow: FlowKind) -> &'static str {
    match flow {
        FlowKind::Register => "Registration",
        FlowKind::Sleep => "Sleep logging",
        FlowKind::WakeSleep => "Sleep cycle logging",
        FlowKind::WakeTime => "Wake-up time",
        FlowKind::SleepTime => "Bedtime",
        FlowKind::SetTimezone => "Timezone setup",
        FlowKind::Water => "Water logging",
        FlowKind::Thought => "Journal entry",
    }
}

fn start_command(flow: FlowKind) -> &'static str {
    match flow {
        FlowKind::Register => "/register",
        FlowKind::Sleep => "/sleep",
        FlowKind::WakeSleep | FlowKind::WakeTime | FlowKind::SleepTime => "/wakesleep",
        FlowKind::SetTimezone => "/set_timezone",
        FlowKind::Water => "/water",
        FlowKind::Thought => "/thought",
    }
}

/// Text answering an engine result. `NoOp` has no reply of its own.
pub fn render_result(result: &EngineResult, offset: &FixedOffset) -> Option<String> {
    let text = match result {
        EngineResult::NoOp => return None,
        EngineResult::Prompt(prompt) => prompt.clone(),
        EngineResult::Reprompt { reason, prompt } => format!("{}\n\n{}", reason, prompt),
        EngineResult::Resumed(prompt) => format!("Let's continue where we left off.\n\n{}", prompt),
        EngineResult::Replaced { cancelled, prompt } => {
            format!("{} cancelled.\n\n{}", flow_label(*cancelled), prompt)
        }
        EngineResult::Completed(record) => render_completion(record, offset),
        EngineResult::Cancelled { flow } => format!("{} cancelled.", flow_label(*flow)),
        EngineResult::Expired { flow } => render_expired(*flow),
        EngineResult::SaveFailed { .. } => {
            "I couldn't save that just now. Your answers are kept: send any message to try again, \
             or /cancel to drop them."
                .to_string()
        }
        EngineResult::Refused { flow, reason } => format!(
            "{} could not be saved: {}. Your answers were dropped.",
            flow_label(*flow),
            reason
        ),
    };
    Some(text)
}

/// Notice sent when a conversation timed out
pub fn render_expired(flow: FlowKind) -> String {
    format!(
        "{} timed out. Please use {} to try again.",
        flow_label(flow),
        start_command(flow)
    )
}

fn render_completion(record: &Record, offset: &FixedOffset) -> String {
    match record.flow {
        FlowKind::Register => match record.fields_as::<Registration>() {
            Ok(reg) => format!(
                "Registration complete!\n\nName: {}\nEmail: {}\n\nNext, use /set_timezone to set your timezone.",
                reg.name,
                mask_email(&reg.email)
            ),
            Err(_) => "Registration complete!".to_string(),
        },
        FlowKind::SetTimezone => match record.fields_as::<TimezoneSelection>() {
            Ok(sel) => format!(
                "Timezone set to {} (UTC{}), effective {}.",
                sel.timezone_name,
                sel.timezone_offset,
                sel.effective_from.replace("sincefirstday", "since registration")
            ),
            Err(_) => "Timezone saved.".to_string(),
        },
        FlowKind::Sleep | FlowKind::WakeSleep => match SleepLog::from_record(record) {
            Ok(log) => format!(
                "Sleep logged!\n\n{}\nLogged: {}",
                render_sleep_log(&log),
                readable_datetime(record.event_time, offset)
            ),
            Err(_) => "Sleep logged!".to_string(),
        },
        FlowKind::Water => match WaterIntake::from_record(record) {
            Ok(water) => {
                let when = water.drunk_on(record.event_time, offset);
                format!(
                    "Water intake logged!\n\nTime: {}, {}\nAmount: {}ml ({:.1} glasses)\nNotes: {}\n\n\
                     Use /mywater to view your water intake history.",
                    when.format("%d %b"),
                    format_clock(water.hour, water.minute),
                    water.amount_ml,
                    glasses(water.amount_ml),
                    notes_or_dash(&water.notes)
                )
            }
            Err(_) => "Water intake logged!".to_string(),
        },
        FlowKind::Thought => match record.fields_as::<JournalEntry>() {
            Ok(entry) => format!(
                "Thought saved!\n\nTime: {}\n{}\n\nUse /mythoughts to view your journal.",
                readable_datetime(record.event_time, offset),
                entry.content
            ),
            Err(_) => "Thought saved!".to_string(),
        },
        FlowKind::WakeTime | FlowKind::SleepTime => "Saved.".to_string(),
    }
}

fn notes_or_dash(notes: &str) -> &str {
    if notes.is_empty() { "-" } else { notes }
}

/// Multi-line description of one sleep log
pub fn render_sleep_log(log: &SleepLog) -> String {
    match log {
        SleepLog::Quick { hour_range: (lower, upper), minute, notes } => {
            let when = if lower == upper {
                format!("around {}", format_clock(*lower, *minute))
            } else {
                format!("between {} and {}", format_clock(*lower, *minute), format_clock(*upper, *minute))
            };
            format!("Fell asleep: {}\nNotes: {}", when, notes_or_dash(notes))
        }
        SleepLog::Cycle { sleep, wake, notes } => {
            let minutes = minutes_between_clock(sleep.as_pair(), wake.as_pair());
            format!(
                "Slept: {}\nWoke: {}\nDuration: {}\nNotes: {}",
                format_clock(sleep.hour, sleep.minute),
                format_clock(wake.hour, wake.minute),
                format_duration_minutes(minutes),
                notes_or_dash(notes)
            )
        }
    }
}

/// One line per sleep record, newest first
pub fn render_sleep_history(records: &[Record], offset: &FixedOffset) -> String {
    if records.is_empty() {
        return "No sleep logged yet. Use /sleep or /wakesleep to add one.".to_string();
    }

    let lines: Vec<String> = records
        .iter()
        .filter_map(|record| {
            let log = SleepLog::from_record(record).ok()?;
            let summary = match &log {
                SleepLog::Quick { hour_range: (lower, upper), minute, .. } => {
                    format!("asleep {}-{}h at :{:02}", lower, upper, minute)
                }
                SleepLog::Cycle { sleep, wake, .. } => format!(
                    "{} - {} ({})",
                    format_clock(sleep.hour, sleep.minute),
                    format_clock(wake.hour, wake.minute),
                    format_duration_minutes(minutes_between_clock(sleep.as_pair(), wake.as_pair()))
                ),
            };
            let line = format!("{}: {}", readable_datetime(record.event_time, offset), summary);
            Some(match log.notes() {
                "" => line,
                notes => format!("{} ({})", line, truncate_text(notes, NOTES_PREVIEW_CHARS)),
            })
        })
        .collect();

    format!("Your recent sleep:\n\n{}", lines.join("\n"))
}

/// Today's total followed by the latest intakes, newest first.
/// `records` may reach further back than `shown`, so the total is complete.
pub fn render_water_history(
    records: &[Record],
    offset: &FixedOffset,
    now: DateTime<Utc>,
    shown: usize,
) -> String {
    let intakes: Vec<(&Record, WaterIntake)> = records
        .iter()
        .filter_map(|record| WaterIntake::from_record(record).ok().map(|water| (record, water)))
        .collect();

    if intakes.is_empty() {
        return "No water records yet. Use /water to log your first intake!".to_string();
    }

    let today: NaiveDate = offset.from_utc_datetime(&now.naive_utc()).date_naive();
    let today_total: u32 = intakes
        .iter()
        .filter(|(record, water)| water.drunk_on(record.event_time, offset) == today)
        .map(|(_, water)| water.amount_ml)
        .sum();

    let lines: Vec<String> = intakes
        .iter()
        .take(shown)
        .enumerate()
        .map(|(i, (record, water))| {
            let line = format!(
                "{}. {}, {}: {}ml ({:.1} glasses)",
                i + 1,
                water.drunk_on(record.event_time, offset).format("%d %b"),
                format_clock(water.hour, water.minute),
                water.amount_ml,
                glasses(water.amount_ml)
            );
            match water.notes.as_str() {
                "" => line,
                notes => format!("{} ({})", line, truncate_text(notes, NOTES_PREVIEW_CHARS)),
            }
        })
        .collect();

    format!(
        "Today's total: {}ml ({:.1} glasses)\n\nRecent water intake:\n{}",
        today_total,
        glasses(today_total),
        lines.join("\n")
    )
}

/// Latest journal entries with a short preview each
pub fn render_thoughts(records: &[Record], offset: &FixedOffset) -> String {
    let entries: Vec<String> = records
        .iter()
        .filter(|record| record.flow == FlowKind::Thought)
        .filter_map(|record| {
            let entry: JournalEntry = record.fields_as().ok()?;
            Some((record, entry))
        })
        .enumerate()
        .map(|(i, (record, entry))| {
            format!(
                "{}. {}\n{}",
                i + 1,
                readable_datetime(record.event_time, offset),
                truncate_text(&entry.content, JOURNAL_PREVIEW_CHARS)
            )
        })
        .collect();

    if entries.is_empty() {
        return "No thoughts yet. Use /thought to write your first entry.".to_string();
    }
    format!("Recent thoughts:\n\n{}", entries.join("\n\n"))
}

/// The stored profile shown when a registered user sends /register
pub fn render_profile(user: &User) -> String {
    format!(
        "You're already registered!\n\nName: {}\nEmail: {}",
        user.name,
        mask_email(&user.email)
    )
}

pub fn render_unmet(unmet: &Unmet) -> String {
    match unmet {
        Unmet::AlreadyRegistered(user) => render_profile(user),
        Unmet::Registration => "Please /register first.".to_string(),
        Unmet::Timezone => "Please /set_timezone first so your logs use your local time.".to_string(),
    }
}

/// Current timezone and earlier choices
pub fn render_timezones(history: &[UserTimezone]) -> String {
    let Some((current, earlier)) = history.split_first() else {
        return "You haven't set a timezone yet. Use /set_timezone.".to_string();
    };

    let label = find_timezone(&current.timezone_name).map(|tz| tz.label).unwrap_or("custom");
    let mut text = format!(
        "Your timezone: {} ({}, UTC{})\nEffective from: {}",
        current.timezone_name,
        label,
        current.timezone_offset,
        current.effective_from.format("%d %b %Y")
    );

    if !earlier.is_empty() {
        text.push_str("\n\nEarlier:");
        for tz in earlier {
            text.push_str(&format!(
                "\n{} (UTC{}) from {}",
                tz.timezone_name,
                tz.timezone_offset,
                tz.effective_from.format("%d %b %Y")
            ));
        }
    }
    text
}

/// Offset to render a user's timestamps in
pub fn offset_for(timezone: Option<&UserTimezone>) -> FixedOffset {
    timezone.map(UserTimezone::offset).unwrap_or_else(utc_offset)
}
