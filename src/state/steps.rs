//! Step definitions
//!
//! A step asks one question and validates the answer. Validation is pure:
//! it sees the raw text and the fields collected so far and never touches
//! storage. Every field the bot can ask for is a [`FieldKind`] variant.

use std::sync::OnceLock;
use regex::Regex;
use serde_json::{json, Value};

use crate::models::record::{CollectedFields, FlowKind, LogDay};
use crate::models::timezone::{Country, EffectiveFrom};
use crate::utils::helpers::{sanitize_multiline, sanitize_text};

pub const MAX_NOTES_CHARS: usize = 500;
pub const MAX_JOURNAL_CHARS: usize = 2000;
pub const MAX_WATER_ML: u32 = 3000;
pub const MAX_EMAIL_CHARS: usize = 255;
pub const NAME_CHARS: std::ops::RangeInclusive<usize> = 2..=30;

/// Answers that leave an optional text field empty
const SKIP_SENTINELS: [&str; 2] = ["skip", "/skip"];

/// Result of validating one answer
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Accept(Value),
    Reject(String),
}

/// Every kind of field a step can collect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Two hours 0-23, lower first, stored as `[lower, upper]`
    HourRange,
    Hour,
    Minute,
    /// Free text, `skip` stores an empty string
    Notes,
    Name,
    Email,
    Country,
    /// A zone of the previously collected country
    TimezoneName,
    EffectiveFrom,
    /// `today` or `yesterday`
    Day,
    /// Millilitres, typed as `500`, `500ml`, `2 glasses` or `1.5 l`
    Amount,
    /// Multi-line free text, never skipped
    Journal,
}

impl FieldKind {
    pub fn validate(&self, input: &str, fields: &CollectedFields) -> Validation {
        let input = input.trim();
        match self {
            FieldKind::HourRange => validate_hour_range(input),
            FieldKind::Hour => match parse_bounded(input, 23) {
                Some(hour) => Validation::Accept(json!(hour)),
                None => Validation::Reject("Please send an hour between 0 and 23.".to_string()),
            },
            FieldKind::Minute => match parse_bounded(input, 59) {
                Some(minute) => Validation::Accept(json!(minute)),
                None => Validation::Reject("Please send a minute between 0 and 59.".to_string()),
            },
            FieldKind::Notes => validate_notes(input),
            FieldKind::Name => validate_name(input),
            FieldKind::Email => validate_email(input),
            FieldKind::Country => match Country::from_alias(input) {
                Some(country) => Validation::Accept(json!(country.as_str())),
                None => Validation::Reject("Please choose one of: India, UK, US.".to_string()),
            },
            FieldKind::TimezoneName => validate_timezone_name(input, fields),
            FieldKind::EffectiveFrom => match EffectiveFrom::parse(input) {
                Some(from) => Validation::Accept(json!(from.as_str())),
                None => Validation::Reject(
                    "Please answer since registration, yesterday or today.".to_string()
                ),
            },
            FieldKind::Day => match LogDay::parse(input) {
                Some(day) => Validation::Accept(json!(day.as_str())),
                None => Validation::Reject("Please answer today or yesterday.".to_string()),
            },
            FieldKind::Amount => validate_amount(input),
            FieldKind::Journal => validate_journal(input),
        }
    }
}

fn parse_bounded(input: &str, max: u32) -> Option<u32> {
    input.parse::<u32>().ok().filter(|v| *v <= max)
}

fn validate_hour_range(input: &str) -> Validation {
    let reject = || Validation::Reject(
        "Please send an hour range like 22-23, both hours between 0 and 23.".to_string()
    );

    let parts: Vec<&str> = input
        .split(|c: char| c == '-' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();

    let (lower, upper) = match parts.as_slice() {
        [single] => match parse_bounded(single, 23) {
            Some(hour) => (hour, hour),
            None => return reject(),
        },
        [lower, upper] => match (parse_bounded(lower, 23), parse_bounded(upper, 23)) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => return reject(),
        },
        _ => return reject(),
    };

    if lower > upper {
        return Validation::Reject(format!(
            "The range starts after it ends ({} > {}). Send the earlier hour first.",
            lower, upper
        ));
    }

    Validation::Accept(json!([lower, upper]))
}

fn validate_notes(input: &str) -> Validation {
    if SKIP_SENTINELS.iter().any(|s| input.eq_ignore_ascii_case(s)) {
        return Validation::Accept(json!(""));
    }

    let notes = sanitize_text(input);
    if notes.is_empty() {
        return Validation::Reject("Notes cannot be empty. Send skip to leave them out.".to_string());
    }
    if notes.chars().count() > MAX_NOTES_CHARS {
        return Validation::Reject(format!("Notes are limited to {} characters.", MAX_NOTES_CHARS));
    }

    Validation::Accept(json!(notes))
}

/// Millilitres in an amount such as `500`, `500 ml`, `2 glasses` or `1.5l`
fn parse_amount_ml(input: &str) -> Option<u32> {
    let lower = input.to_lowercase();
    let split = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);

    let number: f64 = number.parse().ok()?;
    let per_unit = match unit.trim() {
        "" | "ml" => 1.0,
        "glass" | "glasses" => 250.0,
        "l" | "litre" | "litres" | "liter" | "liters" => 1000.0,
        _ => return None,
    };

    let ml = (number * per_unit).round();
    (ml <= f64::from(u32::MAX)).then_some(ml as u32)
}

fn validate_amount(input: &str) -> Validation {
    match parse_amount_ml(input) {
        Some(ml) if (1..=MAX_WATER_ML).contains(&ml) => Validation::Accept(json!(ml)),
        Some(_) => Validation::Reject(format!("Please send an amount between 1 and {} ml.", MAX_WATER_ML)),
        None => Validation::Reject(
            "Please send an amount like 250, 500ml, 2 glasses or 1.5 l.".to_string()
        ),
    }
}

fn validate_journal(input: &str) -> Validation {
    let content = sanitize_multiline(input);
    if content.is_empty() {
        return Validation::Reject("Please write something, or /cancel to stop.".to_string());
    }
    if content.chars().count() > MAX_JOURNAL_CHARS {
        return Validation::Reject(format!(
            "Message too long (max {} characters). Please shorten it.",
            MAX_JOURNAL_CHARS
        ));
    }

    Validation::Accept(json!(content))
}

/// Compiled once. `None` only if a pattern fails to build, which a unit
/// test rules out.
fn name_regex() -> Option<&'static Regex> {
    static NAME: OnceLock<Option<Regex>> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^\p{L}[\p{L} '\-]*$").ok()).as_ref()
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").ok())
        .as_ref()
}

fn validate_name(input: &str) -> Validation {
    let name = sanitize_text(input);
    let len = name.chars().count();
    if !NAME_CHARS.contains(&len) {
        return Validation::Reject(format!(
            "Your name should be {} to {} characters long.",
            NAME_CHARS.start(),
            NAME_CHARS.end()
        ));
    }
    if !name_regex().is_some_and(|re| re.is_match(&name)) {
        return Validation::Reject(
            "Your name can only contain letters, spaces, hyphens and apostrophes.".to_string()
        );
    }

    Validation::Accept(json!(name))
}

fn validate_email(input: &str) -> Validation {
    let email = input.to_lowercase();
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Validation::Reject("That email address is too long.".to_string());
    }
    if !email_regex().is_some_and(|re| re.is_match(&email)) {
        return Validation::Reject(
            "That doesn't look like a valid email address (e.g. name@example.com).".to_string()
        );
    }

    Validation::Accept(json!(email))
}

fn validate_timezone_name(input: &str, fields: &CollectedFields) -> Validation {
    let Some(country) = collected_country(fields) else {
        return Validation::Reject("Please choose your country first.".to_string());
    };

    let zones = country.zones();
    let chosen = zones.iter().find(|tz| {
        tz.name.eq_ignore_ascii_case(input) || tz.label.eq_ignore_ascii_case(input)
    });

    match chosen {
        Some(tz) => Validation::Accept(json!(tz.name)),
        None => {
            let labels: Vec<&str> = zones.iter().map(|tz| tz.label).collect();
            Validation::Reject(format!("Please choose one of: {}.", labels.join(", ")))
        }
    }
}

/// The country collected earlier in the same flow
pub fn collected_country(fields: &CollectedFields) -> Option<Country> {
    fields.get("country").and_then(Value::as_str).and_then(Country::from_alias)
}

/// Question text of a step
#[derive(Clone, Copy)]
pub enum Prompt {
    Static(&'static str),
    /// Built from the fields collected so far
    Dynamic(fn(&CollectedFields) -> String),
}

impl Prompt {
    pub fn render(&self, fields: &CollectedFields) -> String {
        match self {
            Prompt::Static(text) => text.to_string(),
            Prompt::Dynamic(build) => build(fields),
        }
    }
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prompt::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Prompt::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// What a step collects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Answered directly by the user
    Field(FieldKind),
    /// Answered by running a nested flow
    SubFlow(FlowKind),
}

/// Where a flow goes after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Step(&'static str),
    Finish,
}

/// How the step after this one is chosen
#[derive(Clone, Copy)]
pub enum NextStep {
    /// The following step in declaration order, or finish after the last one
    Next,
    Goto(&'static str),
    Finish,
    /// Computed from the fields collected so far
    Branch(fn(&CollectedFields) -> Transition),
}

impl NextStep {
    pub fn resolve(&self, fields: &CollectedFields, following: Option<&'static str>) -> Transition {
        match self {
            NextStep::Next => following.map(Transition::Step).unwrap_or(Transition::Finish),
            NextStep::Goto(step) => Transition::Step(step),
            NextStep::Finish => Transition::Finish,
            NextStep::Branch(choose) => choose(fields),
        }
    }
}

impl std::fmt::Debug for NextStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextStep::Next => f.write_str("Next"),
            NextStep::Goto(step) => f.debug_tuple("Goto").field(step).finish(),
            NextStep::Finish => f.write_str("Finish"),
            NextStep::Branch(_) => f.write_str("Branch"),
        }
    }
}

/// One question of a flow, defined at startup
#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    pub name: &'static str,
    pub prompt: Prompt,
    pub kind: StepKind,
    pub next: NextStep,
}

impl StepDefinition {
    pub const fn field(name: &'static str, prompt: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            prompt: Prompt::Static(prompt),
            kind: StepKind::Field(kind),
            next: NextStep::Next,
        }
    }

    pub const fn sub_flow(name: &'static str, prompt: &'static str, flow: FlowKind) -> Self {
        Self {
            name,
            prompt: Prompt::Static(prompt),
            kind: StepKind::SubFlow(flow),
            next: NextStep::Next,
        }
    }

    pub const fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub const fn then(mut self, next: NextStep) -> Self {
        self.next = next;
        self
    }

    pub fn prompt_text(&self, fields: &CollectedFields) -> String {
        self.prompt.render(fields)
    }
}
