//! Conversation flows
//!
//! A flow is an ordered list of steps started by one or more commands. Flows
//! are registered once at startup in the [`FlowRegistry`].

use std::collections::HashMap;
use chrono::Duration;
use serde_json::{json, Value};

use crate::config::ConversationConfig;
use crate::models::record::{CollectedFields, FlowKind};
use crate::models::timezone::find_timezone;
use crate::utils::errors::{BlueberryError, Result};
use super::steps::{collected_country, FieldKind, NextStep, Prompt, StepDefinition, Transition};

/// A conversation definition
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub kind: FlowKind,
    /// Human-readable name
    pub name: &'static str,
    /// Commands starting this flow, without the leading slash
    pub commands: &'static [&'static str],
    pub steps: Vec<StepDefinition>,
    /// Budget when this flow is outermost. Nested flows never use their own.
    pub timeout: Option<Duration>,
}

impl FlowDefinition {
    pub fn first_step(&self) -> Result<&StepDefinition> {
        self.steps.first().ok_or_else(|| BlueberryError::UnknownStep {
            flow: self.kind.to_string(),
            step: "<first>".to_string(),
        })
    }

    pub fn step(&self, name: &str) -> Result<&StepDefinition> {
        self.steps
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BlueberryError::UnknownStep {
                flow: self.kind.to_string(),
                step: name.to_string(),
            })
    }

    /// Name of the step declared after `name`
    pub fn following(&self, name: &str) -> Option<&'static str> {
        let index = self.steps.iter().position(|s| s.name == name)?;
        self.steps.get(index + 1).map(|s| s.name)
    }

    /// Where the flow goes once `step` is answered
    pub fn transition_after(&self, step: &str, fields: &CollectedFields) -> Result<Transition> {
        let definition = self.step(step)?;
        Ok(definition.next.resolve(fields, self.following(step)))
    }

    pub fn is_nested_only(&self) -> bool {
        self.commands.is_empty()
    }

    /// Derive the fields a finished flow stores besides what was asked
    pub fn complete(&self, fields: &mut CollectedFields) -> Result<()> {
        if self.kind != FlowKind::SetTimezone {
            return Ok(());
        }

        if !fields.contains_key("timezone_name") {
            let zone = collected_country(fields)
                .and_then(|c| c.zones().first().copied())
                .ok_or_else(|| BlueberryError::InvalidInput("No country collected".to_string()))?;
            fields.insert("timezone_name".to_string(), json!(zone.name));
        }

        let name = fields
            .get("timezone_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let zone = find_timezone(&name)
            .ok_or_else(|| BlueberryError::InvalidInput(format!("Unsupported timezone: {}", name)))?;
        fields.insert("timezone_offset".to_string(), json!(zone.offset));

        Ok(())
    }
}

/// Registry of every flow the engine can run
#[derive(Debug, Clone)]
pub struct FlowRegistry {
    flows: HashMap<FlowKind, FlowDefinition>,
}

impl FlowRegistry {
    pub fn empty() -> Self {
        Self {
            flows: HashMap::new(),
        }
    }

    /// Registry with the bot's flows, timed out per configuration
    pub fn with_defaults(config: &ConversationConfig) -> Self {
        let mut registry = Self::empty();

        registry.register(register_flow(config.register_timeout_secs));
        registry.register(sleep_flow(config.sleep_timeout_secs));
        registry.register(wake_sleep_flow(config.sleep_timeout_secs));
        registry.register(clock_flow(FlowKind::WakeTime, "Wake-up time", "What hour did you wake up? (0-23)"));
        registry.register(clock_flow(FlowKind::SleepTime, "Bedtime", "What hour did you fall asleep? (0-23)"));
        registry.register(set_timezone_flow(config.timezone_timeout_secs));
        registry.register(water_flow(config.water_timeout_secs));
        registry.register(thought_flow(config.thought_timeout_secs));

        registry
    }

    pub fn register(&mut self, flow: FlowDefinition) {
        self.flows.insert(flow.kind, flow);
    }

    pub fn get(&self, kind: FlowKind) -> Result<&FlowDefinition> {
        self.flows
            .get(&kind)
            .ok_or_else(|| BlueberryError::UnknownFlow(kind.to_string()))
    }

    /// The top-level flow a command starts
    pub fn for_command(&self, command: &str) -> Option<FlowKind> {
        self.flows
            .values()
            .find(|flow| flow.commands.iter().any(|c| *c == command))
            .map(|flow| flow.kind)
    }
}

fn secs(value: u64) -> Option<Duration> {
    Some(Duration::seconds(value as i64))
}

fn register_flow(timeout_secs: u64) -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::Register,
        name: "Registration",
        commands: &["register"],
        steps: vec![
            StepDefinition::field("name", "Let's get you registered! What's your name?", FieldKind::Name),
            StepDefinition::field("email", "Now please enter your email address:", FieldKind::Email)
                .with_prompt(Prompt::Dynamic(email_prompt)),
        ],
        timeout: secs(timeout_secs),
    }
}

fn email_prompt(fields: &CollectedFields) -> String {
    match fields.get("name").and_then(Value::as_str) {
        Some(name) => format!("Nice to meet you, {}!\n\nNow please enter your email address:", name),
        None => "Now please enter your email address:".to_string(),
    }
}

fn sleep_flow(timeout_secs: u64) -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::Sleep,
        name: "Sleep log",
        commands: &["sleep"],
        steps: vec![
            StepDefinition::field(
                "hour_range",
                "Which hours did you fall asleep between? (e.g. 22-23)",
                FieldKind::HourRange,
            ),
            StepDefinition::field("minute", "At what minute? (0-59)", FieldKind::Minute),
            StepDefinition::field("notes", "Any notes about your sleep? Send skip to leave them out.", FieldKind::Notes),
        ],
        timeout: secs(timeout_secs),
    }
}

fn wake_sleep_flow(timeout_secs: u64) -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::WakeSleep,
        name: "Sleep cycle",
        commands: &["wakesleep", "sleepcycle"],
        steps: vec![
            StepDefinition::sub_flow("wake", "Let's log your sleep cycle, starting with your wake-up.", FlowKind::WakeTime),
            StepDefinition::sub_flow("sleep", "Got it. Now your bedtime.", FlowKind::SleepTime),
            StepDefinition::field("notes", "Any notes about your sleep? Send skip to leave them out.", FieldKind::Notes),
        ],
        timeout: secs(timeout_secs),
    }
}

fn clock_flow(kind: FlowKind, name: &'static str, hour_prompt: &'static str) -> FlowDefinition {
    FlowDefinition {
        kind,
        name,
        commands: &[],
        steps: vec![
            StepDefinition::field("hour", hour_prompt, FieldKind::Hour),
            StepDefinition::field("minute", "At what minute? (0-59)", FieldKind::Minute),
        ],
        timeout: None,
    }
}

fn set_timezone_flow(timeout_secs: u64) -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::SetTimezone,
        name: "Timezone",
        commands: &["set_timezone"],
        steps: vec![
            StepDefinition::field("country", "Which country are you in? (India, UK, US)", FieldKind::Country)
                .then(NextStep::Branch(after_country)),
            StepDefinition::field("timezone_name", "Which timezone?", FieldKind::TimezoneName)
                .with_prompt(Prompt::Dynamic(timezone_prompt)),
            StepDefinition::field(
                "effective_from",
                "Since when does this timezone apply? (since registration, yesterday, today)",
                FieldKind::EffectiveFrom,
            ),
        ],
        timeout: secs(timeout_secs),
    }
}

fn water_flow(timeout_secs: u64) -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::Water,
        name: "Water intake",
        commands: &["water"],
        steps: vec![
            StepDefinition::field("day", "Let's log your water intake. Was it today or yesterday?", FieldKind::Day),
            StepDefinition::field("hour", "What hour? (0-23)", FieldKind::Hour),
            StepDefinition::field("minute", "At what minute? (0-59)", FieldKind::Minute),
            StepDefinition::field(
                "amount_ml",
                "How much did you drink? (e.g. 250, 500ml, 2 glasses, 1.5 l)",
                FieldKind::Amount,
            ),
            StepDefinition::field("notes", "Any notes? Send skip to leave them out.", FieldKind::Notes),
        ],
        timeout: secs(timeout_secs),
    }
}

fn thought_flow(timeout_secs: u64) -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::Thought,
        name: "Journal",
        commands: &["thought"],
        steps: vec![StepDefinition::field(
            "content",
            "Write your thoughts. Everything in your next message is saved as one entry.",
            FieldKind::Journal,
        )],
        timeout: secs(timeout_secs),
    }
}

/// Countries with a single zone skip the zone question
fn after_country(fields: &CollectedFields) -> Transition {
    match collected_country(fields) {
        Some(country) if country.zones().len() == 1 => Transition::Step("effective_from"),
        _ => Transition::Step("timezone_name"),
    }
}

fn timezone_prompt(fields: &CollectedFields) -> String {
    let zones = collected_country(fields).map(|c| c.zones()).unwrap_or_default();
    let options: Vec<String> = zones
        .iter()
        .map(|tz| format!("{} ({}, {})", tz.label, tz.name, tz.offset))
        .collect();
    format!("Which timezone?\n{}", options.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn registry() -> FlowRegistry {
        FlowRegistry::with_defaults(&Settings::default().conversation)
    }

    #[test]
    fn test_commands_map_to_top_level_flows() {
        let registry = registry();
        assert_eq!(registry.for_command("sleep"), Some(FlowKind::Sleep));
        assert_eq!(registry.for_command("wakesleep"), Some(FlowKind::WakeSleep));
        assert_eq!(registry.for_command("sleepcycle"), Some(FlowKind::WakeSleep));
        assert_eq!(registry.for_command("register"), Some(FlowKind::Register));
        assert_eq!(registry.for_command("set_timezone"), Some(FlowKind::SetTimezone));
        assert_eq!(registry.for_command("water"), Some(FlowKind::Water));
        assert_eq!(registry.for_command("thought"), Some(FlowKind::Thought));
        assert_eq!(registry.for_command("mywater"), None);
        assert_eq!(registry.for_command("wake_time"), None);
        assert_eq!(registry.for_command("help"), None);
    }

    #[test]
    fn test_every_flow_is_registered_with_steps() {
        let registry = registry();
        for kind in FlowKind::ALL {
            let flow = registry.get(kind).unwrap();
            assert!(!flow.steps.is_empty(), "{} has no steps", kind);
            assert_eq!(flow.timeout.is_none(), flow.is_nested_only(), "{}", kind);
        }
    }

    #[test]
    fn test_configured_timeouts() {
        let registry = registry();
        assert_eq!(registry.get(FlowKind::Register).unwrap().timeout, Some(Duration::seconds(60)));
        assert_eq!(registry.get(FlowKind::Sleep).unwrap().timeout, Some(Duration::seconds(600)));
        assert_eq!(registry.get(FlowKind::SetTimezone).unwrap().timeout, Some(Duration::seconds(300)));
        assert_eq!(registry.get(FlowKind::Water).unwrap().timeout, Some(Duration::seconds(600)));
        assert_eq!(registry.get(FlowKind::Thought).unwrap().timeout, Some(Duration::seconds(300)));
    }

    #[test]
    fn test_linear_transitions() {
        let registry = registry();
        let sleep = registry.get(FlowKind::Sleep).unwrap();
        let fields = CollectedFields::new();
        assert_eq!(sleep.transition_after("hour_range", &fields).unwrap(), Transition::Step("minute"));
        assert_eq!(sleep.transition_after("notes", &fields).unwrap(), Transition::Finish);
        assert!(sleep.transition_after("bogus", &fields).is_err());
    }

    #[test]
    fn test_single_zone_country_skips_zone_question() {
        let registry = registry();
        let flow = registry.get(FlowKind::SetTimezone).unwrap();

        let mut fields = CollectedFields::new();
        fields.insert("country".to_string(), json!("india"));
        assert_eq!(flow.transition_after("country", &fields).unwrap(), Transition::Step("effective_from"));

        fields.insert("country".to_string(), json!("us"));
        assert_eq!(flow.transition_after("country", &fields).unwrap(), Transition::Step("timezone_name"));
    }

    #[test]
    fn test_timezone_completion_fills_zone_and_offset() {
        let registry = registry();
        let flow = registry.get(FlowKind::SetTimezone).unwrap();

        let mut fields = CollectedFields::new();
        fields.insert("country".to_string(), json!("india"));
        fields.insert("effective_from".to_string(), json!("today"));
        flow.complete(&mut fields).unwrap();

        assert_eq!(fields["timezone_name"], json!("Asia/Kolkata"));
        assert_eq!(fields["timezone_offset"], json!("+5:30"));
    }

    #[test]
    fn test_zone_prompt_lists_country_zones() {
        let mut fields = CollectedFields::new();
        fields.insert("country".to_string(), json!("us"));
        let prompt = timezone_prompt(&fields);
        assert!(prompt.contains("Eastern"));
        assert!(prompt.contains("Pacific/Honolulu"));
        assert!(!prompt.contains("Kolkata"));
    }
}
