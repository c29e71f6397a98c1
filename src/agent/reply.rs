//! Structured replies from the chat model and the fallback used when they don't parse.

use super::mood::Mood;
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

/// Spoken line substituted when the model's reply is unusable.
pub const FALLBACK_SPEECH: &str = "我...我不知道该怎么做...";
pub const NO_TARGET: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Move,
    Interact,
    /// Wire value `none`.
    Stay,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::Move => "move",
            Action::Interact => "interact",
            Action::Stay => "none",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "move" => Some(Action::Move),
            "interact" => Some(Action::Interact),
            "none" => Some(Action::Stay),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub action: Action,
    pub target: String,
    pub speak: String,
    pub mood: Mood,
}

/// Why a raw reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReply {
    #[error("reply is not JSON: {0}")]
    NotJson(String),
    #[error("reply is not a JSON object")]
    NotObject,
    #[error("unknown action {0:?}")]
    BadAction(String),
    #[error("action {0} has no target")]
    MissingTarget(&'static str),
}

impl AgentReply {
    /// The reply used in place of anything that fails to parse.
    pub fn fallback(mood: Mood) -> Self {
        Self {
            action: Action::Stay,
            target: NO_TARGET.to_string(),
            speak: FALLBACK_SPEECH.to_string(),
            mood,
        }
    }

    /// Compact JSON in the same shape the model is asked to produce.
    pub fn to_json(&self) -> String {
        json!({
            "action": self.action.label(),
            "target": self.target,
            "speak": self.speak,
            "mood": self.mood.label(),
        })
        .to_string()
    }

    /// Parse a raw model reply. An unrecognized mood keeps `current`.
    pub fn parse(raw: &str, current: Mood) -> Result<Self, MalformedReply> {
        let body = json_body(raw);
        let value: Value =
            serde_json::from_str(body).map_err(|err| MalformedReply::NotJson(err.to_string()))?;
        let object = value.as_object().ok_or(MalformedReply::NotObject)?;

        let action_text = string_field(object, "action").unwrap_or_default();
        let action =
            Action::parse(&action_text).ok_or_else(|| MalformedReply::BadAction(action_text))?;
        let target = match string_field(object, "target").filter(|t| !t.trim().is_empty()) {
            Some(target) => target.trim().to_string(),
            None if action == Action::Stay => NO_TARGET.to_string(),
            None => return Err(MalformedReply::MissingTarget(action.label())),
        };
        let speak = string_field(object, "speak").unwrap_or_default();
        let mood = string_field(object, "mood")
            .and_then(|text| Mood::parse(&text))
            .unwrap_or(current);

        Ok(Self {
            action,
            target,
            speak: speak.trim().to_string(),
            mood,
        })
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Strip Markdown code fences and any prose around the outermost JSON object.
fn json_body(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.split_once('\n').map_or("", |(_, body)| body);
        text = text.trim_end().strip_suffix("```").unwrap_or(text).trim();
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}
