//! The trapped doctor: conversation history, mood, and reply handling.
//!
//! History is only touched from the coordinator's dispatch phase. The network
//! call itself is split out (`prepare_turn` / `complete_turn`) so it can run on a
//! helper thread while the agent stays owned by the coordinator.

mod mood;
pub mod prompts;
mod reply;

pub use mood::Mood;
pub use reply::{Action, AgentReply, MalformedReply, FALLBACK_SPEECH, NO_TARGET};

use crate::backend::{ChatMessage, Role};
use crate::{log_debug, log_debug_content};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// One completed request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueTurn {
    pub user_text: String,
    pub reply: AgentReply,
    pub previous_mood: Mood,
    /// True when the raw reply was unusable and the fallback was substituted.
    pub recovered: bool,
}

impl DialogueTurn {
    pub fn mood_changed(&self) -> bool {
        self.previous_mood != self.reply.mood
    }
}

/// History snapshot for an in-flight chat request. Must be handed back through
/// `complete_turn` or `abandon_turn`.
#[derive(Debug)]
#[must_use]
pub struct PendingTurn {
    user_text: String,
    request: Vec<ChatMessage>,
    rollback_len: usize,
    sent_action_prompt: bool,
}

impl PendingTurn {
    pub fn into_request(self) -> (Vec<ChatMessage>, PendingTurnToken) {
        let token = PendingTurnToken {
            user_text: self.user_text,
            rollback_len: self.rollback_len,
            sent_action_prompt: self.sent_action_prompt,
        };
        (self.request, token)
    }
}

/// What remains of a `PendingTurn` once its request was moved to a worker.
#[derive(Debug)]
#[must_use]
pub struct PendingTurnToken {
    user_text: String,
    rollback_len: usize,
    sent_action_prompt: bool,
}

#[derive(Debug, Default)]
pub struct DialogueAgent {
    messages: Vec<ChatMessage>,
    mood: Mood,
    action_prompt_sent: bool,
}

impl DialogueAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset history to the system prompt plus the current mood description.
    pub fn initialize(&mut self, system_prompt: &str) {
        self.messages.clear();
        self.action_prompt_sent = false;
        let content = format!(
            "{system_prompt}\n{}",
            prompts::mood_prompt(self.mood.label())
        );
        self.messages.push(ChatMessage::system(content));
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn update_environment(&mut self, info: &str) {
        self.messages.push(ChatMessage::system(info));
    }

    /// Record a new mood. Only an actual change adds a system note.
    pub fn update_mood(&mut self, mood: Mood) -> bool {
        if mood == self.mood {
            return false;
        }
        self.mood = mood;
        self.messages
            .push(ChatMessage::system(prompts::mood_update_note(mood.label())));
        true
    }

    /// Append the operator's message (and the one-time action prompt) and
    /// snapshot the history to send.
    pub fn prepare_turn(&mut self, user_text: &str) -> PendingTurn {
        let rollback_len = self.messages.len();
        let sent_action_prompt = !self.action_prompt_sent;
        if sent_action_prompt {
            self.messages
                .push(ChatMessage::system(prompts::ACTION_PROMPT));
            self.action_prompt_sent = true;
        }
        self.messages.push(ChatMessage::user(user_text));
        PendingTurn {
            user_text: user_text.to_string(),
            request: self.messages.clone(),
            rollback_len,
            sent_action_prompt,
        }
    }

    /// Apply the model's raw reply. Unparseable replies become the fallback.
    pub fn complete_turn(&mut self, token: PendingTurnToken, raw: &str) -> DialogueTurn {
        let previous_mood = self.mood;
        let (reply, recovered) = match AgentReply::parse(raw, previous_mood) {
            Ok(reply) => {
                self.messages.push(ChatMessage::assistant(raw.trim()));
                (reply, false)
            }
            Err(err) => {
                log_debug(&format!("agent reply malformed ({err}); using fallback"));
                log_debug_content(&format!("malformed reply: {raw}"));
                let fallback = AgentReply::fallback(previous_mood);
                self.messages
                    .push(ChatMessage::assistant(fallback.to_json()));
                (fallback, true)
            }
        };
        self.update_mood(reply.mood);
        DialogueTurn {
            user_text: token.user_text,
            reply,
            previous_mood,
            recovered,
        }
    }

    /// Undo `prepare_turn` after a failed chat request.
    pub fn abandon_turn(&mut self, token: PendingTurnToken) {
        self.messages.truncate(token.rollback_len);
        if token.sent_action_prompt {
            self.action_prompt_sent = false;
        }
    }

    /// Write the history as pretty JSON, keeping non-ASCII text readable.
    pub fn save_messages(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.messages)
            .context("failed to serialize conversation")?;
        fs::write(path, json).with_context(|| format!("failed to write '{}'", path.display()))?;
        Ok(())
    }

    /// Replace history with a saved conversation and recover mood and prompt state from it.
    pub fn load_messages(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let messages: Vec<ChatMessage> = serde_json::from_str(&text)
            .with_context(|| format!("'{}' is not a saved conversation", path.display()))?;
        self.action_prompt_sent = messages
            .iter()
            .any(|m| m.role == Role::System && m.content == prompts::ACTION_PROMPT);
        self.mood = last_recorded_mood(&messages).unwrap_or_default();
        self.messages = messages;
        Ok(())
    }
}

fn last_recorded_mood(messages: &[ChatMessage]) -> Option<Mood> {
    const UPDATE_PREFIX: &str = "你的心情状态现在是 ";
    const INITIAL_MARKER: &str = "你当前的心情状态为：";
    messages
        .iter()
        .rev()
        .filter(|message| message.role == Role::System)
        .find_map(|message| {
            if let Some(rest) = message.content.strip_prefix(UPDATE_PREFIX) {
                return Mood::parse(rest.trim_end_matches('。'));
            }
            let start = message.content.find(INITIAL_MARKER)? + INITIAL_MARKER.len();
            let line = message.content[start..].lines().next()?;
            Mood::parse(line)
        })
}
