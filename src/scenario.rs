//! Hospital map hooks: what the doctor's actions do to the world.
//!
//! Rules fire in the dispatch phase, so the agent's history already reflects
//! the new surroundings when the next turn starts listening.

use crate::agent::{prompts, Action, AgentReply, DialogueAgent};
use crate::log_debug;

/// One consequence of a matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioEffect {
    /// System note appended to the agent's history.
    Environment(&'static str),
    /// Line shown to the operator.
    Narration(&'static str),
}

#[derive(Debug, Clone)]
struct Rule {
    action: Action,
    target: &'static str,
    effects: &'static [ScenarioEffect],
}

const HOSPITAL_RULES: &[Rule] = &[
    Rule {
        action: Action::Move,
        target: "Target_Cube_4",
        effects: &[ScenarioEffect::Environment(prompts::ENV_CORRIDOR)],
    },
    Rule {
        action: Action::Interact,
        target: "Target_Cube_4",
        effects: &[
            ScenarioEffect::Narration(prompts::LOCKED_DOOR_NARRATION),
            ScenarioEffect::Environment(prompts::INTERACT_LOCKED_DOOR),
        ],
    },
    Rule {
        action: Action::Interact,
        target: "Target_Cube_2",
        effects: &[ScenarioEffect::Environment(prompts::INTERACT_CABINET)],
    },
];

#[derive(Debug, Clone)]
pub struct Scenario {
    opening: &'static str,
    rules: &'static [Rule],
}

impl Default for Scenario {
    fn default() -> Self {
        Self::hospital()
    }
}

impl Scenario {
    /// The trapped-doctor map: starts in the office.
    pub fn hospital() -> Self {
        Self {
            opening: prompts::ENV_OFFICE,
            rules: HOSPITAL_RULES,
        }
    }

    /// Environment note applied once at startup.
    pub fn opening(&self) -> &'static str {
        self.opening
    }

    /// Apply every rule matching the reply. Environment effects go straight into
    /// the agent's history; all effects are returned for display.
    pub fn apply(&self, reply: &AgentReply, agent: &mut DialogueAgent) -> Vec<ScenarioEffect> {
        let mut applied = Vec::new();
        for rule in self
            .rules
            .iter()
            .filter(|rule| rule.action == reply.action && rule.target == reply.target)
        {
            for effect in rule.effects {
                if let ScenarioEffect::Environment(note) = effect {
                    agent.update_environment(note);
                }
                applied.push(*effect);
            }
        }
        if !applied.is_empty() {
            log_debug(&format!(
                "scenario: {} {} applied {} effect(s)",
                reply.action,
                reply.target,
                applied.len()
            ));
        }
        applied
    }
}
