use std::fmt;

/// Where the coordinator is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnPhase {
    Idle,
    /// Capture and recognition are open and frames are flowing.
    Listening,
    /// Recognition stopped; waiting for the feeder to wind down.
    Draining,
    /// Talking to the agent. No audio is open.
    Dispatching,
    Speaking,
    Aborting,
    Terminated,
}

impl TurnPhase {
    pub fn label(self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Listening => "listening",
            TurnPhase::Draining => "draining",
            TurnPhase::Dispatching => "dispatching",
            TurnPhase::Speaking => "speaking",
            TurnPhase::Aborting => "aborting",
            TurnPhase::Terminated => "terminated",
        }
    }

    /// Transitions the coordinator is allowed to take.
    pub fn can_enter(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        match (self, next) {
            (Idle, Listening) | (Listening, Draining) | (Draining, Dispatching) => true,
            (Dispatching, Speaking) | (Speaking, Idle) => true,
            // Nothing usable was heard, or the reply needs no voice.
            (Draining, Idle) | (Dispatching, Idle) => true,
            // Typed input skips the audio phases.
            (Idle, Dispatching) => true,
            (Idle, Terminated) | (Aborting, Terminated) => true,
            (Listening | Draining | Dispatching | Speaking, Aborting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Current phase plus the guard that keeps transitions legal.
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: TurnPhase,
}

impl PhaseTracker {
    pub(crate) fn new() -> Self {
        Self {
            phase: TurnPhase::Idle,
        }
    }

    pub(crate) fn current(&self) -> TurnPhase {
        self.phase
    }

    /// Move to `next`. Returns false and stays put on an illegal transition.
    pub(crate) fn enter(&mut self, next: TurnPhase) -> bool {
        if self.phase == next {
            return true;
        }
        if !self.phase.can_enter(next) {
            debug_assert!(false, "illegal turn transition {} -> {next}", self.phase);
            tracing::error!(from = %self.phase, to = %next, "illegal turn transition");
            return false;
        }
        tracing::debug!(from = %self.phase, to = %next, "turn phase");
        self.phase = next;
        true
    }
}
