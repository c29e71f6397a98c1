//! The conversation loop.
//!
//! One turn: open the microphone and a recognition session, keep the first
//! finished sentence, close both, ask the agent, then speak the reply. Audio
//! resources never outlive the listening phase, and an interrupt tears down
//! whatever phase is running.

mod commands;
mod coordinator;
mod events;
mod feeder;
mod phase;

pub use commands::{classify, Command};
pub use coordinator::{AudioInput, ExitReason, RunSummary, SpeechOutput, TurnCoordinator};
pub use events::{ConsoleSink, EventSink, InputSource, JsonLinesSink, TurnEvent};
pub use phase::TurnPhase;
