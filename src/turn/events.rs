//! What the operator sees: a stream of turn events rendered by a sink.

use crate::log_debug;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Voice,
    Typed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TurnEvent {
    Started {
        input: String,
        recognizer: Option<String>,
        speech: bool,
    },
    Notice {
        message: String,
    },
    Listening {
        turn: u64,
    },
    Heard {
        turn: u64,
        text: String,
        source: InputSource,
    },
    Reply {
        turn: u64,
        action: String,
        target: String,
        speak: String,
        mood: String,
        mood_changed: bool,
        recovered: bool,
    },
    Narration {
        turn: u64,
        text: String,
    },
    Spoke {
        turn: u64,
        bytes: u64,
    },
    Saved {
        path: String,
    },
    Error {
        turn: u64,
        kind: String,
        message: String,
        mood: String,
    },
    Mood {
        turn: u64,
        mood: String,
        level: u8,
    },
    Stopped {
        turns: u64,
        reason: String,
    },
}

pub trait EventSink: Send {
    fn emit(&mut self, event: &TurnEvent);
}

/// Human-readable lines.
pub struct ConsoleSink<W: Write + Send> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, event: &TurnEvent) -> io::Result<()> {
        let out = &mut self.out;
        match event {
            TurnEvent::Started {
                input,
                recognizer,
                speech,
            } => writeln!(
                out,
                "walkie ready: input={input} recognizer={} speech={}",
                recognizer.as_deref().unwrap_or("off"),
                if *speech { "on" } else { "off" }
            ),
            TurnEvent::Notice { message } => writeln!(out, "note: {message}"),
            TurnEvent::Listening { turn } => writeln!(out, "[{turn}] listening..."),
            TurnEvent::Heard { turn, text, .. } => writeln!(out, "[{turn}] you: {text}"),
            TurnEvent::Reply {
                turn,
                action,
                target,
                speak,
                ..
            } => {
                writeln!(out, "[{turn}] doctor: {speak}")?;
                if action != "none" {
                    writeln!(out, "[{turn}]   ({action} -> {target})")?;
                }
                Ok(())
            }
            TurnEvent::Narration { turn, text } => writeln!(out, "[{turn}] * {text}"),
            TurnEvent::Spoke { .. } => Ok(()),
            TurnEvent::Saved { path } => writeln!(out, "conversation saved to {path}"),
            TurnEvent::Error {
                turn,
                kind,
                message,
                mood,
            } => {
                writeln!(out, "[{turn}] error ({kind}): {message}")?;
                writeln!(out, "[{turn}] mood: {mood}")
            }
            TurnEvent::Mood { turn, mood, level } => {
                writeln!(out, "[{turn}] mood: {mood} ({level}/5)")
            }
            TurnEvent::Stopped { turns, reason } => {
                writeln!(out, "walkie stopped after {turns} turn(s): {reason}")
            }
        }?;
        out.flush()
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn emit(&mut self, event: &TurnEvent) {
        if let Err(err) = self.render(event) {
            log_debug(&format!("console write failed: {err}"));
        }
    }
}

/// One JSON object per line, for driving the loop from another program.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &TurnEvent) {
        let written = serde_json::to_writer(&mut self.out, event)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out))
            .and_then(|()| self.out.flush());
        if let Err(err) = written {
            log_debug(&format!("event write failed: {err}"));
        }
    }
}
