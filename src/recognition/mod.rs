//! Streaming speech recognition sessions.
//!
//! A `RecognitionService` accepts PCM and reports sentence boundaries through an
//! event callback that may run on the service's own thread.
//! `StreamingRecognitionSession` wraps one connection: the callback only
//! touches the single-use `UtteranceSlot`, while `feed` and `stop` serialize
//! on the session state so no frame is ever sent after a stop was requested.

pub mod local;
mod slot;
#[cfg(test)]
mod tests;

pub use local::{sanitize_transcript, LocalWhisperService};
pub use slot::{SlotWait, UtteranceSlot};

use crate::audio::{AudioFrame, TARGET_CHANNELS, TARGET_RATE};
use crate::lock::{ClaimKind, ExclusiveClaim};
use crate::{lock_or_recover, log_debug, log_debug_content};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    #[error("recognition service unreachable: {0}")]
    ServiceUnreachable(String),
    #[error("recognition service rejected credentials: {0}")]
    AuthError(String),
    #[error("recognition session is not active")]
    SessionNotActive,
    #[error("a recognition session is already active for '{0}'")]
    AlreadyActive(String),
    #[error("recognition transport failed: {0}")]
    TransportError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    /// Connecting; not yet accepting audio.
    Idle,
    Active,
    Stopped,
}

/// Audio shape announced when a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognitionParams {
    pub sample_rate: u32,
    pub format: &'static str,
    pub channels: u16,
}

impl Default for RecognitionParams {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_RATE,
            format: "pcm",
            channels: TARGET_CHANNELS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    SpeechStarted,
    SentenceEnd(String),
    Failed(RecognitionError),
}

/// Final text of one spoken sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub end_of_speech: bool,
    pub timestamp: SystemTime,
}

impl Utterance {
    pub fn sentence(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_of_speech: true,
            timestamp: SystemTime::now(),
        }
    }
}

pub type EventCallback = Box<dyn Fn(RecognitionEvent) + Send + Sync>;

pub trait RecognitionService: Send + Sync {
    fn name(&self) -> &'static str;

    fn connect(
        &self,
        params: &RecognitionParams,
        on_event: EventCallback,
    ) -> Result<Box<dyn RecognitionStream>, RecognitionError>;
}

/// One open connection to a recognition service.
pub trait RecognitionStream: Send {
    fn request_id(&self) -> &str;

    /// Submit little-endian 16-bit PCM.
    fn send_audio(&mut self, pcm: &[u8]) -> Result<(), RecognitionError>;

    /// Close the connection. Events may still arrive until it returns.
    fn finish(&mut self) -> Result<(), RecognitionError>;
}

struct Core {
    state: RecognitionState,
    stream: Option<Box<dyn RecognitionStream>>,
    claim: Option<ExclusiveClaim>,
}

struct Shared {
    core: Mutex<Core>,
    slot: Arc<UtteranceSlot>,
    failure: Arc<Mutex<Option<RecognitionError>>>,
    heard_speech: Arc<AtomicBool>,
    request_id: String,
}

impl Shared {
    fn stop(&self) -> Result<(), RecognitionError> {
        let mut core = lock_or_recover(&self.core, "recognition stop");
        if core.state == RecognitionState::Stopped {
            return Ok(());
        }
        core.state = RecognitionState::Stopped;
        self.slot.close();
        let result = match core.stream.take() {
            Some(mut stream) => stream.finish(),
            None => Ok(()),
        };
        core.claim.take();
        log_debug(&format!("recognition session {} stopped", self.request_id));
        result
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log_debug(&format!("recognition stop on drop failed: {err}"));
        }
    }
}

fn record_failure(failure: &Mutex<Option<RecognitionError>>, err: RecognitionError) {
    let mut slot = lock_or_recover(failure, "recognition failure");
    if slot.is_none() {
        *slot = Some(err);
    }
}

/// Handle on one recognition session. Clones share the session, so the
/// feeding loop and the coordinator can each hold one.
#[derive(Clone)]
pub struct StreamingRecognitionSession {
    shared: Arc<Shared>,
}

impl StreamingRecognitionSession {
    /// Connect to `service` on behalf of the capture device `device`.
    pub fn start(
        service: &dyn RecognitionService,
        device: &str,
        params: RecognitionParams,
    ) -> Result<Self, RecognitionError> {
        let claim = ExclusiveClaim::acquire(ClaimKind::Recognition, device)
            .ok_or_else(|| RecognitionError::AlreadyActive(device.to_string()))?;
        let slot = Arc::new(UtteranceSlot::new());
        let failure = Arc::new(Mutex::new(None));
        let heard_speech = Arc::new(AtomicBool::new(false));

        let on_event: EventCallback = {
            let slot = slot.clone();
            let failure = failure.clone();
            let heard_speech = heard_speech.clone();
            Box::new(move |event| match event {
                RecognitionEvent::SpeechStarted => {
                    heard_speech.store(true, Ordering::Release);
                }
                RecognitionEvent::SentenceEnd(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        return;
                    }
                    if !slot.offer(Utterance::sentence(text)) {
                        log_debug_content(&format!("discarded extra utterance: {text}"));
                    }
                }
                RecognitionEvent::Failed(err) => {
                    log_debug(&format!("recognition failed: {err}"));
                    record_failure(&failure, err);
                    slot.close();
                }
            })
        };

        let stream = service.connect(&params, on_event)?;
        let request_id = stream.request_id().to_string();
        log_debug(&format!(
            "recognition session {request_id} active via {} ({}Hz {} x{})",
            service.name(),
            params.sample_rate,
            params.format,
            params.channels
        ));
        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    state: RecognitionState::Active,
                    stream: Some(stream),
                    claim: Some(claim),
                }),
                slot,
                failure,
                heard_speech,
                request_id,
            }),
        })
    }

    pub fn request_id(&self) -> &str {
        &self.shared.request_id
    }

    /// A failure reported by the service counts as stopped even before the
    /// next `feed` notices it.
    pub fn state(&self) -> RecognitionState {
        if self.failure().is_some() {
            return RecognitionState::Stopped;
        }
        lock_or_recover(&self.shared.core, "recognition state").state
    }

    pub fn is_active(&self) -> bool {
        self.state() == RecognitionState::Active
    }

    /// Send one frame. Fails once the session is stopped, including when the
    /// service reported a failure.
    pub fn feed(&self, frame: &AudioFrame) -> Result<(), RecognitionError> {
        let mut core = lock_or_recover(&self.shared.core, "recognition feed");
        if core.state != RecognitionState::Active {
            return Err(RecognitionError::SessionNotActive);
        }
        let outcome = match self.failure() {
            Some(err) => Err(err),
            None => match core.stream.as_mut() {
                Some(stream) => stream.send_audio(&frame.to_le_bytes()),
                None => Err(RecognitionError::SessionNotActive),
            },
        };
        if let Err(err) = &outcome {
            record_failure(&self.shared.failure, err.clone());
            drop(core);
            if let Err(stop_err) = self.shared.stop() {
                log_debug(&format!("recognition stop after failure: {stop_err}"));
            }
            return Err(match err {
                RecognitionError::TransportError(_) => err.clone(),
                other => RecognitionError::TransportError(other.to_string()),
            });
        }
        Ok(())
    }

    /// Stop streaming. Idempotent and callable from any thread.
    pub fn stop(&self) -> Result<(), RecognitionError> {
        self.shared.stop()
    }

    pub fn slot(&self) -> &UtteranceSlot {
        &self.shared.slot
    }

    /// The error that ended the session, if any.
    pub fn failure(&self) -> Option<RecognitionError> {
        lock_or_recover(&self.shared.failure, "recognition failure").clone()
    }

    pub fn heard_speech(&self) -> bool {
        self.shared.heard_speech.load(Ordering::Acquire)
    }

    pub fn discarded(&self) -> usize {
        self.shared.slot.discarded()
    }
}
