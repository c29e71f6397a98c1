//! Turn-level failures reported by the coordinator.
//!
//! Every variant is isolated to the turn it happened in; the loop reports it
//! and moves on unless it is a fatal device failure.

use crate::audio::CaptureError;
use crate::backend::BackendError;
use crate::playback::PlaybackError;
use crate::recognition::RecognitionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("speech recognition failed: {0}")]
    RecognitionTransport(String),
    #[error("chat request failed: {0}")]
    ChatFailure(#[source] BackendError),
    #[error("speech synthesis failed: {0}")]
    SynthesisFailure(#[source] BackendError),
    #[error("playback failed: {0}")]
    PlaybackFailure(#[source] PlaybackError),
    #[error("cleanup step '{step}' failed: {detail}")]
    ResourceCleanup { step: &'static str, detail: String },
}

impl TurnError {
    /// Stable label used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TurnError::DeviceUnavailable(_) => "device_unavailable",
            TurnError::RecognitionTransport(_) => "recognition_transport",
            TurnError::ChatFailure(_) => "chat_failure",
            TurnError::SynthesisFailure(_) => "synthesis_failure",
            TurnError::PlaybackFailure(_) => "playback_failure",
            TurnError::ResourceCleanup { .. } => "resource_cleanup",
        }
    }
}

impl From<CaptureError> for TurnError {
    fn from(err: CaptureError) -> Self {
        TurnError::DeviceUnavailable(err.to_string())
    }
}

impl From<RecognitionError> for TurnError {
    fn from(err: RecognitionError) -> Self {
        TurnError::RecognitionTransport(err.to_string())
    }
}
