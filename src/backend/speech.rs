//! Speech-synthesis request shape and its validity rules.

use super::BackendError;
use clap::ValueEnum;
use serde_json::{json, Value};

pub const SPEECH_MODEL: &str = "FunAudioLLM/CosyVoice2-0.5B";
pub const VOICES: &[&str] = &[
    "alex", "anna", "bella", "benjamin", "charles", "claire", "david", "diana",
];
pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;
pub const MIN_GAIN: f32 = -10.0;
pub const MAX_GAIN: f32 = 10.0;
pub const MAX_TEXT_CHARS: usize = 128_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioFormat {
    Mp3,
    Opus,
    Wav,
    Pcm,
}

impl AudioFormat {
    pub fn label(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Wav => "wav",
            AudioFormat::Pcm => "pcm",
        }
    }

    /// File extension for a staged artifact.
    pub fn extension(self) -> &'static str {
        self.label()
    }

    pub fn supported_sample_rates(self) -> &'static [u32] {
        match self {
            AudioFormat::Opus => &[48_000],
            AudioFormat::Wav | AudioFormat::Pcm => &[8_000, 16_000, 24_000, 32_000, 44_100],
            AudioFormat::Mp3 => &[32_000, 44_100],
        }
    }

    pub fn default_sample_rate(self) -> u32 {
        match self {
            AudioFormat::Opus => 48_000,
            AudioFormat::Wav | AudioFormat::Pcm | AudioFormat::Mp3 => 44_100,
        }
    }
}

/// Voice settings fixed for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechParams {
    pub voice: String,
    pub format: AudioFormat,
    pub sample_rate: Option<u32>,
    pub speed: f32,
    pub gain: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            voice: "alex".to_string(),
            format: AudioFormat::Mp3,
            sample_rate: None,
            speed: 1.0,
            gain: 0.0,
        }
    }
}

impl SpeechParams {
    /// Check ranges and return the effective sample rate.
    pub fn validate(&self) -> Result<u32, BackendError> {
        if !VOICES.contains(&self.voice.as_str()) {
            return Err(BackendError::InvalidRequest(format!(
                "voice '{}' is not one of {VOICES:?}",
                self.voice
            )));
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(BackendError::InvalidRequest(format!(
                "speed must be between {MIN_SPEED} and {MAX_SPEED}, got {}",
                self.speed
            )));
        }
        if !(MIN_GAIN..=MAX_GAIN).contains(&self.gain) {
            return Err(BackendError::InvalidRequest(format!(
                "gain must be between {MIN_GAIN} and {MAX_GAIN}, got {}",
                self.gain
            )));
        }
        let rate = self
            .sample_rate
            .unwrap_or_else(|| self.format.default_sample_rate());
        if !self.format.supported_sample_rates().contains(&rate) {
            return Err(BackendError::InvalidRequest(format!(
                "{} supports sample rates {:?}, got {rate}",
                self.format.label(),
                self.format.supported_sample_rates()
            )));
        }
        Ok(rate)
    }
}

/// A validated synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    text: String,
    params: SpeechParams,
    sample_rate: u32,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, params: &SpeechParams) -> Result<Self, BackendError> {
        let text = text.into();
        let chars = text.chars().count();
        if !(1..=MAX_TEXT_CHARS).contains(&chars) {
            return Err(BackendError::InvalidRequest(format!(
                "text must be 1 to {MAX_TEXT_CHARS} characters, got {chars}"
            )));
        }
        let sample_rate = params.validate()?;
        Ok(Self {
            text,
            params: params.clone(),
            sample_rate,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn format(&self) -> AudioFormat {
        self.params.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// JSON body for an `/audio/speech` call against `model`.
    pub fn to_body(&self, model: &str) -> Value {
        json!({
            "model": model,
            "input": self.text,
            "voice": format!("{model}:{}", self.params.voice),
            "response_format": self.params.format.label(),
            "sample_rate": self.sample_rate,
            "stream": true,
            "speed": self.params.speed,
            "gain": self.params.gain,
        })
    }
}

/// Prefix `text` with a CosyVoice emotion instruction.
pub fn styled_text(style: &str, text: &str) -> String {
    format!("用{style}的情绪 说: <|endofprompt|>{text}")
}
