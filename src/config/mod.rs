//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use crate::backend::speech::{AudioFormat, SpeechParams};
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    default_vad_engine, DEFAULT_CAPTURE_CHANNEL_CAPACITY, DEFAULT_FRAME_SAMPLES,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_LOOKBACK_MS,
    DEFAULT_MAX_SENTENCE_MS, DEFAULT_MIN_SPEECH_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SAVE_PATH,
    DEFAULT_SILENCE_TAIL_MS, DEFAULT_VAD_FRAME_MS, DEFAULT_VAD_SMOOTHING_FRAMES,
    DEFAULT_VAD_THRESHOLD_DB, DEFAULT_VOICE, MAX_CONSECUTIVE_DEVICE_FAILURES,
};

/// CLI options for the walkie-talkie loop.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "walkie",
    about = "Walkie: talk a trapped doctor out of the hospital over a voice radio",
    author,
    version
)]
pub struct AppConfig {
    /// Where operator input comes from
    #[arg(long = "input-mode", value_enum, default_value_t = InputMode::Voice)]
    pub input_mode: InputMode,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Chat-completion provider driving the doctor
    #[arg(long = "chat-provider", value_enum, default_value_t = ChatProvider::Siliconflow)]
    pub chat_provider: ChatProvider,

    /// Override the provider's default chat model
    #[arg(long = "chat-model")]
    pub chat_model: Option<String>,

    /// Override the provider's API base URL
    #[arg(long = "chat-base-url")]
    pub chat_base_url: Option<String>,

    /// Speech-synthesis provider (`none` keeps replies text-only)
    #[arg(long = "speech-provider", value_enum, default_value_t = SpeechProvider::Siliconflow)]
    pub speech_provider: SpeechProvider,

    /// SiliconFlow API key
    #[arg(long = "siliconflow-api-key", env = "SILICONFLOW_API_KEY", hide_env_values = true)]
    pub siliconflow_api_key: Option<String>,

    /// DeepSeek API key
    #[arg(long = "deepseek-api-key", env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub deepseek_api_key: Option<String>,

    /// Timeout for chat and speech HTTP requests (seconds)
    #[arg(long = "http-timeout-secs", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,

    /// Synthesis voice name
    #[arg(long, default_value = DEFAULT_VOICE)]
    pub voice: String,

    /// Synthesized audio format
    #[arg(long = "speech-format", value_enum, default_value_t = AudioFormat::Mp3)]
    pub speech_format: AudioFormat,

    /// Synthesized audio sample rate (defaults per format)
    #[arg(long = "speech-sample-rate")]
    pub speech_sample_rate: Option<u32>,

    /// Speaking speed (0.25 to 4.0)
    #[arg(long = "speech-speed", default_value_t = 1.0)]
    pub speech_speed: f32,

    /// Output gain in dB (-10 to 10)
    #[arg(long = "speech-gain", default_value_t = 0.0, allow_negative_numbers = true)]
    pub speech_gain: f32,

    /// Send the reply text to synthesis without a mood-driven style prefix
    #[arg(long = "no-speech-style", default_value_t = false)]
    pub no_speech_style: bool,

    /// Whisper model path (ggml)
    #[arg(long = "whisper-model-path", env = "WALKIE_WHISPER_MODEL")]
    pub whisper_model_path: Option<String>,

    /// Language passed to Whisper
    #[arg(long, default_value = "zh")]
    pub lang: String,

    /// Whisper beam size (>1 enables beam search)
    #[arg(long = "whisper-beam-size", default_value_t = 0)]
    pub whisper_beam_size: u32,

    /// Whisper temperature
    #[arg(long = "whisper-temperature", default_value_t = 0.0)]
    pub whisper_temperature: f32,

    /// Voice activity detector implementation to use
    #[arg(long = "vad-engine", value_enum, default_value_t = default_vad_engine())]
    pub vad_engine: VadEngineKind,

    /// Voice activity detection threshold (decibels)
    #[arg(
        long = "vad-threshold-db",
        default_value_t = DEFAULT_VAD_THRESHOLD_DB,
        allow_negative_numbers = true
    )]
    pub vad_threshold_db: f32,

    /// Voice activity detection frame size (milliseconds)
    #[arg(long = "vad-frame-ms", default_value_t = DEFAULT_VAD_FRAME_MS)]
    pub vad_frame_ms: u64,

    /// VAD smoothing window (frames)
    #[arg(long = "vad-smoothing-frames", default_value_t = DEFAULT_VAD_SMOOTHING_FRAMES)]
    pub vad_smoothing_frames: usize,

    /// Trailing silence that ends a sentence (milliseconds)
    #[arg(long = "silence-tail-ms", default_value_t = DEFAULT_SILENCE_TAIL_MS)]
    pub silence_tail_ms: u64,

    /// Minimum speech before a sentence can end (milliseconds)
    #[arg(long = "min-speech-ms", default_value_t = DEFAULT_MIN_SPEECH_MS)]
    pub min_speech_ms: u64,

    /// Hard cap on one sentence (milliseconds)
    #[arg(long = "max-sentence-ms", default_value_t = DEFAULT_MAX_SENTENCE_MS)]
    pub max_sentence_ms: u64,

    /// Leading audio kept before speech onset (milliseconds)
    #[arg(long = "lookback-ms", default_value_t = DEFAULT_LOOKBACK_MS)]
    pub lookback_ms: u64,

    /// Samples read from the microphone per frame
    #[arg(long = "frame-samples", default_value_t = DEFAULT_FRAME_SAMPLES)]
    pub frame_samples: usize,

    /// Frame buffer between the audio callback and the feeder
    #[arg(
        long = "capture-channel-capacity",
        default_value_t = DEFAULT_CAPTURE_CHANNEL_CAPACITY
    )]
    pub capture_channel_capacity: usize,

    /// Wait-loop polling interval (milliseconds)
    #[arg(long = "poll-interval-ms", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Bound on joining the frame feeder at the end of listening (milliseconds)
    #[arg(long = "join-timeout-ms", default_value_t = DEFAULT_JOIN_TIMEOUT_MS)]
    pub join_timeout_ms: u64,

    /// Give up listening after this long without an utterance (0 waits indefinitely)
    #[arg(long = "listen-timeout-ms", default_value_t = 0)]
    pub listen_timeout_ms: u64,

    /// Phrase that ends the game (repeatable)
    #[arg(
        long = "exit-keyword",
        action = ArgAction::Append,
        value_name = "WORD",
        default_values = ["退出", "exit", "quit"]
    )]
    pub exit_keywords: Vec<String>,

    /// Phrase that saves the conversation (repeatable)
    #[arg(
        long = "save-keyword",
        action = ArgAction::Append,
        value_name = "WORD",
        default_values = ["保存", "save"]
    )]
    pub save_keywords: Vec<String>,

    /// Where the save keyword writes the conversation
    #[arg(long = "save-path", default_value = DEFAULT_SAVE_PATH)]
    pub save_path: PathBuf,

    /// Resume from a previously saved conversation
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Emit turn events as JSON lines instead of console text
    #[arg(long = "json-events", default_value_t = false)]
    pub json_events: bool,

    /// Parent directory for the per-process temp audio folder
    #[arg(long = "temp-root")]
    pub temp_root: Option<PathBuf>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "WALKIE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "WALKIE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging utterance/reply text (debug log only)
    #[arg(long = "log-content", env = "WALKIE_LOG_CONTENT", default_value_t = false)]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputMode {
    /// Microphone with streaming recognition; typed lines still work
    Voice,
    /// Typed lines only
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChatProvider {
    Siliconflow,
    Deepseek,
}

impl ChatProvider {
    pub fn label(self) -> &'static str {
        match self {
            ChatProvider::Siliconflow => "siliconflow",
            ChatProvider::Deepseek => "deepseek",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpeechProvider {
    Siliconflow,
    /// Text-only replies
    #[value(name = "none")]
    Off,
}

/// Available runtime-selectable VAD implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VadEngineKind {
    Earshot,
    Simple,
}

impl VadEngineKind {
    pub fn label(self) -> &'static str {
        match self {
            VadEngineKind::Earshot => "earshot",
            VadEngineKind::Simple => "simple",
        }
    }
}

/// Capture-side settings for one microphone session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device: Option<String>,
    pub frame_samples: usize,
    pub channel_capacity: usize,
}

/// Settings for the local streaming recognizer.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub model_path: Option<String>,
    pub lang: String,
    pub beam_size: u32,
    pub temperature: f32,
    pub vad_engine: VadEngineKind,
    pub vad_threshold_db: f32,
    pub vad_frame_ms: u64,
    pub vad_smoothing_frames: usize,
    pub silence_tail_ms: u64,
    pub min_speech_ms: u64,
    pub max_sentence_ms: u64,
    pub lookback_ms: u64,
}

/// Coordinator timing and command settings.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub poll_interval: Duration,
    pub join_timeout: Duration,
    pub listen_timeout: Option<Duration>,
    pub exit_keywords: Vec<String>,
    pub save_keywords: Vec<String>,
    pub save_path: PathBuf,
    pub speech_style: bool,
    pub max_device_failures: u32,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
            listen_timeout: None,
            exit_keywords: vec!["退出".into(), "exit".into(), "quit".into()],
            save_keywords: vec!["保存".into(), "save".into()],
            save_path: PathBuf::from(DEFAULT_SAVE_PATH),
            speech_style: true,
            max_device_failures: MAX_CONSECUTIVE_DEVICE_FAILURES,
        }
    }
}

impl AppConfig {
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.input_device.clone(),
            frame_samples: self.frame_samples,
            channel_capacity: self.capture_channel_capacity,
        }
    }

    pub fn recognizer_config(&self) -> RecognizerConfig {
        RecognizerConfig {
            model_path: self.whisper_model_path.clone(),
            lang: self.lang.clone(),
            beam_size: self.whisper_beam_size,
            temperature: self.whisper_temperature,
            vad_engine: self.vad_engine,
            vad_threshold_db: self.vad_threshold_db,
            vad_frame_ms: self.vad_frame_ms,
            vad_smoothing_frames: self.vad_smoothing_frames,
            silence_tail_ms: self.silence_tail_ms,
            min_speech_ms: self.min_speech_ms,
            max_sentence_ms: self.max_sentence_ms,
            lookback_ms: self.lookback_ms,
        }
    }

    pub fn speech_params(&self) -> SpeechParams {
        SpeechParams {
            voice: self.voice.clone(),
            format: self.speech_format,
            sample_rate: self.speech_sample_rate,
            speed: self.speech_speed,
            gain: self.speech_gain,
        }
    }

    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            listen_timeout: (self.listen_timeout_ms > 0)
                .then(|| Duration::from_millis(self.listen_timeout_ms)),
            exit_keywords: self.exit_keywords.clone(),
            save_keywords: self.save_keywords.clone(),
            save_path: self.save_path.clone(),
            speech_style: !self.no_speech_style,
            max_device_failures: MAX_CONSECUTIVE_DEVICE_FAILURES,
        }
    }

    /// API key for the selected chat provider.
    pub fn chat_api_key(&self) -> Option<&str> {
        match self.chat_provider {
            ChatProvider::Siliconflow => self.siliconflow_api_key.as_deref(),
            ChatProvider::Deepseek => self.deepseek_api_key.as_deref(),
        }
    }
}
