use super::VadEngineKind;

pub const DEFAULT_FRAME_SAMPLES: usize = 3200;
pub const DEFAULT_CAPTURE_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_VAD_THRESHOLD_DB: f32 = -50.0;
pub const DEFAULT_VAD_FRAME_MS: u64 = 20;
pub const DEFAULT_VAD_SMOOTHING_FRAMES: usize = 3;
pub const DEFAULT_SILENCE_TAIL_MS: u64 = 800;
pub const DEFAULT_MIN_SPEECH_MS: u64 = 300;
pub const DEFAULT_MAX_SENTENCE_MS: u64 = 15_000;
pub const DEFAULT_LOOKBACK_MS: u64 = 300;

pub const DEFAULT_VOICE: &str = "alex";
pub const DEFAULT_SAVE_PATH: &str = "game_save.json";
pub const MAX_CONSECUTIVE_DEVICE_FAILURES: u32 = 3;

pub(super) const MIN_POLL_INTERVAL_MS: u64 = 5;
pub(super) const MAX_POLL_INTERVAL_MS: u64 = 500;
pub(super) const MIN_JOIN_TIMEOUT_MS: u64 = 100;
pub(super) const MAX_JOIN_TIMEOUT_MS: u64 = 5000;
pub(super) const MIN_FRAME_SAMPLES: usize = 160;
pub(super) const MAX_FRAME_SAMPLES: usize = 16_000;
pub(super) const MAX_SENTENCE_HARD_LIMIT_MS: u64 = 60_000;
pub(super) const MAX_KEYWORD_CHARS: usize = 32;
pub(super) const ISO_639_1_CODES: &[&str] = &[
    "af", "am", "ar", "az", "be", "bg", "bn", "bs", "ca", "cs", "cy", "da", "de", "el", "en", "es",
    "et", "eu", "fa", "fi", "fil", "fr", "ga", "gl", "gu", "he", "hi", "hr", "hu", "hy", "id",
    "is", "it", "ja", "jv", "ka", "kk", "km", "kn", "ko", "lo", "lt", "lv", "mk", "ml", "mn", "mr",
    "ms", "my", "ne", "nl", "no", "pa", "pl", "pt", "ro", "ru", "si", "sk", "sl", "sq", "sr", "sv",
    "sw", "ta", "te", "th", "tr", "uk", "ur", "vi", "yue", "zh",
];

pub const fn default_vad_engine() -> VadEngineKind {
    #[cfg(feature = "vad_earshot")]
    {
        VadEngineKind::Earshot
    }
    #[cfg(not(feature = "vad_earshot"))]
    {
        VadEngineKind::Simple
    }
}
