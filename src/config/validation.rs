use super::defaults::{
    ISO_639_1_CODES, MAX_FRAME_SAMPLES, MAX_JOIN_TIMEOUT_MS, MAX_KEYWORD_CHARS,
    MAX_POLL_INTERVAL_MS, MAX_SENTENCE_HARD_LIMIT_MS, MIN_FRAME_SAMPLES, MIN_JOIN_TIMEOUT_MS,
    MIN_POLL_INTERVAL_MS,
};
use super::{AppConfig, ChatProvider, SpeechProvider};
use crate::playback::RodioPlayer;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths and keywords.
    pub fn validate(&mut self) -> Result<()> {
        self.validate_timing()?;
        self.validate_recognizer()?;
        self.validate_keywords()?;
        self.validate_providers()?;

        if let Some(path) = &self.resume {
            if !path.is_file() {
                bail!("--resume file '{}' does not exist", path.display());
            }
        }
        Ok(())
    }

    fn validate_timing(&self) -> Result<()> {
        if !(MIN_FRAME_SAMPLES..=MAX_FRAME_SAMPLES).contains(&self.frame_samples) {
            bail!(
                "--frame-samples must be between {MIN_FRAME_SAMPLES} and {MAX_FRAME_SAMPLES}, got {}",
                self.frame_samples
            );
        }
        if !(4..=1024).contains(&self.capture_channel_capacity) {
            bail!(
                "--capture-channel-capacity must be between 4 and 1024, got {}",
                self.capture_channel_capacity
            );
        }
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            bail!(
                "--poll-interval-ms must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS}, got {}",
                self.poll_interval_ms
            );
        }
        if !(MIN_JOIN_TIMEOUT_MS..=MAX_JOIN_TIMEOUT_MS).contains(&self.join_timeout_ms) {
            bail!(
                "--join-timeout-ms must be between {MIN_JOIN_TIMEOUT_MS} and {MAX_JOIN_TIMEOUT_MS}, got {}",
                self.join_timeout_ms
            );
        }
        if self.listen_timeout_ms != 0 && !(1_000..=600_000).contains(&self.listen_timeout_ms) {
            bail!(
                "--listen-timeout-ms must be 0 (disabled) or between 1000 and 600000, got {}",
                self.listen_timeout_ms
            );
        }
        if !(1..=600).contains(&self.http_timeout_secs) {
            bail!(
                "--http-timeout-secs must be between 1 and 600, got {}",
                self.http_timeout_secs
            );
        }
        Ok(())
    }

    fn validate_recognizer(&mut self) -> Result<()> {
        if self.max_sentence_ms < 1_000 || self.max_sentence_ms > MAX_SENTENCE_HARD_LIMIT_MS {
            bail!(
                "--max-sentence-ms must be between 1000 and {MAX_SENTENCE_HARD_LIMIT_MS} ms, got {}",
                self.max_sentence_ms
            );
        }
        if self.silence_tail_ms < 200 || self.silence_tail_ms > self.max_sentence_ms {
            bail!(
                "--silence-tail-ms must be >=200 and <= --max-sentence-ms ({})",
                self.max_sentence_ms
            );
        }
        if self.min_speech_ms < 50 || self.min_speech_ms > self.max_sentence_ms {
            bail!(
                "--min-speech-ms must be between 50 and {}",
                self.max_sentence_ms
            );
        }
        if self.lookback_ms > self.max_sentence_ms {
            bail!(
                "--lookback-ms ({}) cannot exceed --max-sentence-ms ({})",
                self.lookback_ms,
                self.max_sentence_ms
            );
        }
        if !(-120.0..=0.0).contains(&self.vad_threshold_db) {
            bail!(
                "--vad-threshold-db must be between -120.0 and 0.0 dB, got {}",
                self.vad_threshold_db
            );
        }
        if !(5..=120).contains(&self.vad_frame_ms) {
            bail!(
                "--vad-frame-ms must be between 5 and 120, got {}",
                self.vad_frame_ms
            );
        }
        if !(1..=10).contains(&self.vad_smoothing_frames) {
            bail!(
                "--vad-smoothing-frames must be between 1 and 10, got {}",
                self.vad_smoothing_frames
            );
        }
        if self.whisper_beam_size > 10 {
            bail!(
                "--whisper-beam-size must be between 0 and 10, got {}",
                self.whisper_beam_size
            );
        }
        if !(0.0..=5.0).contains(&self.whisper_temperature) {
            bail!(
                "--whisper-temperature must be between 0.0 and 5.0, got {}",
                self.whisper_temperature
            );
        }

        #[cfg(not(feature = "vad_earshot"))]
        if matches!(self.vad_engine, super::VadEngineKind::Earshot) {
            bail!("--vad-engine earshot requires building with the 'vad_earshot' feature");
        }

        validate_lang(&self.lang)?;

        if self.whisper_model_path.is_none() {
            if let Some(found) = discover_default_whisper_model(Path::new("whisper_models")) {
                self.whisper_model_path = Some(found.to_string_lossy().to_string());
            }
        }
        if let Some(model) = &mut self.whisper_model_path {
            let canonical = Path::new(model.as_str())
                .canonicalize()
                .with_context(|| format!("whisper model path '{model}' does not exist"))?;
            *model = canonical
                .to_str()
                .map(|s| s.to_string())
                .ok_or_else(|| anyhow!("whisper model path must be valid UTF-8"))?;
        }
        Ok(())
    }

    fn validate_keywords(&mut self) -> Result<()> {
        self.exit_keywords = normalize_keywords(&self.exit_keywords, "--exit-keyword")?;
        self.save_keywords = normalize_keywords(&self.save_keywords, "--save-keyword")?;
        if let Some(shared) = self
            .exit_keywords
            .iter()
            .find(|word| self.save_keywords.contains(word))
        {
            bail!("'{shared}' cannot be both an exit keyword and a save keyword");
        }
        if self.save_path.as_os_str().is_empty() {
            bail!("--save-path must not be empty");
        }
        Ok(())
    }

    fn validate_providers(&self) -> Result<()> {
        if self.chat_api_key().map_or(true, |key| key.trim().is_empty()) {
            let (flag, env) = match self.chat_provider {
                ChatProvider::Siliconflow => ("--siliconflow-api-key", "SILICONFLOW_API_KEY"),
                ChatProvider::Deepseek => ("--deepseek-api-key", "DEEPSEEK_API_KEY"),
            };
            bail!(
                "--chat-provider {} requires {flag} or {env}",
                self.chat_provider.label()
            );
        }
        if let Some(url) = &self.chat_base_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                bail!("--chat-base-url must start with http:// or https://, got '{url}'");
            }
        }
        if let Some(model) = &self.chat_model {
            if model.trim().is_empty() {
                bail!("--chat-model must not be empty");
            }
        }
        if self.speech_provider == SpeechProvider::Siliconflow {
            if self
                .siliconflow_api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
            {
                bail!(
                    "--speech-provider siliconflow requires --siliconflow-api-key or SILICONFLOW_API_KEY (use --speech-provider none for text-only replies)"
                );
            }
            if !RodioPlayer::supports(self.speech_format) {
                bail!(
                    "--speech-format {} cannot be played by the built-in player; use mp3, wav or pcm",
                    self.speech_format.label()
                );
            }
            self.speech_params()
                .validate()
                .map_err(|err| anyhow!("invalid speech settings: {err}"))?;
        }
        Ok(())
    }
}

fn validate_lang(lang: &str) -> Result<()> {
    if lang.trim().is_empty() {
        bail!("--lang must not be empty");
    }
    if lang.eq_ignore_ascii_case("auto") {
        return Ok(());
    }
    if !lang
        .chars()
        .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
    {
        bail!("--lang must contain only alphabetic characters or '-'/'_' separators");
    }
    let primary = lang
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if !ISO_639_1_CODES.contains(&primary.as_str()) {
        bail!("--lang must start with a valid ISO-639-1 code or be 'auto', got '{lang}'");
    }
    Ok(())
}

/// Trim, drop duplicates, and bound keyword length.
pub(super) fn normalize_keywords(words: &[String], flag: &str) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(words.len());
    for word in words {
        let trimmed = word.trim();
        if trimmed.is_empty() {
            bail!("{flag} must not be empty");
        }
        if trimmed.chars().count() > MAX_KEYWORD_CHARS {
            bail!("{flag} '{trimmed}' is longer than {MAX_KEYWORD_CHARS} characters");
        }
        let lowered = trimmed.to_lowercase();
        if !normalized.contains(&lowered) {
            normalized.push(lowered);
        }
    }
    if normalized.is_empty() {
        bail!("{flag} needs at least one value");
    }
    Ok(normalized)
}

/// Look for a ggml model under `models_dir` so voice mode works without
/// `--whisper-model-path` when the models live next to the working directory.
pub(super) fn discover_default_whisper_model(models_dir: &Path) -> Option<PathBuf> {
    if !models_dir.is_dir() {
        return None;
    }
    ["ggml-small.bin", "ggml-base.bin", "ggml-tiny.bin"]
        .iter()
        .map(|name| models_dir.join(name))
        .find(|candidate| candidate.is_file())
        .and_then(|candidate| candidate.canonicalize().ok())
}
