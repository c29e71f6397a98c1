//! Whisper speech-to-text.
//!
//! The model is loaded once per recognition service and reused for every
//! sentence.

use crate::config::RecognizerConfig;
use anyhow::Result;

/// Turns one 16 kHz mono sentence into text.
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, samples: &[f32]) -> Result<String>;
}

#[cfg(unix)]
mod platform {
    use super::SpeechToText;
    use crate::config::RecognizerConfig;
    use crate::log_debug;
    use anyhow::{anyhow, Context, Result};
    use std::io;
    use std::os::raw::{c_char, c_uint, c_void};
    use std::os::unix::io::AsRawFd;
    use std::sync::Once;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// A loaded GGML model plus the decoding settings to use with it.
    pub struct Transcriber {
        ctx: WhisperContext,
        config: RecognizerConfig,
    }

    impl Transcriber {
        /// Load the model, keeping whisper.cpp's startup chatter off stderr.
        pub fn new(model_path: &str, config: &RecognizerConfig) -> Result<Self> {
            install_whisper_log_silencer();

            let null = std::fs::OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .context("failed to open /dev/null")?;

            // SAFETY: fd 2 is duplicated and restored before returning; no other
            // code in this function writes to stderr in between.
            let saved_stderr = unsafe { libc::dup(2) };
            if saved_stderr < 0 {
                return Err(anyhow!(
                    "failed to dup stderr: {}",
                    io::Error::last_os_error()
                ));
            }
            if unsafe { libc::dup2(null.as_raw_fd(), 2) } < 0 {
                unsafe {
                    libc::close(saved_stderr);
                }
                return Err(anyhow!(
                    "failed to redirect stderr: {}",
                    io::Error::last_os_error()
                ));
            }

            let loaded =
                WhisperContext::new_with_params(model_path, WhisperContextParameters::default());

            let restored = unsafe { libc::dup2(saved_stderr, 2) };
            unsafe {
                libc::close(saved_stderr);
            }
            if restored < 0 {
                return Err(anyhow!(
                    "failed to restore stderr: {}",
                    io::Error::last_os_error()
                ));
            }

            let ctx = loaded.context("failed to load whisper model")?;
            Ok(Self {
                ctx,
                config: config.clone(),
            })
        }
    }

    impl SpeechToText for Transcriber {
        fn transcribe(&self, samples: &[f32]) -> Result<String> {
            let cfg = &self.config;
            let mut state = self
                .ctx
                .create_state()
                .context("failed to create whisper state")?;
            let mut params = if cfg.beam_size > 1 {
                FullParams::new(SamplingStrategy::BeamSearch {
                    beam_size: cfg.beam_size as i32,
                    patience: -1.0,
                })
            } else {
                FullParams::new(SamplingStrategy::Greedy { best_of: 1 })
            };
            if cfg.lang.eq_ignore_ascii_case("auto") {
                params.set_language(None);
                params.set_detect_language(true);
            } else {
                params.set_language(Some(&cfg.lang));
                params.set_detect_language(false);
            }
            params.set_temperature(cfg.temperature);
            params.set_n_threads(num_cpus::get().min(8) as i32);
            params.set_print_progress(false);
            params.set_print_timestamps(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_translate(false);
            params.set_token_timestamps(false);
            state.full(params, samples)?;

            let segments = match state.full_n_segments() {
                Ok(count) if count >= 0 => count,
                Ok(_) => {
                    log_debug("whisper returned a negative segment count");
                    return Ok(String::new());
                }
                Err(err) => {
                    log_debug(&format!("whisper failed to read segment count: {err}"));
                    return Ok(String::new());
                }
            };
            let mut transcript = String::new();
            for i in 0..segments {
                match state.full_get_segment_text_lossy(i) {
                    Ok(text) => transcript.push_str(&text),
                    Err(err) => log_debug(&format!("failed to read whisper segment {i}: {err}")),
                }
            }
            Ok(transcript)
        }
    }

    fn install_whisper_log_silencer() {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| unsafe {
            whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
        });
    }

    unsafe extern "C" fn whisper_log_callback(
        _level: c_uint,
        _text: *const c_char,
        _user_data: *mut c_void,
    ) {
    }
}

#[cfg(not(unix))]
mod platform {
    use super::SpeechToText;
    use crate::config::RecognizerConfig;
    use anyhow::{anyhow, Result};

    /// Placeholder for targets without the whisper.cpp build (e.g. Windows).
    pub struct Transcriber;

    impl Transcriber {
        pub fn new(_: &str, _: &RecognizerConfig) -> Result<Self> {
            Err(anyhow!(
                "Whisper transcription is currently supported only on Unix-like platforms"
            ))
        }
    }

    impl SpeechToText for Transcriber {
        fn transcribe(&self, _: &[f32]) -> Result<String> {
            Err(anyhow!(
                "Whisper transcription is currently supported only on Unix-like platforms"
            ))
        }
    }
}

pub use platform::Transcriber;

/// Load the configured model, or fail if none was resolved.
pub fn load_transcriber(config: &RecognizerConfig) -> Result<Transcriber> {
    let path = config
        .model_path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("no whisper model configured (--whisper-model-path)"))?;
    Transcriber::new(path, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use clap::Parser;

    #[test]
    fn missing_model_fails_to_load() {
        let mut config = AppConfig::parse_from(["walkie"]).recognizer_config();
        config.model_path = Some("/no/such/model.bin".to_string());
        assert!(load_transcriber(&config).is_err());
    }

    #[test]
    fn unset_model_path_is_an_error() {
        let mut config = AppConfig::parse_from(["walkie"]).recognizer_config();
        config.model_path = None;
        let err = load_transcriber(&config).err().expect("error");
        assert!(err.to_string().contains("--whisper-model-path"));
    }
}
