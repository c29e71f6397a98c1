use super::validation::{discover_default_whisper_model, normalize_keywords};
use super::{AppConfig, ChatProvider, InputMode, SpeechProvider};
use crate::backend::speech::AudioFormat;
use clap::Parser;
use std::fs;
use std::time::Duration;

fn base_config(extra: &[&str]) -> AppConfig {
    let mut args = vec![
        "test-app",
        "--siliconflow-api-key",
        "sk-test",
        "--deepseek-api-key",
        "sk-test",
    ];
    args.extend_from_slice(extra);
    let mut cfg = AppConfig::parse_from(args);
    cfg.whisper_model_path = None;
    cfg.resume = None;
    cfg
}

#[test]
fn defaults_validate_with_keys() {
    let mut cfg = base_config(&[]);
    cfg.validate().expect("defaults should be valid");
    assert_eq!(cfg.input_mode, InputMode::Voice);
    assert_eq!(cfg.chat_provider, ChatProvider::Siliconflow);
    assert_eq!(cfg.frame_samples, 3200);
    assert_eq!(cfg.exit_keywords, vec!["退出", "exit", "quit"]);
    assert_eq!(cfg.save_keywords, vec!["保存", "save"]);
}

#[test]
fn rejects_missing_chat_key() {
    let mut cfg = base_config(&["--chat-provider", "deepseek", "--speech-provider", "none"]);
    cfg.deepseek_api_key = None;
    let err = cfg.validate().expect_err("missing key must fail");
    assert!(err.to_string().contains("DEEPSEEK_API_KEY"));
}

#[test]
fn speech_provider_none_skips_speech_checks() {
    let mut cfg = base_config(&[
        "--chat-provider",
        "deepseek",
        "--speech-provider",
        "none",
        "--speech-speed",
        "9.0",
    ]);
    cfg.siliconflow_api_key = None;
    assert_eq!(cfg.speech_provider, SpeechProvider::Off);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_speech_speed_out_of_range() {
    let mut cfg = base_config(&["--speech-speed", "0.2"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--speech-speed", "4.5"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--speech-speed", "4.0"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_speech_gain_out_of_range() {
    let mut cfg = base_config(&["--speech-gain", "-10.5"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--speech-gain", "-10"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_sample_rate_invalid_for_format() {
    let mut cfg = base_config(&["--speech-format", "mp3", "--speech-sample-rate", "16000"]);
    assert_eq!(cfg.speech_format, AudioFormat::Mp3);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--speech-format", "wav", "--speech-sample-rate", "24000"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_speech_format_without_a_decoder() {
    let mut cfg = base_config(&["--speech-format", "opus"]);
    let err = cfg.validate().expect_err("opus is not playable");
    assert!(err.to_string().contains("--speech-format opus"));
    let mut cfg = base_config(&["--speech-format", "opus", "--speech-provider", "none"]);
    assert!(cfg.validate().is_ok());
    let mut cfg = base_config(&["--speech-format", "pcm", "--speech-sample-rate", "24000"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_unknown_voice() {
    let mut cfg = base_config(&["--voice", "zelda"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_poll_interval_out_of_bounds() {
    let mut cfg = base_config(&["--poll-interval-ms", "1"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--poll-interval-ms", "501"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_join_timeout_out_of_bounds() {
    let mut cfg = base_config(&["--join-timeout-ms", "50"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--join-timeout-ms", "6000"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_frame_samples_out_of_bounds() {
    let mut cfg = base_config(&["--frame-samples", "10"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_silence_tail_longer_than_sentence() {
    let mut cfg = base_config(&["--max-sentence-ms", "2000", "--silence-tail-ms", "2500"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_invalid_language_code() {
    let mut cfg = base_config(&["--lang", "zz-ZZ"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--lang", "zh$"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--lang", "zh-CN"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn custom_keywords_replace_defaults() {
    let mut cfg = base_config(&["--exit-keyword", " Bye ", "--exit-keyword", "bye"]);
    cfg.validate().expect("valid keywords");
    assert_eq!(cfg.exit_keywords, vec!["bye"]);
}

#[test]
fn rejects_keyword_used_for_exit_and_save() {
    let mut cfg = base_config(&["--exit-keyword", "done", "--save-keyword", "DONE"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn normalize_keywords_rejects_blank() {
    assert!(normalize_keywords(&["  ".to_string()], "--exit-keyword").is_err());
}

#[test]
fn rejects_bad_base_url() {
    let mut cfg = base_config(&["--chat-base-url", "ftp://example.com"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_missing_resume_file() {
    let mut cfg = base_config(&[]);
    cfg.resume = Some("/definitely/not/here.json".into());
    assert!(cfg.validate().is_err());
}

#[test]
fn turn_settings_treat_zero_listen_timeout_as_unbounded() {
    let cfg = base_config(&[]);
    assert_eq!(cfg.turn_settings().listen_timeout, None);
    let cfg = base_config(&["--listen-timeout-ms", "5000"]);
    assert_eq!(
        cfg.turn_settings().listen_timeout,
        Some(Duration::from_millis(5000))
    );
}

#[test]
fn no_speech_style_disables_style() {
    let cfg = base_config(&["--no-speech-style"]);
    assert!(!cfg.turn_settings().speech_style);
}

#[test]
fn discovers_model_in_models_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(discover_default_whisper_model(dir.path()).is_none());
    fs::write(dir.path().join("ggml-base.bin"), b"model").expect("write model");
    let found = discover_default_whisper_model(dir.path()).expect("model found");
    assert!(found.ends_with("ggml-base.bin"));
}

#[test]
fn canonicalizes_explicit_model_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = dir.path().join("ggml-tiny.bin");
    fs::write(&model, b"model").expect("write model");
    let mut cfg = base_config(&[]);
    cfg.whisper_model_path = Some(model.to_string_lossy().to_string());
    cfg.validate().expect("model path valid");
    let stored = cfg.whisper_model_path.expect("path kept");
    assert!(stored.ends_with("ggml-tiny.bin"));
}
