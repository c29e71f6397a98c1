//! Walkie entrypoint: wires the microphone, recognizer, chat and speech
//! providers into one turn coordinator and runs it until the operator quits.
//!
//! # Threads
//!
//! - Main: the coordinator's turn loop
//! - Feeder: capture -> recognition frames, only while listening
//! - Recognizer: Whisper transcription behind the recognition session
//! - Chat / speech workers: one per request, abandoned on interrupt
//! - Stdin reader: typed lines

mod cli_utils;

use anyhow::{Context, Result};
use clap::Parser;
use std::panic;
use std::process::ExitCode;
use std::sync::{Arc, OnceLock};
use walkie::agent::DialogueAgent;
use walkie::audio::CpalDevice;
use walkie::backend::{chat_backend, speech_backend};
use walkie::config::{AppConfig, InputMode};
use walkie::input::spawn_stdin_reader;
use walkie::interrupt::Interrupt;
use walkie::playback::{RodioPlayer, TempWorkspace};
use walkie::recognition::LocalWhisperService;
use walkie::turn::{
    AudioInput, ConsoleSink, EventSink, JsonLinesSink, SpeechOutput, TurnCoordinator,
};
use walkie::{init_logging, init_tracing, log_debug, log_debug_content, log_file_path, LogSettings};

use crate::cli_utils::list_input_devices;

static PANIC_HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            log_debug(&format!("fatal: {err:#}"));
            eprintln!("walkie: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let mut config = AppConfig::parse();
    if config.list_input_devices {
        list_input_devices()?;
        return Ok(ExitCode::SUCCESS);
    }

    config.validate()?;
    init_logging(&config);
    init_tracing(LogSettings::from_config(&config));
    install_panic_hook();
    log_debug("=== Walkie Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let interrupt = Interrupt::new();
    interrupt
        .install()
        .context("failed to install signal handlers")?;

    let chat = chat_backend(&config).context("chat provider unavailable")?;
    let speech = speech_backend(&config).context("speech provider unavailable")?;

    let mut agent = DialogueAgent::new();
    if let Some(path) = &config.resume {
        agent
            .load_messages(path)
            .with_context(|| format!("failed to resume from {}", path.display()))?;
        log_debug(&format!("resumed {} message(s)", agent.messages().len()));
    }

    let sink: Box<dyn EventSink> = if config.json_events {
        Box::new(JsonLinesSink::stdout())
    } else {
        Box::new(ConsoleSink::stdout())
    };
    let typed = spawn_stdin_reader().context("failed to start stdin reader")?;
    let mut coordinator = TurnCoordinator::new(agent, chat, sink, config.turn_settings())
        .with_interrupt(interrupt)
        .with_typed_input(typed);

    if config.input_mode == InputMode::Voice {
        match open_audio(&config) {
            Ok(audio) => coordinator = coordinator.with_audio(audio),
            Err(err) => {
                log_debug(&format!("voice input unavailable: {err:#}"));
                coordinator.notice(format!(
                    "voice input unavailable ({err:#}); type your messages instead"
                ));
            }
        }
    }

    if let Some(backend) = speech {
        let workspace = TempWorkspace::create(config.temp_root.as_deref())
            .context("failed to create temp audio folder")?;
        coordinator = coordinator.with_speech(
            SpeechOutput {
                backend,
                params: config.speech_params(),
                player: Arc::new(RodioPlayer),
            },
            workspace,
        );
    }

    let summary = coordinator.run();
    log_debug(&format!(
        "=== Walkie Stopped: {} after {} turn(s) ===",
        summary.exit.label(),
        summary.turns
    ));
    Ok(ExitCode::from(summary.exit.exit_status()))
}

/// Microphone plus local recognizer. Either failing keeps the game in text mode.
fn open_audio(config: &AppConfig) -> Result<AudioInput> {
    let device = CpalDevice::new(config.input_device.as_deref())
        .context("no usable input device")?;
    let service = LocalWhisperService::load(&config.recognizer_config())
        .context("speech recognizer failed to load")?;
    Ok(AudioInput {
        device: Arc::new(device),
        service: Arc::new(service),
        capture: config.capture_config(),
    })
}

fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            walkie::log_panic(info);
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "unknown".to_string());
            log_debug(&format!("panic at {location}"));
            log_debug_content(&format!("panic: {info}"));
            previous(info);
        }));
    });
}
