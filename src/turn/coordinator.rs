use super::commands::{self, Command};
use super::events::{EventSink, InputSource, TurnEvent};
use super::feeder::{spawn_feeder, Feeder, FeederExit, FeederReport};
use super::phase::{PhaseTracker, TurnPhase};
use crate::agent::{prompts, DialogueAgent, Mood};
use crate::audio::{AudioCaptureSession, CaptureDevice};
use crate::backend::speech::styled_text;
use crate::backend::{BackendError, ModelBackend, SpeechParams, SpeechRequest};
use crate::config::{CaptureConfig, TurnSettings};
use crate::error::TurnError;
use crate::interrupt::Interrupt;
use crate::lock::{join_with_timeout, JoinOutcome};
use crate::playback::{AudioPlayer, AudioSpec, PlaybackError, PlaybackManager, TempWorkspace};
use crate::recognition::{
    RecognitionParams, RecognitionService, SlotWait, StreamingRecognitionSession, Utterance,
};
use crate::scenario::{Scenario, ScenarioEffect};
use crate::{log_debug, log_debug_content, log_timing};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const JOIN_POLL: Duration = Duration::from_millis(5);
/// Wait between failed attempts to open the microphone, in poll intervals.
const RETRY_POLLS: u32 = 10;

/// Microphone plus the recognizer it streams into.
pub struct AudioInput {
    pub device: Arc<dyn CaptureDevice>,
    pub service: Arc<dyn RecognitionService>,
    pub capture: CaptureConfig,
}

/// Synthesis provider and the player for its output.
pub struct SpeechOutput {
    pub backend: Arc<dyn ModelBackend>,
    pub params: SpeechParams,
    pub player: Arc<dyn AudioPlayer>,
}

struct Speaker {
    backend: Arc<dyn ModelBackend>,
    params: SpeechParams,
    playback: PlaybackManager,
    workspace: TempWorkspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    ExitCommand,
    Interrupted,
    /// Typed input reached EOF with no microphone to fall back on.
    InputClosed,
    /// The microphone kept failing and there was no typed input.
    DeviceFailed,
}

impl ExitReason {
    pub fn label(self) -> &'static str {
        match self {
            ExitReason::ExitCommand => "exit_command",
            ExitReason::Interrupted => "interrupted",
            ExitReason::InputClosed => "input_closed",
            ExitReason::DeviceFailed => "device_failed",
        }
    }

    /// Process exit status. An interrupt that reached here shut down cleanly,
    /// so it exits 0; only the forced second Ctrl-C leaves with
    /// [`FORCED_EXIT_CODE`](crate::interrupt::FORCED_EXIT_CODE).
    pub fn exit_status(self) -> u8 {
        match self {
            ExitReason::ExitCommand | ExitReason::Interrupted | ExitReason::InputClosed => 0,
            ExitReason::DeviceFailed => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Utterances handed to the agent.
    pub turns: u64,
    pub exit: ExitReason,
}

/// What one input phase produced.
enum Heard {
    Text(String, InputSource),
    Nothing,
    Exit(ExitReason),
}

/// Why the listening wait ended.
enum ListenEnd {
    Utterance(Utterance),
    Typed(String),
    Failed(TurnError),
    FeederEnded(FeederReport),
    TimedOut,
    Interrupted,
}

/// Result of a blocking call moved onto a helper thread.
enum Waited<T> {
    Done(T),
    /// The worker died without answering.
    Lost(String),
    Interrupted,
}

/// Runs the conversation: listen, dispatch, speak, repeat.
pub struct TurnCoordinator {
    settings: TurnSettings,
    agent: DialogueAgent,
    scenario: Scenario,
    chat: Arc<dyn ModelBackend>,
    audio: Option<AudioInput>,
    speaker: Option<Speaker>,
    typed: Option<Receiver<String>>,
    sink: Box<dyn EventSink>,
    interrupt: Interrupt,
    phase: PhaseTracker,
    cycle: u64,
    turns: u64,
    listen_failures: u32,
}

impl TurnCoordinator {
    pub fn new(
        agent: DialogueAgent,
        chat: Arc<dyn ModelBackend>,
        sink: Box<dyn EventSink>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            settings,
            agent,
            scenario: Scenario::hospital(),
            chat,
            audio: None,
            speaker: None,
            typed: None,
            sink,
            interrupt: Interrupt::new(),
            phase: PhaseTracker::new(),
            cycle: 0,
            turns: 0,
            listen_failures: 0,
        }
    }

    pub fn with_audio(mut self, audio: AudioInput) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Voice replies, staged under `workspace`.
    pub fn with_speech(mut self, speech: SpeechOutput, workspace: TempWorkspace) -> Self {
        self.speaker = Some(Speaker {
            playback: PlaybackManager::new(&workspace, speech.player),
            backend: speech.backend,
            params: speech.params,
            workspace,
        });
        self
    }

    pub fn with_typed_input(mut self, lines: Receiver<String>) -> Self {
        self.typed = Some(lines);
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = scenario;
        self
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase.current()
    }

    /// Show an operator-facing note, e.g. a startup fallback.
    pub fn notice(&mut self, message: impl Into<String>) {
        self.emit(TurnEvent::Notice {
            message: message.into(),
        });
    }

    /// Loop until an exit command, an interrupt, or input runs out.
    pub fn run(mut self) -> RunSummary {
        if self.agent.messages().is_empty() {
            self.agent.initialize(prompts::SYSTEM_PROMPT);
            self.agent.update_environment(self.scenario.opening());
        }
        self.emit(TurnEvent::Started {
            input: if self.audio.is_some() { "voice" } else { "text" }.to_string(),
            recognizer: self
                .audio
                .as_ref()
                .map(|audio| audio.service.name().to_string()),
            speech: self.speaker.is_some(),
        });
        tracing::info!(
            voice = self.audio.is_some(),
            speech = self.speaker.is_some(),
            "conversation started"
        );

        let exit = loop {
            if self.interrupt.is_raised() {
                break ExitReason::Interrupted;
            }
            if let Some(reason) = self.run_turn() {
                break reason;
            }
        };
        self.shutdown(exit)
    }

    fn run_turn(&mut self) -> Option<ExitReason> {
        self.cycle += 1;
        let heard = if self.audio.is_some() {
            self.listen()
        } else {
            self.wait_typed()
        };
        match heard {
            Heard::Text(text, source) => self.handle_text(text, source),
            Heard::Nothing => None,
            Heard::Exit(reason) => Some(reason),
        }
    }

    // --- input ------------------------------------------------------------

    fn wait_typed(&mut self) -> Heard {
        let Some(typed) = self.typed.as_ref() else {
            return Heard::Exit(ExitReason::InputClosed);
        };
        loop {
            if self.interrupt.is_raised() {
                return Heard::Exit(ExitReason::Interrupted);
            }
            match typed.recv_timeout(self.settings.poll_interval) {
                Ok(line) => return Heard::Text(line, InputSource::Typed),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Heard::Exit(ExitReason::InputClosed),
            }
        }
    }

    /// A typed line, if one is waiting. Losing stdin in voice mode only
    /// disables typing.
    fn poll_typed(&mut self) -> Option<String> {
        match self.typed.as_ref()?.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log_debug("typed input closed; voice only from here");
                self.typed = None;
                None
            }
        }
    }

    fn listen(&mut self) -> Heard {
        let Some(audio) = self.audio.as_ref() else {
            return Heard::Nothing;
        };
        let service = audio.service.clone();
        let frame_samples = audio.capture.frame_samples;
        let capture = match AudioCaptureSession::open(audio.device.clone(), &audio.capture) {
            Ok(capture) => capture,
            Err(err) => return self.listen_failed(err.into()),
        };
        let recognition = match StreamingRecognitionSession::start(
            service.as_ref(),
            capture.device_name(),
            RecognitionParams::default(),
        ) {
            Ok(session) => session,
            Err(err) => {
                drop(capture);
                return self.listen_failed(err.into());
            }
        };
        let feeder = match spawn_feeder(capture, recognition.clone(), frame_samples) {
            Ok(feeder) => feeder,
            Err(err) => {
                if let Err(stop_err) = recognition.stop() {
                    log_debug(&format!("recognition stop after spawn failure: {stop_err}"));
                }
                return self.listen_failed(TurnError::DeviceUnavailable(format!(
                    "failed to start frame feeder: {err}"
                )));
            }
        };
        self.phase.enter(TurnPhase::Listening);
        self.emit(TurnEvent::Listening { turn: self.cycle });
        tracing::info!(
            turn = self.cycle,
            request_id = recognition.request_id(),
            "listening"
        );

        let started = Instant::now();
        let end = self.wait_for_utterance(&recognition, &feeder);
        if matches!(end, ListenEnd::Interrupted) {
            self.phase.enter(TurnPhase::Aborting);
            tracing::warn!(turn = self.cycle, "interrupted while listening");
            self.drain(&recognition, feeder);
            return Heard::Exit(ExitReason::Interrupted);
        }

        self.phase.enter(TurnPhase::Draining);
        let report = self.drain(&recognition, feeder);
        log_timing("listen", started.elapsed());
        if recognition.discarded() > 0 {
            log_debug(&format!(
                "turn {}: discarded {} extra sentence(s)",
                self.cycle,
                recognition.discarded()
            ));
        }
        if let Some(report) = &report {
            log_debug(&format!(
                "turn {}: fed {} frame(s), {} capture chunk(s) dropped",
                self.cycle, report.frames, report.dropped_chunks
            ));
        }

        if !matches!(end, ListenEnd::FeederEnded(_)) {
            self.listen_failures = 0;
        }
        match end {
            ListenEnd::Utterance(utterance) => {
                log_debug_content(&format!("heard: {}", utterance.text));
                Heard::Text(utterance.text, InputSource::Voice)
            }
            ListenEnd::Typed(line) => Heard::Text(line, InputSource::Typed),
            ListenEnd::Failed(err) => {
                self.report_error(&err);
                self.phase.enter(TurnPhase::Idle);
                Heard::Nothing
            }
            ListenEnd::FeederEnded(report) => self.feeder_failed(report, &recognition),
            ListenEnd::TimedOut => {
                self.notice("no speech heard; listening again");
                self.phase.enter(TurnPhase::Idle);
                Heard::Nothing
            }
            ListenEnd::Interrupted => Heard::Exit(ExitReason::Interrupted),
        }
    }

    fn wait_for_utterance(
        &mut self,
        recognition: &StreamingRecognitionSession,
        feeder: &Feeder,
    ) -> ListenEnd {
        let started = Instant::now();
        loop {
            if self.interrupt.is_raised() {
                return ListenEnd::Interrupted;
            }
            if let Some(line) = self.poll_typed() {
                return ListenEnd::Typed(line);
            }
            match recognition.slot().wait(self.settings.poll_interval) {
                SlotWait::Delivered(utterance) => return ListenEnd::Utterance(utterance),
                SlotWait::Closed => {
                    let detail = recognition
                        .failure()
                        .map(|err| err.to_string())
                        .unwrap_or_else(|| "recognition session closed".to_string());
                    return ListenEnd::Failed(TurnError::RecognitionTransport(detail));
                }
                SlotWait::Pending => {}
            }
            if let Ok(report) = feeder.report.try_recv() {
                return ListenEnd::FeederEnded(report);
            }
            // Once speech has started the sentence is allowed to finish.
            if let Some(limit) = self.settings.listen_timeout {
                if started.elapsed() >= limit && !recognition.heard_speech() {
                    return ListenEnd::TimedOut;
                }
            }
        }
    }

    /// Stop recognition, then wait (bounded) for the feeder, which closes
    /// the capture session on its way out. Each step runs even if the one
    /// before it failed.
    fn drain(
        &mut self,
        recognition: &StreamingRecognitionSession,
        feeder: Feeder,
    ) -> Option<FeederReport> {
        if let Err(err) = recognition.stop() {
            self.cleanup_failed("stop recognition", err.to_string());
        }
        let Feeder { handle, report } = feeder;
        match join_with_timeout(handle, self.settings.join_timeout, JOIN_POLL) {
            JoinOutcome::Joined => {}
            JoinOutcome::Panicked => {
                self.cleanup_failed("join feeder", "feeder thread panicked".to_string())
            }
            JoinOutcome::Abandoned => self.cleanup_failed(
                "join feeder",
                format!(
                    "still running after {:?}; abandoned",
                    self.settings.join_timeout
                ),
            ),
        }
        report.try_recv().ok()
    }

    fn feeder_failed(
        &mut self,
        report: FeederReport,
        recognition: &StreamingRecognitionSession,
    ) -> Heard {
        let err = match report.exit {
            FeederExit::CaptureFailed(err) => {
                self.phase.enter(TurnPhase::Idle);
                return self.listen_failed(err.into());
            }
            FeederExit::FeedFailed(err) => TurnError::from(err),
            FeederExit::Stopped => TurnError::RecognitionTransport(
                recognition
                    .failure()
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "recognition stopped unexpectedly".to_string()),
            ),
        };
        self.report_error(&err);
        self.phase.enter(TurnPhase::Idle);
        Heard::Nothing
    }

    /// Count a failed attempt to start listening. Too many in a row either
    /// switch to typed input or end the run.
    fn listen_failed(&mut self, err: TurnError) -> Heard {
        self.listen_failures += 1;
        self.report_error(&err);
        if self.listen_failures >= self.settings.max_device_failures {
            if self.typed.is_some() {
                self.audio = None;
                tracing::warn!(
                    failures = self.listen_failures,
                    "microphone unusable; switching to typed input"
                );
                self.notice(format!(
                    "microphone failed {} times; switching to typed input",
                    self.listen_failures
                ));
                return Heard::Nothing;
            }
            tracing::error!(
                failures = self.listen_failures,
                "microphone unusable and no typed input"
            );
            return Heard::Exit(ExitReason::DeviceFailed);
        }
        for _ in 0..RETRY_POLLS {
            if self.interrupt.is_raised() {
                break;
            }
            thread::sleep(self.settings.poll_interval);
        }
        Heard::Nothing
    }

    // --- dispatch ---------------------------------------------------------

    fn handle_text(&mut self, text: String, source: InputSource) -> Option<ExitReason> {
        match commands::classify(&text, &self.settings) {
            Command::Exit => {
                self.phase.enter(TurnPhase::Idle);
                tracing::info!(turn = self.cycle, "exit command");
                Some(ExitReason::ExitCommand)
            }
            Command::Save => {
                self.phase.enter(TurnPhase::Dispatching);
                self.save();
                self.phase.enter(TurnPhase::Idle);
                None
            }
            Command::Say(text) => self.dispatch(text, source),
        }
    }

    fn save(&mut self) {
        let path = self.settings.save_path.clone();
        match self.agent.save_messages(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "conversation saved");
                self.emit(TurnEvent::Saved {
                    path: path.display().to_string(),
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "save failed");
                self.emit(TurnEvent::Error {
                    turn: self.cycle,
                    kind: "save_failure".to_string(),
                    message: format!("{err:#}"),
                    mood: self.agent.mood().label().to_string(),
                });
            }
        }
    }

    fn dispatch(&mut self, text: String, source: InputSource) -> Option<ExitReason> {
        self.phase.enter(TurnPhase::Dispatching);
        let turn = self.cycle;
        self.emit(TurnEvent::Heard {
            turn,
            text: text.clone(),
            source,
        });
        self.turns += 1;
        tracing::info!(turn, source = ?source, "dispatching utterance");

        let (request, token) = self.agent.prepare_turn(&text).into_request();
        let chat = self.chat.clone();
        let started = Instant::now();
        let waited = self.wait_on_worker("walkie-chat", move || chat.chat(&request));
        log_timing("chat", started.elapsed());
        let raw = match waited {
            Waited::Done(Ok(raw)) => raw,
            Waited::Done(Err(err)) => {
                self.agent.abandon_turn(token);
                self.report_error(&TurnError::ChatFailure(err));
                self.phase.enter(TurnPhase::Idle);
                return None;
            }
            Waited::Lost(detail) => {
                self.agent.abandon_turn(token);
                let err = BackendError::Transport {
                    provider: self.chat.name(),
                    detail,
                };
                self.report_error(&TurnError::ChatFailure(err));
                self.phase.enter(TurnPhase::Idle);
                return None;
            }
            Waited::Interrupted => {
                self.agent.abandon_turn(token);
                return Some(self.abort());
            }
        };

        let dialogue = self.agent.complete_turn(token, &raw);
        let reply = &dialogue.reply;
        self.emit(TurnEvent::Reply {
            turn,
            action: reply.action.label().to_string(),
            target: reply.target.clone(),
            speak: reply.speak.clone(),
            mood: reply.mood.label().to_string(),
            mood_changed: dialogue.mood_changed(),
            recovered: dialogue.recovered,
        });
        if dialogue.mood_changed() {
            tracing::info!(
                turn,
                from = dialogue.previous_mood.label(),
                to = reply.mood.label(),
                "mood changed"
            );
        }
        for effect in self.scenario.apply(&dialogue.reply, &mut self.agent) {
            if let ScenarioEffect::Narration(text) = effect {
                self.emit(TurnEvent::Narration {
                    turn,
                    text: text.to_string(),
                });
            }
        }

        let speak = dialogue.reply.speak.trim();
        if !speak.is_empty() {
            if let Some(reason) = self.speak(speak, dialogue.reply.mood) {
                return Some(reason);
            }
        }
        self.phase.enter(TurnPhase::Idle);
        let mood = self.agent.mood();
        self.emit(TurnEvent::Mood {
            turn,
            mood: mood.label().to_string(),
            level: mood.level(),
        });
        None
    }

    /// Synthesize and play `text`. Failures are reported and the turn goes
    /// on text-only.
    fn speak(&mut self, text: &str, mood: Mood) -> Option<ExitReason> {
        let speaker = self.speaker.as_ref()?;
        let backend = speaker.backend.clone();
        let provider = backend.name();
        let text = if self.settings.speech_style {
            styled_text(mood.speaking_style(), text)
        } else {
            text.to_string()
        };
        let request = match SpeechRequest::new(text, &speaker.params) {
            Ok(request) => request,
            Err(err) => {
                self.report_error(&TurnError::SynthesisFailure(err));
                return None;
            }
        };
        self.phase.enter(TurnPhase::Speaking);
        let spec = AudioSpec {
            format: request.format(),
            sample_rate: request.sample_rate(),
        };
        let started = Instant::now();
        let waited = self.wait_on_worker("walkie-speech", move || backend.synthesize(&request));
        log_timing("synthesis", started.elapsed());
        let bytes = match waited {
            Waited::Done(Ok(bytes)) => bytes,
            Waited::Done(Err(err)) => {
                self.report_error(&TurnError::SynthesisFailure(err));
                return None;
            }
            Waited::Lost(detail) => {
                let err = BackendError::Transport { provider, detail };
                self.report_error(&TurnError::SynthesisFailure(err));
                return None;
            }
            Waited::Interrupted => return Some(self.abort()),
        };

        let speaker = self.speaker.as_mut()?;
        match speaker
            .playback
            .play(&bytes, spec, self.interrupt.flag())
        {
            Ok(artifact) => {
                self.emit(TurnEvent::Spoke {
                    turn: self.cycle,
                    bytes: artifact.size_bytes,
                });
                None
            }
            Err(PlaybackError::Interrupted) => Some(self.abort()),
            Err(err) => {
                self.report_error(&TurnError::PlaybackFailure(err));
                None
            }
        }
    }

    /// Run `work` on a helper thread and wait for it, giving up when the
    /// interrupt is raised. An abandoned worker finishes on its own.
    fn wait_on_worker<T, F>(&self, name: &str, work: F) -> Waited<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = bounded(1);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = sender.send(work());
            });
        if let Err(err) = spawned {
            return Waited::Lost(format!("failed to spawn {name}: {err}"));
        }
        loop {
            if self.interrupt.is_raised() {
                log_debug(&format!("{name}: abandoned on interrupt"));
                return Waited::Interrupted;
            }
            match receiver.recv_timeout(self.settings.poll_interval) {
                Ok(value) => return Waited::Done(value),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Waited::Lost(format!("{name} worker exited without a result"))
                }
            }
        }
    }

    // --- teardown ---------------------------------------------------------

    fn abort(&mut self) -> ExitReason {
        self.phase.enter(TurnPhase::Aborting);
        tracing::warn!(turn = self.cycle, "interrupted; aborting turn");
        ExitReason::Interrupted
    }

    fn shutdown(mut self, exit: ExitReason) -> RunSummary {
        if let Some(mut speaker) = self.speaker.take() {
            if let Err(err) = speaker.workspace.cleanup() {
                self.cleanup_failed("remove temp workspace", err.to_string());
            }
        }
        self.phase.enter(TurnPhase::Terminated);
        tracing::info!(turns = self.turns, reason = exit.label(), "conversation ended");
        self.emit(TurnEvent::Stopped {
            turns: self.turns,
            reason: exit.label().to_string(),
        });
        RunSummary {
            turns: self.turns,
            exit,
        }
    }

    fn report_error(&mut self, err: &TurnError) {
        log_debug(&format!("turn {} {}: {err}", self.cycle, err.kind()));
        tracing::warn!(turn = self.cycle, kind = err.kind(), error = %err, "turn error");
        self.emit(TurnEvent::Error {
            turn: self.cycle,
            kind: err.kind().to_string(),
            message: err.to_string(),
            mood: self.agent.mood().label().to_string(),
        });
    }

    /// Cleanup failures are logged, never surfaced.
    fn cleanup_failed(&self, step: &'static str, detail: String) {
        let err = TurnError::ResourceCleanup { step, detail };
        log_debug(&format!("turn {}: {err}", self.cycle));
        tracing::warn!(turn = self.cycle, kind = err.kind(), error = %err, "cleanup failed");
    }

    fn emit(&mut self, event: TurnEvent) {
        self.sink.emit(&event);
    }
}
