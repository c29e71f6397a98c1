//! Deterministic stand-ins for hardware and network seams, shared by unit tests.

use crate::audio::{CaptureDevice, CaptureError, CaptureStream};
use crate::backend::{BackendError, ChatMessage, ModelBackend, SpeechRequest};
use crate::config::CaptureConfig;
use crate::lock_or_recover;
use crate::playback::{AudioPlayer, AudioSpec, PlaybackError};
use crate::recognition::{
    EventCallback, RecognitionError, RecognitionEvent, RecognitionParams, RecognitionService,
    RecognitionStream,
};
use crate::turn::{EventSink, TurnEvent};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// --- capture --------------------------------------------------------------

struct DeviceState {
    chunk: Mutex<Vec<i16>>,
    chunk_delay: Duration,
    overflow: AtomicUsize,
    open_failure: Mutex<Option<CaptureError>>,
    starve_after: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Endless source of a fixed chunk, with knobs for failures.
pub(crate) struct FakeCaptureDevice {
    name: String,
    state: Arc<DeviceState>,
}

impl FakeCaptureDevice {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Arc::new(DeviceState {
                chunk: Mutex::new(vec![0; 320]),
                chunk_delay: Duration::from_millis(2),
                overflow: AtomicUsize::new(0),
                open_failure: Mutex::new(None),
                starve_after: AtomicUsize::new(usize::MAX),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        })
    }

    pub(crate) fn set_chunk(&self, chunk: Vec<i16>) {
        *lock_or_recover(&self.state.chunk, "fake chunk") = chunk;
    }

    /// Report `n` dropped chunks on the next read.
    pub(crate) fn queue_overflow(&self, n: usize) {
        self.state.overflow.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn set_open_failure(&self, failure: Option<CaptureError>) {
        *lock_or_recover(&self.state.open_failure, "fake open failure") = failure;
    }

    /// Deliver `n` more chunks, then time out on every read.
    /// `usize::MAX` never starves.
    pub(crate) fn starve_after(&self, n: usize) {
        self.state.starve_after.store(n, Ordering::Relaxed);
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::Relaxed)
    }

    /// Streams opened and not yet closed.
    pub(crate) fn live_streams(&self) -> usize {
        self.state.opened.load(Ordering::Relaxed) - self.state.closed.load(Ordering::Relaxed)
    }
}

impl CaptureDevice for FakeCaptureDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open_stream(&self, _: &CaptureConfig) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if let Some(err) = lock_or_recover(&self.state.open_failure, "fake open").clone() {
            return Err(err);
        }
        self.state.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(FakeStream {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct FakeStream {
    state: Arc<DeviceState>,
    closed: bool,
}

impl CaptureStream for FakeStream {
    fn next_chunk(&mut self, timeout: Duration) -> Result<Vec<i16>, CaptureError> {
        if self.closed {
            return Err(CaptureError::StreamClosed);
        }
        let remaining = self.state.starve_after.load(Ordering::Relaxed);
        if remaining == 0 {
            thread::sleep(timeout);
            return Err(CaptureError::ReadTimeout(timeout));
        }
        if remaining != usize::MAX {
            self.state.starve_after.store(remaining - 1, Ordering::Relaxed);
        }
        thread::sleep(self.state.chunk_delay);
        Ok(lock_or_recover(&self.state.chunk, "fake chunk").clone())
    }

    fn take_dropped(&mut self) -> usize {
        self.state.overflow.swap(0, Ordering::Relaxed)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// --- chat and speech ------------------------------------------------------

const DEFAULT_REPLY: &str =
    r#"{"action":"none","target":"none","speak":"收到","mood":"轻微紧张"}"#;

/// Replays queued chat replies; once the queue runs dry every chat gets a
/// plain "收到".
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, u16>>>,
    speech: Mutex<VecDeque<Result<Vec<u8>, u16>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    spoken: Mutex<Vec<String>>,
    chat_delay: Duration,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_reply(self, raw: &str) -> Self {
        lock_or_recover(&self.replies, "scripted replies").push_back(Ok(raw.to_string()));
        self
    }

    pub(crate) fn with_chat_error(self, status: u16) -> Self {
        lock_or_recover(&self.replies, "scripted replies").push_back(Err(status));
        self
    }

    pub(crate) fn with_speech_error(self, status: u16) -> Self {
        lock_or_recover(&self.speech, "scripted speech").push_back(Err(status));
        self
    }

    /// Hold every chat call this long before answering.
    pub(crate) fn with_chat_delay(mut self, delay: Duration) -> Self {
        self.chat_delay = delay;
        self
    }

    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock_or_recover(&self.requests, "scripted requests").clone()
    }

    /// Text of every synthesis request, style prefix included.
    pub(crate) fn spoken(&self) -> Vec<String> {
        lock_or_recover(&self.spoken, "scripted spoken").clone()
    }
}

impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        lock_or_recover(&self.requests, "scripted requests").push(messages.to_vec());
        if !self.chat_delay.is_zero() {
            thread::sleep(self.chat_delay);
        }
        match lock_or_recover(&self.replies, "scripted replies").pop_front() {
            Some(Ok(raw)) => Ok(raw),
            Some(Err(status)) => Err(BackendError::Http {
                provider: "scripted",
                status,
                body: "scripted failure".to_string(),
            }),
            None => Ok(DEFAULT_REPLY.to_string()),
        }
    }

    fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError> {
        lock_or_recover(&self.spoken, "scripted spoken").push(request.text().to_string());
        match lock_or_recover(&self.speech, "scripted speech").pop_front() {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(status)) => Err(BackendError::Http {
                provider: "scripted",
                status,
                body: "scripted failure".to_string(),
            }),
            None => Ok(b"ID3 scripted audio".to_vec()),
        }
    }
}

// --- recognition ----------------------------------------------------------

/// What one connection does once it has received enough frames.
#[derive(Debug, Clone, Default)]
pub(crate) struct StreamScript {
    trigger_after: usize,
    sentences: Vec<String>,
    /// Gap between speech starting and the first sentence ending.
    sentence_delay: Duration,
    failure_event: Option<RecognitionError>,
    send_error: Option<RecognitionError>,
}

impl StreamScript {
    /// Never recognizes anything.
    pub(crate) fn silent() -> Self {
        Self::default()
    }

    /// After `frames` frames, report each text as a finished sentence.
    pub(crate) fn says(frames: usize, texts: &[&str]) -> Self {
        Self {
            trigger_after: frames,
            sentences: texts.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Like [`StreamScript::says`], but the sentences end `delay` after
    /// speech starts.
    pub(crate) fn says_after(frames: usize, delay: Duration, texts: &[&str]) -> Self {
        Self {
            sentence_delay: delay,
            ..Self::says(frames, texts)
        }
    }

    /// Reject frame number `frames` with `err`.
    pub(crate) fn send_error(frames: usize, err: RecognitionError) -> Self {
        Self {
            trigger_after: frames,
            send_error: Some(err),
            ..Self::default()
        }
    }

    /// After `frames` frames, report `err` through the event callback.
    pub(crate) fn fails(frames: usize, err: RecognitionError) -> Self {
        Self {
            trigger_after: frames,
            failure_event: Some(err),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct RecognitionCounters {
    connects: AtomicUsize,
    frames: AtomicUsize,
    finishes: AtomicUsize,
}

/// Recognition service whose connections follow queued scripts and deliver
/// events from their own thread.
#[derive(Default)]
pub(crate) struct ScriptedRecognition {
    scripts: Mutex<VecDeque<StreamScript>>,
    connect_failure: Mutex<Option<RecognitionError>>,
    counters: Arc<RecognitionCounters>,
}

impl ScriptedRecognition {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_script(&self, script: StreamScript) {
        lock_or_recover(&self.scripts, "recognition scripts").push_back(script);
    }

    pub(crate) fn set_connect_failure(&self, failure: Option<RecognitionError>) {
        *lock_or_recover(&self.connect_failure, "recognition connect") = failure;
    }

    pub(crate) fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::Relaxed)
    }

    /// Frames accepted across all connections.
    pub(crate) fn frames_sent(&self) -> usize {
        self.counters.frames.load(Ordering::Relaxed)
    }

    pub(crate) fn finishes(&self) -> usize {
        self.counters.finishes.load(Ordering::Relaxed)
    }

    /// Connections not yet finished.
    pub(crate) fn open_streams(&self) -> usize {
        self.connects() - self.finishes()
    }
}

impl RecognitionService for ScriptedRecognition {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn connect(
        &self,
        _: &RecognitionParams,
        on_event: EventCallback,
    ) -> Result<Box<dyn RecognitionStream>, RecognitionError> {
        if let Some(err) = lock_or_recover(&self.connect_failure, "recognition connect").clone() {
            return Err(err);
        }
        let index = self.counters.connects.fetch_add(1, Ordering::Relaxed) + 1;
        let script = lock_or_recover(&self.scripts, "recognition scripts")
            .pop_front()
            .unwrap_or_default();
        Ok(Box::new(ScriptedStream {
            request_id: format!("scripted-{index}"),
            script,
            frames: 0,
            on_event: Arc::new(on_event),
            counters: self.counters.clone(),
            emitter: None,
            finished: false,
        }))
    }
}

struct ScriptedStream {
    request_id: String,
    script: StreamScript,
    frames: usize,
    on_event: Arc<EventCallback>,
    counters: Arc<RecognitionCounters>,
    emitter: Option<JoinHandle<()>>,
    finished: bool,
}

impl ScriptedStream {
    fn emit_script(&mut self) {
        let on_event = self.on_event.clone();
        let sentences = self.script.sentences.clone();
        let failure = self.script.failure_event.clone();
        let delay = self.script.sentence_delay;
        self.emitter = Some(thread::spawn(move || {
            if let Some(err) = failure {
                on_event(RecognitionEvent::Failed(err));
                return;
            }
            on_event(RecognitionEvent::SpeechStarted);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            for text in sentences {
                on_event(RecognitionEvent::SentenceEnd(text));
            }
        }));
    }
}

impl RecognitionStream for ScriptedStream {
    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn send_audio(&mut self, _: &[u8]) -> Result<(), RecognitionError> {
        if self.finished {
            return Err(RecognitionError::SessionNotActive);
        }
        self.frames += 1;
        if self.frames == self.script.trigger_after {
            if let Some(err) = self.script.send_error.clone() {
                return Err(err);
            }
        }
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        let scripted = !self.script.sentences.is_empty() || self.script.failure_event.is_some();
        if scripted && self.frames == self.script.trigger_after {
            self.emit_script();
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecognitionError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Some(emitter) = self.emitter.take() {
            let _ = emitter.join();
        }
        self.counters.finishes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

// --- playback -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PlayerMode {
    #[default]
    Succeed,
    Fail,
    /// Play until the interrupt flag is raised.
    Hang,
}

/// Records what would have been played and whether the file was really there.
#[derive(Default)]
pub(crate) struct FakePlayer {
    mode: PlayerMode,
    played: Mutex<Vec<(PathBuf, bool)>>,
    specs: Mutex<Vec<AudioSpec>>,
}

impl FakePlayer {
    pub(crate) fn new(mode: PlayerMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            played: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
        })
    }

    /// Played paths, each paired with whether it existed during playback.
    pub(crate) fn played(&self) -> Vec<(PathBuf, bool)> {
        lock_or_recover(&self.played, "fake player").clone()
    }

    pub(crate) fn specs(&self) -> Vec<AudioSpec> {
        lock_or_recover(&self.specs, "fake player specs").clone()
    }
}

impl AudioPlayer for FakePlayer {
    fn play(
        &self,
        path: &Path,
        spec: AudioSpec,
        interrupt: &AtomicBool,
    ) -> Result<(), PlaybackError> {
        lock_or_recover(&self.played, "fake player").push((path.to_path_buf(), path.exists()));
        lock_or_recover(&self.specs, "fake player specs").push(spec);
        match self.mode {
            PlayerMode::Succeed => Ok(()),
            PlayerMode::Fail => Err(PlaybackError::Decode("scripted decode failure".into())),
            PlayerMode::Hang => {
                while !interrupt.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(2));
                }
                Err(PlaybackError::Interrupted)
            }
        }
    }
}

// --- events ---------------------------------------------------------------

/// Collects events; clones share the same buffer.
#[derive(Clone, Default)]
pub(crate) struct MemorySink {
    events: Arc<Mutex<Vec<TurnEvent>>>,
}

impl MemorySink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn events(&self) -> Vec<TurnEvent> {
        lock_or_recover(&self.events, "memory sink").clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &TurnEvent) {
        lock_or_recover(&self.events, "memory sink").push(event.clone());
    }
}
