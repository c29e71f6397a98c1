//! In-process streaming recognizer: VAD sentence segmentation plus Whisper.
//!
//! Each connection gets a worker thread that owns a `SentenceSegmenter`. PCM
//! arrives through a bounded channel; every completed sentence is transcribed
//! and reported as `SentenceEnd` from the worker thread.

use super::{
    EventCallback, RecognitionError, RecognitionEvent, RecognitionParams, RecognitionService,
    RecognitionStream,
};
use crate::audio::{
    AudioFrame, SegmentEvent, SentenceSegmenter, SimpleThresholdVad, VadConfig, VadEngine,
    TARGET_CHANNELS, TARGET_RATE,
};
use crate::config::{RecognizerConfig, VadEngineKind};
use crate::lock::{join_with_timeout, JoinOutcome};
use crate::stt::{self, SpeechToText};
use crate::{log_debug, log_debug_content, log_timing};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const QUEUE_FRAMES: usize = 32;
const SEND_TIMEOUT: Duration = Duration::from_millis(500);
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_millis(1000);
const WORKER_JOIN_POLL: Duration = Duration::from_millis(10);

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

pub struct LocalWhisperService {
    config: RecognizerConfig,
    stt: Arc<dyn SpeechToText>,
}

impl LocalWhisperService {
    pub fn new(config: &RecognizerConfig, stt: Arc<dyn SpeechToText>) -> Self {
        Self {
            config: config.clone(),
            stt,
        }
    }

    /// Load the Whisper model once. A missing or broken model makes the
    /// service unreachable.
    pub fn load(config: &RecognizerConfig) -> Result<Self, RecognitionError> {
        let transcriber = stt::load_transcriber(config)
            .map_err(|err| RecognitionError::ServiceUnreachable(format!("{err:#}")))?;
        Ok(Self::new(config, Arc::new(transcriber)))
    }
}

impl RecognitionService for LocalWhisperService {
    fn name(&self) -> &'static str {
        "local-whisper"
    }

    fn connect(
        &self,
        params: &RecognitionParams,
        on_event: EventCallback,
    ) -> Result<Box<dyn RecognitionStream>, RecognitionError> {
        if params.sample_rate != TARGET_RATE
            || params.channels != TARGET_CHANNELS
            || params.format != "pcm"
        {
            return Err(RecognitionError::ServiceUnreachable(format!(
                "unsupported stream {}Hz {} x{}",
                params.sample_rate, params.format, params.channels
            )));
        }
        let request_id = format!("local-{}", NEXT_REQUEST.fetch_add(1, Ordering::Relaxed));
        let vad_config = VadConfig::from(&self.config);
        let segmenter = SentenceSegmenter::new(
            vad_config.clone(),
            create_vad_engine(&self.config, &vad_config),
        );
        let (sender, receiver) = bounded::<Vec<u8>>(QUEUE_FRAMES);
        let stt = self.stt.clone();
        let worker_id = request_id.clone();
        let worker = thread::Builder::new()
            .name("walkie-recognizer".to_string())
            .spawn(move || run_worker(&worker_id, receiver, segmenter, stt, on_event))
            .map_err(|err| {
                RecognitionError::ServiceUnreachable(format!("failed to spawn recognizer: {err}"))
            })?;
        Ok(Box::new(LocalStream {
            request_id,
            sender: Some(sender),
            worker: Some(worker),
        }))
    }
}

struct LocalStream {
    request_id: String,
    sender: Option<Sender<Vec<u8>>>,
    worker: Option<JoinHandle<()>>,
}

impl RecognitionStream for LocalStream {
    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn send_audio(&mut self, pcm: &[u8]) -> Result<(), RecognitionError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(RecognitionError::SessionNotActive)?;
        match sender.send_timeout(pcm.to_vec(), SEND_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(RecognitionError::TransportError(
                "recognizer is not keeping up".to_string(),
            )),
            Err(SendTimeoutError::Disconnected(_)) => Err(RecognitionError::TransportError(
                "recognizer worker exited".to_string(),
            )),
        }
    }

    fn finish(&mut self) -> Result<(), RecognitionError> {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match join_with_timeout(worker, WORKER_JOIN_TIMEOUT, WORKER_JOIN_POLL) {
            JoinOutcome::Joined => Ok(()),
            JoinOutcome::Panicked => Err(RecognitionError::TransportError(
                "recognizer worker panicked".to_string(),
            )),
            JoinOutcome::Abandoned => {
                log_debug(&format!(
                    "recognizer {} still transcribing; detached",
                    self.request_id
                ));
                Ok(())
            }
        }
    }
}

impl Drop for LocalStream {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

fn run_worker(
    request_id: &str,
    frames: Receiver<Vec<u8>>,
    mut segmenter: SentenceSegmenter,
    stt: Arc<dyn SpeechToText>,
    on_event: EventCallback,
) {
    log_debug(&format!(
        "recognizer {request_id} started (vad={})",
        segmenter.vad_name()
    ));
    for pcm in frames.iter() {
        let samples = AudioFrame::from_le_bytes(&pcm).to_f32();
        for event in segmenter.push(&samples) {
            match event {
                SegmentEvent::SpeechStarted => {
                    log_debug(&format!("recognizer {request_id}: speech started"));
                    on_event(RecognitionEvent::SpeechStarted);
                }
                SegmentEvent::Discarded { speech_ms } => {
                    log_debug(&format!(
                        "recognizer {request_id}: dropped {speech_ms}ms blip"
                    ));
                }
                SegmentEvent::Sentence(sentence) => {
                    log_debug(&format!(
                        "recognizer {request_id}: sentence end={} speech_ms={} samples={}",
                        sentence.end.label(),
                        sentence.speech_ms,
                        sentence.samples.len()
                    ));
                    let started = Instant::now();
                    match stt.transcribe(&sentence.samples) {
                        Ok(raw) => {
                            let text = sanitize_transcript(&raw);
                            log_timing("stt", started.elapsed());
                            log_debug_content(&format!("recognizer {request_id}: '{text}'"));
                            if !text.is_empty() {
                                on_event(RecognitionEvent::SentenceEnd(text));
                            }
                        }
                        Err(err) => {
                            on_event(RecognitionEvent::Failed(RecognitionError::TransportError(
                                format!("transcription failed: {err:#}"),
                            )));
                            return;
                        }
                    }
                }
            }
        }
    }
    if let Some(unfinished) = segmenter.flush() {
        log_debug(&format!(
            "recognizer {request_id}: dropping {}ms of unfinished speech",
            unfinished.speech_ms
        ));
    }
    log_debug(&format!("recognizer {request_id} finished"));
}

pub(crate) fn create_vad_engine(
    config: &RecognizerConfig,
    vad_config: &VadConfig,
) -> Box<dyn VadEngine> {
    match config.vad_engine {
        VadEngineKind::Simple => Box::new(SimpleThresholdVad::new(vad_config.threshold_db)),
        VadEngineKind::Earshot => {
            #[cfg(feature = "vad_earshot")]
            {
                Box::new(crate::vad_earshot::EarshotVad::from_config(vad_config))
            }
            #[cfg(not(feature = "vad_earshot"))]
            {
                log_debug("earshot VAD requested without the vad_earshot feature; using simple");
                Box::new(SimpleThresholdVad::new(vad_config.threshold_db))
            }
        }
    }
}

/// Strip Whisper's non-speech markers and collapse whitespace.
pub fn sanitize_transcript(text: &str) -> String {
    static NON_SPEECH: OnceLock<Option<Regex>> = OnceLock::new();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let pattern = NON_SPEECH.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\)|[（(]\s*(?:音乐|笑声|掌声|咳嗽)\s*[)）]",
        )
        .ok()
    });
    let cleaned = match pattern {
        Some(re) => re.replace_all(trimmed, " ").into_owned(),
        None => trimmed.to_string(),
    };
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
