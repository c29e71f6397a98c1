use super::*;
use crate::audio::AudioFrame;
use crate::config::{AppConfig, RecognizerConfig, VadEngineKind};
use crate::stt::SpeechToText;
use crate::testing::{ScriptedRecognition, StreamScript};
use clap::Parser;
use std::sync::atomic::AtomicUsize;
use std::thread;
use std::time::{Duration, Instant};

fn frame() -> AudioFrame {
    AudioFrame::new(vec![0; 320])
}

fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// --- slot -----------------------------------------------------------------

#[test]
fn slot_accepts_exactly_one_utterance() {
    let slot = UtteranceSlot::new();
    assert!(slot.offer(Utterance::sentence("有人吗？")));
    assert!(!slot.offer(Utterance::sentence("还有人吗")));
    assert!(!slot.offer(Utterance::sentence("喂")));
    assert_eq!(slot.discarded(), 2);
    match slot.wait(Duration::from_millis(10)) {
        SlotWait::Delivered(utterance) => {
            assert_eq!(utterance.text, "有人吗？");
            assert!(utterance.end_of_speech);
        }
        other => panic!("expected delivery, got {other:?}"),
    }
    assert_eq!(slot.wait(Duration::from_millis(10)), SlotWait::Closed);
}

#[test]
fn slot_reports_pending_then_closed() {
    let slot = UtteranceSlot::new();
    assert_eq!(slot.wait(Duration::from_millis(5)), SlotWait::Pending);
    slot.close();
    assert_eq!(slot.wait(Duration::from_millis(5)), SlotWait::Closed);
    assert!(!slot.offer(Utterance::sentence("late")));
    assert_eq!(slot.discarded(), 1);
}

#[test]
fn delivered_utterance_survives_close() {
    let slot = UtteranceSlot::new();
    assert!(slot.offer(Utterance::sentence("hello")));
    slot.close();
    assert_eq!(
        slot.wait(Duration::from_millis(5)),
        SlotWait::Delivered(Utterance::sentence("hello"))
    );
    assert_eq!(slot.wait(Duration::from_millis(5)), SlotWait::Closed);
}

// --- session --------------------------------------------------------------

#[test]
fn only_one_session_per_device() {
    let service = ScriptedRecognition::new();
    let first = StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-single-flight",
        RecognitionParams::default(),
    )
    .expect("first");
    match StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-single-flight",
        RecognitionParams::default(),
    ) {
        Err(RecognitionError::AlreadyActive(device)) => {
            assert_eq!(device, "rec-test-single-flight")
        }
        Err(other) => panic!("expected AlreadyActive, got {other:?}"),
        Ok(_) => panic!("expected AlreadyActive, got a second session"),
    }
    first.stop().expect("stop");
    assert!(StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-single-flight",
        RecognitionParams::default(),
    )
    .is_ok());
}

#[test]
fn connect_failure_releases_claim() {
    let service = ScriptedRecognition::new();
    service.set_connect_failure(Some(RecognitionError::AuthError("bad key".into())));
    assert!(matches!(
        StreamingRecognitionSession::start(
            service.as_ref(),
            "rec-test-auth",
            RecognitionParams::default()
        ),
        Err(RecognitionError::AuthError(_))
    ));
    service.set_connect_failure(None);
    assert!(StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-auth",
        RecognitionParams::default()
    )
    .is_ok());
}

#[test]
fn feed_after_stop_is_rejected_and_stop_is_idempotent() {
    let service = ScriptedRecognition::new();
    let session = StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-stop",
        RecognitionParams::default(),
    )
    .expect("start");
    assert_eq!(session.state(), RecognitionState::Active);
    session.feed(&frame()).expect("feed");
    assert_eq!(service.frames_sent(), 1);

    session.stop().expect("stop");
    session.stop().expect("second stop");
    assert_eq!(session.state(), RecognitionState::Stopped);
    assert_eq!(service.finishes(), 1);
    assert!(matches!(
        session.feed(&frame()),
        Err(RecognitionError::SessionNotActive)
    ));
    assert_eq!(service.frames_sent(), 1);
}

#[test]
fn only_first_sentence_is_delivered() {
    let service = ScriptedRecognition::new();
    service.push_script(StreamScript::says(1, &["有人吗？", "你好", "喂"]));
    let session = StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-flaky",
        RecognitionParams::default(),
    )
    .expect("start");
    session.feed(&frame()).expect("feed");
    assert!(wait_for(|| session.discarded() == 2));
    match session.slot().wait(Duration::from_millis(100)) {
        SlotWait::Delivered(utterance) => assert_eq!(utterance.text, "有人吗？"),
        other => panic!("expected delivery, got {other:?}"),
    }
    session.stop().expect("stop");
    assert_eq!(session.slot().wait(Duration::from_millis(5)), SlotWait::Closed);
}

#[test]
fn blank_sentences_are_ignored() {
    let service = ScriptedRecognition::new();
    service.push_script(StreamScript::says(1, &["   ", "真的有人"]));
    let session = StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-blank",
        RecognitionParams::default(),
    )
    .expect("start");
    session.feed(&frame()).expect("feed");
    match session.slot().wait(Duration::from_secs(1)) {
        SlotWait::Delivered(utterance) => assert_eq!(utterance.text, "真的有人"),
        other => panic!("expected delivery, got {other:?}"),
    }
    assert_eq!(session.discarded(), 0);
}

#[test]
fn send_failure_stops_session_with_transport_error() {
    let service = ScriptedRecognition::new();
    service.push_script(StreamScript::send_error(
        2,
        RecognitionError::TransportError("socket reset".into()),
    ));
    let session = StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-send-error",
        RecognitionParams::default(),
    )
    .expect("start");
    session.feed(&frame()).expect("first frame");
    match session.feed(&frame()) {
        Err(RecognitionError::TransportError(detail)) => assert!(detail.contains("socket reset")),
        other => panic!("expected TransportError, got {other:?}"),
    }
    assert_eq!(session.state(), RecognitionState::Stopped);
    assert!(session.failure().is_some());
    assert_eq!(service.finishes(), 1);
    assert_eq!(session.slot().wait(Duration::from_millis(5)), SlotWait::Closed);
}

#[test]
fn service_failure_event_surfaces_to_waiter() {
    let service = ScriptedRecognition::new();
    service.push_script(StreamScript::fails(
        1,
        RecognitionError::TransportError("service went away".into()),
    ));
    let session = StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-fail-event",
        RecognitionParams::default(),
    )
    .expect("start");
    session.feed(&frame()).expect("feed");
    assert_eq!(session.slot().wait(Duration::from_secs(1)), SlotWait::Closed);
    assert_eq!(session.state(), RecognitionState::Stopped);
    assert!(matches!(
        session.feed(&frame()),
        Err(RecognitionError::SessionNotActive) | Err(RecognitionError::TransportError(_))
    ));
}

#[test]
fn stop_from_another_thread_halts_feeding() {
    let service = ScriptedRecognition::new();
    let session = StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-cross-thread",
        RecognitionParams::default(),
    )
    .expect("start");
    let feeder = {
        let session = session.clone();
        thread::spawn(move || {
            let mut fed = 0usize;
            while session.feed(&frame()).is_ok() {
                fed += 1;
                thread::sleep(Duration::from_millis(1));
            }
            fed
        })
    };
    thread::sleep(Duration::from_millis(20));
    session.stop().expect("stop");
    let fed = feeder.join().expect("feeder");
    assert_eq!(service.frames_sent(), fed);
    assert_eq!(service.open_streams(), 0);
    assert!(matches!(
        session.feed(&frame()),
        Err(RecognitionError::SessionNotActive)
    ));
}

#[test]
fn dropping_last_handle_stops_session() {
    let service = ScriptedRecognition::new();
    {
        let _session = StreamingRecognitionSession::start(
            service.as_ref(),
            "rec-test-drop",
            RecognitionParams::default(),
        )
        .expect("start");
    }
    assert_eq!(service.finishes(), 1);
    assert!(StreamingRecognitionSession::start(
        service.as_ref(),
        "rec-test-drop",
        RecognitionParams::default()
    )
    .is_ok());
}

// --- local recognizer -----------------------------------------------------

struct CannedStt {
    reply: anyhow::Result<String>,
    calls: AtomicUsize,
}

impl CannedStt {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(anyhow::anyhow!("model crashed")),
            calls: AtomicUsize::new(0),
        })
    }
}

impl SpeechToText for CannedStt {
    fn transcribe(&self, samples: &[f32]) -> anyhow::Result<String> {
        assert!(!samples.is_empty());
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(err) => Err(anyhow::anyhow!("{err}")),
        }
    }
}

fn recognizer_config() -> RecognizerConfig {
    let mut config = AppConfig::parse_from(["walkie"]).recognizer_config();
    config.vad_engine = VadEngineKind::Simple;
    config.vad_threshold_db = -30.0;
    config.vad_smoothing_frames = 1;
    config.silence_tail_ms = 100;
    config.min_speech_ms = 100;
    config
}

fn loud_frame() -> AudioFrame {
    AudioFrame::from_f32(&[0.5; 320])
}

fn feed_sentence(session: &StreamingRecognitionSession) {
    for _ in 0..10 {
        session.feed(&loud_frame()).expect("speech");
    }
    for _ in 0..10 {
        session.feed(&frame()).expect("silence");
    }
}

#[test]
fn local_service_transcribes_segmented_sentence() {
    let stt = CannedStt::ok(" [BLANK_AUDIO] 有人吗？ ");
    let service = LocalWhisperService::new(&recognizer_config(), stt.clone());
    let session = StreamingRecognitionSession::start(
        &service,
        "rec-test-local",
        RecognitionParams::default(),
    )
    .expect("start");
    feed_sentence(&session);
    match session.slot().wait(Duration::from_secs(2)) {
        SlotWait::Delivered(utterance) => assert_eq!(utterance.text, "有人吗？"),
        other => panic!("expected delivery, got {other:?}"),
    }
    assert!(session.heard_speech());
    assert_eq!(stt.calls.load(Ordering::Relaxed), 1);
    session.stop().expect("stop");
}

#[test]
fn local_service_ignores_silence() {
    let stt = CannedStt::ok("should not appear");
    let service = LocalWhisperService::new(&recognizer_config(), stt.clone());
    let session = StreamingRecognitionSession::start(
        &service,
        "rec-test-local-silence",
        RecognitionParams::default(),
    )
    .expect("start");
    for _ in 0..20 {
        session.feed(&frame()).expect("silence");
    }
    assert_eq!(session.slot().wait(Duration::from_millis(50)), SlotWait::Pending);
    session.stop().expect("stop");
    assert_eq!(stt.calls.load(Ordering::Relaxed), 0);
    assert!(!session.heard_speech());
}

#[test]
fn local_transcription_failure_is_a_transport_error() {
    let service = LocalWhisperService::new(&recognizer_config(), CannedStt::failing());
    let session = StreamingRecognitionSession::start(
        &service,
        "rec-test-local-fail",
        RecognitionParams::default(),
    )
    .expect("start");
    feed_sentence(&session);
    assert_eq!(session.slot().wait(Duration::from_secs(2)), SlotWait::Closed);
    match session.failure() {
        Some(RecognitionError::TransportError(detail)) => assert!(detail.contains("model crashed")),
        other => panic!("expected TransportError, got {other:?}"),
    }
}

#[test]
fn local_service_rejects_unsupported_params() {
    let service = LocalWhisperService::new(&recognizer_config(), CannedStt::ok("x"));
    let params = RecognitionParams {
        sample_rate: 44_100,
        ..RecognitionParams::default()
    };
    assert!(matches!(
        StreamingRecognitionSession::start(&service, "rec-test-params", params),
        Err(RecognitionError::ServiceUnreachable(_))
    ));
}

#[test]
fn sanitize_strips_markers_and_whitespace() {
    assert_eq!(sanitize_transcript("  [BLANK_AUDIO]  "), "");
    assert_eq!(sanitize_transcript("hello (music)  world"), "hello world");
    assert_eq!(sanitize_transcript("（音乐）有人吗？"), "有人吗？");
    assert_eq!(sanitize_transcript("[ Silence ] 救命"), "救命");
}
