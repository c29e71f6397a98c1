//! The frame-feeding loop: capture -> recognition, on its own thread.
//!
//! The session's active state is the only stop signal. The loop checks it
//! before every read, and `feed` re-checks it under the session lock, so no
//! frame reaches a session that was asked to stop.

use crate::audio::{AudioCaptureSession, CaptureError};
use crate::log_debug;
use crate::recognition::{RecognitionError, StreamingRecognitionSession};
use crossbeam_channel::{bounded, Receiver};
use std::io;
use std::thread::{self, JoinHandle};

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FeederExit {
    /// The session stopped; the normal way out.
    Stopped,
    CaptureFailed(CaptureError),
    FeedFailed(RecognitionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FeederReport {
    pub(crate) frames: usize,
    pub(crate) dropped_chunks: usize,
    pub(crate) exit: FeederExit,
}

pub(crate) struct Feeder {
    pub(crate) handle: JoinHandle<()>,
    /// Receives the report once the loop has exited and closed the capture.
    pub(crate) report: Receiver<FeederReport>,
}

/// Move `capture` to a new thread and pump `frame_samples`-sized frames into
/// `recognition` until it stops. The capture session is closed on exit.
pub(crate) fn spawn_feeder(
    capture: AudioCaptureSession,
    recognition: StreamingRecognitionSession,
    frame_samples: usize,
) -> io::Result<Feeder> {
    let (sender, report) = bounded(1);
    let handle = thread::Builder::new()
        .name("walkie-feeder".to_string())
        .spawn(move || {
            let report = feed_until_stopped(capture, &recognition, frame_samples);
            let _ = sender.send(report);
        })?;
    Ok(Feeder { handle, report })
}

fn feed_until_stopped(
    mut capture: AudioCaptureSession,
    recognition: &StreamingRecognitionSession,
    frame_samples: usize,
) -> FeederReport {
    let mut frames = 0usize;
    let mut dropped_chunks = 0usize;
    let exit = loop {
        if !recognition.is_active() {
            break FeederExit::Stopped;
        }
        match capture.read(frame_samples) {
            Ok(frame) => match recognition.feed(&frame) {
                Ok(()) => frames += 1,
                Err(RecognitionError::SessionNotActive) => break FeederExit::Stopped,
                Err(err) => break FeederExit::FeedFailed(err),
            },
            Err(CaptureError::OverflowDropped { dropped }) => {
                dropped_chunks += dropped;
                log_debug(&format!("feeder: capture overflow, {dropped} chunk(s) lost"));
            }
            Err(CaptureError::ReadTimeout(_)) => {}
            Err(err) => break FeederExit::CaptureFailed(err),
        }
    };
    if let Err(err) = capture.close() {
        log_debug(&format!("feeder: capture close failed: {err}"));
    }
    log_debug(&format!(
        "feeder exited after {frames} frame(s): {exit:?}"
    ));
    FeederReport {
        frames,
        dropped_chunks,
        exit,
    }
}
