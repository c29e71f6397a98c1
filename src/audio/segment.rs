//! Splits a continuous 16 kHz stream into sentences using VAD.
//!
//! A sentence starts on the first (smoothed) speech frame, carrying up to
//! `lookback_ms` of the audio that preceded it, and ends once trailing silence
//! reaches `silence_tail_ms` or the sentence hits `max_sentence_ms`. Sentences
//! with less than `min_speech_ms` of speech are dropped as noise.

use super::vad::{ms_to_samples, VadConfig, VadDecision, VadEngine, VadSmoother};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceEnd {
    Silence { tail_ms: u64 },
    MaxLength,
    /// The stream ended mid-sentence.
    Flushed,
}

impl SentenceEnd {
    pub fn label(&self) -> &'static str {
        match self {
            SentenceEnd::Silence { .. } => "silence",
            SentenceEnd::MaxLength => "max_length",
            SentenceEnd::Flushed => "flushed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub samples: Vec<f32>,
    pub speech_ms: u64,
    pub end: SentenceEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    SpeechStarted,
    Sentence(Sentence),
    /// Speech too short to count; discarded.
    Discarded { speech_ms: u64 },
}

struct Frame {
    samples: Vec<f32>,
    decision: VadDecision,
}

/// Frames of the sentence in progress plus its timing.
struct SentenceBuffer {
    frames: VecDeque<Frame>,
    total_samples: usize,
    speech_ms: u64,
    silence_ms: u64,
    total_ms: u64,
}

impl SentenceBuffer {
    fn new(preroll: VecDeque<Frame>) -> Self {
        let total_samples = preroll.iter().map(|f| f.samples.len()).sum();
        Self {
            frames: preroll,
            total_samples,
            speech_ms: 0,
            silence_ms: 0,
            total_ms: 0,
        }
    }

    fn push(&mut self, frame: Frame, frame_ms: u64) {
        match frame.decision {
            VadDecision::Speech => {
                self.speech_ms += frame_ms;
                self.silence_ms = 0;
            }
            VadDecision::Silence => self.silence_ms += frame_ms,
            VadDecision::Uncertain => self.silence_ms = 0,
        }
        self.total_ms += frame_ms;
        self.total_samples += frame.samples.len();
        self.frames.push_back(frame);
    }

    /// Drop trailing silence beyond `keep` samples.
    fn trim_trailing_silence(&mut self, keep: usize) {
        let trailing: usize = self
            .frames
            .iter()
            .rev()
            .take_while(|f| f.decision == VadDecision::Silence)
            .map(|f| f.samples.len())
            .sum();
        let mut excess = trailing.saturating_sub(keep);
        while excess > 0 {
            let Some(last) = self.frames.back_mut() else {
                break;
            };
            let len = last.samples.len();
            if len <= excess {
                self.frames.pop_back();
                self.total_samples -= len;
                excess -= len;
            } else {
                last.samples.truncate(len - excess);
                self.total_samples -= excess;
                excess = 0;
            }
        }
    }

    fn into_samples(self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.total_samples);
        for frame in self.frames {
            out.extend(frame.samples);
        }
        out
    }
}

pub struct SentenceSegmenter {
    cfg: VadConfig,
    vad: Box<dyn VadEngine>,
    smoother: VadSmoother,
    frame_samples: usize,
    lookback_samples: usize,
    pending: Vec<f32>,
    preroll: VecDeque<Frame>,
    preroll_samples: usize,
    current: Option<SentenceBuffer>,
}

impl SentenceSegmenter {
    pub fn new(cfg: VadConfig, vad: Box<dyn VadEngine>) -> Self {
        let frame_samples = cfg.frame_samples();
        let lookback_samples = ms_to_samples(cfg.lookback_ms, cfg.sample_rate);
        Self {
            smoother: VadSmoother::new(cfg.smoothing_frames),
            cfg,
            vad,
            frame_samples,
            lookback_samples,
            pending: Vec::with_capacity(frame_samples),
            preroll: VecDeque::new(),
            preroll_samples: 0,
            current: None,
        }
    }

    pub fn vad_name(&self) -> &'static str {
        self.vad.name()
    }

    /// True while a sentence is being collected.
    pub fn in_sentence(&self) -> bool {
        self.current.is_some()
    }

    /// Feed normalized samples of any length.
    pub fn push(&mut self, samples: &[f32]) -> Vec<SegmentEvent> {
        self.pending.extend_from_slice(samples);
        let mut events = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let frame: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
            if let Some(event) = self.on_frame(frame) {
                events.push(event);
            }
        }
        events
    }

    /// End of stream: emit the sentence in progress if it has enough speech.
    pub fn flush(&mut self) -> Option<Sentence> {
        self.pending.clear();
        let buffer = self.current.take()?;
        let speech_ms = buffer.speech_ms;
        self.reset_detector();
        (speech_ms >= self.cfg.min_speech_ms).then(|| Sentence {
            samples: buffer.into_samples(),
            speech_ms,
            end: SentenceEnd::Flushed,
        })
    }

    fn on_frame(&mut self, samples: Vec<f32>) -> Option<SegmentEvent> {
        let raw = self.vad.process_frame(&samples);
        let decision = self.smoother.smooth(raw);
        let frame = Frame { samples, decision };
        let frame_ms = self.cfg.frame_ms;

        if self.current.is_none() {
            if decision == VadDecision::Speech {
                let preroll = std::mem::take(&mut self.preroll);
                self.preroll_samples = 0;
                let mut buffer = SentenceBuffer::new(preroll);
                buffer.push(frame, frame_ms);
                self.current = Some(buffer);
                return Some(SegmentEvent::SpeechStarted);
            }
            self.remember_preroll(frame);
            return None;
        }

        let buffer = self.current.as_mut()?;
        buffer.push(frame, frame_ms);
        if buffer.total_ms >= self.cfg.max_sentence_ms {
            return self.finish(SentenceEnd::MaxLength);
        }
        if buffer.silence_ms >= self.cfg.silence_tail_ms {
            if buffer.speech_ms >= self.cfg.min_speech_ms {
                let tail_ms = buffer.silence_ms;
                return self.finish(SentenceEnd::Silence { tail_ms });
            }
            let speech_ms = buffer.speech_ms;
            self.current = None;
            self.reset_detector();
            return Some(SegmentEvent::Discarded { speech_ms });
        }
        None
    }

    fn finish(&mut self, end: SentenceEnd) -> Option<SegmentEvent> {
        let mut buffer = self.current.take()?;
        buffer.trim_trailing_silence(self.lookback_samples);
        self.reset_detector();
        Some(SegmentEvent::Sentence(Sentence {
            speech_ms: buffer.speech_ms,
            samples: buffer.into_samples(),
            end,
        }))
    }

    fn remember_preroll(&mut self, frame: Frame) {
        self.preroll_samples += frame.samples.len();
        self.preroll.push_back(Frame {
            decision: VadDecision::Silence,
            ..frame
        });
        while self.preroll_samples > self.lookback_samples {
            match self.preroll.pop_front() {
                Some(old) => self.preroll_samples -= old.samples.len(),
                None => break,
            }
        }
    }

    fn reset_detector(&mut self) {
        self.vad.reset();
        self.smoother.reset();
    }
}
