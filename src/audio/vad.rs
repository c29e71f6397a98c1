//! Voice activity detection: speech/silence classification per frame.

use super::TARGET_RATE;
use crate::config::{
    RecognizerConfig, DEFAULT_LOOKBACK_MS, DEFAULT_MAX_SENTENCE_MS, DEFAULT_MIN_SPEECH_MS,
    DEFAULT_SILENCE_TAIL_MS, DEFAULT_VAD_FRAME_MS, DEFAULT_VAD_SMOOTHING_FRAMES,
    DEFAULT_VAD_THRESHOLD_DB,
};
use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;

/// Sentence segmentation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VadConfig {
    pub sample_rate: u32,
    pub frame_ms: u64,
    pub threshold_db: f32,
    pub silence_tail_ms: u64,
    pub min_speech_ms: u64,
    pub max_sentence_ms: u64,
    pub lookback_ms: u64,
    pub smoothing_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_RATE,
            frame_ms: DEFAULT_VAD_FRAME_MS,
            threshold_db: DEFAULT_VAD_THRESHOLD_DB,
            silence_tail_ms: DEFAULT_SILENCE_TAIL_MS,
            min_speech_ms: DEFAULT_MIN_SPEECH_MS,
            max_sentence_ms: DEFAULT_MAX_SENTENCE_MS,
            lookback_ms: DEFAULT_LOOKBACK_MS,
            smoothing_frames: DEFAULT_VAD_SMOOTHING_FRAMES,
        }
    }
}

impl From<&RecognizerConfig> for VadConfig {
    fn from(cfg: &RecognizerConfig) -> Self {
        Self {
            sample_rate: TARGET_RATE,
            frame_ms: cfg.vad_frame_ms,
            threshold_db: cfg.vad_threshold_db,
            silence_tail_ms: cfg.silence_tail_ms,
            min_speech_ms: cfg.min_speech_ms,
            max_sentence_ms: cfg.max_sentence_ms,
            lookback_ms: cfg.lookback_ms,
            smoothing_frames: cfg.vad_smoothing_frames,
        }
    }
}

impl VadConfig {
    pub fn frame_samples(&self) -> usize {
        ms_to_samples(self.frame_ms, self.sample_rate).max(1)
    }
}

pub(super) fn ms_to_samples(ms: u64, rate: u32) -> usize {
    ((ms * u64::from(rate)) / 1000) as usize
}

/// Per-frame speech classifier.
///
/// Earshot only accepts 10, 20 or 30 ms frames at 16 kHz; callers pass frames
/// of `VadConfig::frame_samples()` length.
pub trait VadEngine: Send {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
    Uncertain,
}

/// Majority vote over the last few decisions, so single-frame spikes don't
/// flip the speech state.
pub(super) struct VadSmoother {
    window: VecDeque<VadDecision>,
    size: usize,
}

impl VadSmoother {
    pub(super) fn new(size: usize) -> Self {
        Self {
            window: VecDeque::new(),
            size: size.max(1),
        }
    }

    pub(super) fn smooth(&mut self, decision: VadDecision) -> VadDecision {
        if self.size == 1 {
            return decision;
        }
        self.window.push_back(decision);
        if self.window.len() > self.size {
            self.window.pop_front();
        }
        let speech = self
            .window
            .iter()
            .filter(|d| **d == VadDecision::Speech)
            .count();
        let silence = self
            .window
            .iter()
            .filter(|d| **d == VadDecision::Silence)
            .count();
        match speech.cmp(&silence) {
            CmpOrdering::Greater => VadDecision::Speech,
            CmpOrdering::Less => VadDecision::Silence,
            CmpOrdering::Equal => decision,
        }
    }

    pub(super) fn reset(&mut self) {
        self.window.clear();
    }
}

/// RMS energy gate. Used when earshot is disabled.
#[derive(Debug, Clone)]
pub struct SimpleThresholdVad {
    threshold_db: f32,
}

impl SimpleThresholdVad {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }
}

pub(crate) fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return -120.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    20.0 * energy.sqrt().max(1e-6).log10()
}

impl VadEngine for SimpleThresholdVad {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        if rms_db(samples) >= self.threshold_db {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "simple_threshold_vad"
    }
}
