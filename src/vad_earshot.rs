//! Earshot-backed `VadEngine`.

use crate::audio::{VadConfig, VadDecision, VadEngine};
use earshot::{VoiceActivityDetector, VoiceActivityProfile};

pub struct EarshotVad {
    detector: VoiceActivityDetector,
    frame_samples: usize,
    scratch: Vec<i16>,
}

impl EarshotVad {
    /// Lower thresholds pick more aggressive profiles, mirroring the energy gate.
    pub fn from_config(cfg: &VadConfig) -> Self {
        let profile = match cfg.threshold_db {
            t if t <= -50.0 => VoiceActivityProfile::VERY_AGGRESSIVE,
            t if t <= -40.0 => VoiceActivityProfile::AGGRESSIVE,
            t if t <= -30.0 => VoiceActivityProfile::LBR,
            _ => VoiceActivityProfile::QUALITY,
        };
        let frame_ms = cfg.frame_ms.clamp(10, 30) as usize;
        let frame_samples = (cfg.sample_rate as usize * frame_ms) / 1000;
        Self {
            detector: VoiceActivityDetector::new(profile),
            frame_samples: frame_samples.max(160),
            scratch: Vec::new(),
        }
    }
}

impl VadEngine for EarshotVad {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        self.scratch.clear();
        self.scratch
            .extend(samples.iter().map(|s| (s.clamp(-1.0, 1.0) * 32_767.0) as i16));
        self.scratch.resize(self.frame_samples, 0);
        match self.detector.predict_16khz(&self.scratch) {
            Ok(true) => VadDecision::Speech,
            Ok(false) => VadDecision::Silence,
            Err(_) => VadDecision::Uncertain,
        }
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "earshot_vad"
    }
}
