//! Microphone capture, resampling, and voice activity detection (VAD).
//!
//! Audio is captured via CPAL on a keeper thread, downmixed and resampled to
//! 16 kHz mono, and handed out as fixed-size `AudioFrame`s of signed 16-bit PCM.

use std::time::Duration;

/// Sample rate every frame is normalized to.
pub const TARGET_RATE: u32 = 16_000;

/// Channel count every frame is normalized to.
pub const TARGET_CHANNELS: u16 = 1;

mod capture;
mod device;
mod resample;
mod segment;
mod vad;

pub use capture::{AudioCaptureSession, CaptureDevice, CaptureError, CaptureState, CaptureStream};
pub use device::CpalDevice;
pub use segment::{SegmentEvent, Sentence, SentenceEnd, SentenceSegmenter};
pub use vad::{SimpleThresholdVad, VadConfig, VadDecision, VadEngine};

/// A block of 16 kHz mono PCM owned by the feeding loop between read and feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Quantize normalized `[-1.0, 1.0]` samples.
    pub fn from_f32(samples: &[f32]) -> Self {
        Self {
            samples: samples.iter().copied().map(f32_to_i16).collect(),
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / u64::from(TARGET_RATE))
    }

    /// Little-endian byte layout used on the recognition wire.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Inverse of `to_le_bytes`; a trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        Self {
            samples: bytes
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        }
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| f32::from(s) / 32_768.0).collect()
    }
}

pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0).round() as i16
}

/// Names of the host's input devices, for `--list-input-devices`.
pub fn list_input_devices() -> anyhow::Result<Vec<String>> {
    CpalDevice::list_devices()
}
