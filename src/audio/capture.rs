//! Exclusive, closable handle on one input device.
//!
//! The session owns a device claim for its whole open lifetime, so a second
//! `open` on the same device fails with `AlreadyOpen` until the first closes.

use super::AudioFrame;
use crate::config::CaptureConfig;
use crate::lock::{ClaimKind, ExclusiveClaim};
use crate::log_debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("capture device '{0}' is already open")]
    AlreadyOpen(String),
    #[error("capture stream closed")]
    StreamClosed,
    #[error("capture overflow: {dropped} chunk(s) dropped")]
    OverflowDropped { dropped: usize },
    #[error("no audio within {0:?}")]
    ReadTimeout(Duration),
}

/// Something that can open an input stream, e.g. a cpal device.
pub trait CaptureDevice: Send + Sync {
    fn name(&self) -> String;

    fn open_stream(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// A running input stream delivering 16 kHz mono chunks of arbitrary size.
pub trait CaptureStream: Send {
    /// Wait up to `timeout` for the next chunk.
    fn next_chunk(&mut self, timeout: Duration) -> Result<Vec<i16>, CaptureError>;

    /// Chunks discarded since the previous call because the consumer lagged.
    fn take_dropped(&mut self) -> usize;

    fn close(&mut self) -> Result<(), CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Closed,
    Open,
}

pub struct AudioCaptureSession {
    device_name: String,
    stream: Option<Box<dyn CaptureStream>>,
    claim: Option<ExclusiveClaim>,
    pending: Vec<i16>,
    read_timeout: Duration,
}

impl AudioCaptureSession {
    /// Claim `device` and start its stream.
    pub fn open(
        device: Arc<dyn CaptureDevice>,
        config: &CaptureConfig,
    ) -> Result<Self, CaptureError> {
        let device_name = device.name();
        let claim = ExclusiveClaim::acquire(ClaimKind::Capture, &device_name)
            .ok_or_else(|| CaptureError::AlreadyOpen(device_name.clone()))?;
        let stream = device.open_stream(config)?;
        log_debug(&format!("capture opened on '{device_name}'"));
        Ok(Self {
            device_name,
            stream: Some(stream),
            claim: Some(claim),
            pending: Vec::with_capacity(config.frame_samples),
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Bound how long a single `read` waits on the device.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn state(&self) -> CaptureState {
        if self.stream.is_some() {
            CaptureState::Open
        } else {
            CaptureState::Closed
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Read exactly `n` samples.
    ///
    /// Overflow is reported before any data and is not fatal: the next call
    /// continues from the surviving samples. On `ReadTimeout` the samples
    /// gathered so far are kept for the next call.
    pub fn read(&mut self, n: usize) -> Result<AudioFrame, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::StreamClosed)?;
        let dropped = stream.take_dropped();
        if dropped > 0 {
            return Err(CaptureError::OverflowDropped { dropped });
        }
        let n = n.max(1);
        while self.pending.len() < n {
            let chunk = stream.next_chunk(self.read_timeout)?;
            self.pending.extend_from_slice(&chunk);
        }
        let samples: Vec<i16> = self.pending.drain(..n).collect();
        Ok(AudioFrame::new(samples))
    }

    /// Stop the stream and release the device. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        let result = match self.stream.take() {
            Some(mut stream) => stream.close(),
            None => Ok(()),
        };
        self.pending.clear();
        if let Some(claim) = self.claim.take() {
            log_debug(&format!("capture released '{}'", claim.name()));
        }
        result
    }
}

impl Drop for AudioCaptureSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log_debug(&format!("capture close on drop failed: {err}"));
        }
    }
}
