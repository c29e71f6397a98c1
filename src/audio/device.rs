//! System microphone via CPAL.
//!
//! `cpal::Stream` is not `Send`, so each open stream lives on a keeper thread
//! that builds it, plays it, and drops it when asked to stop. The data callback
//! downmixes to mono and pushes fixed-size chunks through a bounded channel;
//! chunks that don't fit are counted as dropped instead of blocking the
//! audio thread.

use super::capture::{CaptureDevice, CaptureError, CaptureStream};
use super::f32_to_i16;
use super::resample::to_target_rate;
use crate::config::CaptureConfig;
use crate::lock::{join_with_timeout, JoinOutcome};
use crate::log_debug;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CHUNK_MS: u64 = 20;
const OPEN_TIMEOUT: Duration = Duration::from_secs(3);
const KEEPER_POLL: Duration = Duration::from_millis(20);
const KEEPER_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

pub struct CpalDevice {
    preferred: Option<String>,
    name: String,
}

impl CpalDevice {
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    /// Resolve the named device (or the default one) without opening it.
    pub fn new(preferred: Option<&str>) -> Result<Self, CaptureError> {
        let device = find_device(preferred)?;
        let name = device
            .name()
            .unwrap_or_else(|_| "unknown input device".to_string());
        Ok(Self {
            preferred: preferred.map(str::to_string),
            name,
        })
    }
}

impl CaptureDevice for CpalDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open_stream(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let (ready_tx, ready_rx) = bounded::<Result<u32, CaptureError>>(1);
        let (chunk_tx, chunk_rx) = bounded::<Vec<f32>>(config.channel_capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicUsize::new(0));

        let keeper = {
            let preferred = self.preferred.clone();
            let stop = stop.clone();
            let dropped = dropped.clone();
            thread::Builder::new()
                .name("walkie-capture".to_string())
                .spawn(move || run_keeper(preferred, chunk_tx, dropped, stop, ready_tx))
                .map_err(|err| {
                    CaptureError::DeviceUnavailable(format!("failed to spawn capture thread: {err}"))
                })?
        };

        let device_rate = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(rate)) => rate,
            Ok(Err(err)) => {
                join_with_timeout(keeper, KEEPER_JOIN_TIMEOUT, KEEPER_POLL);
                return Err(err);
            }
            Err(_) => {
                stop.store(true, Ordering::Release);
                return Err(CaptureError::DeviceUnavailable(format!(
                    "'{}' did not start within {OPEN_TIMEOUT:?}",
                    self.name
                )));
            }
        };
        log_debug(&format!(
            "capture stream running on '{}' at {device_rate}Hz",
            self.name
        ));

        Ok(Box::new(CpalStream {
            chunks: chunk_rx,
            device_rate,
            dropped,
            stop,
            keeper: Some(keeper),
        }))
    }
}

struct CpalStream {
    chunks: Receiver<Vec<f32>>,
    device_rate: u32,
    dropped: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    keeper: Option<JoinHandle<()>>,
}

impl CaptureStream for CpalStream {
    fn next_chunk(&mut self, timeout: Duration) -> Result<Vec<i16>, CaptureError> {
        match self.chunks.recv_timeout(timeout) {
            Ok(raw) => Ok(to_target_rate(&raw, self.device_rate)
                .into_iter()
                .map(f32_to_i16)
                .collect()),
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::ReadTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::StreamClosed),
        }
    }

    fn take_dropped(&mut self) -> usize {
        self.dropped.swap(0, Ordering::AcqRel)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        self.stop.store(true, Ordering::Release);
        let Some(keeper) = self.keeper.take() else {
            return Ok(());
        };
        match join_with_timeout(keeper, KEEPER_JOIN_TIMEOUT, KEEPER_POLL) {
            JoinOutcome::Joined => {}
            JoinOutcome::Panicked => log_debug("capture keeper thread panicked"),
            JoinOutcome::Abandoned => log_debug("capture keeper thread did not stop in time"),
        }
        Ok(())
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn run_keeper(
    preferred: Option<String>,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    ready: Sender<Result<u32, CaptureError>>,
) {
    let failed = Arc::new(AtomicBool::new(false));
    let stream = match build_stream(preferred.as_deref(), sender, dropped, failed.clone()) {
        Ok((stream, rate)) => {
            let _ = ready.send(Ok(rate));
            stream
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    while !stop.load(Ordering::Acquire) && !failed.load(Ordering::Acquire) {
        thread::sleep(KEEPER_POLL);
    }
    if let Err(err) = stream.pause() {
        log_debug(&format!("failed to pause capture stream: {err}"));
    }
    // Dropping the stream drops the callback and its sender, which the
    // reader sees as `StreamClosed`.
    drop(stream);
}

fn build_stream(
    preferred: Option<&str>,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
    failed: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let device = find_device(preferred)?;
    let default_config = device
        .default_input_config()
        .map_err(|err| unavailable(&format!("no usable input config: {err}")))?;
    let format = default_config.sample_format();
    let stream_config: StreamConfig = default_config.into();
    let rate = stream_config.sample_rate.0;
    let channels = usize::from(stream_config.channels.max(1));
    let chunk_samples = ((u64::from(rate) * CHUNK_MS) / 1000).max(1) as usize;
    log_debug(&format!(
        "capture config: format={format:?} sample_rate={rate}Hz channels={channels}"
    ));

    let pump = ChunkPump::new(chunk_samples, channels, sender, dropped);
    let on_error = move |err: cpal::StreamError| {
        log_debug(&format!("audio_stream_error: {err}"));
        failed.store(true, Ordering::Release);
    };
    let stream = match format {
        SampleFormat::F32 => input_stream(&device, &stream_config, pump, |s: f32| s, on_error),
        SampleFormat::I16 => input_stream(&device, &stream_config, pump, i16_to_f32, on_error),
        SampleFormat::U16 => input_stream(&device, &stream_config, pump, u16_to_f32, on_error),
        other => return Err(unavailable(&format!("unsupported sample format: {other:?}"))),
    }
    .map_err(|err| unavailable(&format!("failed to build input stream: {err}")))?;

    stream
        .play()
        .map_err(|err| unavailable(&format!("failed to start input stream: {err}")))?;
    Ok((stream, rate))
}

fn input_stream<T, E>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut pump: ChunkPump,
    convert: fn(T) -> f32,
    on_error: E,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + Copy + 'static,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| pump.push(data, convert),
        on_error,
        None,
    )
}

fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32_768.0
}

fn u16_to_f32(sample: u16) -> f32 {
    (f32::from(sample) - 32_768.0) / 32_768.0
}

fn find_device(preferred: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match preferred {
        Some(name) => host
            .input_devices()
            .map_err(|err| unavailable(&format!("no input devices available: {err}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| unavailable(&format!("input device '{name}' not found"))),
        None => host
            .default_input_device()
            .ok_or_else(|| unavailable("no default input device available")),
    }
}

fn unavailable(detail: &str) -> CaptureError {
    CaptureError::DeviceUnavailable(format!("{detail}. {}", mic_permission_hint()))
}

fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}

/// Average interleaved channels into mono.
pub(super) fn downmix_into<T, F>(out: &mut Vec<f32>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        out.extend(data.iter().copied().map(&mut convert));
        return;
    }
    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().copied().map(&mut convert).sum();
        out.push(sum / frame.len() as f32);
    }
}

/// Callback-side accumulator that emits fixed-size device-rate chunks.
pub(super) struct ChunkPump {
    chunk_samples: usize,
    channels: usize,
    pending: Vec<f32>,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
}

impl ChunkPump {
    pub(super) fn new(
        chunk_samples: usize,
        channels: usize,
        sender: Sender<Vec<f32>>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            chunk_samples: chunk_samples.max(1),
            channels,
            pending: Vec::with_capacity(chunk_samples),
            sender,
            dropped,
        }
    }

    pub(super) fn push<T: Copy>(&mut self, data: &[T], convert: fn(T) -> f32) {
        downmix_into(&mut self.pending, data, self.channels, convert);
        while self.pending.len() >= self.chunk_samples {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_samples).collect();
            match self.sender.try_send(chunk) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.pending.clear();
                    break;
                }
            }
        }
    }
}
