//! Sample-rate conversion from the device's native rate to 16 kHz.

use super::TARGET_RATE;
use crate::log_debug;
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::cmp::Ordering as CmpOrdering;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};

pub(super) const MIN_DEVICE_RATE: u32 = 2_000;
pub(super) const MAX_DEVICE_RATE: u32 = 1_600_000;
const MAX_FIR_TAPS: usize = 129;

static FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

/// Convert one mono chunk to 16 kHz. Out-of-range rates pass through untouched.
pub(super) fn to_target_rate(input: &[f32], device_rate: u32) -> Vec<f32> {
    if input.is_empty() || device_rate == TARGET_RATE || device_rate == 0 {
        return input.to_vec();
    }
    if cfg!(feature = "high-quality-audio") {
        match sinc_resample(input, device_rate) {
            Ok(output) => return output,
            Err(err) => {
                if !FALLBACK_WARNED.swap(true, Ordering::AcqRel) {
                    log_debug(&format!("sinc resampler failed ({err}); using FIR path"));
                }
            }
        }
    }
    fir_resample(input, device_rate)
}

fn checked_ratio(device_rate: u32) -> Result<f64> {
    if !(MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&device_rate) {
        return Err(anyhow!("unsupported device sample rate {device_rate}Hz"));
    }
    Ok(f64::from(TARGET_RATE) / f64::from(device_rate))
}

#[cfg(feature = "high-quality-audio")]
pub(super) fn sinc_resample(input: &[f32], device_rate: u32) -> Result<Vec<f32>> {
    let ratio = checked_ratio(device_rate)?;
    let chunk = 256usize;
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 1)
        .map_err(|e| anyhow!("failed to build sinc resampler: {e:?}"))?;

    let expected = ((input.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(expected + 8);
    let mut block = vec![0.0f32; chunk];
    for piece in input.chunks(chunk) {
        // Pad a short tail with its last sample to avoid a click.
        let pad = piece.last().copied().unwrap_or(0.0);
        block.fill(pad);
        block[..piece.len()].copy_from_slice(piece);
        let produced = resampler
            .process(std::slice::from_ref(&block), None)
            .map_err(|e| anyhow!("sinc resampler failed: {e:?}"))?;
        out.extend_from_slice(&produced[0]);
    }
    Ok(fit_length(out, expected))
}

#[cfg(not(feature = "high-quality-audio"))]
pub(super) fn sinc_resample(_input: &[f32], _device_rate: u32) -> Result<Vec<f32>> {
    Err(anyhow!("built without high-quality-audio"))
}

/// Low-pass (when decimating) followed by linear interpolation.
pub(super) fn fir_resample(input: &[f32], device_rate: u32) -> Vec<f32> {
    let Ok(ratio) = checked_ratio(device_rate) else {
        return input.to_vec();
    };
    let filtered = if device_rate > TARGET_RATE {
        low_pass(input, device_rate, fir_taps(device_rate))
    } else {
        input.to_vec()
    };
    linear_resample(&filtered, ratio as f32)
}

pub(super) fn linear_resample(input: &[f32], ratio: f32) -> Vec<f32> {
    let out_len = (input.len() as f32 * ratio).round() as usize;
    let last = input.last().copied().unwrap_or(0.0);
    (0..out_len)
        .map(|i| {
            let pos = i as f32 / ratio;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f32;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                _ => last,
            }
        })
        .collect()
}

/// Odd tap count that grows with the decimation ratio.
pub(super) fn fir_taps(device_rate: u32) -> usize {
    let ratio = device_rate as f32 / TARGET_RATE as f32;
    let mut taps = (ratio * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_FIR_TAPS)
}

pub(super) fn low_pass(input: &[f32], device_rate: u32, taps: usize) -> Vec<f32> {
    if input.is_empty() || taps <= 1 {
        return input.to_vec();
    }
    let cutoff = (TARGET_RATE as f32 * 0.5 / device_rate as f32).min(0.499);
    let coeffs = hamming_sinc(cutoff, taps);
    let half = taps / 2;
    (0..input.len())
        .map(|n| {
            coeffs
                .iter()
                .enumerate()
                .filter_map(|(k, c)| {
                    let idx = (n + k).checked_sub(half)?;
                    input.get(idx).map(|s| s * c)
                })
                .sum()
        })
        .collect()
}

/// Normalized Hamming-windowed sinc taps.
pub(super) fn hamming_sinc(cutoff: f32, taps: usize) -> Vec<f32> {
    let m = (taps.max(2) - 1) as f32;
    let mut coeffs: Vec<f32> = (0..taps)
        .map(|n| {
            let centered = n as f32 - m / 2.0;
            let x = 2.0 * PI * cutoff * centered;
            let sinc = if centered == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * cutoff * x.sin()) / x
            };
            let window = 0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos();
            sinc * window
        })
        .collect();
    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        coeffs.iter_mut().for_each(|c| *c /= sum);
    }
    coeffs
}

fn fit_length(mut data: Vec<f32>, len: usize) -> Vec<f32> {
    match data.len().cmp(&len) {
        CmpOrdering::Greater => data.truncate(len),
        CmpOrdering::Less => {
            let pad = data.last().copied().unwrap_or(0.0);
            data.resize(len, pad);
        }
        CmpOrdering::Equal => {}
    }
    data
}
