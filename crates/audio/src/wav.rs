// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! WAV loading/saving and mono resampling.
//!
//! Everything downstream of this module works on mono f32 buffers in
//! [-1, 1]. Multi-channel input is downmixed by averaging; integer formats
//! are normalized on read and written back as 16-bit PCM.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::path::Path;
use voxhub_core::{HubError, Result};

/// Load a WAV file as mono f32, optionally resampling to `target_rate`.
///
/// # Errors
///
/// `io_failure` for unreadable files, `bad_request` for formats hound
/// cannot decode.
pub fn load_mono(path: &Path, target_rate: Option<u32>) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)
        .map_err(|e| HubError::Io(format!("opening wav: {e}")))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| HubError::BadRequest(format!("decoding wav: {e}")))?,
        (SampleFormat::Int, bits) => {
            // hound yields i32 regardless of the container width.
            let scale = ((1_i64 << (i64::from(bits) - 1)) as f64).max(1.0);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (f64::from(v) / scale) as f32))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| HubError::BadRequest(format!("decoding wav: {e}")))?
        },
    };

    let mono = downmix(&interleaved, channels);
    let rate = spec.sample_rate;
    match target_rate {
        Some(target) if target != rate => Ok((resample(&mono, rate, target)?, target)),
        _ => Ok((mono, rate)),
    }
}

/// Write mono f32 samples as 16-bit PCM.
pub fn save_wav(path: &Path, samples: &[f32], rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer =
        WavWriter::create(path, spec).map_err(|e| HubError::Io(format!("creating wav: {e}")))?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * f32::from(i16::MAX)).round() as i16;
        writer.write_sample(value).map_err(|e| HubError::Io(format!("writing wav: {e}")))?;
    }
    writer.finalize().map_err(|e| HubError::Io(format!("finalizing wav: {e}")))?;
    Ok(())
}

/// Sample rate and duration (seconds) from a WAV header, without decoding.
pub fn wav_info(path: &Path) -> Result<(u32, f64)> {
    let reader =
        WavReader::open(path).map_err(|e| HubError::Io(format!("opening wav: {e}")))?;
    let spec = reader.spec();
    let frames = reader.duration();
    let duration = f64::from(frames) / f64::from(spec.sample_rate.max(1));
    Ok((spec.sample_rate, duration))
}

/// Average interleaved channels down to mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Offline mono resample through rubato's `FastFixedIn`, feeding fixed
/// chunks and flushing the tail with a partial call.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    const CHUNK: usize = 1024;
    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let mut resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, CHUNK, 1)
        .map_err(|e| HubError::Io(format!("creating resampler: {e}")))?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut out = Vec::with_capacity(expected + CHUNK);
    let mut offset = 0;
    while offset + CHUNK <= samples.len() {
        let chunk = &samples[offset..offset + CHUNK];
        let frames = resampler
            .process(&[chunk], None)
            .map_err(|e| HubError::Io(format!("resampling: {e}")))?;
        out.extend_from_slice(&frames[0]);
        offset += CHUNK;
    }
    let tail = &samples[offset..];
    let frames = if tail.is_empty() {
        resampler.process_partial::<&[f32]>(None, None)
    } else {
        let tail_buf = [tail];
        resampler.process_partial(Some(&tail_buf[..]), None)
    }
    .map_err(|e| HubError::Io(format!("resampling tail: {e}")))?;
    out.extend_from_slice(&frames[0]);

    // The polynomial resampler carries a small internal delay; trim or pad
    // to the mathematically expected length so durations stay exact.
    match out.len().cmp(&expected) {
        std::cmp::Ordering::Greater => out.truncate(expected),
        std::cmp::Ordering::Less => out.resize(expected, 0.0),
        std::cmp::Ordering::Equal => {},
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    fn sine(rate: u32, hz: f32, seconds: f32) -> Vec<f32> {
        let n = (rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * hz * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples = sine(24_000, 440.0, 0.25);
        save_wav(&path, &samples, 24_000).unwrap();

        let (loaded, rate) = load_mono(&path, None).unwrap();
        assert_eq!(rate, 24_000);
        assert_eq!(loaded.len(), samples.len());
        // 16-bit quantization error only.
        for (a, b) in loaded.iter().zip(&samples) {
            assert!((a - b).abs() < 2.0 / 32768.0);
        }
    }

    #[test]
    fn load_resamples_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone48.wav");
        save_wav(&path, &sine(48_000, 440.0, 0.5), 48_000).unwrap();

        let (loaded, rate) = load_mono(&path, Some(24_000)).unwrap();
        assert_eq!(rate, 24_000);
        assert_eq!(loaded.len(), 12_000);
    }

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn resample_identity() {
        let samples = sine(24_000, 440.0, 0.1);
        let out = resample(&samples, 24_000, 24_000).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn resample_scales_length() {
        let samples = sine(24_000, 440.0, 1.0);
        let out = resample(&samples, 24_000, 48_000).unwrap();
        assert_eq!(out.len(), 48_000);
    }
}
