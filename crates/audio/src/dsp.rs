// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Loudness, trimming and level-safety primitives.
//!
//! None of these raise: degenerate inputs (empty buffers, zero-length
//! regions) return empty or unchanged audio.

/// Root-mean-square level of a buffer. 0.0 for empty input.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Peak absolute amplitude.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()))
}

/// Strip leading/trailing low-energy audio.
///
/// Energy is measured per 10 ms frame against a threshold `top_db` below
/// the loudest frame. `prepad_ms`/`postpad_ms` keep a little context around
/// the detected span.
pub fn trim_silence(
    samples: &[f32],
    rate: u32,
    top_db: f32,
    prepad_ms: u32,
    postpad_ms: u32,
) -> Vec<f32> {
    if samples.is_empty() || rate == 0 {
        return samples.to_vec();
    }
    let frame = ((rate / 100).max(1)) as usize;
    let frame_rms: Vec<f32> = samples.chunks(frame).map(rms).collect();
    let loudest = frame_rms.iter().fold(0.0_f32, |a, &b| a.max(b));
    if loudest <= 0.0 {
        return samples.to_vec();
    }
    let threshold = loudest * 10.0_f32.powf(-top_db / 20.0);

    let Some(first) = frame_rms.iter().position(|&r| r >= threshold) else {
        return samples.to_vec();
    };
    let last = frame_rms
        .iter()
        .rposition(|&r| r >= threshold)
        .unwrap_or(frame_rms.len() - 1);

    let prepad = (rate as u64 * u64::from(prepad_ms) / 1000) as usize;
    let postpad = (rate as u64 * u64::from(postpad_ms) / 1000) as usize;
    let start = (first * frame).saturating_sub(prepad);
    let end = (((last + 1) * frame) + postpad).min(samples.len());
    samples[start..end].to_vec()
}

/// Tanh soft limiter engaged above `ceiling`.
///
/// Below the ceiling the signal passes through untouched; above it the
/// overshoot is squashed through a tanh knee so transient peaks round off
/// instead of clipping. Output magnitude stays under `ceiling + knee`.
pub fn soft_limit(samples: &mut [f32], ceiling: f32) {
    let knee = 1.0 - ceiling;
    for sample in samples.iter_mut() {
        let magnitude = sample.abs();
        if magnitude > ceiling {
            let squashed = ceiling + knee * ((magnitude - ceiling) / knee).tanh();
            *sample = squashed.copysign(*sample);
        }
    }
}

/// Hard safety clamp to ±`limit`.
pub fn hard_clip(samples: &mut [f32], limit: f32) {
    for sample in samples.iter_mut() {
        *sample = sample.clamp(-limit, limit);
    }
}

/// Scale so the peak hits `target_peak`. Silence is left untouched.
pub fn peak_normalize(samples: &mut [f32], target_peak: f32) {
    let current = peak(samples);
    if current <= 0.0 {
        return;
    }
    let gain = target_peak / current;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

/// Linear fade over the final `ms` milliseconds.
pub fn fade_out(samples: &mut [f32], rate: u32, ms: u32) {
    let span = ((rate as u64 * u64::from(ms) / 1000) as usize).min(samples.len());
    if span == 0 {
        return;
    }
    let start = samples.len() - span;
    for (i, sample) in samples[start..].iter_mut().enumerate() {
        let gain = 1.0 - (i as f32 + 1.0) / span as f32;
        *sample *= gain;
    }
}

/// Silence of `seconds` at `rate`.
pub fn silence(rate: u32, seconds: f64) -> Vec<f32> {
    let n = (f64::from(rate) * seconds).max(0.0).round() as usize;
    vec![0.0; n]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_known_signal() {
        assert_eq!(rms(&[]), 0.0);
        let dc = vec![0.5_f32; 1000];
        assert!((rms(&dc) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn trim_removes_silent_edges() {
        let rate = 24_000;
        let mut samples = vec![0.0_f32; rate as usize]; // 1s silence
        samples.extend(std::iter::repeat(0.5).take(rate as usize)); // 1s tone
        samples.extend(std::iter::repeat(0.0).take(rate as usize)); // 1s silence

        let trimmed = trim_silence(&samples, rate, 40.0, 10, 10);
        let expected = rate as usize; // 1s of tone
        let pad = (rate / 100) as usize + (rate / 100) as usize; // frame rounding + pads
        assert!(trimmed.len() >= expected);
        assert!(trimmed.len() <= expected + 3 * pad);
    }

    #[test]
    fn trim_is_noop_on_silence_and_empty() {
        assert!(trim_silence(&[], 24_000, 40.0, 0, 0).is_empty());
        let flat = vec![0.0_f32; 100];
        assert_eq!(trim_silence(&flat, 24_000, 40.0, 0, 0).len(), 100);
    }

    #[test]
    fn limiter_bounds_output() {
        let mut hot: Vec<f32> = (0..1000).map(|i| (i as f32 / 100.0).sin() * 2.5).collect();
        soft_limit(&mut hot, 0.98);
        hard_clip(&mut hot, 1.0);
        assert!(peak(&hot) <= 1.0);
        // Everything that was over the ceiling got squashed under 1.0
        // before the hard clamp even ran.
        assert!(peak(&hot) < 1.0);
    }

    #[test]
    fn limiter_passes_quiet_audio_untouched() {
        let quiet: Vec<f32> = (0..100).map(|i| (i as f32 / 10.0).sin() * 0.5).collect();
        let mut processed = quiet.clone();
        soft_limit(&mut processed, 0.98);
        assert_eq!(processed, quiet);
    }

    #[test]
    fn peak_normalize_hits_target() {
        let mut samples = vec![0.1, -0.2, 0.05];
        peak_normalize(&mut samples, 0.95);
        assert!((peak(&samples) - 0.95).abs() < 1e-6);

        let mut flat = vec![0.0_f32; 10];
        peak_normalize(&mut flat, 0.95);
        assert_eq!(flat, vec![0.0; 10]);
    }

    #[test]
    fn fade_out_ends_near_zero() {
        let mut samples = vec![1.0_f32; 24_000];
        fade_out(&mut samples, 24_000, 50);
        assert_eq!(samples[0], 1.0);
        assert!(samples.last().unwrap().abs() < 1e-3);
    }
}
