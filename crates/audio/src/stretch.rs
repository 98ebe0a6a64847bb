// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Pitch-preserving time stretch.
//!
//! The main path is a WSOLA overlap-add: output frames are taken from the
//! input at a scaled hop, with a small waveform-similarity search so frame
//! joins land in phase. Large ratios are composed from steps that each stay
//! within [0.5, 2.0], where WSOLA holds up. Inputs too short to carry a
//! full analysis window fall back to plain interpolation, which changes
//! pitch but cannot smear.

/// Per-step ratio bounds for the overlap-add path.
const STEP_MIN: f64 = 0.5;
const STEP_MAX: f64 = 2.0;

/// Stretch `samples` so the result has exactly `target_len` samples.
///
/// The final length is enforced by truncation or zero-padding, so callers
/// can splice the result into a region without re-measuring.
pub fn time_stretch_to_length(samples: &[f32], rate: u32, target_len: usize) -> Vec<f32> {
    if target_len == 0 {
        return Vec::new();
    }
    if samples.is_empty() {
        return vec![0.0; target_len];
    }
    if samples.len() == target_len {
        return samples.to_vec();
    }

    let window = ((rate / 20).max(128)) as usize; // 50 ms analysis window
    let mut current: Vec<f32> = samples.to_vec();

    if samples.len() < window * 2 {
        current = interpolate_to(&current, target_len);
    } else {
        let mut ratio = target_len as f64 / current.len() as f64;
        // Compose out-of-range ratios from in-range steps.
        while ratio > STEP_MAX {
            current = wsola_step(&current, rate, STEP_MAX);
            ratio = target_len as f64 / current.len() as f64;
        }
        while ratio < STEP_MIN {
            current = wsola_step(&current, rate, STEP_MIN);
            ratio = target_len as f64 / current.len() as f64;
        }
        if (ratio - 1.0).abs() > 1e-3 {
            current = wsola_step(&current, rate, ratio);
        }
    }

    match current.len().cmp(&target_len) {
        std::cmp::Ordering::Greater => current.truncate(target_len),
        std::cmp::Ordering::Less => current.resize(target_len, 0.0),
        std::cmp::Ordering::Equal => {},
    }
    current
}

/// One WSOLA pass at `ratio` (output length / input length), `ratio`
/// within [0.5, 2.0].
fn wsola_step(samples: &[f32], rate: u32, ratio: f64) -> Vec<f32> {
    let window = ((rate / 20).max(128)) as usize;
    let overlap = window / 2;
    let hop_out = window - overlap;
    let seek = ((rate / 200).max(16)) as usize; // ±5 ms similarity search
    if samples.len() < window + seek + 1 {
        let target = (samples.len() as f64 * ratio).round().max(1.0) as usize;
        return interpolate_to(samples, target);
    }

    let hop_in = (hop_out as f64 / ratio).max(1.0);
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut out: Vec<f32> = Vec::with_capacity(expected + window);
    out.extend_from_slice(&samples[..window]);

    let mut in_pos = 0.0_f64;
    loop {
        in_pos += hop_in;
        let base = in_pos.round() as usize;
        if base + window + seek >= samples.len() || out.len() >= expected + window {
            break;
        }

        let tail_start = out.len() - overlap;
        let template: Vec<f32> = out[tail_start..].to_vec();
        let start = best_segment_start(samples, base, seek, window, &template);
        let segment = &samples[start..start + window];

        // Equal-gain crossfade across the overlap, then append the rest.
        for i in 0..overlap {
            let w = (i as f32 + 0.5) / overlap as f32;
            out[tail_start + i] = template[i] * (1.0 - w) + segment[i] * w;
        }
        out.extend_from_slice(&segment[overlap..]);
    }
    out
}

/// Search ±`seek` around `base` for the segment start whose leading overlap
/// best correlates with `template`. Returns an absolute index with at least
/// `window` samples available after it.
fn best_segment_start(
    samples: &[f32],
    base: usize,
    seek: usize,
    window: usize,
    template: &[f32],
) -> usize {
    let lo = base.saturating_sub(seek);
    let hi = (base + seek).min(samples.len().saturating_sub(window));
    let mut best = base.clamp(lo, hi);
    let mut best_score = f64::MIN;
    for candidate in lo..=hi {
        let mut score = 0.0_f64;
        for (i, &t) in template.iter().enumerate() {
            score += f64::from(samples[candidate + i]) * f64::from(t);
        }
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

/// Plain linear interpolation to `target_len` samples. Not pitch-preserving;
/// only used where WSOLA cannot run.
fn interpolate_to(samples: &[f32], target_len: usize) -> Vec<f32> {
    if samples.is_empty() || target_len == 0 {
        return vec![0.0; target_len];
    }
    if samples.len() == 1 {
        return vec![samples[0]; target_len];
    }
    let step = (samples.len() - 1) as f64 / (target_len.max(2) - 1) as f64;
    (0..target_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
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
    fn exact_length_for_all_ratios() {
        let rate = 24_000;
        let samples = sine(rate, 220.0, 1.0);
        for target in [1, 100, 12_000, 24_000, 30_000, 48_000, 96_000, 120_000] {
            let out = time_stretch_to_length(&samples, rate, target);
            assert_eq!(out.len(), target, "target {target}");
        }
    }

    #[test]
    fn empty_input_pads_with_silence() {
        let out = time_stretch_to_length(&[], 24_000, 500);
        assert_eq!(out, vec![0.0; 500]);
    }

    #[test]
    fn identity_length_is_passthrough() {
        let samples = sine(24_000, 330.0, 0.5);
        let out = time_stretch_to_length(&samples, 24_000, samples.len());
        assert_eq!(out, samples);
    }

    #[test]
    fn tiny_input_still_hits_target() {
        let samples = vec![0.1, 0.2, 0.3];
        let out = time_stretch_to_length(&samples, 24_000, 1000);
        assert_eq!(out.len(), 1000);
    }

    #[test]
    fn stretch_preserves_rough_energy() {
        // A stretched sine should stay a bounded, non-silent signal of the
        // same order of loudness, not an artifact burst or silence.
        let rate = 24_000;
        let samples = sine(rate, 220.0, 1.0);
        let original_rms = crate::dsp::rms(&samples);
        let out = time_stretch_to_length(&samples, rate, 36_000);
        let stretched_rms = crate::dsp::rms(&out);
        assert!(stretched_rms > original_rms * 0.5);
        assert!(stretched_rms < original_rms * 1.5);
        assert!(crate::dsp::peak(&out) <= 1.0);
    }
}
