// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Region replacement with crossfades, loudness matching and ducking.

use crate::dsp::{hard_clip, peak, rms, soft_limit};
use crate::stretch::time_stretch_to_length;

/// The loudness-matching neighborhood straddling the region, at most 0.5 s.
const MATCH_NEIGHBORHOOD_SECS: f64 = 0.5;

/// The limiter engages when the spliced signal peaks above this.
const LIMIT_CEILING: f32 = 0.98;

/// Splice `replacement` into `source[i0..i1]`.
///
/// - the replacement is stretched to the region length if it differs;
/// - its loudness is matched to the RMS of up to 0.5 s of source material
///   straddling the region;
/// - symmetric equal-power crossfades of `min(fade_ms, region_len / 4)`
///   samples smooth both boundaries;
/// - `duck_gain` in (0, 1] attenuates the original inside the region and
///   restores it over the trailing crossfade;
/// - a tanh limiter plus hard clamp keep the result within ±1.0.
///
/// Samples outside `[i0 - fade, i1 + fade]` are returned bit-exact.
pub fn crossfade_splice(
    source: &[f32],
    replacement: &[f32],
    rate: u32,
    i0: usize,
    i1: usize,
    fade_ms: u32,
    duck_gain: Option<f32>,
) -> Vec<f32> {
    let i1 = i1.min(source.len());
    if i0 >= i1 || source.is_empty() {
        return source.to_vec();
    }
    let region_len = i1 - i0;

    let replacement = if replacement.len() == region_len {
        replacement.to_vec()
    } else {
        time_stretch_to_length(replacement, rate, region_len)
    };
    let replacement = loudness_match(source, &replacement, rate, i0, i1);

    let fade_wanted = (u64::from(rate) * u64::from(fade_ms) / 1000) as usize;
    let fade = fade_wanted.min(region_len / 4);

    let duck = duck_gain.map(|g| g.clamp(0.0, 1.0));

    let mut out = source.to_vec();
    for i in 0..region_len {
        let original = source[i0 + i];
        let incoming = replacement[i];

        // Equal-power weights inside the fade zones, full replacement in
        // the middle of the region.
        let blend = fade_weight(i, region_len, fade);
        let (wr, wo) = equal_power(blend);

        let bed = match duck {
            // Ducked bed underneath the replacement, smoothly restored to
            // unity over the trailing fade.
            Some(gain) => original * (gain + (1.0 - gain) * restore_weight(i, region_len, fade)),
            None => original * wo,
        };
        out[i0 + i] = incoming * wr + bed;
    }

    if peak(&out[i0..i1]) > LIMIT_CEILING {
        soft_limit(&mut out[i0..i1], LIMIT_CEILING);
    }
    hard_clip(&mut out[i0..i1], 1.0);
    out
}

/// Replacement gain that matches the RMS of the source neighborhood around
/// the region. Returns the replacement scaled in place.
fn loudness_match(
    source: &[f32],
    replacement: &[f32],
    rate: u32,
    i0: usize,
    i1: usize,
) -> Vec<f32> {
    let half = ((f64::from(rate) * MATCH_NEIGHBORHOOD_SECS / 2.0) as usize).max(1);
    let lo = i0.saturating_sub(half);
    let hi = (i1 + half).min(source.len());

    let mut neighborhood: Vec<f32> = Vec::with_capacity(2 * half);
    neighborhood.extend_from_slice(&source[lo..i0]);
    neighborhood.extend_from_slice(&source[i1..hi]);
    // A region spanning the whole clip has no outside context; fall back to
    // the region itself.
    if neighborhood.is_empty() {
        neighborhood.extend_from_slice(&source[i0..i1]);
    }

    let target = rms(&neighborhood);
    let current = rms(replacement);
    if target <= 1e-6 || current <= 1e-6 {
        return replacement.to_vec();
    }
    let gain = (target / current).min(4.0);
    replacement.iter().map(|&s| s * gain).collect()
}

/// Raw blend position for sample `i` of the region: 0.0 at the region edge,
/// 1.0 once past the fade span.
fn fade_weight(i: usize, region_len: usize, fade: usize) -> f32 {
    if fade == 0 {
        return 1.0;
    }
    if i < fade {
        (i as f32 + 0.5) / fade as f32
    } else if i >= region_len - fade {
        ((region_len - i) as f32 - 0.5) / fade as f32
    } else {
        1.0
    }
}

/// How much of the original's unity gain is restored at sample `i`; rises
/// from 0 to 1 across the trailing fade.
fn restore_weight(i: usize, region_len: usize, fade: usize) -> f32 {
    if fade == 0 || i < region_len - fade {
        return 0.0;
    }
    let into_fade = i - (region_len - fade);
    (into_fade as f32 + 0.5) / fade as f32
}

/// Equal-power crossfade weights for a blend position in [0, 1].
fn equal_power(blend: f32) -> (f32, f32) {
    let blend = blend.clamp(0.0, 1.0);
    let theta = blend * std::f32::consts::FRAC_PI_2;
    (theta.sin(), theta.cos())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss, clippy::float_cmp)]
mod tests {
    use super::*;

    fn sine(rate: u32, hz: f32, seconds: f32, amp: f32) -> Vec<f32> {
        let n = (rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * hz * i as f32 / rate as f32).sin() * amp)
            .collect()
    }

    #[test]
    fn output_length_matches_source() {
        let rate = 24_000;
        let source = sine(rate, 220.0, 2.0, 0.4);
        let replacement = sine(rate, 440.0, 0.3, 0.4);
        let out = crossfade_splice(&source, &replacement, rate, 12_000, 24_000, 30, None);
        assert_eq!(out.len(), source.len());
    }

    #[test]
    fn outside_region_is_bit_exact() {
        let rate = 24_000;
        let source = sine(rate, 220.0, 2.0, 0.4);
        let replacement = sine(rate, 440.0, 0.5, 0.4);
        let (i0, i1) = (12_000, 24_000);
        let fade = (rate as usize * 30 / 1000).min((i1 - i0) / 4);
        let out = crossfade_splice(&source, &replacement, rate, i0, i1, 30, None);
        assert_eq!(out[..i0], source[..i0], "prefix changed");
        assert_eq!(out[i1..], source[i1..], "suffix changed");
        // The fade itself stays inside the region.
        assert!(fade <= i1 - i0);
    }

    #[test]
    fn region_energy_changes() {
        let rate = 24_000;
        let source = sine(rate, 220.0, 2.0, 0.4);
        let replacement = vec![0.0_f32; 100]; // silence replaces tone
        let out = crossfade_splice(&source, &replacement, rate, 12_000, 24_000, 30, None);
        let region_rms = rms(&out[13_000..23_000]);
        assert!(region_rms < 0.1, "expected quieter region, rms={region_rms}");
    }

    #[test]
    fn loudness_is_matched_to_neighborhood() {
        let rate = 24_000;
        let source = sine(rate, 220.0, 2.0, 0.4);
        // Very quiet replacement gets lifted toward the neighborhood level.
        let replacement = sine(rate, 440.0, 0.5, 0.01);
        let out = crossfade_splice(&source, &replacement, rate, 12_000, 24_000, 30, None);
        let mid = rms(&out[15_000..21_000]);
        assert!(mid > 0.03, "replacement not lifted, rms={mid}");
    }

    #[test]
    fn ducking_keeps_attenuated_original() {
        let rate = 24_000;
        let source = sine(rate, 220.0, 2.0, 0.4);
        let replacement = vec![0.0_f32; 12_000];
        let duck = 0.5_f32;
        let out =
            crossfade_splice(&source, &replacement, rate, 12_000, 24_000, 30, Some(duck));
        // Middle of the region: silence on top of the ducked original.
        let mid = rms(&out[15_000..21_000]);
        let original_mid = rms(&source[15_000..21_000]);
        assert!((mid - original_mid * duck).abs() < 0.02);
    }

    #[test]
    fn limiter_engages_on_hot_splice() {
        let rate = 24_000;
        let source = sine(rate, 220.0, 1.0, 0.9);
        let replacement = sine(rate, 225.0, 0.5, 0.9);
        let out = crossfade_splice(&source, &replacement, rate, 6_000, 18_000, 20, Some(1.0));
        assert!(peak(&out) <= 1.0);
    }

    #[test]
    fn degenerate_region_is_noop() {
        let source = sine(24_000, 220.0, 0.5, 0.4);
        let out = crossfade_splice(&source, &[0.5; 10], 24_000, 4_000, 4_000, 30, None);
        assert_eq!(out, source);
    }
}
