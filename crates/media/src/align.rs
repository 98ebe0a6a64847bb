// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Region alignment: window math, the word-merge set operation and the
//! before/after diff statistics.
//!
//! The transcript is treated as an ordered set of non-overlapping word
//! intervals. A region merge is `(prior \ window) ∪ new_in_window`,
//! re-sorted by start; words outside the window are never touched.

use crate::stt::{Transcript, Word};
use serde::Serialize;
use voxhub_core::{HubError, Result};

/// Expand `[start, end]` by `margin` on both sides, clamped to the clip.
pub fn expand_window(start: f64, end: f64, margin: f64, duration: f64) -> (f64, f64) {
    let w0 = (start - margin).max(0.0);
    let w1 = if duration > 0.0 { (end + margin).min(duration) } else { end + margin };
    (w0, w1)
}

/// Does a word interval overlap `[w0, w1]`?
fn overlaps(word: &Word, w0: f64, w1: f64) -> bool {
    word.end > w0 && word.start < w1
}

/// The window's text, preferring word-level granularity and falling back
/// to segments.
///
/// # Errors
///
/// `bad_request` when the window contains no usable text.
pub fn window_text(transcript: &Transcript, w0: f64, w1: f64) -> Result<String> {
    let from_words: Vec<&str> = transcript
        .words
        .iter()
        .filter(|w| overlaps(w, w0, w1))
        .map(|w| w.text.as_str())
        .collect();
    let text = if from_words.is_empty() {
        transcript
            .segments
            .iter()
            .filter(|s| s.end > w0 && s.start < w1)
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        from_words.join(" ")
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        Err(HubError::BadRequest(
            "the selected region contains no transcript text to align".to_string(),
        ))
    } else {
        Ok(text)
    }
}

/// Shift a batch of clip-relative words to absolute time.
pub fn shift_words(words: Vec<Word>, offset: f64) -> Vec<Word> {
    words
        .into_iter()
        .map(|mut w| {
            w.start += offset;
            w.end += offset;
            w
        })
        .collect()
}

/// Merge freshly aligned words into the prior word list.
///
/// Keeps every prior word that does not overlap `[w0, w1]`, appends all new
/// words and re-sorts by start time. The invariant: any word outside the
/// window survives with identical timings.
pub fn merge_region_words(prior: &[Word], new_words: Vec<Word>, w0: f64, w1: f64) -> Vec<Word> {
    let mut merged: Vec<Word> =
        prior.iter().filter(|w| !overlaps(w, w0, w1)).cloned().collect();
    merged.extend(new_words);
    merged.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

/// One headline entry in the diff report.
#[derive(Debug, Clone, Serialize)]
pub struct DiffTop {
    pub idx: usize,
    pub text: String,
    pub boundary: &'static str,
    pub delta_ms: f64,
    pub direction: &'static str,
}

/// Aggregate before/after statistics over the window's word pairs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffStats {
    pub compared: usize,
    pub changed: usize,
    pub text_mismatch: usize,
    pub mean_abs_ms: f64,
    pub median_abs_ms: f64,
    pub p95_abs_ms: f64,
    pub max_abs_ms: f64,
    pub top: Vec<DiffTop>,
}

/// A pair counts as "changed" when either boundary moved at least this far.
const CHANGED_THRESHOLD_MS: f64 = 1.0;

/// Compare word pairs by index within the window. Text mismatches are
/// counted but do not exclude a pair from the delta calculation.
pub fn diff_stats(prior: &[Word], updated: &[Word]) -> DiffStats {
    let compared = prior.len().min(updated.len());
    if compared == 0 {
        return DiffStats::default();
    }

    let mut abs_deltas: Vec<f64> = Vec::with_capacity(compared * 2);
    let mut top: Vec<DiffTop> = Vec::new();
    let mut changed = 0;
    let mut text_mismatch = 0;

    for idx in 0..compared {
        let old = &prior[idx];
        let new = &updated[idx];
        if !old.text.eq_ignore_ascii_case(&new.text) {
            text_mismatch += 1;
        }
        let delta_start = (new.start - old.start) * 1000.0;
        let delta_end = (new.end - old.end) * 1000.0;
        abs_deltas.push(delta_start.abs());
        abs_deltas.push(delta_end.abs());
        if delta_start.abs().max(delta_end.abs()) >= CHANGED_THRESHOLD_MS {
            changed += 1;
        }
        for (boundary, delta) in [("start", delta_start), ("end", delta_end)] {
            top.push(DiffTop {
                idx,
                text: new.text.clone(),
                boundary,
                delta_ms: (delta * 10.0).round() / 10.0,
                direction: if delta < 0.0 { "earlier" } else { "later" },
            });
        }
    }

    abs_deltas.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mean = abs_deltas.iter().sum::<f64>() / abs_deltas.len() as f64;
    let percentile = |q: f64| -> f64 {
        let pos = (q * (abs_deltas.len() - 1) as f64).round() as usize;
        abs_deltas[pos.min(abs_deltas.len() - 1)]
    };

    top.sort_by(|a, b| {
        b.delta_ms
            .abs()
            .partial_cmp(&a.delta_ms.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    top.truncate(10);

    DiffStats {
        compared,
        changed,
        text_mismatch,
        mean_abs_ms: (mean * 10.0).round() / 10.0,
        median_abs_ms: percentile(0.5),
        p95_abs_ms: percentile(0.95),
        max_abs_ms: abs_deltas.last().copied().unwrap_or(0.0),
        top,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::stt::Segment;

    fn word(text: &str, start: f64, end: f64) -> Word {
        Word { text: text.to_string(), start, end, confidence: None }
    }

    fn transcript(words: Vec<Word>) -> Transcript {
        Transcript {
            language: "en".to_string(),
            duration: 60.0,
            segments: vec![Segment { text: "seg".to_string(), start: 0.0, end: 60.0 }],
            words,
            stats: None,
            aligned: false,
            stub: false,
        }
    }

    #[test]
    fn window_expansion_clamps() {
        assert_eq!(expand_window(10.0, 12.5, 0.5, 60.0), (9.5, 13.0));
        assert_eq!(expand_window(0.2, 59.9, 0.5, 60.0), (0.0, 60.0));
    }

    #[test]
    fn window_text_prefers_words() {
        let t = transcript(vec![
            word("alpha", 1.0, 1.5),
            word("beta", 2.0, 2.5),
            word("gamma", 9.0, 9.5),
        ]);
        assert_eq!(window_text(&t, 0.5, 3.0).unwrap(), "alpha beta");
    }

    #[test]
    fn window_text_falls_back_to_segments() {
        let t = transcript(vec![]);
        assert_eq!(window_text(&t, 0.0, 10.0).unwrap(), "seg");
    }

    #[test]
    fn empty_window_is_bad_request() {
        let mut t = transcript(vec![word("far", 50.0, 51.0)]);
        t.segments.clear();
        assert_eq!(window_text(&t, 0.0, 5.0).unwrap_err().kind(), "bad_request");
    }

    #[test]
    fn merge_preserves_outside_words_exactly() {
        let prior = vec![
            word("before", 1.0, 1.4),
            word("inside1", 10.2, 10.6),
            word("inside2", 10.8, 11.4),
            word("after", 20.0, 20.5),
        ];
        let fresh = vec![word("replaced", 10.1, 11.5)];
        let merged = merge_region_words(&prior, fresh, 10.0, 12.0);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], word("before", 1.0, 1.4));
        assert_eq!(merged[1], word("replaced", 10.1, 11.5));
        assert_eq!(merged[2], word("after", 20.0, 20.5));
    }

    #[test]
    fn merge_drops_words_straddling_the_boundary() {
        let prior = vec![word("straddle", 9.8, 10.4), word("clear", 15.0, 15.5)];
        let merged = merge_region_words(&prior, vec![word("new", 10.0, 10.5)], 10.0, 12.0);
        let texts: Vec<&str> = merged.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "clear"]);
    }

    #[test]
    fn shift_words_offsets_both_boundaries() {
        let shifted = shift_words(vec![word("w", 0.5, 0.9)], 10.0);
        assert_eq!(shifted[0].start, 10.5);
        assert_eq!(shifted[0].end, 10.9);
    }

    #[test]
    fn diff_stats_report() {
        let prior = vec![word("a", 1.0, 1.5), word("b", 2.0, 2.5), word("c", 3.0, 3.5)];
        let updated = vec![
            word("a", 1.05, 1.5), // start moved 50 ms later
            word("B", 2.0, 2.4),  // end moved 100 ms earlier, text case-insensitive match
            word("x", 3.0, 3.5),  // text mismatch, no movement
        ];
        let stats = diff_stats(&prior, &updated);
        assert_eq!(stats.compared, 3);
        assert_eq!(stats.changed, 2);
        assert_eq!(stats.text_mismatch, 1);
        assert_eq!(stats.max_abs_ms, 100.0);
        assert!(!stats.top.is_empty());
        assert_eq!(stats.top[0].delta_ms, -100.0);
        assert_eq!(stats.top[0].boundary, "end");
        assert_eq!(stats.top[0].direction, "earlier");
    }

    #[test]
    fn diff_stats_empty_inputs() {
        let stats = diff_stats(&[], &[]);
        assert_eq!(stats.compared, 0);
        assert_eq!(stats.max_abs_ms, 0.0);
    }
}
