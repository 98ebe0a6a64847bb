// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sample text for auditioning voices: local snippet banks per category,
//! upgraded to LLM-generated text when the ollama upstream answers.

use rand::seq::SliceRandom;
use serde_json::Value;
use std::time::Duration;

pub const CATEGORIES: &[&str] =
    &["any", "dialogue", "narration", "news", "promo", "story", "whimsy"];

/// Built-in snippets, two per category, used whenever the LLM upstream is
/// unavailable.
const SNIPPETS: &[(&str, &[&str])] = &[
    (
        "any",
        &[
            "Welcome to the VoxHub studio. Generate speech clips, audition voices, and tweak the pacing to fit your project.",
            "Testing, one two three. This is a friendly reminder that synthetic voices can be astonishingly crisp when tuned properly.",
        ],
    ),
    (
        "dialogue",
        &[
            "I can't believe it worked. All those late nights finally paid off.",
            "You really think this voice will convince them? Trust me, it's the right choice.",
        ],
    ),
    (
        "narration",
        &[
            "In the stillness between the trees, a quiet melody carried the promise of the coming dawn.",
            "The crew had rehearsed for months, but nothing prepared them for the thrill of opening night.",
        ],
    ),
    (
        "news",
        &[
            "Local engineers today unveiled a breakthrough text-to-speech model designed for studio quality voiceovers.",
            "In technology headlines, developers are embracing on-device speech synthesis for privacy-conscious products.",
        ],
    ),
    (
        "promo",
        &[
            "Upgrade your workflow with the VoxHub studio. Faster rendering, smarter presets, limitless creativity.",
            "Your story deserves a captivating voice. Open the studio and discover the perfect tone in seconds.",
        ],
    ),
    (
        "story",
        &[
            "Beneath the shifting aurora, the explorers found a hidden city pulsing with ancient light.",
            "Every legend begins with a single voice daring to speak the impossible aloud.",
        ],
    ),
    (
        "whimsy",
        &[
            "Some voices sparkle like stardust; others hum like a cup of tea on a rainy afternoon.",
            "This sentence serves no purpose except to make the waveform wiggle in a delightful way.",
        ],
    ),
];

/// Normalize a requested category, falling back to `any`.
pub fn normalize_category(raw: Option<&str>) -> &'static str {
    let wanted = raw.unwrap_or("any").to_lowercase();
    CATEGORIES.iter().find(|c| **c == wanted).copied().unwrap_or("any")
}

/// A local snippet for the category.
pub fn local_snippet(category: &str) -> String {
    let bank = SNIPPETS
        .iter()
        .find(|(tag, _)| *tag == category)
        .or_else(|| SNIPPETS.first())
        .map_or::<&[&str], _>(&[], |(_, texts)| texts);
    bank.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("The quick brown fox jumps over the lazy dog.")
        .to_string()
}

/// Ask the ollama upstream for a fresh paragraph. `None` on any failure;
/// the caller falls back to the local bank.
pub async fn generate_via_ollama(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    category: &str,
) -> Option<String> {
    let mut prompt = String::from(
        "Compose a short paragraph suitable for testing a text-to-speech voice. \
         Keep it under 60 words.",
    );
    if category != "any" {
        prompt.push_str(&format!(" The tone should feel like: {category}."));
    }

    let payload = serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
        "options": {"temperature": 0.7, "top_p": 0.9},
    });
    let response = client
        .post(format!("{}/api/generate", base_url.trim_end_matches('/')))
        .timeout(Duration::from_secs(20))
        .json(&payload)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body: Value = response.json().await.ok()?;
    body.get("response")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_normalize() {
        assert_eq!(normalize_category(Some("NEWS")), "news");
        assert_eq!(normalize_category(Some("nope")), "any");
        assert_eq!(normalize_category(None), "any");
    }

    #[test]
    fn every_category_has_snippets() {
        for category in CATEGORIES {
            assert!(!local_snippet(category).is_empty());
        }
    }
}
