// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Rolling operation statistics for ETA estimates.
//!
//! Each operation kind (transcribe, align, replace, apply...) keeps a
//! bounded ring of small records in a JSON file. Writes never fail the
//! request that produced them; a broken stats file degrades to an empty
//! book on the next read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Maximum samples retained per operation kind.
const RING_CAP: usize = 100;

/// One sample: elapsed seconds plus any flat numeric facts the operation
/// wants remembered (duration, rtf, region length...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatRecord {
    pub elapsed: f64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, f64>,
    pub ts: f64,
}

impl StatRecord {
    pub fn new(elapsed: f64) -> Self {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self { elapsed, fields: BTreeMap::new(), ts }
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Real-time factor: recorded explicitly, or derived from
    /// `duration / elapsed` when both are known.
    pub fn rtf(&self) -> Option<f64> {
        if let Some(rtf) = self.fields.get("rtf") {
            return Some(*rtf);
        }
        let duration = self.fields.get("duration")?;
        if self.elapsed > 0.0 {
            Some(duration / self.elapsed)
        } else {
            None
        }
    }
}

/// Per-kind aggregate reported by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatSummary {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rtf: Option<f64>,
    pub avg_elapsed: f64,
}

/// The persisted stats book: kind -> bounded ring of records.
pub struct StatsBook {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StatsBook {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    fn read(&self) -> BTreeMap<String, Vec<StatRecord>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Append a sample for `kind`. Failures are logged and swallowed.
    pub fn record(&self, kind: &str, record: StatRecord) {
        let Ok(_guard) = self.lock.lock() else { return };
        let mut book = self.read();
        let ring = book.entry(kind.to_string()).or_default();
        ring.push(record);
        if ring.len() > RING_CAP {
            let overflow = ring.len() - RING_CAP;
            ring.drain(..overflow);
        }
        match serde_json::to_vec_pretty(&book) {
            Ok(bytes) => {
                if let Err(e) = crate::paths::write_atomic(&self.path, &bytes) {
                    tracing::warn!(error = %e, "failed to persist stats");
                }
            },
            Err(e) => tracing::warn!(error = %e, "failed to serialize stats"),
        }
    }

    /// Aggregate summaries over the retained window.
    pub fn summary(&self) -> BTreeMap<String, StatSummary> {
        let Ok(_guard) = self.lock.lock() else { return BTreeMap::new() };
        let book = self.read();
        let mut out = BTreeMap::new();
        for (kind, ring) in book {
            if ring.is_empty() {
                continue;
            }
            let count = ring.len();
            let avg_elapsed = ring.iter().map(|r| r.elapsed).sum::<f64>() / count as f64;
            let rtfs: Vec<f64> = ring.iter().filter_map(StatRecord::rtf).collect();
            let avg_rtf = if rtfs.is_empty() {
                None
            } else {
                Some(rtfs.iter().sum::<f64>() / rtfs.len() as f64)
            };
            out.insert(kind, StatSummary { count, avg_rtf, avg_elapsed });
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn book() -> (tempfile::TempDir, StatsBook) {
        let dir = tempfile::tempdir().unwrap();
        let book = StatsBook::new(dir.path().join("media_stats.json"));
        (dir, book)
    }

    #[test]
    fn ring_is_bounded() {
        let (_dir, book) = book();
        for i in 0..(RING_CAP + 20) {
            book.record("transcribe", StatRecord::new(i as f64));
        }
        let summary = book.summary();
        assert_eq!(summary["transcribe"].count, RING_CAP);
    }

    #[test]
    fn rtf_derived_from_duration() {
        let (_dir, book) = book();
        book.record("transcribe", StatRecord::new(2.0).with("duration", 60.0));
        let summary = book.summary();
        assert_eq!(summary["transcribe"].avg_rtf, Some(30.0));
    }

    #[test]
    fn explicit_rtf_wins() {
        let record = StatRecord::new(2.0).with("duration", 60.0).with("rtf", 5.0);
        assert_eq!(record.rtf(), Some(5.0));
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let (dir, book) = book();
        std::fs::write(dir.path().join("media_stats.json"), b"{not json").unwrap();
        assert!(book.summary().is_empty());
        book.record("align", StatRecord::new(1.0));
        assert_eq!(book.summary()["align"].count, 1);
    }
}
