//! Append-only outcome log and the learned per-worker success rates.
//!
//! The JSONL log is the source of truth; the in-memory EMA table is rebuilt
//! from it on startup. An unwritable log degrades to a session-only table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

/// One line of the feedback log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub ts: DateTime<Utc>,
    pub worker: String,
    pub outcome: f64,
    pub content_type: String,
    pub subtask: String,
}

/// Learned view over the log for one worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuccessRate {
    pub rate: f64,
    pub samples: u64,
}

struct Inner {
    writer: Option<File>,
    rates: HashMap<String, SuccessRate>,
}

pub struct FeedbackStore {
    alpha: f64,
    inner: Mutex<Inner>,
}

impl FeedbackStore {
    /// Open the log at `path`, replaying existing records into the rate
    /// table. Unparsable lines (including a trailing partial write) are
    /// skipped; an unopenable file leaves the store session-only.
    pub fn open(path: &Path, alpha: f64) -> Self {
        let mut rates = HashMap::new();
        if let Ok(content) = fs::read_to_string(path) {
            for line in content.lines() {
                if let Ok(record) = serde_json::from_str::<FeedbackRecord>(line) {
                    Self::apply(&mut rates, alpha, &record.worker, record.outcome);
                }
            }
        }

        let writer = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "feedback log unwritable, success rates are session-only");
                None
            }
        };

        Self {
            alpha,
            inner: Mutex::new(Inner { writer, rates }),
        }
    }

    /// A store with no backing file. Used when no state directory exists
    /// and in tests.
    pub fn in_memory(alpha: f64) -> Self {
        Self {
            alpha,
            inner: Mutex::new(Inner {
                writer: None,
                rates: HashMap::new(),
            }),
        }
    }

    /// Append one outcome and fold it into the worker's EMA. The line is
    /// flushed before this returns, so a crash loses at most the in-flight
    /// record.
    pub fn record(&self, worker: &str, outcome: f64, content_type: &str, subtask: &str) {
        let record = FeedbackRecord {
            ts: Utc::now(),
            worker: worker.to_string(),
            outcome,
            content_type: content_type.to_string(),
            subtask: subtask.to_string(),
        };

        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(writer) = inner.writer.as_mut() {
            let outcome_write = serde_json::to_string(&record)
                .map_err(std::io::Error::other)
                .and_then(|line| {
                    writer.write_all(line.as_bytes())?;
                    writer.write_all(b"\n")?;
                    writer.flush()
                });
            if let Err(e) = outcome_write {
                warn!(error = %e, "feedback log write failed, dropping to session-only rates");
                inner.writer = None;
            }
        }

        Self::apply(&mut inner.rates, self.alpha, worker, outcome);
    }

    pub fn rate(&self, worker: &str) -> Option<SuccessRate> {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.rates.get(worker).copied()
    }

    /// Stable-ordered copy of the rate table.
    pub fn snapshot(&self) -> BTreeMap<String, SuccessRate> {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .rates
            .iter()
            .map(|(name, rate)| (name.clone(), *rate))
            .collect()
    }

    // EMA over a neutral 0.5 seed, so replaying the same log always
    // reconstructs the same table.
    fn apply(rates: &mut HashMap<String, SuccessRate>, alpha: f64, worker: &str, outcome: f64) {
        let entry = rates.entry(worker.to_string()).or_insert(SuccessRate {
            rate: 0.5,
            samples: 0,
        });
        entry.rate = alpha * outcome + (1.0 - alpha) * entry.rate;
        entry.samples += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_moves_toward_outcomes() {
        let store = FeedbackStore::in_memory(0.2);
        assert!(store.rate("w").is_none());

        store.record("w", 1.0, "codebase-analysis", "duplicate-detect");
        let first = store.rate("w").unwrap();
        assert!((first.rate - 0.6).abs() < 1e-9);
        assert_eq!(first.samples, 1);

        for _ in 0..20 {
            store.record("w", 1.0, "codebase-analysis", "duplicate-detect");
        }
        assert!(store.rate("w").unwrap().rate > 0.95);

        for _ in 0..20 {
            store.record("w", 0.0, "codebase-analysis", "duplicate-detect");
        }
        assert!(store.rate("w").unwrap().rate < 0.05);
    }

    #[test]
    fn log_lines_match_the_wire_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");

        let store = FeedbackStore::open(&path, 0.2);
        store.record("omnisearch", 1.0, "content-research", "search");

        let content = fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(line["worker"], "omnisearch");
        assert_eq!(line["outcome"], 1.0);
        assert_eq!(line["content_type"], "content-research");
        assert_eq!(line["subtask"], "search");
        assert!(line["ts"].is_string());
    }

    #[test]
    fn replay_reconstructs_the_same_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");

        let store = FeedbackStore::open(&path, 0.2);
        store.record("a", 1.0, "x", "s1");
        store.record("a", 0.0, "x", "s2");
        store.record("b", 1.0, "y", "s3");
        let before = store.snapshot();
        drop(store);

        let reopened = FeedbackStore::open(&path, 0.2);
        assert_eq!(reopened.snapshot(), before);
    }

    #[test]
    fn trailing_partial_line_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");

        let store = FeedbackStore::open(&path, 0.2);
        store.record("a", 1.0, "x", "s1");
        drop(store);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"ts\":\"2026-01-01T00:00:00Z\",\"worker\":\"a\"").unwrap();
        drop(file);

        let reopened = FeedbackStore::open(&path, 0.2);
        let rate = reopened.rate("a").unwrap();
        assert_eq!(rate.samples, 1);
    }

    #[test]
    fn unwritable_log_degrades_to_session_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-parent").join("feedback.jsonl");

        let store = FeedbackStore::open(&path, 0.2);
        store.record("a", 1.0, "x", "s1");
        assert_eq!(store.rate("a").unwrap().samples, 1);
        assert!(!path.exists());
    }
}
