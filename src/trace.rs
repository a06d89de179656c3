//! Per-subtask execution trace and cost accounting.

use crate::bridge::{WorkerOutput, CANCELLED_ERROR};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Terminal status of one subtask. In-flight subtasks have no entry yet;
/// the finalized trace holds exactly one entry per attempted subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub wave_num: usize,
    pub worker_name: String,
    pub subtask_id: String,
    pub status: TraceStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tokens: Option<u64>,
    /// Unknown when the worker reported no token count; never coerced to 0.
    pub cost: Option<f64>,
    pub error: Option<String>,
}

/// Accumulates one finalized entry per attempted subtask, in completion
/// order within each wave.
pub struct Tracer {
    usd_per_million_tokens: f64,
    entries: Vec<TraceEntry>,
}

impl Tracer {
    pub fn new(usd_per_million_tokens: f64) -> Self {
        Self {
            usd_per_million_tokens,
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, wave_num: usize, output: &WorkerOutput) {
        let status = if output.success {
            TraceStatus::Success
        } else if output.error == CANCELLED_ERROR {
            TraceStatus::Cancelled
        } else {
            TraceStatus::Failed
        };

        let cost = output.cost.or_else(|| {
            output
                .tokens
                .map(|tokens| tokens as f64 * self.usd_per_million_tokens / 1_000_000.0)
        });

        let duration_ms = (output.ended_at - output.started_at)
            .num_milliseconds()
            .max(0) as u64;

        self.entries.push(TraceEntry {
            wave_num,
            worker_name: output.worker_name.clone(),
            subtask_id: output.subtask_id.clone(),
            status,
            started_at: output.started_at,
            ended_at: output.ended_at,
            duration_ms,
            tokens: output.tokens,
            cost,
            error: if output.error.is_empty() {
                None
            } else {
                Some(output.error.clone())
            },
        });
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

/// Write entries as JSONL under `dir`, named `<timestamp>-<request-hash>.jsonl`.
pub fn persist(entries: &[TraceEntry], dir: &Path, request_text: &str) -> Result<PathBuf> {
    let digest = Sha256::digest(request_text.as_bytes());
    let hash: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");

    let path = dir.join(format!("{}-{}.jsonl", stamp, hash));
    let mut lines = String::new();
    for entry in entries {
        lines.push_str(&serde_json::to_string(entry)?);
        lines.push('\n');
    }
    fs::write(&path, lines)?;

    Ok(path)
}
