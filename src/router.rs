//! Per-subtask worker selection.
//!
//! A registered worker hint wins outright. Otherwise the subtask
//! description is classified into a (content-type, intent) pair over the
//! same kind of keyword heuristics the decomposer uses, mapped to an
//! ordered candidate list, and the learned success rates break the tie.

use crate::bridge::registry::{WorkerRegistry, ECHO_WORKER};
use crate::decomposer::classify;
use crate::decomposer::{Intent, Pattern, SubTask};
use crate::feedback::FeedbackStore;
use std::sync::Arc;
use tracing::debug;

/// Subject-matter axis of a subtask, independent of the intent verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Code,
    Web,
    Content,
    Project,
    General,
}

/// Rate assumed for workers without enough observations.
const NEUTRAL_PRIOR: f64 = 0.5;

const CONTENT_KEYWORDS: [(ContentType, &[&str]); 4] = [
    (
        ContentType::Web,
        &["search", "sources", "web", "research", "url"],
    ),
    (
        ContentType::Code,
        &["code", "module", "refactor", "duplicate", "unused", "unreachable", "structure"],
    ),
    (
        ContentType::Project,
        &["activity", "session", "next actions", "recent", "prior sessions"],
    ),
    (
        ContentType::Content,
        &["content", "material", "quiz", "question", "document", "study", "summarize", "fetch"],
    ),
];

fn classify_content(text: &str) -> ContentType {
    let lowered = text.to_lowercase();

    let mut best = ContentType::General;
    let mut best_score = 0;
    for (content, keywords) in CONTENT_KEYWORDS {
        let score = keywords.iter().filter(|k| lowered.contains(*k)).count();
        if score > best_score {
            best = content;
            best_score = score;
        }
    }

    best
}

/// Ordered candidates per (content-type, intent) cell. Position is the
/// final tie-break.
fn candidates(content: ContentType, intent: Intent) -> &'static [&'static str] {
    use ContentType::*;
    use Intent::*;

    match (content, intent) {
        (_, Search) => &["omnisearch", "mock-search"],
        (_, Status) => &["context-build"],
        (Content, Extract) | (Web, Extract) | (General, Extract) => &["content-fetch"],
        (Content, Generate) | (General, Generate) => &["quiz-generate", "materials-generate"],
        (Code, Generate) => &["doc-generate"],
        (Content, Analyze) | (Web, Analyze) | (General, Analyze) => &["quality-assess"],
        (Code, Analyze) => &["quality-assess", "code-group"],
        (Code, Refactor) | (Code, Fix) => &["refactor-plan"],
        _ => &[],
    }
}

pub struct Router {
    registry: Arc<WorkerRegistry>,
    feedback: Arc<FeedbackStore>,
    min_samples: u64,
}

impl Router {
    pub fn new(registry: Arc<WorkerRegistry>, feedback: Arc<FeedbackStore>, min_samples: u64) -> Self {
        Self {
            registry,
            feedback,
            min_samples,
        }
    }

    /// Pick the worker for a subtask. Total: always returns a registered
    /// name, falling back to the echo worker.
    pub fn choose(&self, subtask: &SubTask, _pattern: Pattern) -> String {
        if let Some(hint) = &subtask.worker_hint {
            if self.registry.contains(hint) {
                return hint.clone();
            }
            debug!(hint = %hint, subtask = %subtask.id, "worker hint not registered, classifying");
        }

        let content = classify_content(&subtask.description);
        let Some(intent) = classify::classify_intent(&subtask.description) else {
            return ECHO_WORKER.to_string();
        };

        let mut best: Option<(&str, f64)> = None;
        for candidate in candidates(content, intent) {
            if !self.registry.contains(candidate) {
                continue;
            }
            let rate = match self.feedback.rate(candidate) {
                Some(r) if r.samples >= self.min_samples => r.rate,
                _ => NEUTRAL_PRIOR,
            };
            // Strictly greater keeps the earlier candidate on ties.
            if best.is_none_or(|(_, best_rate)| rate > best_rate) {
                best = Some((candidate, rate));
            }
        }

        best.map(|(name, _)| name.to_string())
            .unwrap_or_else(|| ECHO_WORKER.to_string())
    }
}
