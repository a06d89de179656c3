//! Keyword scoring for pattern and intent classification.
//!
//! Both passes lowercase the request and count matching phrases. Ties are
//! broken by fixed priority order; a best score of zero means no match.

use crate::decomposer::{Intent, Pattern};

/// Keyword table per pattern, in `Pattern::PRIORITY` order.
const PATTERN_KEYWORDS: [(Pattern, &[&str]); 13] = [
    (
        Pattern::CodebaseAnalysis,
        &["audit", "codebase", "code analysis", "analyze the code", "health check"],
    ),
    (
        Pattern::ContentResearch,
        &["research", "investigate", "look up", "find information", "find sources"],
    ),
    (
        Pattern::ProjectStatus,
        &["working on", "status", "progress", "where did i leave", "what was i"],
    ),
    (Pattern::CodeCleanup, &["clean up", "cleanup", "tidy"]),
    (
        Pattern::LearningMaterials,
        &["learning materials", "study guide", "teach me", "lesson", "flashcard"],
    ),
    (
        Pattern::QualityAssessment,
        &["quality", "assess", "evaluate", "how good"],
    ),
    (
        Pattern::Refactoring,
        &["refactor", "restructure", "rework"],
    ),
    (
        Pattern::Documentation,
        &["document", "readme", "docstring", "api reference"],
    ),
    (
        Pattern::DuplicateDetection,
        &["duplicate", "duplicated", "copy-paste", "copy paste"],
    ),
    (
        Pattern::DeadCodeAnalysis,
        &["dead code", "unused code", "unreachable"],
    ),
    (
        Pattern::CodeOrganization,
        &["organize", "organization", "module structure", "file layout"],
    ),
    (
        Pattern::ContentExtraction,
        &["extract", "pull out", "key points", "summarize"],
    ),
    (
        Pattern::QuizGeneration,
        &["quiz", "questions about", "test me", "exam"],
    ),
];

/// Intent table; earlier entries win ties.
const INTENT_KEYWORDS: [(Intent, &[&str]); 7] = [
    (Intent::Status, &["working on", "status", "progress"]),
    (
        Intent::Refactor,
        &["refactor", "restructure", "reorganize", "clean up"],
    ),
    (Intent::Fix, &["fix", "repair", "debug", "resolve"]),
    (
        Intent::Extract,
        &["extract", "summarize", "pull out", "key points"],
    ),
    (
        Intent::Analyze,
        &["analyze", "audit", "assess", "review", "evaluate", "duplicate", "dead code"],
    ),
    (Intent::Search, &["research", "search", "find", "look up"]),
    (
        Intent::Generate,
        &["create", "generate", "write", "make", "build", "quiz"],
    ),
];

fn score(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

/// Best-scoring pattern, or `Unknown` when nothing matches.
pub fn classify_pattern(text: &str) -> Pattern {
    let lowered = text.to_lowercase();

    let mut best = Pattern::Unknown;
    let mut best_score = 0;
    for (pattern, keywords) in PATTERN_KEYWORDS {
        let s = score(&lowered, keywords);
        if s > best_score {
            best = pattern;
            best_score = s;
        }
    }

    best
}

/// Best-scoring intent, or `None` when nothing matches.
pub fn classify_intent(text: &str) -> Option<Intent> {
    let lowered = text.to_lowercase();

    let mut best = None;
    let mut best_score = 0;
    for (intent, keywords) in INTENT_KEYWORDS {
        let s = score(&lowered, keywords);
        if s > best_score {
            best = Some(intent);
            best_score = s;
        }
    }

    best
}
