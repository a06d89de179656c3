pub mod classify;
pub mod templates;
pub mod waves;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-text user request plus optional caller-supplied context.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub text: String,
    pub context: BTreeMap<String, String>,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Text plus context values, the haystack both classifiers score.
    fn classification_text(&self) -> String {
        let mut text = self.text.clone();
        for value in self.context.values() {
            text.push(' ');
            text.push_str(value);
        }
        text
    }
}

/// Closed set of request shapes. Order is the tie-break priority: when two
/// patterns score equally, the earlier one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    CodebaseAnalysis,
    ContentResearch,
    ProjectStatus,
    CodeCleanup,
    LearningMaterials,
    QualityAssessment,
    Refactoring,
    Documentation,
    DuplicateDetection,
    DeadCodeAnalysis,
    CodeOrganization,
    ContentExtraction,
    QuizGeneration,
    Unknown,
}

impl Pattern {
    /// All classifiable patterns in priority order (`Unknown` excluded).
    pub const PRIORITY: [Pattern; 13] = [
        Pattern::CodebaseAnalysis,
        Pattern::ContentResearch,
        Pattern::ProjectStatus,
        Pattern::CodeCleanup,
        Pattern::LearningMaterials,
        Pattern::QualityAssessment,
        Pattern::Refactoring,
        Pattern::Documentation,
        Pattern::DuplicateDetection,
        Pattern::DeadCodeAnalysis,
        Pattern::CodeOrganization,
        Pattern::ContentExtraction,
        Pattern::QuizGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::CodebaseAnalysis => "codebase-analysis",
            Pattern::ContentResearch => "content-research",
            Pattern::ProjectStatus => "project-status",
            Pattern::CodeCleanup => "code-cleanup",
            Pattern::LearningMaterials => "learning-materials",
            Pattern::QualityAssessment => "quality-assessment",
            Pattern::Refactoring => "refactoring",
            Pattern::Documentation => "documentation",
            Pattern::DuplicateDetection => "duplicate-detection",
            Pattern::DeadCodeAnalysis => "dead-code-analysis",
            Pattern::CodeOrganization => "code-organization",
            Pattern::ContentExtraction => "content-extraction",
            Pattern::QuizGeneration => "quiz-generation",
            Pattern::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb axis of a request, kept separate from the content-type axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Extract,
    Analyze,
    Generate,
    Fix,
    Refactor,
    Search,
    Status,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Extract => "extract",
            Intent::Analyze => "analyze",
            Intent::Generate => "generate",
            Intent::Fix => "fix",
            Intent::Refactor => "refactor",
            Intent::Search => "search",
            Intent::Status => "status",
        }
    }
}

/// One invocation unit in a plan. Immutable once the plan is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    /// Unique within the plan; template ids double as role names.
    pub id: String,
    pub description: String,
    pub priority: u32,
    pub worker_hint: Option<String>,
    pub depends_on: Vec<String>,
    pub parallelizable: bool,
    pub est_seconds: u64,
}

/// A decomposed request: subtasks, wave partitioning, and display estimate.
#[derive(Debug, Clone, Serialize)]
pub struct TaskPlan {
    pub pattern: Pattern,
    pub intent: Option<Intent>,
    pub subtasks: Vec<SubTask>,
    /// Wave k contains subtask ids whose dependencies all lie in waves 0..k.
    pub waves: Vec<Vec<String>>,
    pub est_total_seconds: u64,
}

impl TaskPlan {
    pub fn subtask(&self, id: &str) -> Option<&SubTask> {
        self.subtasks.iter().find(|s| s.id == id)
    }
}

/// Transforms a free-text request into a wave-partitioned plan.
///
/// Never fails on well-formed text: unmatched requests fall back to the
/// `unknown` pattern with a single pass-through subtask. The only error
/// paths are template bugs (duplicate ids, unknown or duplicated
/// dependencies, cycles), which are programmer errors and fail fast.
#[derive(Debug, Default)]
pub struct Decomposer;

impl Decomposer {
    pub fn new() -> Self {
        Self
    }

    pub fn decompose(&self, request: &Request) -> Result<TaskPlan> {
        let haystack = request.classification_text();
        let pattern = classify::classify_pattern(&haystack);
        let intent = classify::classify_intent(&haystack);

        let subtasks = match pattern {
            Pattern::Unknown => vec![SubTask {
                id: "request".to_string(),
                description: request.text.clone(),
                priority: 5,
                worker_hint: None,
                depends_on: Vec::new(),
                parallelizable: false,
                est_seconds: 5,
            }],
            _ => templates::instantiate(pattern),
        };

        let waves = waves::partition(&subtasks)?;
        let est_total_seconds = waves::estimate_total_seconds(&subtasks, &waves);

        Ok(TaskPlan {
            pattern,
            intent,
            subtasks,
            waves,
            est_total_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_request_decomposes_into_two_waves() {
        let plan = Decomposer::new()
            .decompose(&Request::new("Audit the codebase"))
            .unwrap();

        assert_eq!(plan.pattern, Pattern::CodebaseAnalysis);
        assert_eq!(plan.subtasks.len(), 4);
        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[0].len(), 3);
        assert_eq!(plan.waves[1], vec!["refactor-plan".to_string()]);
        assert_eq!(plan.est_total_seconds, 18);
    }

    #[test]
    fn quiz_request_decomposes_into_two_waves() {
        let plan = Decomposer::new()
            .decompose(&Request::new("Create a quiz about photosynthesis for 6th grade"))
            .unwrap();

        assert_eq!(plan.pattern, Pattern::QuizGeneration);
        assert_eq!(plan.subtasks.len(), 4);
        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[1], vec!["quiz-generate".to_string()]);
    }

    #[test]
    fn status_request_is_a_single_wave() {
        let plan = Decomposer::new()
            .decompose(&Request::new("What was I working on?"))
            .unwrap();

        assert_eq!(plan.pattern, Pattern::ProjectStatus);
        assert_eq!(plan.subtasks.len(), 1);
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.subtasks[0].id, "context-build");
        assert_eq!(plan.est_total_seconds, 1);
    }

    #[test]
    fn unmatched_request_falls_back_to_unknown() {
        let plan = Decomposer::new()
            .decompose(&Request::new("zzz qqq nothing matches here"))
            .unwrap();

        assert_eq!(plan.pattern, Pattern::Unknown);
        assert_eq!(plan.subtasks.len(), 1);
        assert_eq!(plan.subtasks[0].description, "zzz qqq nothing matches here");
        assert!(plan.subtasks[0].worker_hint.is_none());
        assert!(!plan.subtasks[0].parallelizable);
    }

    #[test]
    fn empty_request_falls_back_to_unknown() {
        let plan = Decomposer::new().decompose(&Request::new("")).unwrap();

        assert_eq!(plan.pattern, Pattern::Unknown);
        assert_eq!(plan.subtasks.len(), 1);
        assert_eq!(plan.subtasks[0].description, "");
        assert_eq!(plan.waves.len(), 1);
    }

    #[test]
    fn context_values_inform_classification() {
        let request =
            Request::new("handle this one").with_context("hint", "make a quiz about rivers");
        let plan = Decomposer::new().decompose(&request).unwrap();
        assert_eq!(plan.pattern, Pattern::QuizGeneration);
        assert_eq!(plan.subtasks.len(), 4);
    }

    #[test]
    fn decomposition_is_deterministic() {
        let decomposer = Decomposer::new();
        let request = Request::new("Refactor the payment module");
        let a = decomposer.decompose(&request).unwrap();
        let b = decomposer.decompose(&request).unwrap();

        assert_eq!(a.pattern, b.pattern);
        assert_eq!(a.waves, b.waves);
        assert_eq!(
            a.subtasks.iter().map(|s| &s.id).collect::<Vec<_>>(),
            b.subtasks.iter().map(|s| &s.id).collect::<Vec<_>>()
        );
        assert_eq!(a.est_total_seconds, b.est_total_seconds);
    }

    #[test]
    fn every_subtask_lands_in_exactly_one_wave() {
        for pattern in Pattern::PRIORITY {
            let subtasks = templates::instantiate(pattern);
            let waves = waves::partition(&subtasks).unwrap();

            let mut seen: Vec<&String> = waves.iter().flatten().collect();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), subtasks.len(), "pattern {}", pattern);
        }
    }
}
