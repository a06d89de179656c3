//! Declarative subtask templates, one per pattern.
//!
//! Template ids double as role names: the synthesizer keys its sections off
//! them and the router uses the worker hints. Dependencies reference ids
//! within the same template.

use crate::decomposer::{Pattern, SubTask};

pub struct TemplateStep {
    pub id: &'static str,
    pub description: &'static str,
    pub worker_hint: Option<&'static str>,
    pub priority: u32,
    pub depends_on: &'static [&'static str],
    pub parallelizable: bool,
    pub est_seconds: u64,
}

const CODEBASE_ANALYSIS: &[TemplateStep] = &[
    TemplateStep {
        id: "duplicate-detect",
        description: "Detect duplicated code across the project",
        worker_hint: Some("duplicate-detect"),
        priority: 8,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 5,
    },
    TemplateStep {
        id: "dead-code",
        description: "Find unused and unreachable code",
        worker_hint: Some("dead-code"),
        priority: 7,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 5,
    },
    TemplateStep {
        id: "code-group",
        description: "Group related code and map the module structure",
        worker_hint: Some("code-group"),
        priority: 6,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 8,
    },
    TemplateStep {
        id: "refactor-plan",
        description: "Draft a prioritized refactoring plan from the analysis results",
        worker_hint: Some("refactor-plan"),
        priority: 9,
        depends_on: &["duplicate-detect", "dead-code", "code-group"],
        parallelizable: false,
        est_seconds: 10,
    },
];

const CONTENT_RESEARCH: &[TemplateStep] = &[
    TemplateStep {
        id: "search",
        description: "Search for sources relevant to the request",
        worker_hint: None,
        priority: 8,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 6,
    },
    TemplateStep {
        id: "quality-assess",
        description: "Score and rank the gathered sources",
        worker_hint: Some("quality-assess"),
        priority: 7,
        depends_on: &["search"],
        parallelizable: false,
        est_seconds: 4,
    },
];

const PROJECT_STATUS: &[TemplateStep] = &[TemplateStep {
    id: "context-build",
    description: "Summarize recent activity and suggest next actions",
    worker_hint: Some("context-build"),
    priority: 8,
    depends_on: &[],
    parallelizable: false,
    est_seconds: 1,
}];

const LEARNING_MATERIALS: &[TemplateStep] = &[
    TemplateStep {
        id: "content-fetch",
        description: "Fetch the source material to teach from",
        worker_hint: Some("content-fetch"),
        priority: 8,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 4,
    },
    TemplateStep {
        id: "context-build",
        description: "Build learner context from prior sessions",
        worker_hint: Some("context-build"),
        priority: 6,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 2,
    },
    TemplateStep {
        id: "materials-generate",
        description: "Generate study materials from the fetched content",
        worker_hint: Some("materials-generate"),
        priority: 9,
        depends_on: &["content-fetch", "context-build"],
        parallelizable: false,
        est_seconds: 8,
    },
];

const QUALITY_ASSESSMENT: &[TemplateStep] = &[TemplateStep {
    id: "quality-assess",
    description: "Assess the quality of the given content",
    worker_hint: Some("quality-assess"),
    priority: 8,
    depends_on: &[],
    parallelizable: false,
    est_seconds: 4,
}];

const DOCUMENTATION: &[TemplateStep] = &[
    TemplateStep {
        id: "code-group",
        description: "Map the module structure to document",
        worker_hint: Some("code-group"),
        priority: 7,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 8,
    },
    TemplateStep {
        id: "doc-generate",
        description: "Generate documentation from the structure map",
        worker_hint: Some("doc-generate"),
        priority: 9,
        depends_on: &["code-group"],
        parallelizable: false,
        est_seconds: 8,
    },
];

const DUPLICATE_DETECTION: &[TemplateStep] = &[TemplateStep {
    id: "duplicate-detect",
    description: "Detect duplicated code across the project",
    worker_hint: Some("duplicate-detect"),
    priority: 8,
    depends_on: &[],
    parallelizable: false,
    est_seconds: 5,
}];

const DEAD_CODE_ANALYSIS: &[TemplateStep] = &[TemplateStep {
    id: "dead-code",
    description: "Find unused and unreachable code",
    worker_hint: Some("dead-code"),
    priority: 8,
    depends_on: &[],
    parallelizable: false,
    est_seconds: 5,
}];

const CODE_ORGANIZATION: &[TemplateStep] = &[TemplateStep {
    id: "code-group",
    description: "Group related code and map the module structure",
    worker_hint: Some("code-group"),
    priority: 8,
    depends_on: &[],
    parallelizable: false,
    est_seconds: 8,
}];

const CONTENT_EXTRACTION: &[TemplateStep] = &[TemplateStep {
    id: "content-fetch",
    description: "Extract the requested content",
    worker_hint: Some("content-fetch"),
    priority: 8,
    depends_on: &[],
    parallelizable: false,
    est_seconds: 4,
}];

const QUIZ_GENERATION: &[TemplateStep] = &[
    TemplateStep {
        id: "content-fetch",
        description: "Fetch the source material for the quiz",
        worker_hint: Some("content-fetch"),
        priority: 8,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 4,
    },
    TemplateStep {
        id: "context-build",
        description: "Build learner context from prior sessions",
        worker_hint: Some("context-build"),
        priority: 6,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 2,
    },
    TemplateStep {
        id: "quality-assess",
        description: "Assess the quality of the source material",
        worker_hint: Some("quality-assess"),
        priority: 7,
        depends_on: &[],
        parallelizable: true,
        est_seconds: 4,
    },
    TemplateStep {
        id: "quiz-generate",
        description: "Generate quiz questions from the vetted material",
        worker_hint: Some("quiz-generate"),
        priority: 9,
        depends_on: &["content-fetch", "context-build", "quality-assess"],
        parallelizable: false,
        est_seconds: 8,
    },
];

/// Template for a pattern. `Unknown` has no template; the decomposer builds
/// its single pass-through subtask directly from the request text.
pub fn steps_for(pattern: Pattern) -> &'static [TemplateStep] {
    match pattern {
        Pattern::CodebaseAnalysis | Pattern::Refactoring | Pattern::CodeCleanup => {
            CODEBASE_ANALYSIS
        }
        Pattern::ContentResearch => CONTENT_RESEARCH,
        Pattern::ProjectStatus => PROJECT_STATUS,
        Pattern::LearningMaterials => LEARNING_MATERIALS,
        Pattern::QualityAssessment => QUALITY_ASSESSMENT,
        Pattern::Documentation => DOCUMENTATION,
        Pattern::DuplicateDetection => DUPLICATE_DETECTION,
        Pattern::DeadCodeAnalysis => DEAD_CODE_ANALYSIS,
        Pattern::CodeOrganization => CODE_ORGANIZATION,
        Pattern::ContentExtraction => CONTENT_EXTRACTION,
        Pattern::QuizGeneration => QUIZ_GENERATION,
        Pattern::Unknown => &[],
    }
}

pub fn instantiate(pattern: Pattern) -> Vec<SubTask> {
    steps_for(pattern)
        .iter()
        .map(|step| SubTask {
            id: step.id.to_string(),
            description: step.description.to_string(),
            priority: step.priority,
            worker_hint: step.worker_hint.map(str::to_string),
            depends_on: step.depends_on.iter().map(|d| d.to_string()).collect(),
            parallelizable: step.parallelizable,
            est_seconds: step.est_seconds,
        })
        .collect()
}
