//! Folds worker outputs into a single report, per pattern.

pub mod strategies;

use crate::bridge::{WorkerOutput, CANCELLED_ERROR};
use crate::decomposer::Pattern;
use crate::report::{Report, ReportMetadata, Section, WorkerTally};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fold ordered outputs into a report. Pure: outputs are read, never
/// mutated, and identical inputs produce identical reports. The caller
/// (the coordinator) fills in timing metadata and any execution trace.
pub fn fold(pattern: Pattern, outputs: &[WorkerOutput]) -> Report {
    let (sections, recommendations) = match pattern {
        Pattern::CodebaseAnalysis | Pattern::Refactoring | Pattern::CodeCleanup => {
            strategies::codebase(outputs)
        }
        Pattern::ContentResearch => strategies::research(outputs),
        Pattern::QuizGeneration => strategies::quiz(outputs),
        Pattern::ProjectStatus => strategies::project_status(outputs),
        Pattern::Unknown => strategies::unknown(outputs),
        _ => strategies::generic(outputs),
    };

    let metadata = build_metadata(pattern, outputs);
    let summary = format!(
        "{}/{} subtasks successful",
        metadata.succeeded, metadata.total_subtasks
    );

    Report {
        title: report_title(pattern),
        summary,
        sections,
        recommendations,
        metadata,
        raw_outputs: outputs.to_vec(),
        execution_trace: None,
    }
}

fn report_title(pattern: Pattern) -> String {
    let name = match pattern {
        Pattern::CodebaseAnalysis => "Codebase Analysis",
        Pattern::ContentResearch => "Content Research",
        Pattern::ProjectStatus => "Project Status",
        Pattern::CodeCleanup => "Code Cleanup",
        Pattern::LearningMaterials => "Learning Materials",
        Pattern::QualityAssessment => "Quality Assessment",
        Pattern::Refactoring => "Refactoring",
        Pattern::Documentation => "Documentation",
        Pattern::DuplicateDetection => "Duplicate Detection",
        Pattern::DeadCodeAnalysis => "Dead Code Analysis",
        Pattern::CodeOrganization => "Code Organization",
        Pattern::ContentExtraction => "Content Extraction",
        Pattern::QuizGeneration => "Quiz Generation",
        Pattern::Unknown => "Request",
    };
    format!("{} Report", name)
}

fn build_metadata(pattern: Pattern, outputs: &[WorkerOutput]) -> ReportMetadata {
    let mut workers: BTreeMap<String, WorkerTally> = BTreeMap::new();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut cancelled = 0;

    for output in outputs {
        let tally = workers.entry(output.worker_name.clone()).or_default();
        if output.success {
            succeeded += 1;
            tally.success += 1;
        } else if output.error == CANCELLED_ERROR {
            cancelled += 1;
            tally.cancelled += 1;
        } else {
            failed += 1;
            tally.failed += 1;
        }
    }

    ReportMetadata {
        pattern: pattern.as_str().to_string(),
        total_subtasks: outputs.len(),
        succeeded,
        failed,
        cancelled,
        est_total_seconds: 0,
        duration_ms: 0,
        workers,
    }
}

/// Section title and icon for a subtask role.
pub(crate) fn section_heading(subtask_id: &str) -> (&'static str, &'static str) {
    match subtask_id {
        "duplicate-detect" => ("Duplicate Code", "🔁"),
        "dead-code" => ("Dead Code", "🧹"),
        "code-group" => ("Code Organization", "🗂️"),
        "refactor-plan" => ("Refactor Plan", "🛠️"),
        "search" => ("Search Results", "🔎"),
        "quality-assess" => ("Quality", "⭐"),
        "content-fetch" => ("Source", "📄"),
        "context-build" => ("Context", "🧭"),
        "quiz-generate" => ("Questions", "❓"),
        "doc-generate" => ("Documentation", "📚"),
        "materials-generate" => ("Study Materials", "📖"),
        _ => ("Result", "▪️"),
    }
}

/// A titled section for one output. Failed outputs get a `[FAILED]` marker
/// and their error text as the body.
pub(crate) fn section_for(output: &WorkerOutput, title: &str, icon: &str) -> Section {
    if output.success {
        let body = output
            .result
            .as_ref()
            .map(render_value)
            .unwrap_or_else(|| "(no result)".to_string());
        Section {
            title: title.to_string(),
            body,
            icon: icon.to_string(),
        }
    } else {
        Section {
            title: format!("{} [FAILED]", title),
            body: output.error.clone(),
            icon: icon.to_string(),
        }
    }
}

/// Ranked `{priority, action}` recommendations aggregated from successful
/// outputs only; highest priority first, input order on ties, capped.
pub(crate) fn ranked_recommendations(outputs: &[&WorkerOutput], cap: usize) -> Vec<String> {
    let mut items: Vec<(i64, String)> = Vec::new();
    for output in outputs {
        if !output.success {
            continue;
        }
        let Some(recs) = output
            .result
            .as_ref()
            .and_then(|r| r.get("recommendations"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for rec in recs {
            if let Some(action) = rec.get("action").and_then(Value::as_str) {
                let priority = rec.get("priority").and_then(Value::as_i64).unwrap_or(0);
                items.push((priority, action.to_string()));
            }
        }
    }

    items.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));
    items.truncate(cap);
    items.into_iter().map(|(_, action)| action).collect()
}

/// String entries under `key` in a successful output's result.
pub(crate) fn string_list(output: &WorkerOutput, key: &str) -> Vec<String> {
    if !output.success {
        return Vec::new();
    }
    output
        .result
        .as_ref()
        .and_then(|r| r.get(key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic plain-text rendering of a structured result. Object keys
/// come out sorted (serde_json maps are ordered), arrays keep their order.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, val)| match val {
                Value::Object(_) | Value::Array(_) => {
                    format!("{}:\n{}", key, indent(&render_value(val)))
                }
                _ => format!("{}: {}", key, scalar(val)),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => items
            .iter()
            .map(|item| format!("- {}", inline(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => scalar(other),
    }
}

fn inline(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, val)| format!("{}={}", key, inline(val)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => items.iter().map(inline).collect::<Vec<_>>().join(", "),
        other => scalar(other),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
