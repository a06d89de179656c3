//! Per-pattern folding strategies. Each takes the plan-ordered outputs and
//! returns sections plus recommendations; the dispatch lives in `fold`.

use crate::bridge::WorkerOutput;
use crate::report::Section;
use crate::synthesizer::{
    ranked_recommendations, render_value, section_for, section_heading, string_list,
};
use serde_json::Value;

const MAX_RECOMMENDATIONS: usize = 10;

/// Codebase analysis family: one section per analysis worker plus the
/// refactor plan, recommendations ranked across the successful ones.
pub fn codebase(outputs: &[WorkerOutput]) -> (Vec<Section>, Vec<String>) {
    let sections = outputs
        .iter()
        .map(|output| {
            let (title, icon) = section_heading(&output.subtask_id);
            section_for(output, title, icon)
        })
        .collect();

    let refs: Vec<&WorkerOutput> = outputs.iter().collect();
    (sections, ranked_recommendations(&refs, MAX_RECOMMENDATIONS))
}

/// Content research: search hits first, then the quality-scored ranking.
pub fn research(outputs: &[WorkerOutput]) -> (Vec<Section>, Vec<String>) {
    let mut sections = Vec::new();

    for output in outputs {
        match output.subtask_id.as_str() {
            "search" => sections.push(search_section(output)),
            "quality-assess" => sections.push(ranking_section(output)),
            _ => {
                let (title, icon) = section_heading(&output.subtask_id);
                sections.push(section_for(output, title, icon));
            }
        }
    }

    (sections, Vec::new())
}

fn search_section(output: &WorkerOutput) -> Section {
    let (title, icon) = section_heading("search");
    if !output.success {
        return section_for(output, title, icon);
    }

    let hits = output
        .result
        .as_ref()
        .and_then(|r| r.get("hits"))
        .and_then(Value::as_array);

    let body = match hits {
        Some(hits) if !hits.is_empty() => hits
            .iter()
            .map(|hit| {
                let heading = hit.get("title").and_then(Value::as_str).unwrap_or("(untitled)");
                let url = hit.get("url").and_then(Value::as_str).unwrap_or("");
                let snippet = hit.get("snippet").and_then(Value::as_str).unwrap_or("");
                format!("- {} — {}\n  {}", heading, url, snippet)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => output
            .result
            .as_ref()
            .map(render_value)
            .unwrap_or_else(|| "(no result)".to_string()),
    };

    Section {
        title: title.to_string(),
        body,
        icon: icon.to_string(),
    }
}

fn ranking_section(output: &WorkerOutput) -> Section {
    let icon = section_heading("quality-assess").1;
    if !output.success {
        return section_for(output, "Quality Ranking", icon);
    }

    let scores = output
        .result
        .as_ref()
        .and_then(|r| r.get("scores"))
        .and_then(Value::as_array);

    let body = match scores {
        Some(scores) if !scores.is_empty() => {
            let mut ranked: Vec<(&str, f64)> = scores
                .iter()
                .filter_map(|entry| {
                    let item = entry.get("item").and_then(Value::as_str)?;
                    let score = entry.get("score").and_then(Value::as_f64)?;
                    Some((item, score))
                })
                .collect();
            // Stable sort keeps the worker's order for equal scores.
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            ranked
                .iter()
                .enumerate()
                .map(|(i, (item, score))| format!("{}. {} ({:.2})", i + 1, item, score))
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => output
            .result
            .as_ref()
            .map(render_value)
            .unwrap_or_else(|| "(no result)".to_string()),
    };

    Section {
        title: "Quality Ranking".to_string(),
        body,
        icon: icon.to_string(),
    }
}

/// Quiz generation: Source / Context / Quality sections plus the question
/// list rendered verbatim in id order; recommendations are the quiz
/// worker's post-edit suggestions.
pub fn quiz(outputs: &[WorkerOutput]) -> (Vec<Section>, Vec<String>) {
    let mut sections = Vec::new();
    let mut recommendations = Vec::new();

    for output in outputs {
        if output.subtask_id == "quiz-generate" {
            sections.push(questions_section(output));
            recommendations = string_list(output, "suggestions");
        } else {
            let (title, icon) = section_heading(&output.subtask_id);
            sections.push(section_for(output, title, icon));
        }
    }

    (sections, recommendations)
}

fn questions_section(output: &WorkerOutput) -> Section {
    let (title, icon) = section_heading("quiz-generate");
    if !output.success {
        return section_for(output, title, icon);
    }

    let questions = output
        .result
        .as_ref()
        .and_then(|r| r.get("questions"))
        .and_then(Value::as_array);

    let body = match questions {
        Some(questions) if !questions.is_empty() => {
            let mut ordered: Vec<&Value> = questions.iter().collect();
            ordered.sort_by_key(|q| q.get("id").and_then(Value::as_i64).unwrap_or(i64::MAX));
            ordered
                .iter()
                .map(|q| {
                    let id = q.get("id").and_then(Value::as_i64).unwrap_or(0);
                    let prompt = q.get("prompt").and_then(Value::as_str).unwrap_or("");
                    let answer = q.get("answer").and_then(Value::as_str).unwrap_or("");
                    format!("{}. {}\n   Answer: {}", id, prompt, answer)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => output
            .result
            .as_ref()
            .map(render_value)
            .unwrap_or_else(|| "(no result)".to_string()),
    };

    Section {
        title: title.to_string(),
        body,
        icon: icon.to_string(),
    }
}

/// Project status: one context section; recommendations are the context
/// worker's suggested next actions.
pub fn project_status(outputs: &[WorkerOutput]) -> (Vec<Section>, Vec<String>) {
    let mut sections = Vec::new();
    let mut recommendations = Vec::new();

    for output in outputs {
        let (title, icon) = section_heading(&output.subtask_id);
        if output.success {
            let body = output
                .result
                .as_ref()
                .and_then(|r| r.get("summary"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    output
                        .result
                        .as_ref()
                        .map(render_value)
                        .unwrap_or_else(|| "(no result)".to_string())
                });
            sections.push(Section {
                title: title.to_string(),
                body,
                icon: icon.to_string(),
            });
            recommendations.extend(string_list(output, "suggestions"));
        } else {
            sections.push(section_for(output, title, icon));
        }
    }

    (sections, recommendations)
}

/// Unknown pattern: the raw result of the single pass-through subtask.
pub fn unknown(outputs: &[WorkerOutput]) -> (Vec<Section>, Vec<String>) {
    let sections = outputs
        .iter()
        .map(|output| section_for(output, "Result", "▪️"))
        .collect();
    (sections, Vec::new())
}

/// Default fold: one titled section per output, recommendations gathered
/// from whatever the successful workers emitted.
pub fn generic(outputs: &[WorkerOutput]) -> (Vec<Section>, Vec<String>) {
    let sections = outputs
        .iter()
        .map(|output| {
            let (title, icon) = section_heading(&output.subtask_id);
            section_for(output, title, icon)
        })
        .collect();

    let refs: Vec<&WorkerOutput> = outputs.iter().collect();
    (sections, ranked_recommendations(&refs, MAX_RECOMMENDATIONS))
}
