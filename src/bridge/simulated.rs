//! Canned payloads for simulated workers.
//!
//! Development installs have no worker binaries; simulated entries return a
//! deterministic `{simulated: true, ...}` result shaped like the real
//! worker's output so downstream synthesis stays exercisable.

use crate::decomposer::SubTask;
use serde_json::{json, Value};

pub fn canned_result(worker_name: &str, subtask: &SubTask) -> Value {
    match worker_name {
        "duplicate-detect" => json!({
            "simulated": true,
            "findings": [
                {"files": ["src/utils.py", "src/helpers.py"], "lines": 42, "similarity": 0.93},
                {"files": ["app/views.py", "app/admin.py"], "lines": 17, "similarity": 0.88},
            ],
            "recommendations": [
                {"priority": 8, "action": "Extract a shared helper from src/utils.py and src/helpers.py"},
            ],
        }),
        "dead-code" => json!({
            "simulated": true,
            "unused": [
                {"symbol": "legacy_import", "file": "src/io.py", "line": 210},
                {"symbol": "old_formatter", "file": "src/render.py", "line": 88},
            ],
            "recommendations": [
                {"priority": 6, "action": "Delete legacy_import in src/io.py"},
            ],
        }),
        "code-group" => json!({
            "simulated": true,
            "groups": [
                {"name": "storage", "files": ["db.py", "cache.py"]},
                {"name": "api", "files": ["routes.py", "handlers.py"]},
            ],
            "recommendations": [
                {"priority": 5, "action": "Move cache.py next to db.py"},
            ],
        }),
        "refactor-plan" => json!({
            "simulated": true,
            "plan": [
                {"step": 1, "action": "Extract shared helpers", "priority": 9},
                {"step": 2, "action": "Delete dead code", "priority": 7},
                {"step": 3, "action": "Regroup storage modules", "priority": 5},
            ],
            "recommendations": [
                {"priority": 9, "action": "Extract shared helpers first"},
                {"priority": 7, "action": "Remove dead code before regrouping"},
            ],
        }),
        "omnisearch" | "mock-search" => json!({
            "simulated": true,
            "hits": [
                {"title": "Primary source", "url": "https://example.com/1", "snippet": "Closest match for the query."},
                {"title": "Secondary source", "url": "https://example.com/2", "snippet": "Supporting material."},
                {"title": "Background reading", "url": "https://example.com/3", "snippet": "Context and history."},
            ],
        }),
        "quality-assess" => json!({
            "simulated": true,
            "scores": [
                {"item": "Primary source", "score": 0.92},
                {"item": "Secondary source", "score": 0.74},
                {"item": "Background reading", "score": 0.61},
            ],
            "overall": 0.76,
        }),
        "content-fetch" => json!({
            "simulated": true,
            "content": format!("Simulated source content for: {}", subtask.description),
            "format": "text",
        }),
        "context-build" => json!({
            "simulated": true,
            "summary": "Recent activity: two analysis sessions and one open draft.",
            "suggestions": [
                "Resume the open draft",
                "Review yesterday's analysis notes",
            ],
        }),
        "quiz-generate" => json!({
            "simulated": true,
            "questions": [
                {"id": 1, "prompt": "What does the process produce?", "answer": "Glucose and oxygen"},
                {"id": 2, "prompt": "Where does it take place?", "answer": "In the chloroplasts"},
                {"id": 3, "prompt": "What light-absorbing pigment is involved?", "answer": "Chlorophyll"},
            ],
            "suggestions": [
                "Add a harder bonus question",
                "Pair each question with a diagram",
            ],
        }),
        "doc-generate" => json!({
            "simulated": true,
            "documents": [
                {"title": "Overview", "body": "High-level description of the module layout."},
                {"title": "Storage", "body": "Persistence responsibilities and entry points."},
            ],
        }),
        "materials-generate" => json!({
            "simulated": true,
            "materials": [
                {"kind": "flashcards", "count": 10},
                {"kind": "summary-sheet", "count": 1},
            ],
        }),
        _ => json!({
            "simulated": true,
            "task": subtask.description,
        }),
    }
}
