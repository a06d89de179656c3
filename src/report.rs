//! The public result type of an execution and its renderers.
//!
//! A `Report` carries pure data; rendering to text, Markdown, JSON, or HTML
//! is a separate, deterministic step chosen by the caller.

use crate::bridge::WorkerOutput;
use crate::trace::TraceEntry;
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub title: String,
    pub body: String,
    pub icon: String,
}

/// Per-worker terminal-status tally, mirrored by the execution trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerTally {
    pub success: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub pattern: String,
    pub total_subtasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub est_total_seconds: u64,
    pub duration_ms: u64,
    pub workers: BTreeMap<String, WorkerTally>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub sections: Vec<Section>,
    pub recommendations: Vec<String>,
    pub metadata: ReportMetadata,
    pub raw_outputs: Vec<WorkerOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_trace: Option<Vec<TraceEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Markdown,
    Json,
    Html,
}

impl Report {
    /// True when every planned subtask ran and succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.metadata.succeeded == self.metadata.total_subtasks
    }

    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Text => self.render_text(),
            ReportFormat::Markdown => self.render_markdown(),
            ReportFormat::Json => self.render_json(),
            ReportFormat::Html => self.render_html(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n{}\n\n", self.title, "=".repeat(self.title.len())));
        out.push_str(&format!("{}\n", self.summary));

        for section in &self.sections {
            out.push_str(&format!("\n{} {}\n", section.icon, section.title));
            out.push_str(&format!("{}\n", "-".repeat(section.title.len() + 2)));
            out.push_str(&section.body);
            if !section.body.ends_with('\n') {
                out.push('\n');
            }
        }

        if !self.recommendations.is_empty() {
            out.push_str("\nRecommendations\n---------------\n");
            for (i, rec) in self.recommendations.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, rec));
            }
        }

        out.push_str(&format!(
            "\n({} pattern, estimated {}s, ran {}ms)\n",
            self.metadata.pattern, self.metadata.est_total_seconds, self.metadata.duration_ms
        ));
        out
    }

    fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n{}\n", self.title, self.summary));

        for section in &self.sections {
            out.push_str(&format!("\n## {} {}\n\n", section.icon, section.title));
            out.push_str(&section.body);
            if !section.body.ends_with('\n') {
                out.push('\n');
            }
        }

        if !self.recommendations.is_empty() {
            out.push_str("\n## Recommendations\n\n");
            for rec in &self.recommendations {
                out.push_str(&format!("- {}\n", rec));
            }
        }
        out
    }

    // Struct field order plus BTreeMap keys keep this stable across runs.
    fn render_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn render_html(&self) -> String {
        let mut out = String::new();
        out.push_str("<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"></head>\n<body>\n");
        out.push_str(&format!("<h1>{}</h1>\n", escape_html(&self.title)));
        out.push_str(&format!("<p>{}</p>\n", escape_html(&self.summary)));

        for section in &self.sections {
            out.push_str(&format!(
                "<h2>{} {}</h2>\n<pre>{}</pre>\n",
                escape_html(&section.icon),
                escape_html(&section.title),
                escape_html(&section.body)
            ));
        }

        if !self.recommendations.is_empty() {
            out.push_str("<h2>Recommendations</h2>\n<ol>\n");
            for rec in &self.recommendations {
                out.push_str(&format!("<li>{}</li>\n", escape_html(rec)));
            }
            out.push_str("</ol>\n");
        }

        out.push_str("</body>\n</html>\n");
        out
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> Report {
        Report {
            title: "Codebase Analysis".to_string(),
            summary: "2/2 subtasks successful".to_string(),
            sections: vec![
                Section {
                    title: "Duplicate Code".to_string(),
                    body: "- 2 findings\n".to_string(),
                    icon: "*".to_string(),
                },
                Section {
                    title: "Dead Code".to_string(),
                    body: "- none\n".to_string(),
                    icon: "*".to_string(),
                },
            ],
            recommendations: vec!["Extract shared helpers".to_string()],
            metadata: ReportMetadata {
                pattern: "codebase-analysis".to_string(),
                total_subtasks: 2,
                succeeded: 2,
                failed: 0,
                cancelled: 0,
                est_total_seconds: 10,
                duration_ms: 42,
                workers: BTreeMap::new(),
            },
            raw_outputs: Vec::new(),
            execution_trace: None,
        }
    }

    #[test]
    fn text_render_keeps_section_order() {
        let text = sample_report().render(ReportFormat::Text);
        let dup = text.find("Duplicate Code").unwrap();
        let dead = text.find("Dead Code").unwrap();
        assert!(dup < dead);
        assert!(text.contains("2/2 subtasks successful"));
        assert!(text.contains("1. Extract shared helpers"));
    }

    #[test]
    fn markdown_render_uses_headings() {
        let md = sample_report().render(ReportFormat::Markdown);
        assert!(md.starts_with("# Codebase Analysis"));
        assert!(md.contains("## * Duplicate Code"));
        assert!(md.contains("- Extract shared helpers"));
    }

    #[test]
    fn json_render_is_deterministic() {
        let report = sample_report();
        assert_eq!(report.render(ReportFormat::Json), report.render(ReportFormat::Json));
        let value: serde_json::Value = serde_json::from_str(&report.render(ReportFormat::Json)).unwrap();
        assert_eq!(value["metadata"]["pattern"], "codebase-analysis");
        assert_eq!(value["sections"][0]["title"], "Duplicate Code");
    }

    #[test]
    fn html_render_escapes_content() {
        let mut report = sample_report();
        report.summary = "1/2 <failed>".to_string();
        let html = report.render(ReportFormat::Html);
        assert!(html.contains("&lt;failed&gt;"));
        assert!(!html.contains("<failed>"));
    }
}
