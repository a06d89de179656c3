//! Worker registry: maps worker names to how they are invoked.

use crate::config::{ForemanConfig, InputStyle, WorkerSpec};
use crate::error::{ForemanError, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Always-registered fallback that echoes its input payload back.
pub const ECHO_WORKER: &str = "echo";

/// Worker names the orchestrator knows out of the box. Any of these not
/// present in the config registry is registered as simulated, so a bare
/// install still orchestrates end-to-end.
pub const BUILTIN_WORKERS: [&str; 12] = [
    "duplicate-detect",
    "dead-code",
    "code-group",
    "refactor-plan",
    "omnisearch",
    "mock-search",
    "quality-assess",
    "content-fetch",
    "context-build",
    "quiz-generate",
    "doc-generate",
    "materials-generate",
];

/// A registry entry resolved for invocation.
#[derive(Debug, Clone)]
pub enum ResolvedWorker {
    Real {
        argv: Vec<String>,
        input: InputStyle,
        timeout: Option<Duration>,
    },
    Simulated,
    Echo,
}

#[derive(Debug, Default)]
pub struct WorkerRegistry {
    entries: HashMap<String, WorkerSpec>,
}

impl WorkerRegistry {
    /// Build from the config's worker table, filling in simulated entries
    /// for any builtin worker the config does not mention.
    pub fn from_config(config: &ForemanConfig) -> Self {
        let mut entries = config.workers.clone();
        for name in BUILTIN_WORKERS {
            entries.entry(name.to_string()).or_insert(WorkerSpec {
                command: None,
                input: InputStyle::Stdin,
                simulated: true,
                timeout_secs: None,
            });
        }
        Self { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        name == ECHO_WORKER || self.entries.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Result<ResolvedWorker> {
        if name == ECHO_WORKER {
            return Ok(ResolvedWorker::Echo);
        }

        let spec = self
            .entries
            .get(name)
            .ok_or_else(|| ForemanError::Configuration(format!("unregistered worker: {}", name)))?;

        if spec.simulated {
            return Ok(ResolvedWorker::Simulated);
        }

        let command = spec.command.as_deref().ok_or_else(|| {
            ForemanError::Configuration(format!("worker {} has no command and is not simulated", name))
        })?;

        let argv = shell_words::split(command).map_err(|e| {
            ForemanError::Configuration(format!("worker {} has an unparsable command: {}", name, e))
        })?;
        if argv.is_empty() {
            return Err(ForemanError::Configuration(format!(
                "worker {} has an empty command",
                name
            )));
        }

        Ok(ResolvedWorker::Real {
            argv,
            input: spec.input,
            timeout: spec.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Registered names, sorted, echo included.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.push(ECHO_WORKER.to_string());
        names.sort();
        names
    }

    pub fn spec(&self, name: &str) -> Option<&WorkerSpec> {
        self.entries.get(name)
    }
}
