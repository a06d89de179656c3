//! Drives one request end to end: decompose, execute wave by wave, record
//! feedback and trace entries in completion order, synthesize the report.

use crate::bridge::{PriorResults, WorkerExecutor, WorkerOutput, CANCELLED_ERROR};
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::decomposer::{Decomposer, Request};
use crate::error::{ForemanError, Result};
use crate::feedback::FeedbackStore;
use crate::report::Report;
use crate::router::Router;
use crate::synthesizer;
use crate::trace::Tracer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Per-subtask progress lines.
    pub verbose: bool,
    /// Suppress all narrative output.
    pub quiet: bool,
    /// Attach the execution trace to the report.
    pub trace: bool,
    /// Per-subtask deadline.
    pub timeout: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            quiet: false,
            trace: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Executes one request at a time. Concurrent requests belong to separate
/// coordinators sharing only the feedback store.
pub struct Coordinator {
    decomposer: Decomposer,
    router: Router,
    executor: Arc<dyn WorkerExecutor>,
    feedback: Arc<FeedbackStore>,
    usd_per_million_tokens: f64,
}

impl Coordinator {
    pub fn new(
        router: Router,
        executor: Arc<dyn WorkerExecutor>,
        feedback: Arc<FeedbackStore>,
        usd_per_million_tokens: f64,
    ) -> Self {
        Self {
            decomposer: Decomposer::new(),
            router,
            executor,
            feedback,
            usd_per_million_tokens,
        }
    }

    /// Execute without external cancellation.
    pub async fn execute(&self, request: &Request, opts: &ExecOptions) -> Result<Report> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.execute_with_cancel(request, opts, cancel_rx).await
    }

    /// Execute, stopping early when `cancel` flips to true: in-flight
    /// subtasks are terminated, later waves are never scheduled, and the
    /// partial report's summary documents the cancellation. A report is
    /// always produced; only invariant violations return `Err`.
    pub async fn execute_with_cancel(
        &self,
        request: &Request,
        opts: &ExecOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<Report> {
        let started = Instant::now();
        let plan = self.decomposer.decompose(request)?;

        if !opts.quiet {
            println!(
                "[PLAN] pattern={} subtasks={} waves={} est={}s",
                plan.pattern,
                plan.subtasks.len(),
                plan.waves.len(),
                plan.est_total_seconds
            );
        }
        info!(pattern = %plan.pattern, subtasks = plan.subtasks.len(), waves = plan.waves.len(), "plan ready");

        let mut tracer = Tracer::new(self.usd_per_million_tokens);
        let mut outputs: HashMap<String, WorkerOutput> = HashMap::new();
        let mut prior: PriorResults = PriorResults::new();
        let mut waves_completed = 0usize;
        let mut cancelled = false;

        for (wave_idx, wave) in plan.waves.iter().enumerate() {
            if *cancel.borrow() {
                cancelled = true;
                break;
            }
            let wave_num = wave_idx + 1;

            let (tx, mut done) = mpsc::channel::<WorkerOutput>(wave.len().max(1));
            for subtask_id in wave {
                let subtask = plan
                    .subtask(subtask_id)
                    .ok_or_else(|| {
                        ForemanError::Internal(format!("wave references unknown subtask {}", subtask_id))
                    })?
                    .clone();
                let worker_name = self.router.choose(&subtask, plan.pattern);

                if opts.verbose && !opts.quiet {
                    println!("[WAVE {}] {} -> {}", wave_num, subtask.id, worker_name);
                }

                let executor = Arc::clone(&self.executor);
                let prior_snapshot = prior.clone();
                let cancel_rx = cancel.clone();
                let timeout = opts.timeout;
                let tx = tx.clone();
                tokio::spawn(async move {
                    let output = executor
                        .invoke(&worker_name, &subtask, &prior_snapshot, timeout, cancel_rx)
                        .await;
                    let _ = tx.send(output).await;
                });
            }
            drop(tx);

            // Barrier: the channel closes once every subtask in the wave
            // has reported, in completion order.
            while let Some(output) = done.recv().await {
                if opts.verbose && !opts.quiet {
                    if output.success {
                        println!("[WAVE {}] ✓ {} ({})", wave_num, output.subtask_id, output.worker_name);
                    } else {
                        println!(
                            "[WAVE {}] ✗ {} ({}): {}",
                            wave_num, output.subtask_id, output.worker_name, output.error
                        );
                    }
                }

                // Cancelled invocations say nothing about worker quality.
                if output.error != CANCELLED_ERROR {
                    self.feedback.record(
                        &output.worker_name,
                        if output.success { 1.0 } else { 0.0 },
                        plan.pattern.as_str(),
                        &output.subtask_id,
                    );
                }

                tracer.record(wave_num, &output);
                prior.insert(output.subtask_id.clone(), output.prior_entry());
                outputs.insert(output.subtask_id.clone(), output);
            }

            waves_completed = wave_num;
            if *cancel.borrow() {
                cancelled = true;
                break;
            }
        }

        let ordered: Vec<WorkerOutput> = plan
            .subtasks
            .iter()
            .filter_map(|s| outputs.get(&s.id).cloned())
            .collect();

        let mut report = synthesizer::fold(plan.pattern, &ordered);
        report.metadata.est_total_seconds = plan.est_total_seconds;
        report.metadata.duration_ms = started.elapsed().as_millis() as u64;

        if cancelled {
            let not_attempted = plan.subtasks.len() - ordered.len();
            report.summary = format!(
                "{}/{} subtasks successful; cancelled after wave {} ({} not attempted)",
                report.metadata.succeeded,
                plan.subtasks.len(),
                waves_completed,
                not_attempted
            );
            report.metadata.total_subtasks = plan.subtasks.len();
        }

        if opts.trace {
            report.execution_trace = Some(tracer.into_entries());
        }

        if !opts.quiet {
            println!("[DONE] {}", report.summary);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::registry::WorkerRegistry;
    use crate::config::ForemanConfig;
    use crate::trace::TraceStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Test double for the worker seam: succeeds by default, fails chosen
    /// subtasks, optionally fires a cancellation when a subtask runs, and
    /// remembers which prior results each subtask saw.
    struct StubExecutor {
        fail: HashSet<String>,
        fail_error: String,
        cancel_on: Option<(String, watch::Sender<bool>)>,
        seen_prior: Mutex<HashMap<String, Vec<String>>>,
    }

    impl StubExecutor {
        fn ok() -> Self {
            Self {
                fail: HashSet::new(),
                fail_error: String::new(),
                cancel_on: None,
                seen_prior: Mutex::new(HashMap::new()),
            }
        }

        fn failing(ids: &[&str], error: &str) -> Self {
            Self {
                fail: ids.iter().map(|s| s.to_string()).collect(),
                fail_error: error.to_string(),
                cancel_on: None,
                seen_prior: Mutex::new(HashMap::new()),
            }
        }

        fn cancelling_on(id: &str, tx: watch::Sender<bool>) -> Self {
            Self {
                fail: HashSet::new(),
                fail_error: String::new(),
                cancel_on: Some((id.to_string(), tx)),
                seen_prior: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl WorkerExecutor for StubExecutor {
        async fn invoke(
            &self,
            worker_name: &str,
            subtask: &crate::decomposer::SubTask,
            prior_results: &PriorResults,
            _timeout: Duration,
            _cancel: watch::Receiver<bool>,
        ) -> WorkerOutput {
            {
                let mut seen = self.seen_prior.lock().unwrap();
                let mut keys: Vec<String> = prior_results.keys().cloned().collect();
                keys.sort();
                seen.insert(subtask.id.clone(), keys);
            }

            if let Some((id, tx)) = &self.cancel_on {
                if &subtask.id == id {
                    let _ = tx.send(true);
                }
            }

            let now = Utc::now();
            if self.fail.contains(&subtask.id) {
                WorkerOutput {
                    worker_name: worker_name.to_string(),
                    subtask_id: subtask.id.clone(),
                    success: false,
                    result: None,
                    error: self.fail_error.clone(),
                    started_at: now,
                    ended_at: now,
                    tokens: None,
                    cost: None,
                }
            } else {
                WorkerOutput {
                    worker_name: worker_name.to_string(),
                    subtask_id: subtask.id.clone(),
                    success: true,
                    result: Some(json!({"stub": true})),
                    error: String::new(),
                    started_at: now,
                    ended_at: now,
                    tokens: Some(100),
                    cost: None,
                }
            }
        }
    }

    fn coordinator_with(executor: Arc<StubExecutor>) -> (Coordinator, Arc<FeedbackStore>) {
        let registry = Arc::new(WorkerRegistry::from_config(&ForemanConfig::default()));
        let feedback = Arc::new(FeedbackStore::in_memory(0.2));
        let router = Router::new(registry, Arc::clone(&feedback), 5);
        (
            Coordinator::new(router, executor, Arc::clone(&feedback), 9.0),
            feedback,
        )
    }

    fn quiet_opts() -> ExecOptions {
        ExecOptions {
            quiet: true,
            trace: true,
            ..ExecOptions::default()
        }
    }

    #[tokio::test]
    async fn audit_runs_both_waves_and_chains_results() {
        let stub = Arc::new(StubExecutor::ok());
        let (coordinator, _feedback) = coordinator_with(Arc::clone(&stub));

        let report = coordinator
            .execute(&Request::new("Audit the codebase"), &quiet_opts())
            .await
            .unwrap();

        assert_eq!(report.summary, "4/4 subtasks successful");
        assert!(report.all_succeeded());
        let titles: Vec<&str> = report.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Duplicate Code", "Dead Code", "Code Organization", "Refactor Plan"]
        );

        // The wave-2 subtask saw every wave-1 output.
        let seen = stub.seen_prior.lock().unwrap();
        assert_eq!(
            seen["refactor-plan"],
            vec!["code-group".to_string(), "dead-code".to_string(), "duplicate-detect".to_string()]
        );
        assert!(seen["duplicate-detect"].is_empty());

        let trace = report.execution_trace.as_ref().unwrap();
        assert_eq!(trace.len(), 4);
        assert!(trace.iter().all(|e| e.status == TraceStatus::Success));
        assert!(trace.iter().all(|e| e.ended_at >= e.started_at));
        assert_eq!(trace.iter().filter(|e| e.wave_num == 1).count(), 3);
    }

    #[tokio::test]
    async fn failed_subtask_does_not_abort_the_plan() {
        let stub = Arc::new(StubExecutor::failing(&["duplicate-detect"], "timeout"));
        let (coordinator, feedback) = coordinator_with(Arc::clone(&stub));

        let report = coordinator
            .execute(&Request::new("Audit the codebase"), &quiet_opts())
            .await
            .unwrap();

        assert_eq!(report.summary, "3/4 subtasks successful");
        assert!(!report.all_succeeded());
        assert!(report
            .sections
            .iter()
            .any(|s| s.title == "Duplicate Code [FAILED]" && s.body == "timeout"));

        // The failure still reached wave 2 through prior results.
        let seen = stub.seen_prior.lock().unwrap();
        assert!(seen["refactor-plan"].contains(&"duplicate-detect".to_string()));

        // One outcome=0.0 recorded for the failing worker.
        let rate = feedback.rate("duplicate-detect").unwrap();
        assert_eq!(rate.samples, 1);
        assert!(rate.rate < 0.5);
    }

    #[tokio::test]
    async fn single_failure_records_failure_outcome() {
        let stub = Arc::new(StubExecutor::failing(&["duplicate-detect"], "timeout"));
        let (coordinator, feedback) = coordinator_with(stub);

        let report = coordinator
            .execute(&Request::new("Find duplicate code"), &quiet_opts())
            .await
            .unwrap();

        assert_eq!(report.summary, "0/1 subtasks successful");
        assert!(report
            .sections
            .iter()
            .any(|s| s.title == "Duplicate Code [FAILED]" && s.body == "timeout"));
        assert_eq!(feedback.rate("duplicate-detect").unwrap().samples, 1);
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_waves() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let stub = Arc::new(StubExecutor::cancelling_on("duplicate-detect", cancel_tx));
        let (coordinator, feedback) = coordinator_with(stub);

        let report = coordinator
            .execute_with_cancel(&Request::new("Audit the codebase"), &quiet_opts(), cancel_rx)
            .await
            .unwrap();

        assert!(report.summary.contains("cancelled"));
        assert_eq!(report.metadata.total_subtasks, 4);

        // Only wave 1 ran, so only wave-1 entries and outcomes exist.
        let trace = report.execution_trace.as_ref().unwrap();
        assert_eq!(trace.len(), 3);
        assert!(trace.iter().all(|e| e.wave_num == 1));
        assert!(feedback.rate("refactor-plan").is_none());
    }

    #[tokio::test]
    async fn all_failures_still_produce_a_report() {
        let stub = Arc::new(StubExecutor::failing(
            &["duplicate-detect", "dead-code", "code-group", "refactor-plan"],
            "spawn-failed: missing binary",
        ));
        let (coordinator, _feedback) = coordinator_with(stub);

        let report = coordinator
            .execute(&Request::new("Audit the codebase"), &quiet_opts())
            .await
            .unwrap();

        assert_eq!(report.summary, "0/4 subtasks successful");
        assert_eq!(report.sections.len(), 4);
        assert!(report.sections.iter().all(|s| s.title.ends_with("[FAILED]")));
    }

    #[tokio::test]
    async fn trace_counts_match_worker_tallies() {
        let stub = Arc::new(StubExecutor::failing(&["dead-code"], "boom"));
        let (coordinator, _feedback) = coordinator_with(stub);

        let report = coordinator
            .execute(&Request::new("Audit the codebase"), &quiet_opts())
            .await
            .unwrap();

        let trace = report.execution_trace.as_ref().unwrap();
        for (worker, tally) in &report.metadata.workers {
            let successes = trace
                .iter()
                .filter(|e| &e.worker_name == worker && e.status == TraceStatus::Success)
                .count() as u64;
            let failures = trace
                .iter()
                .filter(|e| &e.worker_name == worker && e.status == TraceStatus::Failed)
                .count() as u64;
            assert_eq!(tally.success, successes);
            assert_eq!(tally.failed, failures);
        }
    }

    #[tokio::test]
    async fn zero_timeout_fails_every_subtask() {
        let registry = Arc::new(WorkerRegistry::from_config(&ForemanConfig::default()));
        let feedback = Arc::new(FeedbackStore::in_memory(0.2));
        let router = Router::new(Arc::clone(&registry), Arc::clone(&feedback), 5);
        let scratch = tempfile::tempdir().unwrap();
        let bridge: Arc<dyn WorkerExecutor> = Arc::new(crate::bridge::WorkerBridge::new(
            registry,
            scratch.path().to_path_buf(),
        ));
        let coordinator = Coordinator::new(router, bridge, feedback, 9.0);

        let opts = ExecOptions {
            timeout: Duration::ZERO,
            ..quiet_opts()
        };
        let report = coordinator
            .execute(&Request::new("Audit the codebase"), &opts)
            .await
            .unwrap();

        assert_eq!(report.summary, "0/4 subtasks successful");
        assert!(report.sections.iter().all(|s| s.title.ends_with("[FAILED]")));
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn unknown_request_executes_the_echo_fallback() {
        let stub = Arc::new(StubExecutor::ok());
        let (coordinator, _feedback) = coordinator_with(stub);

        let report = coordinator
            .execute(&Request::new("zzz qqq"), &quiet_opts())
            .await
            .unwrap();

        assert_eq!(report.summary, "1/1 subtasks successful");
        assert_eq!(report.metadata.pattern, "unknown");
        assert_eq!(report.raw_outputs[0].worker_name, "echo");
    }
}
