pub mod registry;
pub mod simulated;

use crate::config::InputStyle;
use crate::decomposer::SubTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use crate::bridge::registry::{ResolvedWorker, WorkerRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Grace between SIGTERM and SIGKILL for a timed-out or cancelled worker.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// How much of a failing worker's stderr is kept in the error string.
const STDERR_HEAD: usize = 200;

/// Completed outputs of earlier waves, keyed by subtask id, as handed to
/// downstream workers in their input payload.
pub type PriorResults = HashMap<String, Value>;

/// Typed result of invoking one worker for one subtask.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutput {
    pub worker_name: String,
    pub subtask_id: String,
    pub success: bool,
    pub result: Option<Value>,
    /// Empty exactly when `success` is true.
    pub error: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub tokens: Option<u64>,
    pub cost: Option<f64>,
}

impl WorkerOutput {
    pub fn prior_entry(&self) -> Value {
        json!({
            "worker": self.worker_name,
            "success": self.success,
            "result": self.result,
            "error": self.error,
        })
    }
}

/// Wire envelope every worker prints on stdout. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    metrics: Option<Metrics>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Metrics {
    #[serde(default)]
    #[allow(dead_code)]
    execution_time_ms: Option<u64>,
    #[serde(default)]
    tokens: Option<u64>,
    #[serde(default)]
    cost: Option<f64>,
}

/// Invocation failures, normalized into `WorkerOutput.error` strings.
#[derive(Debug, Clone, PartialEq)]
enum Failure {
    WorkerNotFound(String),
    SpawnFailed(String),
    NonzeroExit { code: i32, stderr_head: String },
    InvalidOutput(String),
    Timeout(u64),
    Cancelled,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::WorkerNotFound(name) => write!(f, "worker-not-found: {}", name),
            Failure::SpawnFailed(msg) => write!(f, "spawn-failed: {}", msg),
            Failure::NonzeroExit { code, stderr_head } => {
                write!(f, "nonzero-exit({}, {})", code, stderr_head)
            }
            Failure::InvalidOutput(reason) => write!(f, "invalid-output: {}", reason),
            Failure::Timeout(secs) => write!(f, "timeout after {}s", secs),
            Failure::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error text a cancelled invocation reports; the tracer keys off it.
pub const CANCELLED_ERROR: &str = "cancelled";

/// Seam between the Coordinator and worker execution. The production
/// implementation is [`WorkerBridge`]; tests substitute stubs.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    async fn invoke(
        &self,
        worker_name: &str,
        subtask: &SubTask,
        prior_results: &PriorResults,
        timeout: Duration,
        cancel: watch::Receiver<bool>,
    ) -> WorkerOutput;
}

/// Launches external workers as subprocesses and normalizes their output.
/// Does not retry; one invocation per call, child reaped before return.
pub struct WorkerBridge {
    registry: Arc<WorkerRegistry>,
    scratch_root: PathBuf,
}

impl WorkerBridge {
    pub fn new(registry: Arc<WorkerRegistry>, scratch_root: PathBuf) -> Self {
        Self {
            registry,
            scratch_root,
        }
    }

    fn build_payload(subtask: &SubTask, prior_results: &PriorResults, timeout: Duration) -> Value {
        json!({
            "task_description": subtask.description,
            "prior_results": prior_results,
            "options": {
                "subtask_id": subtask.id,
                "priority": subtask.priority,
                "timeout_secs": timeout.as_secs(),
            },
        })
    }

    async fn run_real(
        &self,
        argv: &[String],
        input: InputStyle,
        payload: &str,
        timeout: Duration,
        cancel: watch::Receiver<bool>,
    ) -> Result<Envelope, Failure> {
        let scratch = self.scratch_root.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&scratch)
            .map_err(|e| Failure::SpawnFailed(format!("scratch dir: {}", e)))?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&scratch)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match input {
            InputStyle::Stdin => {
                cmd.stdin(Stdio::piped());
            }
            InputStyle::Arg => {
                cmd.arg("--input").arg(payload);
                cmd.stdin(Stdio::null());
            }
        }

        let spawned = cmd.spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&scratch);
                return Err(Failure::SpawnFailed(e.to_string()));
            }
        };

        if input == InputStyle::Stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // A worker that exits before reading closes the pipe; the
                // exit status decides the outcome, not the broken write.
                let _ = stdin.write_all(payload.as_bytes()).await;
                let _ = stdin.shutdown().await;
            }
        }

        let stdout_task = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr_task = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = tokio::select! {
            waited = tokio::time::timeout(timeout, child.wait()) => match waited {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    Self::terminate(&mut child).await;
                    let _ = std::fs::remove_dir_all(&scratch);
                    return Err(Failure::SpawnFailed(format!("wait failed: {}", e)));
                }
                Err(_) => {
                    Self::terminate(&mut child).await;
                    let _ = std::fs::remove_dir_all(&scratch);
                    return Err(Failure::Timeout(timeout.as_secs()));
                }
            },
            _ = wait_cancelled(cancel) => {
                Self::terminate(&mut child).await;
                let _ = std::fs::remove_dir_all(&scratch);
                return Err(Failure::Cancelled);
            }
        };

        let stdout = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let _ = std::fs::remove_dir_all(&scratch);

        match serde_json::from_slice::<Envelope>(&stdout) {
            Ok(envelope) => Ok(envelope),
            Err(parse_err) => {
                if !status.success() {
                    let head: String = String::from_utf8_lossy(&stderr)
                        .trim()
                        .chars()
                        .take(STDERR_HEAD)
                        .collect();
                    Err(Failure::NonzeroExit {
                        code: status.code().unwrap_or(-1),
                        stderr_head: head,
                    })
                } else {
                    Err(Failure::InvalidOutput(parse_err.to_string()))
                }
            }
        }
    }

    /// SIGTERM, wait out the grace period, then SIGKILL. The child is
    /// always reaped before this returns.
    async fn terminate(child: &mut Child) {
        if let Some(pid) = child.id() {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
                return;
            }
            warn!(pid, "worker ignored SIGTERM, killing");
        }
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    fn success(
        worker_name: &str,
        subtask_id: &str,
        started_at: DateTime<Utc>,
        result: Value,
        tokens: Option<u64>,
        cost: Option<f64>,
    ) -> WorkerOutput {
        WorkerOutput {
            worker_name: worker_name.to_string(),
            subtask_id: subtask_id.to_string(),
            success: true,
            result: Some(result),
            error: String::new(),
            started_at,
            ended_at: Utc::now(),
            tokens,
            cost,
        }
    }

    fn failure(
        worker_name: &str,
        subtask_id: &str,
        started_at: DateTime<Utc>,
        error: String,
    ) -> WorkerOutput {
        WorkerOutput {
            worker_name: worker_name.to_string(),
            subtask_id: subtask_id.to_string(),
            success: false,
            result: None,
            error,
            started_at,
            ended_at: Utc::now(),
            tokens: None,
            cost: None,
        }
    }
}

#[async_trait]
impl WorkerExecutor for WorkerBridge {
    async fn invoke(
        &self,
        worker_name: &str,
        subtask: &SubTask,
        prior_results: &PriorResults,
        timeout: Duration,
        cancel: watch::Receiver<bool>,
    ) -> WorkerOutput {
        let started_at = Utc::now();

        // A zero deadline is already expired; nothing gets to run.
        if timeout.is_zero() {
            return Self::failure(
                worker_name,
                &subtask.id,
                started_at,
                Failure::Timeout(0).to_string(),
            );
        }

        let payload = Self::build_payload(subtask, prior_results, timeout);

        let resolved = match self.registry.resolve(worker_name) {
            Ok(resolved) => resolved,
            Err(_) => {
                return Self::failure(
                    worker_name,
                    &subtask.id,
                    started_at,
                    Failure::WorkerNotFound(worker_name.to_string()).to_string(),
                );
            }
        };

        match resolved {
            ResolvedWorker::Echo => {
                Self::success(worker_name, &subtask.id, started_at, payload, None, None)
            }
            ResolvedWorker::Simulated => {
                debug!(worker = worker_name, subtask = %subtask.id, "simulated invocation");
                let result = simulated::canned_result(worker_name, subtask);
                Self::success(worker_name, &subtask.id, started_at, result, None, None)
            }
            ResolvedWorker::Real {
                argv,
                input,
                timeout: override_timeout,
            } => {
                let effective = match override_timeout {
                    Some(per_worker) => per_worker.min(timeout),
                    None => timeout,
                };
                let payload_text = payload.to_string();

                match self
                    .run_real(&argv, input, &payload_text, effective, cancel)
                    .await
                {
                    Ok(envelope) => {
                        let (tokens, cost) = envelope
                            .metrics
                            .map(|m| (m.tokens, m.cost))
                            .unwrap_or((None, None));
                        if envelope.success {
                            Self::success(
                                worker_name,
                                &subtask.id,
                                started_at,
                                envelope.result,
                                tokens,
                                cost,
                            )
                        } else {
                            let error = match envelope.error {
                                Some(e) if !e.is_empty() => e,
                                _ => "worker reported failure".to_string(),
                            };
                            Self::failure(worker_name, &subtask.id, started_at, error)
                        }
                    }
                    Err(failure) => {
                        Self::failure(worker_name, &subtask.id, started_at, failure.to_string())
                    }
                }
            }
        }
    }
}

/// Resolves when the cancellation flag flips to true; pends forever if the
/// sender is dropped without cancelling.
async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
