mod bridge;
mod config;
mod coordinator;
mod decomposer;
mod error;
mod feedback;
mod report;
mod router;
mod synthesizer;
mod trace;

use crate::config::ForemanConfig;
use anyhow::Result;
use bridge::registry::WorkerRegistry;
use bridge::{WorkerBridge, WorkerExecutor};
use clap::{Parser, Subcommand};
use coordinator::{Coordinator, ExecOptions};
use decomposer::{Decomposer, Request};
use feedback::FeedbackStore;
use report::ReportFormat;
use router::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "foreman", version, about = "Foreman - fans requests out across a fleet of workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a request and run it across the worker fleet
    Orchestrate {
        /// The free-text request
        request: String,
        /// Attach the execution trace to the report and persist it
        #[arg(long)]
        trace: bool,
        /// Suppress narrative output
        #[arg(long)]
        quiet: bool,
        /// Emit per-subtask progress lines
        #[arg(long)]
        verbose: bool,
        /// Report output format
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,
        /// Per-subtask timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Extra context for the decomposer, repeatable
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
    /// Show the execution plan without invoking any worker
    Plan {
        /// The free-text request
        request: String,
    },
    /// List registered workers and their learned success rates
    Workers,
    /// Show the learned success-rate table
    Stats,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration as JSON
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ForemanConfig::load()?;

    let exit_code = match cli.command {
        Commands::Orchestrate {
            request,
            trace,
            quiet,
            verbose,
            format,
            timeout,
            context,
        } => {
            let opts = ExecOptions {
                verbose,
                quiet,
                trace,
                timeout: timeout
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.default_timeout()),
            };
            run_orchestrate(&config, &request, &context, &opts, format).await?
        }
        Commands::Plan { request } => run_plan(&request)?,
        Commands::Workers => run_workers(&config)?,
        Commands::Stats => run_stats(&config)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                0
            }
        },
    };

    std::process::exit(exit_code);
}

async fn run_orchestrate(
    config: &ForemanConfig,
    request_text: &str,
    context: &[String],
    opts: &ExecOptions,
    format: ReportFormat,
) -> Result<i32> {
    let registry = Arc::new(WorkerRegistry::from_config(config));
    let feedback = Arc::new(FeedbackStore::open(
        &config.feedback_log_path()?,
        config.feedback.alpha,
    ));
    let router = Router::new(
        Arc::clone(&registry),
        Arc::clone(&feedback),
        config.feedback.min_samples,
    );
    let bridge: Arc<dyn WorkerExecutor> =
        Arc::new(WorkerBridge::new(registry, config.scratch_dir()?));
    let coordinator = Coordinator::new(
        router,
        bridge,
        feedback,
        config.pricing.usd_per_million_tokens,
    );

    // Ctrl-C cancels the run: in-flight workers are terminated and the
    // partial report is still rendered.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let mut request = Request::new(request_text);
    for pair in context {
        let (key, value) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
        request = request.with_context(key, value);
    }

    match coordinator.execute_with_cancel(&request, opts, cancel_rx).await {
        Ok(report) => {
            if opts.trace {
                if let Some(entries) = &report.execution_trace {
                    let path = trace::persist(entries, &config.traces_dir()?, request_text)?;
                    if !opts.quiet {
                        println!("[TRACE] {}", path.display());
                    }
                }
            }
            println!("{}", report.render(format));
            Ok(if report.all_succeeded() { 0 } else { 2 })
        }
        Err(e) => {
            eprintln!("error: {}", e);
            Ok(1)
        }
    }
}

fn run_plan(request_text: &str) -> Result<i32> {
    let plan = match Decomposer::new().decompose(&Request::new(request_text)) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(1);
        }
    };

    println!(
        "[PLAN] pattern={} intent={} subtasks={} waves={} est={}s",
        plan.pattern,
        plan.intent.map(|i| i.as_str()).unwrap_or("-"),
        plan.subtasks.len(),
        plan.waves.len(),
        plan.est_total_seconds
    );
    for (i, wave) in plan.waves.iter().enumerate() {
        println!("  wave {}: {}", i + 1, wave.join(", "));
    }
    for subtask in &plan.subtasks {
        println!(
            "  {} (priority {}, ~{}s{}): {}",
            subtask.id,
            subtask.priority,
            subtask.est_seconds,
            subtask
                .worker_hint
                .as_deref()
                .map(|h| format!(", hint {}", h))
                .unwrap_or_default(),
            subtask.description
        );
    }
    Ok(0)
}

fn run_workers(config: &ForemanConfig) -> Result<i32> {
    let registry = WorkerRegistry::from_config(config);
    let feedback = FeedbackStore::open(&config.feedback_log_path()?, config.feedback.alpha);
    let rates = feedback.snapshot();

    for name in registry.names() {
        let kind = match registry.spec(&name) {
            Some(spec) if spec.simulated => "simulated".to_string(),
            Some(spec) => spec.command.clone().unwrap_or_else(|| "?".to_string()),
            None => "builtin".to_string(),
        };
        match rates.get(&name) {
            Some(rate) => println!(
                "{:<20} {:<40} rate={:.2} samples={}",
                name, kind, rate.rate, rate.samples
            ),
            None => println!("{:<20} {:<40} (no history)", name, kind),
        }
    }
    Ok(0)
}

fn run_stats(config: &ForemanConfig) -> Result<i32> {
    let feedback = FeedbackStore::open(&config.feedback_log_path()?, config.feedback.alpha);
    let rates = feedback.snapshot();

    if rates.is_empty() {
        println!("no feedback recorded yet");
        return Ok(0);
    }
    for (name, rate) in rates {
        println!("{:<20} rate={:.2} samples={}", name, rate.rate, rate.samples);
    }
    Ok(0)
}
