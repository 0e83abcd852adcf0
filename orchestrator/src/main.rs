//! Main entry point for the orchestrator binary
//!
//! Boots an orchestrator with an in-process echo worker per configured
//! domain, submits a demo task and prints the resulting status snapshot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::signal;

use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorResult, WorkerPool};
use shared::{logging, process_debug, process_info, Domain, Priority, ProcessId, Task, TaskResult};

/// Hierarchical task orchestrator
#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Shards, validates and dispatches tasks across worker domains")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// JSON configuration file; ORCH_* environment variables override it
    #[arg(long)]
    pub config: Option<String>,

    /// Comma-separated files for the demo task
    #[arg(long, value_delimiter = ',')]
    pub files: Vec<String>,

    /// Description of the demo task
    #[arg(long, default_value = "demo task")]
    pub description: String,

    /// Keep serving until Ctrl+C instead of exiting after the demo
    #[arg(long)]
    pub serve: bool,
}

/// Worker pool that completes every task immediately
struct EchoWorkerPool {
    domain: Domain,
}

#[async_trait]
impl WorkerPool for EchoWorkerPool {
    async fn execute(&self, task: Task) -> OrchestratorResult<TaskResult> {
        process_debug!(ProcessId::Worker(self.domain), "🔁 Echoing {}", task.id);
        Ok(TaskResult::completed(task.id, self.domain, 1))
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<OrchestratorConfig> {
    let config = match path {
        Some(path) => OrchestratorConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {path}"))?
            .with_env_overrides()?,
        None => OrchestratorConfig::from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ProcessId::init_orchestrator();
    logging::init_tracing_with_level(Some(&args.log_level));

    let config = load_config(args.config.as_deref())?;
    let domains = config.domains.clone();
    let mut orchestrator = Orchestrator::new(config)?;
    orchestrator.start().await?;

    for domain in domains {
        orchestrator
            .attach_worker(domain, Arc::new(EchoWorkerPool { domain }))
            .await;
    }

    if !args.files.is_empty() {
        let task = Task::new("demo", &args.description, Domain::Coordination)
            .with_priority(Priority::Medium)
            .with_files(args.files.iter().cloned());
        let report = orchestrator.submit(task).await?;
        process_info!(
            ProcessId::current(),
            "📋 Demo task: complexity {:.1}, {} assignment(s), valid partitions: {}",
            report.complexity,
            report.assignments.len(),
            report.validation.valid
        );

        // Let the echo workers report back
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.process_pending().await;
    }

    println!("{}", serde_json::to_string_pretty(&orchestrator.status().await)?);

    if args.serve {
        let shutdown_sender = orchestrator.get_shutdown_sender();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
                    let _ = shutdown_sender.send(()).await;
                }
                Err(err) => {
                    logging::log_error(ProcessId::current(), "Signal handling", &err);
                }
            }
        });
        orchestrator.run().await?;
    } else {
        orchestrator.shutdown().await?;
    }

    logging::log_success(ProcessId::current(), "Orchestrator stopped gracefully");
    Ok(())
}
