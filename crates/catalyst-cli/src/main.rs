mod cleanup_cmd;
mod log_cmd;
mod pipeline_cmd;
mod report_cmd;
mod run_cmd;
mod status_cmd;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use catalyst_core::ClaudeCodeHarness;

#[derive(Parser)]
#[command(name = "catalyst", about = "Autonomous task-execution orchestrator for fleets of LLM coding agents")]
struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single plan to completion (the Executor, spec 4.1).
    Run {
        /// Path to the plan YAML file.
        #[arg(long)]
        plan: std::path::PathBuf,
        /// Report what would be dispatched without running any agent.
        #[arg(long)]
        dry_run: bool,
        /// Treat tasks before this ID as already completed.
        #[arg(long)]
        resume_from: Option<String>,
        /// Dispatch exactly one task, then stop.
        #[arg(long)]
        single_task: bool,
        /// Run ready parallel_group tasks in isolated worktrees.
        #[arg(long)]
        parallel: bool,
        /// Skip the post-plan smoke-test runner.
        #[arg(long)]
        skip_smoke: bool,
        #[arg(long)]
        verbose: bool,
        /// Override the plan's `budget.max_quota_percent`.
        #[arg(long)]
        max_budget_pct: Option<f64>,
        /// Override the plan's `budget.quota_ceiling_usd`.
        #[arg(long)]
        quota_ceiling: Option<f64>,
        /// Override the plan's `budget.reserved_budget_usd`.
        #[arg(long)]
        reserved_budget: Option<f64>,
    },
    /// Run the Work-Item Pipeline main loop (spec 4.2).
    Pipeline {
        /// Run one iteration and exit, instead of looping.
        #[arg(long)]
        once: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        verbose: bool,
    },
    /// Show plan status and task progress (omit --plan to list all plans).
    Status {
        #[arg(long)]
        plan: Option<String>,
    },
    /// Show the recorded attempt log for a task.
    Log {
        task_id: String,
    },
    /// Show token usage and duration report for a plan.
    Report {
        plan: String,
    },
    /// Remove stale parallel-group worktrees left behind by a plan.
    Cleanup {
        plan: String,
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let root_path = cli
        .root
        .unwrap_or_else(|| std::env::current_dir().expect("current directory"));
    let root = catalyst_store::StoreRoot::new(root_path);
    let harness: Arc<dyn catalyst_core::Harness> = Arc::new(ClaudeCodeHarness::new());

    match cli.command {
        Commands::Run {
            plan,
            dry_run,
            resume_from,
            single_task,
            parallel,
            skip_smoke,
            verbose,
            max_budget_pct,
            quota_ceiling,
            reserved_budget,
        } => {
            run_cmd::run(run_cmd::RunArgs {
                root,
                harness,
                plan_path: plan,
                dry_run,
                resume_from,
                single_task,
                parallel,
                skip_smoke,
                verbose,
                max_budget_pct,
                quota_ceiling,
                reserved_budget,
            })
            .await?;
        }
        Commands::Pipeline { once, dry_run, verbose } => {
            pipeline_cmd::run(&root, harness, once, dry_run, verbose).await?;
        }
        Commands::Status { plan } => {
            status_cmd::run_status(&root, plan.as_deref())?;
        }
        Commands::Log { task_id } => {
            log_cmd::run_log(&root, &task_id)?;
        }
        Commands::Report { plan } => {
            report_cmd::run_report(&root, &plan)?;
        }
        Commands::Cleanup { plan, all } => {
            cleanup_cmd::run_cleanup(&root, &plan, all)?;
        }
    }

    Ok(())
}
