use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskcrew_lib::models::{Complexity, OrchestrationStrategy, Task, TaskType};
use taskcrew_lib::{generate_id, load_config, LogSink, Orchestrator};

/// Taskcrew - dependency-aware orchestration of parallel CLI workers
#[derive(Parser, Debug)]
#[command(name = "taskcrew")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decompose a task and run its subtasks to completion
    Run {
        /// Repository to operate on
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Task description; list items become separate subtasks
        #[arg(long)]
        description: String,

        /// Task kind: feature, bugfix, refactor or chore
        #[arg(long, default_value = "feature")]
        task_type: String,

        /// Complexity estimate: low, medium or high
        #[arg(long, default_value = "medium")]
        complexity: String,

        /// Execution strategy: parallel or sequential
        #[arg(long, default_value = "parallel")]
        strategy: String,

        /// Hybrid strategy as JSON, overrides --strategy
        #[arg(long)]
        strategy_json: Option<String>,

        /// Maximum simultaneously running workers
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Worker binary for every subtask (or set TASKCREW_WORKER)
        #[arg(long, env = "TASKCREW_WORKER")]
        worker: Option<String>,
    },
    /// Show the merged configuration for a repository
    Config {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Run {
            repo,
            description,
            task_type,
            complexity,
            strategy,
            strategy_json,
            max_concurrent,
            worker,
        } => run(
            repo,
            description,
            &task_type,
            &complexity,
            &strategy,
            strategy_json,
            max_concurrent,
            worker,
        )
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            2
        }),
        Commands::Config { repo } => show_config(&repo).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            2
        }),
    };
    std::process::exit(exit_code);
}

#[allow(clippy::too_many_arguments)]
async fn run(
    repo: PathBuf,
    description: String,
    task_type: &str,
    complexity: &str,
    strategy: &str,
    strategy_json: Option<String>,
    max_concurrent: Option<usize>,
    worker: Option<String>,
) -> Result<i32, String> {
    let mut config = load_config(&repo)?;
    if let Some(max) = max_concurrent {
        config.max_concurrent = max;
    }
    if let Some(worker) = worker {
        config.default_worker = worker;
        config.worker_map.clear();
    }

    taskcrew_lib::storage::init_taskcrew_dir(&repo)?;

    let task = Task {
        id: format!("task-{}", generate_id()),
        description,
        task_type: parse_task_type(task_type)?,
        complexity: parse_complexity(complexity)?,
        dependencies: vec![],
    };

    let strategy = match strategy_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| format!("Invalid --strategy-json: {}", e))?,
        None => match strategy {
            "parallel" => OrchestrationStrategy::Parallel {
                max_concurrent: config.max_concurrent,
            },
            "sequential" => OrchestrationStrategy::Sequential,
            other => return Err(format!("Unknown strategy '{}'", other)),
        },
    };

    let orchestrator = Orchestrator::new(&repo, config).with_sink(Box::new(LogSink));
    let report = orchestrator.run(&task, &strategy).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {}", e))?
    );

    Ok(if report.failed() > 0 || report.cancelled {
        1
    } else {
        0
    })
}

fn show_config(repo: &PathBuf) -> Result<i32, String> {
    let config = load_config(repo)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?
    );
    Ok(0)
}

fn parse_task_type(s: &str) -> Result<TaskType, String> {
    match s {
        "feature" => Ok(TaskType::Feature),
        "bugfix" => Ok(TaskType::Bugfix),
        "refactor" => Ok(TaskType::Refactor),
        "chore" => Ok(TaskType::Chore),
        other => Err(format!("Unknown task type '{}'", other)),
    }
}

fn parse_complexity(s: &str) -> Result<Complexity, String> {
    match s {
        "low" => Ok(Complexity::Low),
        "medium" => Ok(Complexity::Medium),
        "high" => Ok(Complexity::High),
        other => Err(format!("Unknown complexity '{}'", other)),
    }
}
