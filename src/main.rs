use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strand_config::Process;
use strand_engine::{EngineConfig, LocalEngine};
use strand_expr::TemplateEvaluator;
use strand_orchestrator::{Capabilities, run_workflow, stage_outputs};
use strand_tool::{CommandExecutor, ExecutorConfig};
use strand_workflow::{Executable, Workflow};

/// Strand - dynamic workflow scheduling over a local task engine
#[derive(Parser)]
#[command(name = "strand")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Log level, overridden by RUST_LOG
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  /// Only log errors
  #[arg(long, short, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow or tool
  Run {
    /// Path to the process document (JSON)
    process_file: PathBuf,

    /// Path to the job order (JSON). Read from stdin when omitted.
    job_file: Option<PathBuf>,

    /// Directory that receives file and directory outputs
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// Directory for per-task working directories (default: <data dir>/strand/work)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Cores that concurrently running tasks may reserve together
    #[arg(long)]
    max_cores: Option<f64>,
  },

  /// Check that a process document parses and locks
  Validate {
    /// Path to the process document (JSON)
    process_file: PathBuf,
  },

  /// Print the step graph of a workflow
  Inspect {
    /// Path to the process document (JSON)
    process_file: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(&cli.log_level, cli.quiet)?;

  match cli.command {
    Some(Commands::Run {
      process_file,
      job_file,
      outdir,
      work_dir,
      max_cores,
    }) => {
      let work_dir = match work_dir {
        Some(dir) => dir,
        None => default_work_dir()?,
      };
      let mut engine_config = EngineConfig::default();
      if let Some(max_cores) = max_cores {
        engine_config.max_cores = max_cores;
      }

      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run(
        process_file,
        job_file,
        outdir,
        ExecutorConfig { work_dir },
        engine_config,
      ))?;
    }
    Some(Commands::Validate { process_file }) => {
      let executable = load(&process_file)?;
      println!("{} is valid", executable.id());
    }
    Some(Commands::Inspect { process_file }) => match load(&process_file)? {
      Executable::Workflow(workflow) => inspect(&workflow),
      Executable::Tool(tool) => println!("tool {} (no steps)", tool.id),
    },
    None => {
      println!("strand - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing(level: &str, quiet: bool) -> Result<()> {
  let filter = if quiet {
    EnvFilter::new("error")
  } else {
    EnvFilter::try_from_default_env()
      .or_else(|_| EnvFilter::try_new(level))
      .with_context(|| format!("invalid log level: {level}"))?
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .with_target(false)
    .try_init()
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

fn default_work_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_local_dir().context("could not determine data directory")?;
  Ok(data_dir.join("strand").join("work"))
}

fn load(process_file: &Path) -> Result<Executable> {
  let content = std::fs::read_to_string(process_file)
    .with_context(|| format!("failed to read process file: {}", process_file.display()))?;

  let process: Process = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse process file: {}", process_file.display()))?;

  strand_workflow::lock(process)
    .with_context(|| format!("invalid process: {}", process_file.display()))
}

fn read_job_order(job_file: Option<&Path>) -> Result<serde_json::Map<String, serde_json::Value>> {
  let content = match job_file {
    Some(path) => std::fs::read_to_string(path)
      .with_context(|| format!("failed to read job order: {}", path.display()))?,
    None => {
      let mut buffer = String::new();
      io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read job order from stdin")?;
      buffer
    }
  };

  if content.trim().is_empty() {
    return Ok(serde_json::Map::new());
  }

  serde_json::from_str(&content).context("job order must be a JSON object")
}

async fn run(
  process_file: PathBuf,
  job_file: Option<PathBuf>,
  outdir: PathBuf,
  executor_config: ExecutorConfig,
  engine_config: EngineConfig,
) -> Result<()> {
  let executable = load(&process_file)?;
  let job_order = read_job_order(job_file.as_deref())?;

  info!(
    process_id = %executable.id(),
    work_dir = %executor_config.work_dir.display(),
    max_cores = engine_config.max_cores,
    "process_loaded"
  );

  let caps = Capabilities::new(
    Arc::new(CommandExecutor::new()),
    Arc::new(TemplateEvaluator::new()),
    executor_config,
  );
  let engine = LocalEngine::new(engine_config);

  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      ctrl_c.cancel();
    }
  });

  let mut outputs = run_workflow(&engine, &executable, job_order, &caps, cancel)
    .await
    .context("workflow execution failed")?;

  stage_outputs(&mut outputs, &outdir)
    .await
    .context("failed to stage outputs")?;

  println!("{}", serde_json::to_string_pretty(&outputs)?);

  Ok(())
}

fn inspect(workflow: &Workflow) {
  let graph = workflow.graph();

  println!("workflow {}", workflow.id);
  println!("entry points: {}", graph.entry_points().join(", "));
  for step in &workflow.steps {
    let mut flags = Vec::new();
    if step.is_scattered() {
      flags.push(format!("scatter {}", step.scatter_keys().join(", ")));
    }
    if graph.is_join_point(&step.id) {
      flags.push("join".to_string());
    }
    if let Executable::Workflow(_) = step.run {
      flags.push("nested".to_string());
    }

    let flags = if flags.is_empty() {
      String::new()
    } else {
      format!(" [{}]", flags.join("; "))
    };
    println!(
      "  {}{} <- [{}] -> [{}]",
      step.id,
      flags,
      graph.upstream(&step.id).join(", "),
      graph.downstream(&step.id).join(", ")
    );
  }
}
