use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use weft_config::WorkflowDef;
use weft_engine::{Engine, EngineConfig};
use weft_host::{Collaborators, OpenAiCompatibleModel};
use weft_store::{ExecutionStatus, SqliteStore};

/// Weft - run LLM workflow graphs from the terminal
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.weft)
  #[arg(long, global = true, env = "WEFT_DATA_DIR")]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a workflow file and print every problem found
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow and print the finished execution
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Workflow inputs as a JSON object (default: stdin, or `{}`)
    #[arg(long)]
    inputs: Option<String>,

    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible chat completions API
    #[arg(long, env = "WEFT_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Model used when a node does not name one
    #[arg(long, env = "WEFT_LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    #[arg(long, env = "WEFT_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Print progress events to stderr as they happen
    #[arg(long)]
    progress: bool,
  },

  /// Print a stored execution
  Show {
    execution_id: String,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info")),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();
  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".weft"),
  };

  match cli.command {
    Commands::Validate { workflow_file } => validate(&workflow_file),
    Commands::Run {
      workflow_file,
      inputs,
      config,
      llm_base_url,
      llm_model,
      llm_api_key,
      progress,
    } => {
      let llm = llm_base_url.map(|base_url| {
        let model = OpenAiCompatibleModel::new(base_url, llm_model);
        match llm_api_key {
          Some(key) => model.with_api_key(key),
          None => model,
        }
      });
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run(RunArgs {
        workflow_file,
        inputs,
        config,
        llm,
        progress,
        data_dir,
      }))
    }
    Commands::Show { execution_id } => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(show(&execution_id, &data_dir))
    }
  }
}

struct RunArgs {
  workflow_file: PathBuf,
  inputs: Option<String>,
  config: Option<PathBuf>,
  llm: Option<OpenAiCompatibleModel>,
  progress: bool,
  data_dir: PathBuf,
}

fn validate(workflow_file: &Path) -> Result<()> {
  let def = load_workflow(workflow_file)?;
  let report = weft_workflow::validate(&def);
  if report.is_valid() {
    eprintln!("{}: ok ({} nodes, {} edges)", def.id, def.nodes.len(), def.edges.len());
    return Ok(());
  }

  for error in &report.errors {
    println!("{error}");
  }
  bail!("workflow '{}' has {} problem(s)", def.id, report.errors.len())
}

async fn run(args: RunArgs) -> Result<()> {
  let def = load_workflow(&args.workflow_file)?;
  let inputs = read_inputs(args.inputs.as_deref())?;
  let config = match &args.config {
    Some(path) => load_config(path)?,
    None => EngineConfig::default(),
  };

  let mut collaborators = Collaborators::new();
  if let Some(llm) = args.llm {
    collaborators = collaborators.with_llm(Arc::new(llm));
  }

  let store = open_store(&args.data_dir).await?;
  let engine = Engine::new(config, collaborators, Arc::new(store));

  let execution_id = engine
    .start_execution(&def, inputs)
    .await
    .with_context(|| format!("failed to start workflow '{}'", def.id))?;
  eprintln!("Started execution: {execution_id}");

  let mut events = engine.subscribe_progress(&execution_id).await?;
  loop {
    tokio::select! {
      event = events.next() => match event {
        Some(event) if args.progress => eprintln!("{}", serde_json::to_string(&event)?),
        Some(_) => {}
        None => break,
      },
      _ = tokio::signal::ctrl_c() => {
        eprintln!("Cancelling execution: {execution_id}");
        engine.cancel_execution(&execution_id).await?;
      }
    }
  }
  engine.shutdown().await;

  let execution = engine.get_execution(&execution_id).await?;
  println!("{}", serde_json::to_string_pretty(&execution)?);

  if execution.status != ExecutionStatus::Completed {
    bail!("execution {execution_id} finished as {}", execution.status);
  }
  Ok(())
}

async fn show(execution_id: &str, data_dir: &Path) -> Result<()> {
  let store = open_store(data_dir).await?;
  let engine = Engine::new(
    EngineConfig::default(),
    Collaborators::new(),
    Arc::new(store),
  );
  let execution = engine
    .get_execution(execution_id)
    .await
    .with_context(|| format!("failed to load execution {execution_id}"))?;
  println!("{}", serde_json::to_string_pretty(&execution)?);
  Ok(())
}

async fn open_store(data_dir: &Path) -> Result<SqliteStore> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  let path = data_dir.join("weft.db");
  SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open execution store: {}", path.display()))
}

fn load_workflow(path: &Path) -> Result<WorkflowDef> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read workflow file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", path.display()))
}

fn load_config(path: &Path) -> Result<EngineConfig> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read config file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse config file: {}", path.display()))
}

fn read_inputs(inline: Option<&str>) -> Result<serde_json::Value> {
  let raw = match inline {
    Some(raw) => raw.to_string(),
    None if io::stdin().is_terminal() => String::new(),
    None => {
      let mut input = String::new();
      io::stdin()
        .read_to_string(&mut input)
        .context("failed to read inputs from stdin")?;
      input
    }
  };

  if raw.trim().is_empty() {
    return Ok(serde_json::json!({}));
  }
  let inputs: serde_json::Value =
    serde_json::from_str(&raw).context("failed to parse inputs JSON")?;
  if !inputs.is_object() {
    bail!("workflow inputs must be a JSON object");
  }
  Ok(inputs)
}
