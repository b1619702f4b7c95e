//! hookwise CLI - run git hook handlers and code analysis

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hookwise_core::{AnalysisType, Config};

mod commands;
mod logging;

use commands::{cmd_analyze, cmd_config_show, cmd_hook};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "hookwise")]
#[command(about = "Hook-triggered code analysis for git")]
#[command(after_help = "\
EXAMPLES:
  hookwise hook pre-commit < context.json    # Run pre-commit handlers
  hookwise analyze src/main.rs --type security
  hookwise analyze < request.json            # Run a raw analysis request
  hookwise config                            # Show effective configuration")]
struct Cli {
  /// Project directory used to locate .hookwise.toml (default: current directory)
  #[arg(short, long, global = true)]
  project: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the handlers registered for a hook (HookContext JSON on stdin).
  /// Exits with status 1 when a blocking hook rejects the operation.
  Hook {
    /// Hook name (pre-commit, commit-msg, post-commit, pre-push, post-merge, or custom)
    name: String,
  },
  /// Analyze files, or an AnalysisRequest JSON read from stdin
  Analyze {
    /// Files to analyze
    paths: Vec<PathBuf>,
    /// Analysis types (default: configured analysis.types)
    #[arg(short = 't', long = "type")]
    types: Vec<AnalysisType>,
    /// Skip the cache and recompute
    #[arg(long)]
    force: bool,
  },
  /// Show the effective configuration
  Config,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let project = match cli.project {
    Some(path) => path,
    None => std::env::current_dir().context("Failed to determine current directory")?,
  };
  let config = Config::load_for_project(&project).context("Failed to load configuration")?;
  let guard = init_logging(&config.logging);

  let blocked = match cli.command {
    Commands::Hook { name } => cmd_hook(&name, config).await?,
    Commands::Analyze { paths, types, force } => {
      cmd_analyze(paths, types, force, config).await?;
      false
    }
    Commands::Config => {
      cmd_config_show(&config)?;
      false
    }
  };

  if blocked {
    // Flush file logs before exiting
    drop(guard);
    std::process::exit(1);
  }

  Ok(())
}
