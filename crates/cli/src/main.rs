use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use cmd::{BuildArgs, cmd_build, cmd_config};
use output::{Status, status};

/// fnpack - package serverless functions into deployable archives
#[derive(Parser)]
#[command(name = "fnpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the service's functions into an archive
  Build(BuildArgs),

  /// Print the merged build configuration as JSON
  Config {
    /// Service directory containing serverless.yml
    #[arg(default_value = ".")]
    path: PathBuf,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(code) => code,
    Err(e) => {
      status(Status::Failed, &format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<ExitCode> {
  match cli.command {
    Commands::Build(args) => cmd_build(&args),
    Commands::Config { path } => {
      cmd_config(&path)?;
      Ok(ExitCode::SUCCESS)
    }
  }
}
