//! Segue CLI - run scripts and interactive sessions
//!
//! Provides subcommands for starting a REPL, running a script file, and
//! writing a default configuration.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use segue::interpreter::ScriptInterpreter;
use segue::runtime::config::{config_path, load_config, write_config};
use segue::runtime::{HandlerSlot, InterruptHandler, RunnerConfig, SharedSink, listen_for_ctrl_c};
use segue::{Session, SessionEnd};

#[derive(Parser)]
#[command(name = "segue")]
#[command(about = "Run scripts one segment at a time", long_about = None, version)]
struct Cli {
    /// Configuration file, or a directory holding segue.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session on stdin/stdout
    Repl,

    /// Run a script file; `input` reads lines from stdin
    Run {
        /// Script to run
        file: PathBuf,
    },

    /// Write a default configuration
    Init {
        /// Target file, or directory to hold segue.json
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RunnerConfig::default(),
    };

    // Initialize tracing
    let level = if cli.debug || config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Init { path, force } => {
            let target = config_path(&path);
            if target.exists() && !force {
                bail!("{:?} already exists (use --force to overwrite)", target);
            }
            let written = write_config(&path, &RunnerConfig::default())?;
            println!("Wrote default configuration to {:?}", written);
        }

        Commands::Repl => {
            install_ctrl_c()?;
            let sink = SharedSink::stdout();
            let interpreter = ScriptInterpreter::new(sink.clone()).with_echo(config.echo_results);
            let mut session = Session::new(interpreter, io::stdin().lock(), sink).with_config(config);

            let end = session.run()?;
            if end == SessionEnd::Eof {
                println!();
            }
            finish(end);
        }

        Commands::Run { file } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read script: {:?}", file))?;

            install_ctrl_c()?;
            let sink = SharedSink::stdout();
            let interpreter = ScriptInterpreter::new(sink.clone());
            let mut session = Session::new(interpreter, io::stdin().lock(), sink).with_config(config);

            let end = session
                .run_script(&source)
                .with_context(|| format!("Failed to run {:?}", file))?;
            finish(end);
        }
    }

    Ok(())
}

/// Route Ctrl-C through the process slot. With no code running, Ctrl-C ends
/// the process the way the default SIGINT disposition would.
fn install_ctrl_c() -> Result<()> {
    let slot = HandlerSlot::process();
    let at_prompt: InterruptHandler = Arc::new(|| {
        let _ = io::stdout().flush();
        eprintln!();
        process::exit(130);
    });
    slot.replace(Some(at_prompt));
    listen_for_ctrl_c(slot).context("Failed to listen for Ctrl-C")
}

fn finish(end: SessionEnd) {
    let _ = io::stdout().flush();
    if end.exit_code() != 0 {
        process::exit(end.exit_code());
    }
}
