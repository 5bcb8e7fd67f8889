//! notegraph CLI
//!
//! Command-line interface for inspecting the note graph snapshot of a
//! workspace.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use notegraph_core::Config;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "notegraph")]
#[command(about = "notegraph - Live graph of notes and the links between them")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default location
    #[arg(long = "config-file", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Log level for notegraph crates (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show snapshot location, age and contents
    Status,
    /// List notes in the snapshot
    #[command(alias = "ls")]
    Notes {
        /// Include placeholders (referenced but missing notes)
        #[arg(short, long)]
        placeholders: bool,
    },
    /// Show forward and back links of a note
    Links {
        /// Canonical note path
        path: String,
    },
    /// Print the event replay a new subscriber receives, as JSON lines
    Events,
    /// Record a saved note and its outgoing links in the snapshot
    Record {
        /// Canonical note path
        path: String,
        /// Target of an outgoing link (repeatable)
        #[arg(short, long = "link", value_name = "TARGET")]
        links: Vec<String>,
        /// Title stored in the note metadata
        #[arg(long)]
        title: Option<String>,
    },
    /// Remove a note from the snapshot
    Forget {
        /// Canonical note path
        path: String,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, snapshot_interval_secs, subscriber_buffer,
        /// coalesce_renames, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config_file.as_ref();

    // Config commands work even when the configuration cannot be applied
    if let Commands::Config { command } = &cli.command {
        return match command.clone().unwrap_or(ConfigCommands::Show) {
            ConfigCommands::Show => commands::config::show(config_path, &output),
            ConfigCommands::Set { key, value } => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config, &cli.log_level, &output);

    match cli.command {
        Commands::Status => commands::status::show(&config, &output),
        Commands::Notes { placeholders } => {
            commands::notes::list(&config, placeholders, &output).await
        }
        Commands::Links { path } => commands::links::show(&config, path, &output).await,
        Commands::Events => commands::events::replay(&config, &output).await,
        Commands::Record { path, links, title } => {
            commands::record::record(&config, path, links, title, &output).await
        }
        Commands::Forget { path } => commands::record::forget(&config, path, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Initialize logging
///
/// `RUST_LOG` takes precedence over `--log-level`. Logs go to
/// `config.log_file` when set, otherwise to stderr.
fn init_logging(config: &Config, log_level: &str, output: &Output) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "notegraph_core={},notegraph_cli={}",
            log_level, log_level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    if let Some(log_path) = &config.log_file {
        match OpenOptions::new().create(true).append(true).open(log_path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(file).try_init();
                return;
            }
            Err(e) => {
                if !output.is_quiet() {
                    eprintln!(
                        "Warning: Could not open log file {:?}: {}",
                        log_path, e
                    );
                }
            }
        }
    }

    let _ = builder.with_writer(std::io::stderr).try_init();
}
