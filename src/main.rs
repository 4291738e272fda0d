//! Grue: run an LLM agent against a text adventure.
//!
//! - `play`    -- Run one episode and print the post-run report
//! - `act`     -- Submit a single command and print the response
//! - `config`  -- Print the effective configuration

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use grue::config::{Difficulty, GrueConfig, ProcessConfig, RemoteConfig, Transport};
use grue::env::{single_action, AnyEnv, Environment};
use grue::episode::EpisodeEngine;
use grue::model::{AnyCompletion, LlmClient};
use grue::policy::Policies;
use grue::report::{dump_history, EpisodeRecord, RunReport};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Grue: an episodic control loop for LLM agents playing text adventures
#[derive(Parser)]
#[command(name = "grue", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured game transport.
    #[arg(long, global = true)]
    transport: Option<TransportChoice>,

    /// Interpreter executable for `--transport process`.
    #[arg(long, global = true)]
    program: Option<PathBuf>,

    /// Session service URL for `--transport remote`.
    #[arg(long, global = true, default_value = "http://localhost:8000")]
    base_url: String,

    /// Apply a difficulty profile.
    #[arg(long, global = true)]
    difficulty: Option<DifficultyChoice>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum TransportChoice {
    Process,
    Remote,
    Scripted,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum DifficultyChoice {
    Easy,
    Medium,
    Hard,
    Rogue,
}

impl From<DifficultyChoice> for Difficulty {
    fn from(choice: DifficultyChoice) -> Self {
        match choice {
            DifficultyChoice::Easy => Difficulty::Easy,
            DifficultyChoice::Medium => Difficulty::Medium,
            DifficultyChoice::Hard => Difficulty::Hard,
            DifficultyChoice::Rogue => Difficulty::Rogue,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one episode.
    Play {
        /// Override the step budget.
        #[arg(long)]
        max_steps: Option<usize>,

        /// Write the full episode memory to this file.
        #[arg(long)]
        dump_history: Option<PathBuf>,

        /// Save a JSON episode record to this file.
        #[arg(long)]
        record: Option<PathBuf>,

        /// Cancel the episode when standard input reaches end of file.
        #[arg(long)]
        stop_on_eof: bool,
    },

    /// Start the game, submit one command, print the response.
    Act {
        /// The command to submit.
        action: String,
    },

    /// Print the effective configuration as JSON.
    Config,
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = effective_config(&cli)?;

    match cli.command {
        Commands::Play {
            max_steps,
            dump_history,
            record,
            stop_on_eof,
        } => {
            cmd_play(
                config,
                max_steps,
                dump_history.as_deref(),
                record.as_deref(),
                stop_on_eof,
            )
            .await
        }
        Commands::Act { action } => cmd_act(&config, &action).await,
        Commands::Config => cmd_config(&config),
    }
}

/// Load the config file, then apply CLI overrides, the difficulty profile and
/// the API key from the environment.
fn effective_config(cli: &Cli) -> Result<GrueConfig> {
    let mut config = match &cli.config {
        Some(path) => GrueConfig::load(path)?,
        None => GrueConfig::default(),
    };

    if let Some(choice) = &cli.transport {
        config.env.transport = match choice {
            TransportChoice::Scripted => Transport::Scripted,
            TransportChoice::Process => {
                let Some(program) = cli.program.clone() else {
                    bail!("--transport process requires --program");
                };
                Transport::Process(ProcessConfig {
                    program,
                    args: Vec::new(),
                    cwd: None,
                    sentinel: grue::stream::DEFAULT_SENTINEL.to_string(),
                    restart_on_exit: false,
                })
            }
            TransportChoice::Remote => Transport::Remote(RemoteConfig {
                base_url: cli.base_url.clone(),
                session_id: None,
                game_file: None,
                poll_delay_ms: 100,
                connect_attempts: 10,
                retry_delay_ms: 2000,
                snapshot_after_step: false,
                timeout_secs: 30,
            }),
        };
    }

    if let Some(choice) = cli.difficulty {
        config.difficulty = Some(choice.into());
    }
    config.apply_difficulty();
    config.fill_api_key_from_env();
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_play(
    mut config: GrueConfig,
    max_steps: Option<usize>,
    history_path: Option<&Path>,
    record_path: Option<&Path>,
    stop_on_eof: bool,
) -> Result<()> {
    if max_steps.is_some() {
        config.episode.max_steps = max_steps;
    }

    let completion = Arc::new(AnyCompletion::Http(LlmClient::new(&config.model)?));
    let policies = Policies::from_config(&config.policy, &config.episode, completion);
    let env = AnyEnv::from_config(&config.env);
    let label = env.label().to_string();

    let cancel = CancellationToken::new();
    watch_ctrl_c(cancel.clone());
    if stop_on_eof {
        watch_stdin_eof(cancel.clone());
    }

    tracing::info!(
        env = %label,
        max_steps = ?config.episode.max_steps,
        difficulty = ?config.difficulty,
        "Starting episode"
    );

    let started_at = chrono::Utc::now();
    let mut engine =
        EpisodeEngine::new(env, policies, config.episode.max_steps).with_cancellation(cancel);
    let outcome = engine.run().await?;

    if let Some(path) = history_path {
        dump_history(&outcome, path)?;
    }

    let report = RunReport::from_outcome(&outcome);
    println!("{report}");

    if let Some(path) = record_path {
        EpisodeRecord::new(&label, started_at, outcome).save_to_file(path)?;
    }

    Ok(())
}

async fn cmd_act(config: &GrueConfig, action: &str) -> Result<()> {
    let mut env = AnyEnv::from_config(&config.env);
    let response = single_action(&mut env, action).await?;
    println!("{response}");
    Ok(())
}

fn cmd_config(config: &GrueConfig) -> Result<()> {
    let json =
        serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("{json}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Out-of-band stops
// ---------------------------------------------------------------------------

fn watch_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping episode");
            cancel.cancel();
        }
    });
}

/// Cancel once standard input is exhausted (the upstream pipe closed).
///
/// Runs on a plain thread: a blocking stdin read cannot be cancelled and must
/// not hold up runtime shutdown.
fn watch_stdin_eof(cancel: CancellationToken) {
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read standard input");
                    break;
                }
            }
        }
        tracing::info!("Standard input closed, stopping episode");
        cancel.cancel();
    });
}
