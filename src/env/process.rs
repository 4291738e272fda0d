//! Interpreters run as a child process and spoken to over stdio.
//!
//! Commands go in as one UTF-8 line each, flushed immediately. Narration
//! comes back unframed on stdout and is cut into turns by the prompt
//! sentinel (see [`crate::stream::framer`]).

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::traits::{Environment, StepOutcome};
use crate::config::ProcessConfig;
use crate::stream::{ProcessTurnStream, TurnSource};

/// A live interpreter process and the turn stream over its stdout.
#[derive(Debug)]
struct Running {
    child: Child,
    stdin: ChildStdin,
    turns: ProcessTurnStream<ChildStdout>,
}

/// An [`Environment`] backed by a child process.
///
/// The child is spawned with `kill_on_drop`, so it is released on every exit
/// path, including panics and early returns. [`Environment::close`] kills and
/// reaps it explicitly and may be called any number of times.
#[derive(Debug)]
pub struct ProcessEnv {
    config: ProcessConfig,
    running: Option<Running>,
}

impl ProcessEnv {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    /// Whether a child process is currently attached.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn spawn(&self) -> Result<Running> {
        let program = &self.config.program;
        let mut cmd = Command::new(program);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to launch game process {}", program.display()))?;
        let stdin = child
            .stdin
            .take()
            .context("game process has no stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("game process has no stdout pipe")?;

        info!(program = %program.display(), pid = child.id(), "game process launched");

        Ok(Running {
            child,
            stdin,
            turns: ProcessTurnStream::new(stdout, &self.config.sentinel),
        })
    }

    /// Launch a fresh process and read its introduction.
    async fn launch(&mut self) -> Result<Option<String>> {
        self.terminate().await;
        let mut running = self.spawn()?;
        let intro = running.turns.next_turn().await?;
        match intro {
            Some(turn) => {
                self.running = Some(running);
                Ok(Some(turn.into_string()))
            }
            None => {
                reap(&mut running.child).await;
                Ok(None)
            }
        }
    }

    /// Kill and reap the child if one is attached.
    async fn terminate(&mut self) {
        if let Some(mut running) = self.running.take() {
            reap(&mut running.child).await;
        }
    }

    /// Input ended or the pipe broke: either restart or report end of input.
    async fn on_exit(&mut self, reason: &str) -> Result<Option<StepOutcome>> {
        self.terminate().await;
        if !self.config.restart_on_exit {
            info!(reason, "game process ended");
            return Ok(None);
        }

        warn!(reason, "game process ended, restarting");
        Ok(self.launch().await?.map(StepOutcome::narration))
    }
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "game process already exited");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "failed to reap game process");
    }
}

async fn write_command(stdin: &mut ChildStdin, action: &str) -> std::io::Result<()> {
    let line = format!("{}\n", action.trim_end());
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

impl Environment for ProcessEnv {
    async fn start(&mut self) -> Result<Option<String>> {
        self.launch().await
    }

    async fn step(&mut self, action: &str) -> Result<Option<StepOutcome>> {
        let Some(running) = self.running.as_mut() else {
            bail!("game process is not running; call start first");
        };

        if let Err(e) = write_command(&mut running.stdin, action).await {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return self.on_exit("broken pipe").await;
            }
            return Err(e).context("failed to write command to game process");
        }

        let next = running.turns.next_turn().await?;
        match next {
            Some(turn) => Ok(Some(StepOutcome::narration(turn.into_string()))),
            None => self.on_exit("end of output").await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.terminate().await;
        Ok(())
    }

    fn label(&self) -> &str {
        "process"
    }
}
