//! Core environment trait and shared types.
//!
//! Every game transport (subprocess, remote service, scripted) implements the
//! [`Environment`] trait so that the episode engine can drive it uniformly.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// What the environment reports after an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// The narration produced in response to the action.
    pub narration: String,
    /// Whether the game has reached a terminal state.
    pub done: bool,
    /// The game's own score, when the transport exposes it.
    #[serde(default)]
    pub score: Option<i64>,
    /// The game's move counter, when the transport exposes it.
    #[serde(default)]
    pub moves: Option<u32>,
}

impl StepOutcome {
    /// An outcome that carries narration only (no structured signals).
    pub fn narration(text: impl Into<String>) -> Self {
        Self {
            narration: text.into(),
            done: false,
            score: None,
            moves: None,
        }
    }
}

/// The core environment trait.
///
/// `start` and `step` return `Ok(None)` when the environment's output has
/// ended (the process exited, the remote session vanished). That is a normal
/// stop, not an error; errors are reserved for transport failures.
#[allow(async_fn_in_trait)]
pub trait Environment: Send {
    /// Bring the game up and return its opening narration.
    async fn start(&mut self) -> Result<Option<String>>;

    /// Submit one command and return what the game said back.
    async fn step(&mut self, action: &str) -> Result<Option<StepOutcome>>;

    /// Commands the game's parser currently accepts.
    async fn valid_actions(&mut self) -> Result<Vec<String>> {
        bail!("{} does not expose valid actions", self.label())
    }

    /// Current score read directly from the game, if available.
    async fn score(&mut self) -> Result<Option<i64>> {
        Ok(None)
    }

    /// Highest attainable score, if the game reports one.
    async fn max_score(&mut self) -> Result<Option<i64>> {
        Ok(None)
    }

    /// Release the underlying game. Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;

    /// Short label for logs (e.g. "process", "remote").
    fn label(&self) -> &str;
}
