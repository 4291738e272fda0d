//! Game transports.
//!
//! Every transport implements the [`Environment`] trait so that the episode
//! engine can drive it uniformly.
//!
//! Included transports:
//! - **Process** ([`process`]) -- an interpreter spawned as a child process,
//!   framed on its prompt sentinel.
//! - **Remote** ([`remote`]) -- one session on the HTTP session service.
//! - **Scripted** ([`scripted`]) -- a small deterministic adventure that runs
//!   in-process, for offline runs and tests.

pub mod process;
pub mod remote;
pub mod scripted;
pub mod traits;

pub use process::ProcessEnv;
pub use remote::{GameServiceClient, RemoteEnv, StateSnapshot};
pub use scripted::ScriptedGame;
pub use traits::{Environment, StepOutcome};

use crate::config::{EnvConfig, Transport};

// ---------------------------------------------------------------------------
// AnyEnv: enum dispatch wrapper for transport selection
// ---------------------------------------------------------------------------

/// An enum wrapper around all concrete transports, enabling runtime selection
/// without `dyn` (which is incompatible with async trait methods).
#[derive(Debug)]
pub enum AnyEnv {
    Process(ProcessEnv),
    Remote(RemoteEnv),
    Scripted(ScriptedGame),
}

impl AnyEnv {
    pub fn from_config(config: &EnvConfig) -> Self {
        match &config.transport {
            Transport::Process(c) => Self::Process(ProcessEnv::new(c.clone())),
            Transport::Remote(c) => Self::Remote(RemoteEnv::new(c)),
            Transport::Scripted => Self::Scripted(ScriptedGame::new()),
        }
    }
}

impl Environment for AnyEnv {
    async fn start(&mut self) -> anyhow::Result<Option<String>> {
        match self {
            Self::Process(e) => e.start().await,
            Self::Remote(e) => e.start().await,
            Self::Scripted(e) => e.start().await,
        }
    }

    async fn step(&mut self, action: &str) -> anyhow::Result<Option<StepOutcome>> {
        match self {
            Self::Process(e) => e.step(action).await,
            Self::Remote(e) => e.step(action).await,
            Self::Scripted(e) => e.step(action).await,
        }
    }

    async fn valid_actions(&mut self) -> anyhow::Result<Vec<String>> {
        match self {
            Self::Process(e) => e.valid_actions().await,
            Self::Remote(e) => e.valid_actions().await,
            Self::Scripted(e) => Environment::valid_actions(e).await,
        }
    }

    async fn score(&mut self) -> anyhow::Result<Option<i64>> {
        match self {
            Self::Process(e) => e.score().await,
            Self::Remote(e) => e.score().await,
            Self::Scripted(e) => e.score().await,
        }
    }

    async fn max_score(&mut self) -> anyhow::Result<Option<i64>> {
        match self {
            Self::Process(e) => e.max_score().await,
            Self::Remote(e) => e.max_score().await,
            Self::Scripted(e) => e.max_score().await,
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        match self {
            Self::Process(e) => e.close().await,
            Self::Remote(e) => e.close().await,
            Self::Scripted(e) => e.close().await,
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Process(e) => e.label(),
            Self::Remote(e) => e.label(),
            Self::Scripted(e) => e.label(),
        }
    }
}

/// Start `env`, submit one command and return the response. The environment
/// is closed afterwards on every path.
pub async fn single_action<E: Environment>(env: &mut E, action: &str) -> anyhow::Result<String> {
    let result = start_and_step(env, action).await;
    if let Err(e) = env.close().await {
        tracing::warn!(env = env.label(), error = %e, "failed to close environment");
    }
    result
}

async fn start_and_step<E: Environment>(env: &mut E, action: &str) -> anyhow::Result<String> {
    if env.start().await?.is_none() {
        anyhow::bail!("game produced no output before its first prompt");
    }
    match env.step(action).await? {
        Some(outcome) => Ok(outcome.narration),
        None => anyhow::bail!("game ended before responding"),
    }
}
