//! The REASON -> ACT -> OBSERVE -> REFLECT cycle.
//!
//! One [`EpisodeEngine`] owns one environment for the whole episode. Stages
//! run strictly in sequence; the only outside influence is a
//! [`CancellationToken`] checked at every point where a stage waits on the
//! environment or the completion backend.

use std::future::Future;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::EpisodeState;
use crate::env::Environment;
use crate::policy::{AnyEvaluator, EnvSignals, Policies};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Reason,
    Act,
    Observe,
    Reflect,
}

impl Stage {
    /// The stage that follows this one. REFLECT wraps around to REASON.
    pub fn next(self) -> Self {
        match self {
            Self::Reason => Self::Act,
            Self::Act => Self::Observe,
            Self::Observe => Self::Reflect,
            Self::Reflect => Self::Reason,
        }
    }
}

/// Why the engine stopped advancing the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The game reported a terminal state.
    Done,
    /// The configured number of cycles ran.
    StepBudget,
    /// The game's output ended.
    EndOfInput,
    /// The cancellation token fired.
    Cancelled,
}

/// The result of one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub initial_obs: String,
    pub state: EpisodeState,
    /// Completed cycles.
    pub steps: usize,
    pub stop_reason: StopReason,
    /// Last score the game reported, if it reports one.
    pub final_score: Option<i64>,
    /// Highest attainable score, if the game reports one.
    #[serde(default)]
    pub max_score: Option<i64>,
    pub moves: Option<u32>,
}

#[derive(Debug, Default)]
struct Progress {
    initial_obs: String,
    steps: usize,
    score: Option<i64>,
    max_score: Option<i64>,
    moves: Option<u32>,
}

impl Progress {
    fn finish(self, state: EpisodeState, stop_reason: StopReason) -> EpisodeOutcome {
        EpisodeOutcome {
            initial_obs: self.initial_obs,
            state,
            steps: self.steps,
            stop_reason,
            final_score: self.score,
            max_score: self.max_score,
            moves: self.moves,
        }
    }
}

/// `None` if `cancel` fires before `fut` completes.
async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

pub struct EpisodeEngine<E: Environment> {
    env: E,
    policies: Policies,
    max_steps: Option<usize>,
    cancel: CancellationToken,
    stage: Stage,
}

impl<E: Environment> EpisodeEngine<E> {
    pub fn new(env: E, policies: Policies, max_steps: Option<usize>) -> Self {
        Self {
            env,
            policies,
            max_steps,
            cancel: CancellationToken::new(),
            stage: Stage::Reason,
        }
    }

    /// Use an externally owned token (e.g. one shared with a signal handler).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn into_env(self) -> E {
        self.env
    }

    /// Run one episode to completion.
    ///
    /// The environment is closed before this returns, whether the episode
    /// ended normally, was cancelled, or failed.
    pub async fn run(&mut self) -> Result<EpisodeOutcome> {
        let result = self.drive().await;
        if let Err(e) = self.env.close().await {
            warn!(env = self.env.label(), error = %e, "failed to close environment");
        }
        match &result {
            Ok(outcome) => info!(
                steps = outcome.steps,
                stop = ?outcome.stop_reason,
                score = ?outcome.final_score,
                "episode finished"
            ),
            Err(e) => warn!(error = %e, "episode aborted"),
        }
        result
    }

    fn enter(&mut self, stage: Stage) {
        debug_assert_eq!(self.stage.next(), stage, "stages must follow the cycle");
        self.stage = stage;
        debug!(?stage, "entering stage");
    }

    async fn drive(&mut self) -> Result<EpisodeOutcome> {
        let cancel = self.cancel.clone();
        self.stage = Stage::Reflect;
        let mut progress = Progress::default();

        let Some(started) = or_cancel(&cancel, self.env.start()).await else {
            return Ok(progress.finish(EpisodeState::default(), StopReason::Cancelled));
        };
        let Some(initial_obs) = started? else {
            return Ok(progress.finish(EpisodeState::default(), StopReason::EndOfInput));
        };
        info!(env = self.env.label(), "episode started");
        progress.initial_obs = initial_obs.clone();
        let mut state = EpisodeState::new(initial_obs);

        progress.max_score = match self.env.max_score().await {
            Ok(max) => max,
            Err(e) => {
                warn!(error = %e, "could not read maximum score");
                None
            }
        };

        if matches!(self.policies.evaluator, AnyEvaluator::ScoreDelta(_)) {
            let baseline = match self.env.score().await {
                Ok(score) => score,
                Err(e) => {
                    warn!(error = %e, "could not read starting score");
                    None
                }
            };
            progress.score = baseline;
            self.policies.evaluator.prime(baseline);
        }

        loop {
            if cancel.is_cancelled() {
                return Ok(progress.finish(state, StopReason::Cancelled));
            }
            if self.max_steps.is_some_and(|max| progress.steps >= max) {
                return Ok(progress.finish(state, StopReason::StepBudget));
            }

            // REASON
            self.enter(Stage::Reason);
            let Some(proposed) =
                or_cancel(&cancel, self.policies.selector.choose(&state, &mut self.env)).await
            else {
                return Ok(progress.finish(state, StopReason::Cancelled));
            };
            let action = self.policies.loop_guard.guard(&state.obs, &proposed);
            state.last_action = Some(action.clone());

            // ACT
            self.enter(Stage::Act);
            let Some(stepped) = or_cancel(&cancel, self.env.step(&action)).await else {
                return Ok(progress.finish(state, StopReason::Cancelled));
            };
            let Some(outcome) = stepped? else {
                return Ok(progress.finish(state, StopReason::EndOfInput));
            };
            state.record_act(&action, &outcome.narration, outcome.done);
            progress.score = outcome.score.or(progress.score);
            progress.moves = outcome.moves.or(progress.moves);

            // OBSERVE
            self.enter(Stage::Observe);
            let signals = EnvSignals {
                score: outcome.score,
            };
            let transcript = state.transcript();
            let Some(reward) = or_cancel(
                &cancel,
                self.policies.evaluator.evaluate(&transcript, &signals),
            )
            .await
            else {
                return Ok(progress.finish(state, StopReason::Cancelled));
            };
            state.reward = reward;

            // REFLECT
            self.enter(Stage::Reflect);
            let transcript = state.transcript();
            let Some(reflection) =
                or_cancel(&cancel, self.policies.reflector.reflect(&transcript, reward)).await
            else {
                return Ok(progress.finish(state, StopReason::Cancelled));
            };
            state.record_reflection(&reflection);

            progress.steps += 1;
            info!(
                step = progress.steps,
                action = %action,
                reward,
                done = state.done,
                "step complete"
            );

            if state.done {
                return Ok(progress.finish(state, StopReason::Done));
            }
        }
    }
}
