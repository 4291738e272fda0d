//! Action selection (the REASON stage).

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::env::Environment;
use crate::episode::EpisodeState;
use crate::model::prompt::{action_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::model::{AnyCompletion, Completion};

/// Returned whenever the completion backend cannot produce a usable command.
pub const FALLBACK_ACTION: &str = "look";

/// Moves the random selector picks from.
pub const BASIC_ACTIONS: [&str; 5] = ["look", "north", "south", "east", "west"];

// ---------------------------------------------------------------------------
// Random
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RandomSelector {
    rng: StdRng,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn choose(&mut self) -> String {
        BASIC_ACTIONS
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(FALLBACK_ACTION)
            .to_string()
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Asks the completion backend for the next command.
#[derive(Debug)]
pub struct LlmSelector {
    completion: Arc<AnyCompletion>,
    system_prompt: String,
    include_valid_actions: bool,
    memory_window: Option<usize>,
}

impl LlmSelector {
    pub fn new(completion: Arc<AnyCompletion>) -> Self {
        Self {
            completion,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            include_valid_actions: false,
            memory_window: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_valid_actions(mut self, include: bool) -> Self {
        self.include_valid_actions = include;
        self
    }

    /// Show up to `chars` characters of recent memory in the prompt.
    pub fn with_memory_window(mut self, chars: Option<usize>) -> Self {
        self.memory_window = chars;
        self
    }

    pub async fn choose<E: Environment>(&self, state: &EpisodeState, env: &mut E) -> String {
        let valid_actions = if self.include_valid_actions {
            match env.valid_actions().await {
                Ok(actions) => actions,
                Err(e) => {
                    debug!(error = %e, "valid actions unavailable, omitting hint");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let history = self
            .memory_window
            .filter(|w| *w > 0)
            .map(|w| state.recent_memory(w));

        let prompt = action_prompt(&self.system_prompt, &state.obs, &valid_actions, history);

        match self.completion.complete(&prompt).await {
            Ok(reply) => first_line(&reply),
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_ACTION, "action completion failed");
                FALLBACK_ACTION.to_string()
            }
        }
    }
}

/// First line of a reply, trimmed; the fallback when that line is blank.
pub fn first_line(reply: &str) -> String {
    let line = reply.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        warn!(fallback = FALLBACK_ACTION, "completion returned an empty command");
        return FALLBACK_ACTION.to_string();
    }
    line.to_string()
}

// ---------------------------------------------------------------------------
// AnySelector
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AnySelector {
    Random(RandomSelector),
    Llm(LlmSelector),
}

impl AnySelector {
    /// Pick the next command. Always a single non-empty line.
    pub async fn choose<E: Environment>(&mut self, state: &EpisodeState, env: &mut E) -> String {
        match self {
            Self::Random(s) => s.choose(),
            Self::Llm(s) => s.choose(state, env).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ScriptedGame;
    use crate::model::ScriptedCompletion;

    fn llm(replies: &[&str]) -> (LlmSelector, Arc<AnyCompletion>) {
        let completion = Arc::new(AnyCompletion::Scripted(ScriptedCompletion::new(
            replies.iter().copied(),
        )));
        (LlmSelector::new(Arc::clone(&completion)), completion)
    }

    fn prompts(completion: &AnyCompletion) -> Vec<String> {
        match completion {
            AnyCompletion::Scripted(c) => c.prompts(),
            AnyCompletion::Http(_) => unreachable!(),
        }
    }

    #[test]
    fn random_selector_stays_in_basic_set() {
        let mut selector = RandomSelector::seeded(7);
        for _ in 0..50 {
            let action = selector.choose();
            assert!(BASIC_ACTIONS.contains(&action.as_str()));
        }
    }

    #[tokio::test]
    async fn llm_selector_takes_first_line_only() {
        let (selector, _) = llm(&["  open mailbox  \nBecause mail is fun.\nMore text."]);
        let mut env = ScriptedGame::new();
        let state = EpisodeState::new("West of House");
        assert_eq!(selector.choose(&state, &mut env).await, "open mailbox");
    }

    #[tokio::test]
    async fn llm_selector_falls_back_on_failure() {
        let (selector, _) = llm(&[]);
        let mut env = ScriptedGame::new();
        let state = EpisodeState::new("West of House");
        assert_eq!(selector.choose(&state, &mut env).await, FALLBACK_ACTION);
    }

    #[tokio::test]
    async fn llm_selector_falls_back_on_blank_reply() {
        let (selector, _) = llm(&["\n\nnorth"]);
        let mut env = ScriptedGame::new();
        let state = EpisodeState::new("West of House");
        assert_eq!(selector.choose(&state, &mut env).await, FALLBACK_ACTION);
    }

    #[tokio::test]
    async fn valid_action_hint_is_included_when_available() {
        let (selector, completion) = llm(&["north"]);
        let selector = selector.with_valid_actions(true);
        let mut env = ScriptedGame::new();
        env.reset();
        let state = EpisodeState::new("West of House");
        selector.choose(&state, &mut env).await;
        assert!(prompts(&completion)[0].contains("Valid actions: north, south"));
    }

    #[tokio::test]
    async fn valid_action_failure_only_omits_hint() {
        use crate::config::ProcessConfig;
        use crate::env::ProcessEnv;

        let (selector, completion) = llm(&["north"]);
        let selector = selector.with_valid_actions(true);
        // Process transports do not expose valid actions.
        let mut env = ProcessEnv::new(ProcessConfig {
            program: "zork".into(),
            args: vec![],
            cwd: None,
            sentinel: "\n>".into(),
            restart_on_exit: false,
        });
        let state = EpisodeState::new("West of House");
        assert_eq!(selector.choose(&state, &mut env).await, "north");
        assert!(!prompts(&completion)[0].contains("Valid actions"));
    }

    #[tokio::test]
    async fn memory_window_adds_history() {
        let (selector, completion) = llm(&["east"]);
        let selector = selector.with_memory_window(Some(100));
        let mut env = ScriptedGame::new();
        let mut state = EpisodeState::new("West of House");
        state.record_act("north", "North of House", false);
        selector.choose(&state, &mut env).await;
        assert!(prompts(&completion)[0].contains("Recent history:\n> north"));
    }
}
