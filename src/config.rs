use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete configuration for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrueConfig {
    pub env: EnvConfig,
    pub model: ModelConfig,
    pub policy: PolicyConfig,
    pub episode: EpisodeConfig,
    /// When set, a difficulty profile overrides parts of `policy` and
    /// `episode` (see [`GrueConfig::apply_difficulty`]).
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

/// Which game transport to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    pub transport: Transport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    /// An interpreter launched as a child process, spoken to over stdio.
    Process(ProcessConfig),
    /// A game hosted by the session service.
    Remote(RemoteConfig),
    /// The built-in scripted adventure (offline runs and tests).
    Scripted,
}

/// Child-process transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Interpreter executable (e.g. `./zork` or `dfrotz`).
    pub program: PathBuf,
    /// Extra arguments (e.g. the story file).
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Prompt sentinel that ends each turn (default: newline + `>`).
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    /// Relaunch the interpreter when it exits or its pipe breaks.
    #[serde(default)]
    pub restart_on_exit: bool,
}

/// Session-service transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the session service (e.g. `http://localhost:8000`).
    pub base_url: String,
    /// Session identifier to start (generated when absent).
    #[serde(default)]
    pub session_id: Option<String>,
    /// Story file the service should load; service default when absent.
    #[serde(default)]
    pub game_file: Option<String>,
    /// Delay between polls of the state snapshot.
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
    /// Session-establishment attempts before giving up.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Wait between session-establishment attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Append the polled room description after each step's feedback.
    #[serde(default)]
    pub snapshot_after_step: bool,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Which completion API dialect to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// `POST {api_base}/chat/completions`
    OpenAi,
    /// `POST {api_base}/api/generate`
    Ollama,
}

/// Completion backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub backend: Backend,
    /// Base URL for the API.
    pub api_base: String,
    /// Model identifier (e.g. "llama3.1:8b").
    pub model_id: String,
    /// API key; filled from `OPENAI_API_KEY` when empty.
    #[serde(default)]
    pub api_key: String,
    pub temperature: f64,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

/// The four pluggable decision stages, each a closed set of variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub selector: SelectorKind,
    pub loop_guard: LoopGuardKind,
    pub evaluator: EvaluatorKind,
    pub reflector: ReflectorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectorKind {
    /// Uniform choice over a fixed set of moves.
    Random,
    /// Ask the completion backend for the next command.
    Llm {
        /// Include the game's currently valid actions in the prompt.
        #[serde(default)]
        include_valid_actions: bool,
        /// Replace the default instruction preamble.
        #[serde(default)]
        system_prompt: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopGuardKind {
    Off,
    Window {
        #[serde(default = "default_loop_window")]
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluatorKind {
    Null,
    /// Clamped delta of the game's structured score.
    ScoreDelta,
    /// Raw delta of the latest "N points" mention in the transcript.
    TextScoreDelta,
    LoopPenalty,
    Novelty,
    Keyword {
        keywords: Vec<String>,
        #[serde(default = "default_keyword_reward")]
        reward: i64,
    },
    SelfAssessment {
        #[serde(default = "default_assessment_lines")]
        last_n: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReflectorKind {
    Null,
    Llm {
        #[serde(default = "default_reflection_lines")]
        last_n: usize,
        /// Keep only the text up to the first blank line.
        #[serde(default)]
        first_paragraph_only: bool,
    },
}

/// Per-episode limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeConfig {
    /// Maximum number of full cycles; unbounded when absent.
    #[serde(default)]
    pub max_steps: Option<usize>,
    /// Characters of recent memory shown to the LLM selector.
    #[serde(default)]
    pub memory_window: Option<usize>,
}

/// Preset bundles of policy choices and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Rogue,
}

impl GrueConfig {
    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Overwrite selector, loop guard, step budget and memory window with the
    /// configured difficulty profile. No-op when no difficulty is set.
    ///
    /// A custom system prompt on an LLM selector survives the override.
    pub fn apply_difficulty(&mut self) {
        let Some(difficulty) = self.difficulty else {
            return;
        };

        let system_prompt = match &self.policy.selector {
            SelectorKind::Llm { system_prompt, .. } => system_prompt.clone(),
            SelectorKind::Random => None,
        };
        let llm = |include_valid_actions: bool| SelectorKind::Llm {
            include_valid_actions,
            system_prompt: system_prompt.clone(),
        };
        let window = LoopGuardKind::Window {
            size: default_loop_window(),
        };

        let (selector, loop_guard, max_steps, memory_window) = match difficulty {
            Difficulty::Easy => (llm(true), LoopGuardKind::Off, None, 4000),
            Difficulty::Medium => (llm(false), window, Some(200), 2000),
            Difficulty::Hard => (SelectorKind::Random, window, Some(50), 1000),
            Difficulty::Rogue => (llm(false), window, Some(200), 2000),
        };

        self.policy.selector = selector;
        self.policy.loop_guard = loop_guard;
        self.episode.max_steps = max_steps;
        self.episode.memory_window = Some(memory_window);
    }

    /// Fill an empty API key from the environment.
    pub fn fill_api_key_from_env(&mut self) {
        if self.model.api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.model.api_key = key;
            }
        }
    }
}

impl Default for GrueConfig {
    fn default() -> Self {
        Self {
            env: EnvConfig {
                transport: Transport::Scripted,
            },
            model: ModelConfig {
                backend: Backend::Ollama,
                api_base: "http://localhost:11434".into(),
                model_id: "llama3.1:8b".into(),
                api_key: String::new(),
                temperature: 0.5,
                max_tokens: 256,
                timeout_secs: 120,
            },
            policy: PolicyConfig {
                selector: SelectorKind::Random,
                loop_guard: LoopGuardKind::Window {
                    size: default_loop_window(),
                },
                evaluator: EvaluatorKind::Null,
                reflector: ReflectorKind::Null,
            },
            episode: EpisodeConfig {
                max_steps: Some(200),
                memory_window: Some(2000),
            },
            difficulty: None,
        }
    }
}

fn default_sentinel() -> String {
    crate::stream::DEFAULT_SENTINEL.to_string()
}

fn default_poll_delay_ms() -> u64 {
    100
}

fn default_connect_attempts() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_loop_window() -> usize {
    5
}

fn default_keyword_reward() -> i64 {
    1
}

fn default_assessment_lines() -> usize {
    10
}

fn default_reflection_lines() -> usize {
    20
}
