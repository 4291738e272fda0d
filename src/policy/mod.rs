//! The four pluggable decision stages.
//!
//! Each stage is a closed enum of strategies, resolved once from
//! [`PolicyConfig`] into concrete objects bound to the engine:
//!
//! - [`selector`] -- picks the next command (REASON).
//! - [`loop_guard`] -- overrides commands that repeat a known loop (REASON).
//! - [`evaluator`] -- turns the transcript into an integer reward (OBSERVE).
//! - [`reflector`] -- comments on the recent play (REFLECT).

pub mod evaluator;
pub mod loop_guard;
pub mod reflector;
pub mod selector;

use std::sync::Arc;

pub use evaluator::{AnyEvaluator, EnvSignals};
pub use loop_guard::{AnyLoopGuard, WindowGuard};
pub use reflector::{AnyReflector, LlmReflector};
pub use selector::{AnySelector, LlmSelector, RandomSelector};

use crate::config::{
    EpisodeConfig, EvaluatorKind, LoopGuardKind, PolicyConfig, ReflectorKind, SelectorKind,
};
use crate::model::AnyCompletion;

/// The resolved policy stages for one episode.
#[derive(Debug)]
pub struct Policies {
    pub selector: AnySelector,
    pub loop_guard: AnyLoopGuard,
    pub evaluator: AnyEvaluator,
    pub reflector: AnyReflector,
}

impl Policies {
    /// Build every stage from configuration. LLM-backed stages share one
    /// completion backend.
    pub fn from_config(
        policy: &PolicyConfig,
        episode: &EpisodeConfig,
        completion: Arc<AnyCompletion>,
    ) -> Self {
        let selector = match &policy.selector {
            SelectorKind::Random => AnySelector::Random(RandomSelector::new()),
            SelectorKind::Llm {
                include_valid_actions,
                system_prompt,
            } => {
                let mut s = LlmSelector::new(Arc::clone(&completion))
                    .with_valid_actions(*include_valid_actions)
                    .with_memory_window(episode.memory_window);
                if let Some(prompt) = system_prompt {
                    s = s.with_system_prompt(prompt.clone());
                }
                AnySelector::Llm(s)
            }
        };

        let loop_guard = match policy.loop_guard {
            LoopGuardKind::Off => AnyLoopGuard::Off,
            LoopGuardKind::Window { size } => AnyLoopGuard::Window(WindowGuard::new(size)),
        };

        let evaluator = match &policy.evaluator {
            EvaluatorKind::Null => AnyEvaluator::Null,
            EvaluatorKind::ScoreDelta => AnyEvaluator::ScoreDelta(Default::default()),
            EvaluatorKind::TextScoreDelta => AnyEvaluator::TextScoreDelta(Default::default()),
            EvaluatorKind::LoopPenalty => AnyEvaluator::LoopPenalty,
            EvaluatorKind::Novelty => AnyEvaluator::Novelty,
            EvaluatorKind::Keyword { keywords, reward } => {
                AnyEvaluator::Keyword(evaluator::KeywordBonus::new(keywords, *reward))
            }
            EvaluatorKind::SelfAssessment { last_n } => AnyEvaluator::SelfAssessment(
                evaluator::SelfAssessment::new(Arc::clone(&completion), *last_n),
            ),
        };

        let reflector = match policy.reflector {
            ReflectorKind::Null => AnyReflector::Null,
            ReflectorKind::Llm {
                last_n,
                first_paragraph_only,
            } => AnyReflector::Llm(LlmReflector::new(completion, last_n, first_paragraph_only)),
        };

        Self {
            selector,
            loop_guard,
            evaluator,
            reflector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedCompletion;

    fn completion() -> Arc<AnyCompletion> {
        Arc::new(AnyCompletion::Scripted(ScriptedCompletion::default()))
    }

    #[test]
    fn default_config_resolves_offline_policies() {
        let config = crate::config::GrueConfig::default();
        let policies = Policies::from_config(&config.policy, &config.episode, completion());
        assert!(matches!(policies.selector, AnySelector::Random(_)));
        assert!(matches!(policies.loop_guard, AnyLoopGuard::Window(ref g) if g.size() == 5));
        assert!(matches!(policies.evaluator, AnyEvaluator::Null));
        assert!(matches!(policies.reflector, AnyReflector::Null));
    }

    #[test]
    fn llm_variants_resolve() {
        let policy = PolicyConfig {
            selector: SelectorKind::Llm {
                include_valid_actions: true,
                system_prompt: Some("Be brief.".into()),
            },
            loop_guard: LoopGuardKind::Off,
            evaluator: EvaluatorKind::SelfAssessment { last_n: 4 },
            reflector: ReflectorKind::Llm {
                last_n: 20,
                first_paragraph_only: true,
            },
        };
        let episode = EpisodeConfig {
            max_steps: Some(3),
            memory_window: None,
        };
        let policies = Policies::from_config(&policy, &episode, completion());
        assert!(matches!(policies.selector, AnySelector::Llm(_)));
        assert!(matches!(policies.loop_guard, AnyLoopGuard::Off));
        assert!(matches!(policies.evaluator, AnyEvaluator::SelfAssessment(_)));
        assert!(matches!(policies.reflector, AnyReflector::Llm(_)));
    }
}
