//! Reward evaluation (the OBSERVE stage).
//!
//! Evaluators see the transcript (the line-split episode memory) and, for
//! the structured score variant, the signals the environment attached to the
//! last step. The engine does not clamp; each variant picks its own range.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::episode::state::{ACTION_PREFIX, REFLECTION_MARKER};
use crate::model::prompt::self_assessment_prompt;
use crate::model::{AnyCompletion, Completion};

/// Structured values reported by the environment for the latest step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvSignals {
    pub score: Option<i64>,
}

// ---------------------------------------------------------------------------
// Score deltas
// ---------------------------------------------------------------------------

/// Signed change of the game's own score, clamped to -1, 0 or 1.
///
/// A step that reports no score counts as no change.
#[derive(Debug, Default)]
pub struct ScoreDelta {
    last: i64,
}

impl ScoreDelta {
    /// Set the baseline the first delta is measured from.
    pub fn prime(&mut self, baseline: Option<i64>) {
        self.last = baseline.unwrap_or(0);
    }

    pub fn evaluate(&mut self, signals: &EnvSignals) -> i64 {
        let Some(current) = signals.score else {
            return 0;
        };
        let delta = current.saturating_sub(self.last);
        self.last = current;
        delta.signum()
    }
}

/// Raw signed change of the latest "N points" mention in the transcript.
///
/// When no line mentions points the last known value is kept, so the delta
/// is zero.
#[derive(Debug, Default)]
pub struct TextScoreDelta {
    last: i64,
}

impl TextScoreDelta {
    pub fn evaluate(&mut self, transcript: &[&str]) -> i64 {
        let current = transcript
            .iter()
            .rev()
            .find_map(|line| points_mentioned(line))
            .unwrap_or(self.last);
        let delta = current.saturating_sub(self.last);
        self.last = current;
        delta
    }
}

/// The first integer in `line` that is immediately followed by a word
/// containing "point".
pub fn points_mentioned(line: &str) -> Option<i64> {
    let words: Vec<&str> = line.split_whitespace().collect();
    words.windows(2).find_map(|pair| {
        let number = pair[0]
            .trim_start_matches(|c: char| !c.is_ascii_digit() && c != '-')
            .parse::<i64>()
            .ok()?;
        pair[1]
            .to_lowercase()
            .contains("point")
            .then_some(number)
    })
}

// ---------------------------------------------------------------------------
// Transcript heuristics
// ---------------------------------------------------------------------------

/// -1 when the latest (observation, action) pair already happened earlier.
///
/// An action line starts with `"> "`; its observation is the last narration
/// line before it. Reflection blocks are not narration.
pub fn loop_penalty(transcript: &[&str]) -> i64 {
    let pairs = action_pairs(transcript);
    match pairs.split_last() {
        Some((last, earlier)) if earlier.contains(last) => -1,
        _ => 0,
    }
}

fn action_pairs<'a>(transcript: &[&'a str]) -> Vec<(&'a str, &'a str)> {
    let mut pairs = Vec::new();
    let mut obs = "";
    let mut in_reflection = false;

    for line in transcript {
        if let Some(action) = line.strip_prefix(ACTION_PREFIX) {
            pairs.push((obs, action.trim()));
            in_reflection = false;
        } else if *line == REFLECTION_MARKER {
            in_reflection = true;
        } else if !in_reflection && !line.trim().is_empty() {
            obs = line;
        }
    }
    pairs
}

/// 1 when the final transcript line appears nowhere else.
pub fn novelty(transcript: &[&str]) -> i64 {
    let Some((last, rest)) = transcript.split_last() else {
        return 0;
    };
    if rest.contains(last) {
        0
    } else {
        1
    }
}

/// Bonus when any keyword appears (case-insensitively) in the final line.
#[derive(Debug)]
pub struct KeywordBonus {
    keywords: Vec<String>,
    reward: i64,
}

impl KeywordBonus {
    pub fn new(keywords: &[String], reward: i64) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            reward,
        }
    }

    pub fn evaluate(&self, transcript: &[&str]) -> i64 {
        let Some(last) = transcript.last() else {
            return 0;
        };
        let last = last.to_lowercase();
        if self.keywords.iter().any(|k| last.contains(k.as_str())) {
            self.reward
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Self-assessment
// ---------------------------------------------------------------------------

/// Asks the completion backend to rate the recent lines.
#[derive(Debug)]
pub struct SelfAssessment {
    completion: Arc<AnyCompletion>,
    last_n: usize,
}

impl SelfAssessment {
    pub fn new(completion: Arc<AnyCompletion>, last_n: usize) -> Self {
        Self { completion, last_n }
    }

    pub async fn evaluate(&self, transcript: &[&str]) -> i64 {
        let start = transcript.len().saturating_sub(self.last_n);
        let prompt = self_assessment_prompt(&transcript[start..]);
        match self.completion.complete(&prompt).await {
            Ok(reply) => first_integer(&reply).map_or(0, |n| n.clamp(-1, 1)),
            Err(e) => {
                warn!(error = %e, "self-assessment completion failed");
                0
            }
        }
    }
}

/// The first integer token anywhere in `text`, with an optional leading '-'.
pub fn first_integer(text: &str) -> Option<i64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let negative = i > 0 && bytes[i - 1] == b'-';
            let end = bytes[i..]
                .iter()
                .position(|b| !b.is_ascii_digit())
                .map_or(bytes.len(), |p| i + p);
            let start = if negative { i - 1 } else { i };
            // Saturate absurdly long numbers; only the sign matters after clamping.
            return Some(text[start..end].parse::<i64>().unwrap_or(if negative {
                i64::MIN
            } else {
                i64::MAX
            }));
        }
        i += 1;
    }
    None
}

// ---------------------------------------------------------------------------
// AnyEvaluator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AnyEvaluator {
    Null,
    ScoreDelta(ScoreDelta),
    TextScoreDelta(TextScoreDelta),
    LoopPenalty,
    Novelty,
    Keyword(KeywordBonus),
    SelfAssessment(SelfAssessment),
}

impl AnyEvaluator {
    /// Give score-tracking variants the game's score before the first step.
    pub fn prime(&mut self, baseline: Option<i64>) {
        if let Self::ScoreDelta(e) = self {
            e.prime(baseline);
        }
    }

    pub async fn evaluate(&mut self, transcript: &[&str], signals: &EnvSignals) -> i64 {
        match self {
            Self::Null => 0,
            Self::ScoreDelta(e) => e.evaluate(signals),
            Self::TextScoreDelta(e) => e.evaluate(transcript),
            Self::LoopPenalty => loop_penalty(transcript),
            Self::Novelty => novelty(transcript),
            Self::Keyword(e) => e.evaluate(transcript),
            Self::SelfAssessment(e) => e.evaluate(transcript).await,
        }
    }
}
