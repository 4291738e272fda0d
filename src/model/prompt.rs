//! Prompt templates for the policy stages.
//!
//! Each function builds one plain-text prompt for [`super::Completion`]:
//!
//! - **Action**: pick the next command from the current observation.
//! - **Reflection**: comment on a stretch of play given its reward.
//! - **Self-assessment**: rate a stretch of play on a -1..=1 scale.

/// Instruction preamble used when no custom system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an AI agent playing a text-based adventure. Respond with exactly one valid command.";

// ---------------------------------------------------------------------------
// Action prompt
// ---------------------------------------------------------------------------

/// Build the action-selection prompt.
///
/// `valid_actions` is rendered as a one-line hint when non-empty; `history`
/// is an optional window of recent memory shown before the observation.
pub fn action_prompt(
    system_prompt: &str,
    observation: &str,
    valid_actions: &[String],
    history: Option<&str>,
) -> String {
    let mut prompt = format!("{system_prompt}\n\n");

    if let Some(history) = history.map(str::trim).filter(|h| !h.is_empty()) {
        prompt.push_str(&format!("Recent history:\n{history}\n\n"));
    }

    prompt.push_str(&format!("Observation:\n{}\n", observation.trim()));

    if !valid_actions.is_empty() {
        prompt.push_str(&format!("Valid actions: {}\n", valid_actions.join(", ")));
    }

    prompt.push_str("\nNext command:");
    prompt
}

// ---------------------------------------------------------------------------
// Reflection prompt
// ---------------------------------------------------------------------------

/// Build the reflection prompt from the tail of the transcript.
pub fn reflection_prompt(recent_lines: &[&str], reward: i64) -> String {
    format!(
        "You are navigating an environment broken down to text.\n\
         Here is what happened recently:\n\
         {}\n\n\
         You received a reward of {reward}.\n\
         Briefly reflect on why that outcome occurred, and what to do differently next time.",
        recent_lines.join("\n")
    )
}

// ---------------------------------------------------------------------------
// Self-assessment prompt
// ---------------------------------------------------------------------------

/// Build the self-assessment rubric prompt.
pub fn self_assessment_prompt(recent_lines: &[&str]) -> String {
    format!(
        "You are judging progress in a text adventure.\n\
         Here are the most recent lines of play:\n\
         {}\n\n\
         Rate the last action: answer 1 if it made progress, 0 if it made no \
         difference, -1 if it was a mistake. Reply with the number only.",
        recent_lines.join("\n")
    )
}
