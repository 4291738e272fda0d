use serde::{Deserialize, Serialize};

/// Prefix marking a command line in the episode memory.
pub const ACTION_PREFIX: &str = "> ";

/// Header line opening a reflection block in the episode memory.
pub const REFLECTION_MARKER: &str = "[Reflection]";

/// Everything the engine knows about the episode so far.
///
/// `memory` is append-only and records every action, narration and
/// reflection in the order the stages ran; [`EpisodeState::transcript`] is its
/// line-split view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeState {
    /// The most recent narration.
    pub obs: String,
    pub memory: String,
    pub last_action: Option<String>,
    /// `"{narration}::{action}"` signature per completed ACT stage.
    pub seen: Vec<String>,
    pub reward: i64,
    pub reflection: String,
    pub done: bool,
}

impl EpisodeState {
    pub fn new(initial_obs: impl Into<String>) -> Self {
        Self {
            obs: initial_obs.into(),
            ..Self::default()
        }
    }

    /// Record an action and the narration it produced.
    pub fn record_act(&mut self, action: &str, narration: &str, done: bool) {
        self.memory
            .push_str(&format!("\n{ACTION_PREFIX}{action}\n{narration}"));
        self.seen.push(format!("{narration}::{action}"));
        self.obs = narration.to_string();
        self.done = done;
    }

    /// Record a reflection block.
    pub fn record_reflection(&mut self, text: &str) {
        self.memory
            .push_str(&format!("\n{REFLECTION_MARKER}\n{text}"));
        self.reflection = text.to_string();
    }

    /// The line-split view of memory.
    pub fn transcript(&self) -> Vec<&str> {
        self.memory.lines().collect()
    }

    /// The last `window` characters of memory, cut on a character boundary.
    pub fn recent_memory(&self, window: usize) -> &str {
        let total = self.memory.chars().count();
        if total <= window {
            return &self.memory;
        }
        let skip = total - window;
        match self.memory.char_indices().nth(skip) {
            Some((at, _)) => &self.memory[at..],
            None => "",
        }
    }

    /// Number of action blocks in memory.
    pub fn action_count(&self) -> usize {
        self.seen.len()
    }

    /// Number of reflection blocks in memory.
    pub fn reflection_count(&self) -> usize {
        self.transcript()
            .iter()
            .filter(|line| **line == REFLECTION_MARKER)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_act_appends_block_and_signature() {
        let mut state = EpisodeState::new("West of House");
        state.record_act("north", "North of House", false);

        assert_eq!(state.memory, "\n> north\nNorth of House");
        assert_eq!(state.seen, vec!["North of House::north"]);
        assert_eq!(state.obs, "North of House");
        assert!(!state.done);
    }

    #[test]
    fn transcript_preserves_order() {
        let mut state = EpisodeState::new("start");
        state.record_act("look", "A field.", false);
        state.record_reflection("Try moving.");
        state.record_act("north", "A forest.", true);

        assert_eq!(
            state.transcript(),
            vec!["", "> look", "A field.", "[Reflection]", "Try moving.", "> north", "A forest."]
        );
        assert_eq!(state.action_count(), 2);
        assert_eq!(state.reflection_count(), 1);
        assert!(state.done);
    }

    #[test]
    fn empty_reflection_still_counts_as_a_block() {
        let mut state = EpisodeState::new("start");
        state.record_act("look", "A field.", false);
        state.record_reflection("");
        assert_eq!(state.reflection_count(), 1);
        assert_eq!(state.reflection, "");
    }

    #[test]
    fn recent_memory_respects_char_boundaries() {
        let mut state = EpisodeState::new("");
        state.record_act("look", "café au lait", false);
        assert_eq!(state.recent_memory(4), "lait");
        assert_eq!(state.recent_memory(7), "au lait");
        assert_eq!(state.recent_memory(10_000), state.memory);
        assert_eq!(state.recent_memory(0), "");
    }
}
