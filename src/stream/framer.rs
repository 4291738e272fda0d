//! Sentinel-based turn framing.
//!
//! The framer is fed one byte at a time and checks the buffer's suffix after
//! every byte. It deliberately does not work line by line: interpreters do not
//! always emit a newline before their prompt, so the sentinel has to be found
//! at arbitrary buffer offsets.

use super::Turn;

/// The prompt most Z-machine interpreters print: a newline followed by `>`.
pub const DEFAULT_SENTINEL: &str = "\n>";

/// Accumulates bytes until the buffer ends with the sentinel.
///
/// A completed turn is the whole trimmed buffer, so the prompt marker is the
/// last thing in it.
#[derive(Debug, Clone)]
pub struct TurnFramer {
    sentinel: Vec<u8>,
    buffer: Vec<u8>,
}

impl TurnFramer {
    /// Create a framer for the given sentinel.
    ///
    /// An empty sentinel would match after every byte, so it falls back to
    /// [`DEFAULT_SENTINEL`].
    pub fn new(sentinel: &str) -> Self {
        let sentinel = if sentinel.is_empty() {
            DEFAULT_SENTINEL
        } else {
            sentinel
        };
        Self {
            sentinel: sentinel.as_bytes().to_vec(),
            buffer: Vec::new(),
        }
    }

    /// Feed one byte; returns a turn when the sentinel has just completed.
    pub fn push(&mut self, byte: u8) -> Option<Turn> {
        self.buffer.push(byte);
        if !self.buffer.ends_with(&self.sentinel) {
            return None;
        }

        // The sentinel stays in the turn; trimming only removes surrounding
        // whitespace.
        let text = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        Some(Turn::new(text))
    }

    /// Feed a chunk, collecting every turn it completes.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<Turn> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Bytes received since the last completed turn.
    ///
    /// These are never emitted as a turn: at end of stream they are dropped.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn sentinel(&self) -> &[u8] {
        &self.sentinel
    }

    /// Discard any partial turn.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for TurnFramer {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(input: &str) -> Vec<String> {
        TurnFramer::default()
            .push_slice(input.as_bytes())
            .into_iter()
            .map(Turn::into_string)
            .collect()
    }

    #[test]
    fn yields_one_turn_per_sentinel() {
        let input = "West of House\nYou are standing in an open field.\n>\
                     Opening the mailbox reveals a leaflet.\n>\
                     Taken.\n>";
        let turns = frame(input);
        assert_eq!(
            turns,
            vec![
                "West of House\nYou are standing in an open field.\n>",
                "Opening the mailbox reveals a leaflet.\n>",
                "Taken.\n>",
            ]
        );
    }

    #[test]
    fn partial_trailing_output_is_not_a_turn() {
        let mut framer = TurnFramer::default();
        let turns = framer.push_slice(b"Welcome\n>You hear a noise");
        assert_eq!(turns.len(), 1);
        assert_eq!(framer.pending(), b"You hear a noise");
    }

    #[test]
    fn no_sentinel_means_no_turns() {
        assert!(frame("narration without a prompt > here").is_empty());
    }

    #[test]
    fn sentinel_found_without_line_boundary_in_body() {
        // The body itself has no trailing newline; only the sentinel does.
        let turns = frame("  Dark room  \n>It is pitch black.\n>");
        assert_eq!(turns, vec!["Dark room  \n>", "It is pitch black.\n>"]);
    }

    #[test]
    fn bare_sentinel_yields_prompt_only_turn() {
        assert_eq!(frame("\n>\n>"), vec![">", ">"]);
    }

    #[test]
    fn custom_multibyte_sentinel() {
        let mut framer = TurnFramer::new("\n» ");
        let turns = framer.push_slice("Bonjour\n» Au revoir\n» ".as_bytes());
        let turns: Vec<_> = turns.into_iter().map(Turn::into_string).collect();
        assert_eq!(turns, vec!["Bonjour\n»", "Au revoir\n»"]);
    }

    #[test]
    fn turn_keeps_the_prompt_marker() {
        let turns = TurnFramer::default().push_slice(b"West of House\nA field.\n>");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].as_str(), "West of House\nA field.\n>");
    }

    #[test]
    fn empty_sentinel_falls_back_to_default() {
        let framer = TurnFramer::new("");
        assert_eq!(framer.sentinel(), DEFAULT_SENTINEL.as_bytes());
    }

    #[test]
    fn k_sentinels_yield_k_turns() {
        for k in 0..6 {
            let input: String = (0..k).map(|i| format!("turn {i}\n>")).collect();
            let turns = frame(&input);
            assert_eq!(turns.len(), k);
            for (i, turn) in turns.iter().enumerate() {
                assert_eq!(turn, &format!("turn {i}\n>"));
            }
        }
    }
}
