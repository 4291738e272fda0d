//! Post-run summaries and episode records.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::episode::state::ACTION_PREFIX;
use crate::episode::{EpisodeOutcome, StopReason};

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Summary statistics for one finished episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub final_score: Option<i64>,
    pub max_score: Option<i64>,
    /// `final_score / max_score`, rounded to three decimals.
    pub score_pct: Option<f64>,
    pub moves: Option<u32>,
    pub game_done: bool,
    pub steps: usize,
    pub stop_reason: StopReason,
    /// Distinct first lines among the observations (a rough room count).
    pub unique_rooms: usize,
    /// Distinct first words among the commands.
    pub unique_verbs: usize,
    pub last_obs: Option<String>,
}

impl RunReport {
    pub fn from_outcome(outcome: &EpisodeOutcome) -> Self {
        let transcript = outcome.state.transcript();
        let last_obs = if outcome.steps == 0 && outcome.state.obs.is_empty() {
            None
        } else {
            Some(outcome.state.obs.clone())
        };

        Self {
            final_score: outcome.final_score,
            max_score: outcome.max_score,
            score_pct: score_fraction(outcome.final_score, outcome.max_score),
            moves: outcome.moves,
            game_done: outcome.state.done,
            steps: outcome.steps,
            stop_reason: outcome.stop_reason,
            unique_rooms: unique_rooms(&outcome.initial_obs, &transcript),
            unique_verbs: unique_verbs(&transcript),
            last_obs,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        writeln!(f, "final score:  {}", or_dash(self.final_score.map(|s| s.to_string())))?;
        writeln!(f, "max score:    {}", or_dash(self.max_score.map(|s| s.to_string())))?;
        writeln!(
            f,
            "score pct:    {}",
            or_dash(self.score_pct.map(|p| format!("{:.1}%", p * 100.0)))
        )?;
        writeln!(f, "moves:        {}", or_dash(self.moves.map(|m| m.to_string())))?;
        writeln!(f, "game done:    {}", self.game_done)?;
        writeln!(f, "steps:        {}", self.steps)?;
        writeln!(f, "stopped by:   {:?}", self.stop_reason)?;
        writeln!(f, "unique rooms: {}", self.unique_rooms)?;
        write!(f, "unique verbs: {}", self.unique_verbs)
    }
}

/// `None` unless both scores are known and the maximum is positive.
fn score_fraction(score: Option<i64>, max_score: Option<i64>) -> Option<f64> {
    match (score, max_score) {
        (Some(score), Some(max)) if max > 0 => {
            Some((score as f64 / max as f64 * 1000.0).round() / 1000.0)
        }
        _ => None,
    }
}

fn unique_rooms(initial_obs: &str, transcript: &[&str]) -> usize {
    let mut rooms = HashSet::new();
    if let Some(first) = initial_obs.lines().find(|l| !l.trim().is_empty()) {
        rooms.insert(first.trim());
    }
    // The narration for a command starts on the line after it.
    for pair in transcript.windows(2) {
        if pair[0].starts_with(ACTION_PREFIX) && !pair[1].trim().is_empty() {
            rooms.insert(pair[1].trim());
        }
    }
    rooms.len()
}

fn unique_verbs(transcript: &[&str]) -> usize {
    transcript
        .iter()
        .filter_map(|line| line.strip_prefix(ACTION_PREFIX))
        .filter_map(|command| command.split_whitespace().next())
        .map(str::to_lowercase)
        .collect::<HashSet<_>>()
        .len()
}

// ---------------------------------------------------------------------------
// Episode record
// ---------------------------------------------------------------------------

/// Everything worth keeping about one episode, saved as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Transport label (e.g. "process").
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub report: RunReport,
    pub outcome: EpisodeOutcome,
}

impl EpisodeRecord {
    pub fn new(
        environment: &str,
        started_at: DateTime<Utc>,
        outcome: EpisodeOutcome,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            environment: environment.to_string(),
            started_at,
            finished_at: Utc::now(),
            report: RunReport::from_outcome(&outcome),
            outcome,
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize episode record to JSON")?;
        std::fs::write(path.as_ref(), json).with_context(|| {
            format!("Failed to write episode record to {}", path.as_ref().display())
        })?;
        tracing::info!(
            path = %path.as_ref().display(),
            id = %self.id,
            steps = self.report.steps,
            "Saved episode record"
        );
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read episode record from {}", path.as_ref().display())
        })?;
        serde_json::from_str(&data).context("Failed to deserialize episode record JSON")
    }
}

/// Write the raw episode memory (initial narration first) to a text file.
pub fn dump_history(outcome: &EpisodeOutcome, path: impl AsRef<Path>) -> Result<()> {
    let text = format!("{}{}\n", outcome.initial_obs, outcome.state.memory);
    std::fs::write(path.as_ref(), text)
        .with_context(|| format!("Failed to write history to {}", path.as_ref().display()))?;
    tracing::info!(path = %path.as_ref().display(), "Wrote episode history");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::EpisodeState;

    fn outcome() -> EpisodeOutcome {
        let mut state = EpisodeState::new("West of House\nA field.");
        state.record_act("north", "North of House\nNo door.", false);
        state.record_reflection("Keep exploring.");
        state.record_act("Take egg", "Taken.", false);
        state.record_reflection("");
        state.record_act("south", "West of House\nA field.", false);
        state.record_reflection("");
        EpisodeOutcome {
            initial_obs: "West of House\nA field.".into(),
            state,
            steps: 3,
            stop_reason: StopReason::StepBudget,
            final_score: Some(5),
            max_score: Some(15),
            moves: Some(3),
        }
    }

    #[test]
    fn report_counts_rooms_and_verbs() {
        let report = RunReport::from_outcome(&outcome());
        // "West of House", "North of House", "Taken."
        assert_eq!(report.unique_rooms, 3);
        // north, take, south
        assert_eq!(report.unique_verbs, 3);
        assert_eq!(report.final_score, Some(5));
        assert_eq!(report.max_score, Some(15));
        assert_eq!(report.score_pct, Some(0.333));
        assert_eq!(report.last_obs.as_deref(), Some("West of House\nA field."));
        assert!(!report.game_done);
    }

    #[test]
    fn report_display_fills_missing_values() {
        let mut o = outcome();
        o.final_score = None;
        let text = RunReport::from_outcome(&o).to_string();
        assert!(text.contains("final score:  -"));
        assert!(text.contains("max score:    15"));
        assert!(text.contains("score pct:    -"));
        assert!(text.contains("steps:        3"));
    }

    #[test]
    fn empty_episode_report() {
        let o = EpisodeOutcome {
            initial_obs: String::new(),
            state: EpisodeState::default(),
            steps: 0,
            stop_reason: StopReason::EndOfInput,
            final_score: None,
            max_score: None,
            moves: None,
        };
        let report = RunReport::from_outcome(&o);
        assert_eq!(report.unique_rooms, 0);
        assert_eq!(report.unique_verbs, 0);
        assert_eq!(report.last_obs, None);
        assert_eq!(report.score_pct, None);
    }

    #[test]
    fn score_fraction_needs_a_positive_maximum() {
        assert_eq!(score_fraction(Some(15), Some(15)), Some(1.0));
        assert_eq!(score_fraction(Some(2), Some(3)), Some(0.667));
        assert_eq!(score_fraction(Some(-5), Some(10)), Some(-0.5));
        assert_eq!(score_fraction(Some(5), Some(0)), None);
        assert_eq!(score_fraction(None, Some(10)), None);
        assert_eq!(score_fraction(Some(5), None), None);
    }

    #[test]
    fn display_shows_percentage() {
        let text = RunReport::from_outcome(&outcome()).to_string();
        assert!(text.contains("score pct:    33.3%"), "{text}");
    }

    #[test]
    fn record_save_and_load() {
        let record = EpisodeRecord::new("scripted", Utc::now(), outcome());
        let tmp = std::env::temp_dir().join(format!("grue_record_{}.json", record.id));
        record.save_to_file(&tmp).unwrap();
        let loaded = EpisodeRecord::load_from_file(&tmp).unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.report, record.report);
        assert_eq!(loaded.outcome.state, record.outcome.state);
        std::fs::remove_file(tmp).ok();
    }

    #[test]
    fn history_dump_starts_with_intro() {
        let tmp = std::env::temp_dir().join(format!("grue_history_{}.txt", uuid::Uuid::new_v4()));
        dump_history(&outcome(), &tmp).unwrap();
        let text = std::fs::read_to_string(&tmp).unwrap();
        assert!(text.starts_with("West of House\nA field.\n> north\n"));
        std::fs::remove_file(tmp).ok();
    }
}
