//! Episode state and the control loop that drives it.

pub mod engine;
pub mod state;

pub use engine::{EpisodeEngine, EpisodeOutcome, Stage, StopReason};
pub use state::EpisodeState;
