//! Grue: an episodic control loop for LLM agents playing text adventures.
//!
//! An [`episode::EpisodeEngine`] drives a game through repeated
//! REASON -> ACT -> OBSERVE -> REFLECT cycles, with every decision delegated
//! to a pluggable [`policy`] stage. Games are reached through [`env`]
//! transports: an interpreter subprocess framed by its prompt sentinel
//! ([`stream`]), a remote session service, or a built-in scripted adventure.

pub mod config;
pub mod env;
pub mod episode;
pub mod model;
pub mod policy;
pub mod report;
pub mod session;
pub mod stream;

#[cfg(test)]
mod testing;
