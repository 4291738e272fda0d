//! Turn framing over the environment's narration stream.
//!
//! A text adventure interpreter never frames its output: it prints narration
//! and then a prompt, and waits. This module turns that unframed stream into
//! discrete [`Turn`]s.
//!
//! - [`framer::TurnFramer`] -- the pure sentinel matcher (byte in, turn out).
//! - [`process::ProcessTurnStream`] -- drives a framer over any
//!   [`tokio::io::AsyncRead`], typically a child's stdout.
//! - [`remote::RemoteTurnStream`] -- the same contract for a game exposed
//!   behind the request/response service.
//!
//! Every source implements [`TurnSource`], whose `next_turn` returns
//! `Ok(None)` once the underlying stream is exhausted.

pub mod framer;
pub mod process;
pub mod remote;

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use framer::{TurnFramer, DEFAULT_SENTINEL};
pub use process::ProcessTurnStream;
pub use remote::RemoteTurnStream;

/// One complete block of narration, ending at the environment's prompt.
///
/// The sentinel itself and surrounding whitespace are stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn(String);

impl Turn {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lazy sequence of turns.
///
/// Iteration ends with `Ok(None)`; errors are reserved for transport
/// failures. A source that never sees its sentinel blocks forever, so callers
/// that need liveness must race `next_turn` against their own timeout or
/// cancellation.
#[allow(async_fn_in_trait)]
pub trait TurnSource: Send {
    async fn next_turn(&mut self) -> Result<Option<Turn>>;
}
