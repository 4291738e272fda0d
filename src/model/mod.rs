//! The completion capability used by the LLM-backed policy stages.
//!
//! This module provides:
//! - [`Completion`] -- prompt in, text out.
//! - [`api::LlmClient`] -- HTTP client for OpenAI-compatible and Ollama
//!   backends.
//! - [`ScriptedCompletion`] -- replays queued replies, for tests and offline
//!   runs.
//! - [`prompt`] -- prompt templates for action selection, reflection and
//!   self-assessment.

pub mod api;
pub mod prompt;

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

pub use api::{ChatMessage, ChatResponse, LlmClient};

/// A text-completion backend.
#[allow(async_fn_in_trait)]
pub trait Completion {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

impl Completion for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}

// ---------------------------------------------------------------------------
// ScriptedCompletion: canned replies
// ---------------------------------------------------------------------------

/// Replays a fixed queue of replies in order.
///
/// A queued `Err` simulates a backend failure. Once the queue is empty every
/// call fails, so a test that under-provisions replies sees the fallback path
/// rather than a hang.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    /// Queue a failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(message.into()));
        }
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Completion for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow!("scripted completion lock poisoned"))?
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted completion has no replies left")),
        }
    }
}

// ---------------------------------------------------------------------------
// AnyCompletion: enum dispatch wrapper
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AnyCompletion {
    Http(LlmClient),
    Scripted(ScriptedCompletion),
}

impl Completion for AnyCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self {
            Self::Http(c) => c.complete(prompt).await,
            Self::Scripted(c) => c.complete(prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_in_order_then_fails() {
        let completion = ScriptedCompletion::new(["north", "take lamp"]);
        assert_eq!(completion.complete("a").await.unwrap(), "north");
        assert_eq!(completion.complete("b").await.unwrap(), "take lamp");
        assert!(completion.complete("c").await.is_err());
        assert_eq!(completion.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn queued_failure_surfaces_as_error() {
        let completion = ScriptedCompletion::default();
        completion.push_failure("connection refused");
        completion.push_reply("look");
        let err = completion.complete("x").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(completion.complete("y").await.unwrap(), "look");
    }

    #[tokio::test]
    async fn any_completion_dispatches() {
        let any = AnyCompletion::Scripted(ScriptedCompletion::new(["west"]));
        assert_eq!(any.complete("p").await.unwrap(), "west");
    }
}
