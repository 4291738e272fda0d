//! Reflection (the REFLECT stage).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::prompt::reflection_prompt;
use crate::model::{AnyCompletion, Completion};

#[derive(Debug)]
pub struct LlmReflector {
    completion: Arc<AnyCompletion>,
    last_n: usize,
    first_paragraph_only: bool,
}

impl LlmReflector {
    pub fn new(completion: Arc<AnyCompletion>, last_n: usize, first_paragraph_only: bool) -> Self {
        Self {
            completion,
            last_n,
            first_paragraph_only,
        }
    }

    /// Empty when the backend fails.
    pub async fn reflect(&self, transcript: &[&str], reward: i64) -> String {
        let start = transcript.len().saturating_sub(self.last_n);
        let prompt = reflection_prompt(&transcript[start..], reward);

        match self.completion.complete(&prompt).await {
            Ok(reply) => {
                let text = if self.first_paragraph_only {
                    first_paragraph(&reply)
                } else {
                    reply.trim().to_string()
                };
                debug!(chars = text.len(), "reflection produced");
                text
            }
            Err(e) => {
                warn!(error = %e, "reflection completion failed");
                String::new()
            }
        }
    }
}

/// Text up to the first blank line, trimmed.
pub fn first_paragraph(reply: &str) -> String {
    let trimmed = reply.trim();
    let mut end = trimmed.len();
    let mut offset = 0;
    for line in trimmed.split_inclusive('\n') {
        if line.trim().is_empty() {
            end = offset;
            break;
        }
        offset += line.len();
    }
    trimmed[..end].trim().to_string()
}

#[derive(Debug)]
pub enum AnyReflector {
    Null,
    Llm(LlmReflector),
}

impl AnyReflector {
    pub async fn reflect(&self, transcript: &[&str], reward: i64) -> String {
        match self {
            Self::Null => String::new(),
            Self::Llm(r) => r.reflect(transcript, reward).await,
        }
    }
}
