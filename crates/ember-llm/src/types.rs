//! Core types for generation requests against the model server

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role of a conversation history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single entry of prior conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Pre-extracted attachment text folded into the prompt.
///
/// Extraction from PDFs/images happens in a separate layer; by the time a
/// file reaches this crate it is plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub name: String,
    pub content: String,
}

/// Opaque multi-turn context value returned by the server.
///
/// On the wire this is an integer sequence. It is never interpreted, only
/// threaded from one generation's completion into the next request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(pub Vec<i64>);

impl ContinuationToken {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a single generation call needs
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// The user prompt for this turn
    pub prompt: String,
    /// Model name as known to the server
    pub model: String,
    /// Prior conversation history
    pub history: Vec<ChatMessage>,
    /// Attachments, already extracted to text
    pub files: Vec<ProcessedFile>,
    /// Context token from the previous turn, if any
    pub continuation: Option<ContinuationToken>,
    /// Requested context window (maps to `options.num_ctx`)
    pub context_length: Option<u32>,
}

/// The non-streaming reply
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    #[serde(default)]
    pub context: Option<ContinuationToken>,
}

/// Poll-able cancellation predicate passed into transport calls.
///
/// Advisory only: the transport checks it at defined points (once per
/// received network chunk) and stops reading when it returns true.
pub type CancelProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// A probe that never reports cancellation
pub fn never_cancelled() -> CancelProbe {
    Arc::new(|| false)
}
