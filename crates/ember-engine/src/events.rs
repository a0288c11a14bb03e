//! Generation event types

use ember_llm::ContinuationToken;
use serde::{Deserialize, Serialize};

use crate::state::{GenerationState, ThinkingState};

/// Events emitted during a generation.
///
/// Ordering is strict: one `Started`, zero or more `Chunk`s, then at most
/// one `Completed`. A cancelled generation ends without a terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// A generation began; carries the fresh thinking state
    Started { thinking: ThinkingState },

    /// A fragment was processed
    Chunk {
        /// Filtered display text so far
        response: String,
        /// Raw accumulated text so far
        full_response: String,
        state: GenerationState,
        thinking: ThinkingState,
    },

    /// The generation finished normally
    Completed {
        /// Final filtered display text
        response: String,
        /// Final raw text
        full_response: String,
        /// Opaque token to thread into the next request
        context: Option<ContinuationToken>,
        state: GenerationState,
        thinking: ThinkingState,
    },
}

impl GenerationEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationEvent::Completed { .. })
    }
}
