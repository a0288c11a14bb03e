//! Immutable snapshots of generation and thinking-extraction progress

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifier of a chat message, issued by the chat store.
pub type MessageId = String;

/// Phase of a generation.
///
/// Invariant: `display` is always derived from `raw` by subtracting thinking
/// content, so it is never longer than `raw`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum GenerationState {
    /// No generation in flight
    #[default]
    Idle,
    /// Fragments are being consumed
    Streaming { raw: String, display: String },
    /// Finished normally
    Completed { display: String },
    /// Terminated by an error
    Failed,
}

impl GenerationState {
    /// Whether a generation is currently consuming fragments
    pub fn is_streaming(&self) -> bool {
        matches!(self, GenerationState::Streaming { .. })
    }

    /// Check the derived-display invariant, returning violations.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = vec![];
        if let GenerationState::Streaming { raw, display } = self {
            if display.len() > raw.len() {
                violations.push(format!(
                    "display text ({} bytes) longer than raw text ({} bytes)",
                    display.len(),
                    raw.len()
                ));
            }
        }
        violations
    }
}

/// Snapshot of thinking-block extraction status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingState {
    /// Last extracted thinking content (complete or partial)
    pub thinking_text: String,
    /// Whether a thinking bubble should be shown for the current message
    pub has_active_bubble: bool,
    /// Whether the scan ended inside an unterminated block
    pub inside_thinking_block: bool,
    /// True from the start of a generation until visible output appears.
    /// Monotonic within one generation: flips to false at most once.
    pub in_thinking_phase: bool,
    /// Message ids whose bubbles are expanded in the UI
    pub expanded_bubbles: HashSet<MessageId>,
}

impl ThinkingState {
    /// Check the flag invariants, returning violations.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = vec![];
        if self.inside_thinking_block && !self.has_active_bubble {
            violations.push("inside an unterminated block but no active bubble".to_string());
        }
        violations
    }

    /// Diagnostic summary
    pub fn stats(&self) -> ThinkingStats {
        ThinkingStats {
            thinking_len: self.thinking_text.len(),
            has_active_bubble: self.has_active_bubble,
            inside_thinking_block: self.inside_thinking_block,
            in_thinking_phase: self.in_thinking_phase,
            expanded_count: self.expanded_bubbles.len(),
        }
    }
}

/// Diagnostic counters for the thinking state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingStats {
    pub thinking_len: usize,
    pub has_active_bubble: bool,
    pub inside_thinking_block: bool,
    pub in_thinking_phase: bool,
    pub expanded_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invariant_violation() {
        let state = GenerationState::Streaming {
            raw: "ab".into(),
            display: "abc".into(),
        };
        assert_eq!(state.validate().len(), 1);
    }

    #[test]
    fn test_display_invariant_holds() {
        let state = GenerationState::Streaming {
            raw: "a<think>b</think>".into(),
            display: "a".into(),
        };
        assert!(state.validate().is_empty());
        assert!(GenerationState::Idle.validate().is_empty());
    }

    #[test]
    fn test_unterminated_block_implies_active_bubble() {
        let state = ThinkingState {
            inside_thinking_block: true,
            has_active_bubble: false,
            ..Default::default()
        };
        assert_eq!(state.validate().len(), 1);
    }
}
