//! Incremental extraction of thinking blocks from streamed text
//!
//! Reasoning models wrap their chain-of-thought in marker tags
//! (`<think>…</think>` and friends) ahead of the visible answer. The
//! extractor re-scans the *entire* accumulated text on every call rather
//! than just the newest fragment: an opening or closing marker can be split
//! across two network fragments and only becomes recognizable once enough
//! bytes have arrived.

use regex::Regex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::LazyLock;

use crate::state::{MessageId, ThinkingState};

/// Recognized marker pairs, scanned in this order. Matching is ASCII
/// case-insensitive.
const MARKER_PAIRS: [(&str, &str); 5] = [
    ("<think>", "</think>"),
    ("<thinking>", "</thinking>"),
    ("<reasoning>", "</reasoning>"),
    ("<analysis>", "</analysis>"),
    ("<reflection>", "</reflection>"),
];

/// Three or more newlines, optionally interspersed with horizontal
/// whitespace, left behind by removed blocks.
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());

/// Result of one extraction pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// User-visible text with thinking blocks removed
    pub display: String,
    /// Updated extraction status
    pub state: ThinkingState,
}

/// Fresh state for the start of a generation.
///
/// This is the only place `expanded_bubbles` is cleared.
pub fn initialize() -> ThinkingState {
    ThinkingState {
        in_thinking_phase: true,
        ..Default::default()
    }
}

/// Re-scan the cumulative text and split it into display text and thinking
/// content.
///
/// Extraction failures must never corrupt or block the visible stream: if
/// the scan panics, the original text and previous state are returned
/// unchanged.
pub fn extract(cumulative: &str, previous: &ThinkingState) -> Extraction {
    match catch_unwind(AssertUnwindSafe(|| scan(cumulative, previous))) {
        Ok(extraction) => extraction,
        Err(_) => {
            tracing::warn!("thinking extraction panicked; passing text through unmodified");
            Extraction {
                display: cumulative.to_string(),
                state: previous.clone(),
            }
        }
    }
}

fn scan(cumulative: &str, previous: &ThinkingState) -> Extraction {
    let mut display = cumulative.to_string();
    let mut state = ThinkingState {
        thinking_text: String::new(),
        has_active_bubble: false,
        inside_thinking_block: false,
        in_thinking_phase: previous.in_thinking_phase,
        expanded_bubbles: previous.expanded_bubbles.clone(),
    };

    'pairs: for (open, close) in MARKER_PAIRS {
        loop {
            // ASCII lowercasing preserves byte offsets, so positions found
            // in the lowered copy index directly into `display`.
            let lower = display.to_ascii_lowercase();
            let Some(start) = lower.find(open) else { break };
            let content_start = start + open.len();

            match lower[content_start..].find(close) {
                None => {
                    // Unterminated block: everything after the opening
                    // marker is partial thinking content, and the scan
                    // cannot proceed past it for this marker type.
                    state.thinking_text = display[content_start..].trim().to_string();
                    state.inside_thinking_block = true;
                    state.has_active_bubble = true;
                    display = display[..start].trim().to_string();
                    continue 'pairs;
                }
                Some(rel) => {
                    let content_end = content_start + rel;
                    let content = display[content_start..content_end].trim().to_string();
                    state.has_active_bubble = !content.is_empty();
                    state.thinking_text = content;
                    state.inside_thinking_block = false;

                    let after = content_end + close.len();
                    let mut spliced = String::with_capacity(display.len());
                    spliced.push_str(&display[..start]);
                    spliced.push_str(&display[after..]);
                    display = spliced;
                }
            }
        }
    }

    let display = EXCESS_NEWLINES.replace_all(&display, "\n\n").into_owned();
    Extraction { display, state }
}

/// Clear extraction flags after a generation completes.
///
/// `expanded_bubbles` survives; only [`initialize`] clears it.
pub fn reset_after_completion(state: &ThinkingState) -> ThinkingState {
    ThinkingState {
        thinking_text: String::new(),
        has_active_bubble: false,
        inside_thinking_block: false,
        in_thinking_phase: false,
        expanded_bubbles: state.expanded_bubbles.clone(),
    }
}

/// Leave the thinking phase once visible output has appeared.
///
/// Monotonic within one generation: the flag flips to false at most once
/// and never back.
pub fn advance_phase(state: &ThinkingState, display: &str) -> ThinkingState {
    if state.in_thinking_phase && !display.trim().is_empty() && !state.inside_thinking_block {
        let mut next = state.clone();
        next.in_thinking_phase = false;
        return next;
    }
    state.clone()
}

/// Toggle whether a message's bubble is expanded.
pub fn toggle_bubble(state: &ThinkingState, message_id: &MessageId) -> ThinkingState {
    let mut next = state.clone();
    if !next.expanded_bubbles.remove(message_id) {
        next.expanded_bubbles.insert(message_id.clone());
    }
    next
}

/// Query whether a message's bubble is expanded.
pub fn is_bubble_expanded(state: &ThinkingState, message_id: &MessageId) -> bool {
    state.expanded_bubbles.contains(message_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_marker_identity() {
        let extraction = extract("Just a plain answer.", &initialize());
        assert_eq!(extraction.display, "Just a plain answer.");
        assert!(!extraction.state.has_active_bubble);
        assert!(!extraction.state.inside_thinking_block);
        assert!(extraction.state.thinking_text.is_empty());
    }

    #[test]
    fn test_idempotent_re_extraction() {
        let text = "A<think>B</think>C\n\n\n\nD";
        let first = extract(text, &initialize());
        let second = extract(text, &initialize());
        assert_eq!(first, second);
    }

    #[test]
    fn test_unterminated_block() {
        let extraction = extract("Hello <think>partial", &initialize());
        assert_eq!(extraction.display, "Hello");
        assert!(extraction.state.inside_thinking_block);
        assert!(extraction.state.has_active_bubble);
        assert_eq!(extraction.state.thinking_text, "partial");
    }

    #[test]
    fn test_terminated_block_removal() {
        let extraction = extract("A<think>B</think>C", &initialize());
        assert_eq!(extraction.display, "AC");
        assert_eq!(extraction.state.thinking_text, "B");
        assert!(!extraction.state.inside_thinking_block);
        assert!(extraction.state.has_active_bubble);
    }

    #[test]
    fn test_empty_block_has_no_bubble() {
        let extraction = extract("A<think> </think>B", &initialize());
        assert_eq!(extraction.display, "AB");
        assert!(!extraction.state.has_active_bubble);
    }

    #[test]
    fn test_case_insensitive_markers() {
        let extraction = extract("Hi<THINK>shout</Think> there", &initialize());
        assert_eq!(extraction.display, "Hi there");
        assert_eq!(extraction.state.thinking_text, "shout");
    }

    #[test]
    fn test_alternate_marker_types() {
        let extraction = extract("<reasoning>why</reasoning>Answer", &initialize());
        assert_eq!(extraction.display, "Answer");
        assert_eq!(extraction.state.thinking_text, "why");

        let extraction = extract("<reflection>hm</reflection>Done", &initialize());
        assert_eq!(extraction.display, "Done");
        assert_eq!(extraction.state.thinking_text, "hm");
    }

    #[test]
    fn test_repeated_blocks_of_same_type() {
        let extraction = extract("a<think>1</think>b<think>2</think>c", &initialize());
        assert_eq!(extraction.display, "abc");
        assert_eq!(extraction.state.thinking_text, "2");
    }

    #[test]
    fn test_whitespace_collapse() {
        let extraction = extract("para one\n\n\n\npara two", &initialize());
        assert_eq!(extraction.display, "para one\n\npara two");
    }

    #[test]
    fn test_whitespace_collapse_with_horizontal_whitespace() {
        let extraction = extract("a\n  \n\t\n\nb", &initialize());
        assert_eq!(extraction.display, "a\n\nb");
    }

    #[test]
    fn test_two_newlines_untouched() {
        let extraction = extract("a\n\nb", &initialize());
        assert_eq!(extraction.display, "a\n\nb");
    }

    #[test]
    fn test_split_marker_converges_across_fragments() {
        // First the tag is incomplete, so its prefix shows through.
        let partial = extract("Hello <thi", &initialize());
        assert_eq!(partial.display, "Hello <thi");
        assert!(!partial.state.inside_thinking_block);

        // Once the rest of the tag arrives, the cumulative re-scan hides it.
        let full = extract("Hello <think>secret", &partial.state);
        assert_eq!(full.display, "Hello");
        assert!(full.state.inside_thinking_block);
        assert_eq!(full.state.thinking_text, "secret");
    }

    #[test]
    fn test_block_then_closed_in_later_fragment() {
        let open = extract("<think>step one", &initialize());
        assert_eq!(open.display, "");
        assert!(open.state.inside_thinking_block);

        let closed = extract("<think>step one</think>The answer", &open.state);
        assert_eq!(closed.display, "The answer");
        assert!(!closed.state.inside_thinking_block);
        assert_eq!(closed.state.thinking_text, "step one");
    }

    #[test]
    fn test_initialize_starts_thinking_phase() {
        let state = initialize();
        assert!(state.in_thinking_phase);
        assert!(state.expanded_bubbles.is_empty());
        assert!(!state.has_active_bubble);
    }

    #[test]
    fn test_advance_phase_on_visible_output() {
        let extraction = extract("<think>a</think>Answer", &initialize());
        let advanced = advance_phase(&extraction.state, &extraction.display);
        assert!(!advanced.in_thinking_phase);
    }

    #[test]
    fn test_advance_phase_noop_while_inside_block() {
        let extraction = extract("<think>still going", &initialize());
        let advanced = advance_phase(&extraction.state, &extraction.display);
        assert!(advanced.in_thinking_phase);
    }

    #[test]
    fn test_advance_phase_noop_on_whitespace_display() {
        let state = initialize();
        let advanced = advance_phase(&state, "  \n");
        assert!(advanced.in_thinking_phase);
    }

    #[test]
    fn test_phase_transition_is_monotonic() {
        let extraction = extract("<think>a</think>Answer", &initialize());
        let mut state = advance_phase(&extraction.state, &extraction.display);
        assert!(!state.in_thinking_phase);

        // Subsequent extractions and phase checks never re-enter the phase.
        for text in ["<think>a</think>Answer more", "<think>a</think>Answer more text"] {
            let extraction = extract(text, &state);
            state = advance_phase(&extraction.state, &extraction.display);
            assert!(!state.in_thinking_phase);
        }
    }

    #[test]
    fn test_reset_after_completion_preserves_bubbles() {
        let mut state = extract("<think>a</think>b", &initialize()).state;
        state = toggle_bubble(&state, &"msg-1".to_string());

        let reset = reset_after_completion(&state);
        assert!(reset.thinking_text.is_empty());
        assert!(!reset.has_active_bubble);
        assert!(!reset.inside_thinking_block);
        assert!(!reset.in_thinking_phase);
        assert!(is_bubble_expanded(&reset, &"msg-1".to_string()));
    }

    #[test]
    fn test_toggle_bubble_round_trip() {
        let id = "msg-42".to_string();
        let state = initialize();
        assert!(!is_bubble_expanded(&state, &id));

        let expanded = toggle_bubble(&state, &id);
        assert!(is_bubble_expanded(&expanded, &id));

        let collapsed = toggle_bubble(&expanded, &id);
        assert!(!is_bubble_expanded(&collapsed, &id));
    }

    #[test]
    fn test_expanded_bubbles_survive_extraction() {
        let id = "msg-7".to_string();
        let state = toggle_bubble(&initialize(), &id);
        let extraction = extract("<think>a</think>b", &state);
        assert!(is_bubble_expanded(&extraction.state, &id));
    }
}
