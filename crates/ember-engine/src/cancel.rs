//! One-shot cooperative cancellation

use tokio_util::sync::CancellationToken;

/// A one-shot abort flag shared between a caller and an in-progress operation.
///
/// Advisory only: consumers poll [`is_cancelled`](Self::is_cancelled) at
/// defined checkpoints; nothing is interrupted preemptively. Once cancelled
/// the flag never resets; a new generation allocates a new signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    /// Create a fresh, un-cancelled signal
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Set the flag. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Pure read of the flag. Clones observe the same flag.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Build the poll-able predicate handed to the backend transport.
    pub fn probe(&self) -> ember_llm::CancelProbe {
        let signal = self.clone();
        std::sync::Arc::new(move || signal.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_uncancelled() {
        let signal = CancellationSignal::new();
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let signal = CancellationSignal::new();
        signal.cancel();
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_clones_share_the_flag() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();
        signal.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_probe_tracks_signal() {
        let signal = CancellationSignal::new();
        let probe = signal.probe();
        assert!(!probe());
        signal.cancel();
        assert!(probe());
    }
}
