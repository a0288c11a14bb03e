//! Top-level generation orchestration

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use ember_llm::{ContinuationToken, GenerateRequest};

use crate::{
    backend::Backend,
    cancel::CancellationSignal,
    error::Result,
    events::GenerationEvent,
    recovery::ErrorRecoveryCoordinator,
    state::{GenerationState, ThinkingState, ThinkingStats},
    thinking,
};

/// Operation name used for coordinator bookkeeping
const OP_GENERATE: &str = "generate";

/// Final output of a successful generation
#[derive(Debug, Clone)]
pub struct Completion {
    /// Filtered display text
    pub response: String,
    /// Raw accumulated text
    pub full_response: String,
    /// Opaque token to thread into the next request
    pub context: Option<ContinuationToken>,
}

/// Diagnostic snapshot of the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorStats {
    pub is_streaming: bool,
    pub is_cancelled: bool,
    pub has_active_subscription: bool,
    pub thinking: ThinkingStats,
}

struct Shared {
    generation: GenerationState,
    thinking: ThinkingState,
    signal: CancellationSignal,
    has_active_subscription: bool,
}

/// A cloneable handle for cancelling an in-flight generation from other tasks.
#[derive(Clone)]
pub struct GenerationHandle {
    shared: Arc<Mutex<Shared>>,
}

impl GenerationHandle {
    /// Cancel the current generation and discard its partial output.
    pub fn cancel(&self) {
        let mut shared = self.shared.lock();
        shared.signal.cancel();
        shared.has_active_subscription = false;
        shared.generation = GenerationState::Idle;
        shared.thinking = thinking::reset_after_completion(&shared.thinking);
    }

    /// Whether the current generation's signal has been set
    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().signal.is_cancelled()
    }
}

/// Drives generation requests against the backend, filters thinking content
/// out of the visible stream, and reports failures to the recovery
/// coordinator.
///
/// One instance handles at most one in-flight generation; `generate` takes
/// `&mut self`, so a second concurrent call is unrepresentable.
pub struct StreamingOrchestrator {
    backend: Arc<dyn Backend>,
    recovery: Arc<ErrorRecoveryCoordinator>,
    event_tx: broadcast::Sender<GenerationEvent>,
    shared: Arc<Mutex<Shared>>,
}

impl StreamingOrchestrator {
    /// Create an orchestrator over the given backend and coordinator
    pub fn new(backend: Arc<dyn Backend>, recovery: Arc<ErrorRecoveryCoordinator>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            backend,
            recovery,
            event_tx,
            shared: Arc::new(Mutex::new(Shared {
                generation: GenerationState::Idle,
                thinking: ThinkingState::default(),
                signal: CancellationSignal::new(),
                has_active_subscription: false,
            })),
        }
    }

    /// Subscribe to generation events.
    ///
    /// Events arrive in emission order: one `Started`, zero or more
    /// `Chunk`s, then at most one `Completed`.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.event_tx.subscribe()
    }

    /// Get a cloneable handle for cancelling from external code
    pub fn handle(&self) -> GenerationHandle {
        GenerationHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel the current generation and discard its partial output.
    pub fn cancel(&self) {
        self.handle().cancel();
    }

    /// Run one generation.
    ///
    /// Returns the completion, or `None` when the generation was cancelled
    /// before finishing (no `Completed` event is emitted in that case).
    /// Failures are reported to the recovery coordinator for bookkeeping and
    /// then propagated unchanged.
    pub async fn generate(
        &mut self,
        request: GenerateRequest,
        live_updates: bool,
    ) -> Result<Option<Completion>> {
        let signal = self.reset_for_new_generation();

        let result = if live_updates {
            self.consume_stream(&request, &signal).await
        } else {
            self.single_shot(&request, &signal).await
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.shared.lock().generation = GenerationState::Failed;
                let context = serde_json::json!({
                    "streaming": live_updates,
                    "cancelled": signal.is_cancelled(),
                });
                self.recovery
                    .handle_error(OP_GENERATE, &e, Some(context))
                    .await;
                self.reset_to_idle();
                Err(e)
            }
        }
    }

    /// Diagnostic snapshot
    pub fn stats(&self) -> OrchestratorStats {
        let shared = self.shared.lock();
        OrchestratorStats {
            is_streaming: shared.generation.is_streaming(),
            is_cancelled: shared.signal.is_cancelled(),
            has_active_subscription: shared.has_active_subscription,
            thinking: shared.thinking.stats(),
        }
    }

    /// Check that the state invariants currently hold.
    ///
    /// Returns violation descriptions; empty means the state is sound.
    pub fn validate_state(&self) -> Vec<String> {
        let shared = self.shared.lock();
        let mut violations = shared.generation.validate();
        violations.extend(shared.thinking.validate());
        violations
    }

    fn reset_for_new_generation(&self) -> CancellationSignal {
        let signal = CancellationSignal::new();
        let thinking = thinking::initialize();
        {
            let mut shared = self.shared.lock();
            shared.generation = GenerationState::Idle;
            shared.thinking = thinking.clone();
            shared.signal = signal.clone();
            shared.has_active_subscription = false;
        }
        let _ = self.event_tx.send(GenerationEvent::Started { thinking });
        signal
    }

    fn reset_to_idle(&self) {
        let mut shared = self.shared.lock();
        shared.generation = GenerationState::Idle;
        shared.thinking = thinking::reset_after_completion(&shared.thinking);
        shared.has_active_subscription = false;
    }

    /// Consume the backend stream fragment by fragment.
    async fn consume_stream(
        &self,
        request: &GenerateRequest,
        signal: &CancellationSignal,
    ) -> Result<Option<Completion>> {
        let mut chunks = self.backend.stream(request, signal.clone()).await?;
        self.shared.lock().has_active_subscription = true;

        let mut raw = String::new();
        let mut display = String::new();
        let mut context = None;

        while let Some(next) = chunks.next().await {
            // The signal is polled once per fragment: fragments already
            // received are processed, and a fragment in flight when the
            // caller cancels may still slip through. This is a race, not a
            // guarantee.
            if signal.is_cancelled() {
                break;
            }
            let chunk = next?;

            if !chunk.response.is_empty() {
                raw.push_str(&chunk.response);
                display = self.apply_fragment(&raw);
            }
            if chunk.done {
                context = chunk.context;
                break;
            }
        }

        drop(chunks);
        self.shared.lock().has_active_subscription = false;

        if signal.is_cancelled() {
            self.reset_to_idle();
            return Ok(None);
        }
        Ok(Some(self.finalize(raw, display, context)))
    }

    /// Issue one blocking request and extract once over the full response.
    async fn single_shot(
        &self,
        request: &GenerateRequest,
        signal: &CancellationSignal,
    ) -> Result<Option<Completion>> {
        let response = match self.backend.generate(request, signal.clone()).await {
            Ok(r) => r,
            Err(crate::error::Error::Llm(ember_llm::Error::Aborted)) => {
                self.reset_to_idle();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if signal.is_cancelled() {
            self.reset_to_idle();
            return Ok(None);
        }

        let previous = self.shared.lock().thinking.clone();
        let extraction = thinking::extract(&response.response, &previous);
        let thinking = thinking::advance_phase(&extraction.state, &extraction.display);
        self.shared.lock().thinking = thinking;

        Ok(Some(self.finalize(
            response.response,
            extraction.display,
            response.context,
        )))
    }

    /// Re-extract over the cumulative text, advance the phase, update state,
    /// and emit a `Chunk` event. Returns the new display text.
    fn apply_fragment(&self, raw: &str) -> String {
        let previous = self.shared.lock().thinking.clone();
        let extraction = thinking::extract(raw, &previous);
        let thinking = thinking::advance_phase(&extraction.state, &extraction.display);

        let state = GenerationState::Streaming {
            raw: raw.to_string(),
            display: extraction.display.clone(),
        };
        {
            let mut shared = self.shared.lock();
            shared.generation = state.clone();
            shared.thinking = thinking.clone();
        }

        let _ = self.event_tx.send(GenerationEvent::Chunk {
            response: extraction.display.clone(),
            full_response: raw.to_string(),
            state,
            thinking,
        });
        extraction.display
    }

    /// Finalize state and emit exactly one `Completed` event.
    fn finalize(
        &self,
        raw: String,
        display: String,
        context: Option<ContinuationToken>,
    ) -> Completion {
        let state = GenerationState::Completed {
            display: display.clone(),
        };
        let thinking = {
            let mut shared = self.shared.lock();
            shared.generation = state.clone();
            shared.thinking = thinking::reset_after_completion(&shared.thinking);
            shared.thinking.clone()
        };

        let _ = self.event_tx.send(GenerationEvent::Completed {
            response: display.clone(),
            full_response: raw.clone(),
            context: context.clone(),
            state,
            thinking,
        });

        Completion {
            response: display,
            full_response: raw,
            context,
        }
    }
}
