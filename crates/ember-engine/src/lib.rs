//! ember-engine: streaming generation orchestration
//!
//! This crate drives token-by-token generation against a local model server,
//! incrementally separates thinking content from the visible answer as text
//! arrives, and shields callers from transient backend failures via
//! retry/circuit-breaking.

pub mod backend;
pub mod cancel;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod recovery;
pub mod state;
pub mod thinking;

pub use backend::Backend;
pub use cancel::CancellationSignal;
pub use error::{Error, Result};
pub use events::GenerationEvent;
pub use orchestrator::{Completion, GenerationHandle, OrchestratorStats, StreamingOrchestrator};
pub use recovery::{
    ErrorRecoveryCoordinator, ErrorState, OperationHealth, RecoveryOutcome, RecoveryStrategy,
    RetryConfig, SystemHealth,
};
pub use state::{GenerationState, MessageId, ThinkingState, ThinkingStats};
