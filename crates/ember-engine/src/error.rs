//! Error types for ember-engine

use thiserror::Error;

/// Result type alias using ember-engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating a generation
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model-server transport
    #[error(transparent)]
    Llm(#[from] ember_llm::Error),

    /// The circuit for an operation is open; no call was attempted
    #[error("service unavailable: circuit open for operation '{operation}'")]
    ServiceUnavailable { operation: String },

    /// An operation exceeded its timeout
    #[error("operation '{operation}' timed out")]
    Timeout { operation: String },

    /// The operation observed cancellation and stopped
    #[error("operation aborted")]
    Aborted,

    /// A generic engine error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error is transient (worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Llm(e) => e.is_transient(),
            Error::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_delegates_to_transport() {
        assert!(Error::Llm(ember_llm::Error::Timeout).is_transient());
        assert!(!Error::Llm(ember_llm::Error::Aborted).is_transient());
    }

    #[test]
    fn test_transient_timeout() {
        assert!(
            Error::Timeout {
                operation: "generate".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_not_transient_circuit_open_or_aborted() {
        assert!(
            !Error::ServiceUnavailable {
                operation: "generate".into()
            }
            .is_transient()
        );
        assert!(!Error::Aborted.is_transient());
        assert!(!Error::Other("boom".into()).is_transient());
    }
}
