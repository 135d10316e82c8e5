use thiserror::Error;

/// Errors surfaced by the reaction coordinator and its collaborators.
///
/// Coordination failures are never retried. Anything other than
/// `Configuration` indicates either an environment problem at startup or a
/// protocol bug.
#[derive(Debug, Error)]
pub enum EthynylError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Worker {worker} did not finish: {reason}")]
    WorkerAborted { worker: String, reason: String },
    #[error("Reaction journal error: {0}")]
    Journal(#[from] std::io::Error),
}

impl EthynylError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(detail = %detail, "Coordination invariant violated");
        EthynylError::InvariantViolation(detail)
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, EthynylError::InvariantViolation(_))
    }
}

pub type Result<T, E = EthynylError> = std::result::Result<T, E>;
