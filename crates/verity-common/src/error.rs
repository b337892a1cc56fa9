use crate::mock::PatternError;
use thiserror::Error;

/// Unified failure taxonomy for the harness.
///
/// Condition and action failures abort only the flow they occur in;
/// `ConnectionLost` is fatal for every flow sharing the browser handle.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The predicate never became true within its budget. Carries a snapshot
    /// of what the page showed so the failure can be diagnosed without
    /// re-running.
    #[error(
        "condition \"{description}\" not met after {elapsed_ms}ms; last observed: {last_observed}"
    )]
    ConditionTimeout {
        description: String,
        elapsed_ms: u64,
        last_observed: String,
    },

    /// The element resolved but never became actionable.
    #[error("element {selector} not interactable: {reason}")]
    ElementNotInteractable { selector: String, reason: String },

    /// The automation protocol connection dropped.
    #[error("automation protocol connection lost")]
    ConnectionLost,

    /// A request matched no rule while the session ran with strict mocks.
    #[error("no mock rule matched request to {url}")]
    MockMismatch { url: String },

    /// The flow was cancelled from outside.
    #[error("flow cancelled")]
    Cancelled,

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Whether the error poisons the whole browser handle rather than one
    /// flow.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::ConnectionLost)
    }
}
