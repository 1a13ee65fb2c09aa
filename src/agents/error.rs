//! Error types for the generation agents and the validator.

use thiserror::Error;

use crate::error::BusError;

/// Errors that can occur inside an agent's event handler.
///
/// Oracle faults never show up here: they are absorbed by the retry policy
/// and the canned fallbacks. What remains is plumbing.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The downstream event could not be enqueued.
    #[error("Failed to publish downstream event: {0}")]
    Publish(#[from] BusError),

    /// A handler was subscribed to an event it does not understand.
    #[error("Agent '{agent}' received unexpected event '{event}'")]
    UnexpectedEvent { agent: String, event: String },
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let err: AgentError = BusError::Closed("items.math".to_string()).into();
        assert!(err.to_string().contains("items.math"));

        let err = AgentError::UnexpectedEvent {
            agent: "validator".to_string(),
            event: "topic.received".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Agent 'validator' received unexpected event 'topic.received'"
        );
    }
}
