//! Error types for examforge operations.
//!
//! Defines error types for the subsystems that sit below the agents:
//! - LLM provider interactions
//! - The content oracle built on top of a provider
//! - The in-process event bus
//! - Item persistence

use thiserror::Error;

/// Errors that can occur during LLM provider operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Structured failure of a content oracle call.
///
/// Callers never see a provider fault directly; every failure is folded into
/// one of these variants so that rate limiting can be told apart from
/// failures that are not worth retrying.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    #[error("Content oracle rate limited: {0}")]
    RateLimited(String),

    #[error("Content oracle credential missing")]
    MissingCredential,

    #[error("Content oracle transport failure ({}): {message}", status_label(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Content oracle call timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Content oracle returned no usable JSON: {0}")]
    Malformed(String),
}

/// What a caller should do after an oracle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Sleep, then repeat the same call.
    Backoff,
    /// Treat the attempt as producing nothing usable and move on.
    Unusable,
    /// Stop trying.
    Abort,
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "no status".to_string(), |code| code.to_string())
}

impl OracleError {
    /// HTTP-like status code for this failure, if one applies.
    pub fn status(&self) -> Option<u16> {
        match self {
            OracleError::RateLimited(_) => Some(429),
            OracleError::MissingCredential => Some(401),
            OracleError::Transport { status, .. } => *status,
            OracleError::Timeout { .. } => Some(408),
            OracleError::Malformed(_) => None,
        }
    }

    /// Returns true if the oracle signalled rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, OracleError::RateLimited(_))
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            OracleError::RateLimited(_) => Disposition::Backoff,
            OracleError::Malformed(_) => Disposition::Unusable,
            _ => Disposition::Abort,
        }
    }
}

impl From<LlmError> for OracleError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited(message) => OracleError::RateLimited(message),
            LlmError::MissingApiKey => OracleError::MissingCredential,
            LlmError::ApiError { code: 429, message } => OracleError::RateLimited(message),
            LlmError::ApiError { code, message } => OracleError::Transport {
                status: Some(code),
                message,
            },
            LlmError::ParseError(message) => OracleError::Malformed(message),
            other => OracleError::Transport {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

/// Errors that can occur on the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Event bus is closed; event '{0}' was not enqueued")]
    Closed(String),

    #[error("Event bus dispatch loop is already running or has finished")]
    AlreadyRunning,
}

/// Errors that can occur while persisting items.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_maps_to_oracle_error() {
        let err: OracleError = LlmError::RateLimited("slow down".to_string()).into();
        assert!(err.is_rate_limited());
        assert_eq!(err.status(), Some(429));

        let err: OracleError = LlmError::ApiError {
            code: 429,
            message: "quota".to_string(),
        }
        .into();
        assert!(err.is_rate_limited());

        let err: OracleError = LlmError::MissingApiKey.into();
        assert_eq!(err, OracleError::MissingCredential);

        let err: OracleError = LlmError::ApiError {
            code: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.disposition(), Disposition::Abort);

        let err: OracleError = LlmError::RequestFailed("connection refused".to_string()).into();
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_dispositions() {
        assert_eq!(
            OracleError::RateLimited(String::new()).disposition(),
            Disposition::Backoff
        );
        assert_eq!(
            OracleError::Malformed(String::new()).disposition(),
            Disposition::Unusable
        );
        assert_eq!(
            OracleError::Timeout { millis: 10 }.disposition(),
            Disposition::Abort
        );
        assert_eq!(
            OracleError::MissingCredential.disposition(),
            Disposition::Abort
        );
    }

    #[test]
    fn test_transport_display_without_status() {
        let err = OracleError::Transport {
            status: None,
            message: "dns".to_string(),
        };
        assert!(err.to_string().contains("no status"));
    }
}
