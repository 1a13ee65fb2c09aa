//! Content oracle: the single "ask for JSON" operation every agent uses.
//!
//! The oracle wraps an [`LlmProvider`] with a per-call timeout and turns
//! free-form model text into a `serde_json::Value`. Every failure comes back
//! as a structured [`OracleError`]; nothing here panics or propagates a raw
//! provider fault.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use super::litellm::{GenerationRequest, LlmProvider, Message};
use crate::error::OracleError;
use crate::utils::json_extraction::extract_json_value;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sampling and transport parameters for one oracle call.
#[derive(Debug, Clone, PartialEq)]
pub struct AskParams {
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AskParams {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: None,
            max_tokens: 2048,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl AskParams {
    pub fn new(temperature: f64) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Shared handle to the content oracle.
pub type SharedOracle = Arc<ContentOracle>;

/// The content oracle.
///
/// Constructed once per process and handed to every component that needs
/// it; there is no global client.
pub struct ContentOracle {
    provider: Arc<dyn LlmProvider>,
    model: String,
    call_timeout: Duration,
}

impl std::fmt::Debug for ContentOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentOracle")
            .field("model", &self.model)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ContentOracle {
    /// Create an oracle over `provider`. An empty `model` defers to the provider default.
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the timeout applied when callers use [`ContentOracle::params`].
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Parameters at `temperature` carrying this oracle's configured timeout.
    pub fn params(&self, temperature: f64) -> AskParams {
        AskParams::new(temperature).with_timeout(self.call_timeout)
    }

    /// Ask the oracle for a JSON answer.
    pub async fn ask(
        &self,
        prompt: &str,
        system: &str,
        params: &AskParams,
    ) -> Result<Value, OracleError> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        let mut request = GenerationRequest::new(self.model.clone(), messages)
            .with_temperature(params.temperature)
            .with_max_tokens(params.max_tokens);
        if let Some(top_p) = params.top_p {
            request = request.with_top_p(top_p);
        }

        let started = Instant::now();
        let response = tokio::time::timeout(params.timeout, self.provider.generate(request))
            .await
            .map_err(|_| OracleError::Timeout {
                millis: params.timeout.as_millis() as u64,
            })?
            .map_err(OracleError::from)?;

        debug!(
            model = %response.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            total_tokens = response.usage.total_tokens,
            "Content oracle responded"
        );

        let text = response
            .first_content()
            .ok_or_else(|| OracleError::Malformed("response carried no content".to_string()))?;

        extract_json_value(text).map_err(|e| {
            warn!(error = %e, "Content oracle output was not JSON");
            OracleError::Malformed(e.to_string())
        })
    }
}
