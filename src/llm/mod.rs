//! LLM integration for examforge.
//!
//! Two layers live here:
//!
//! - [`litellm`]: the provider seam ([`LlmProvider`]) and an OpenAI-compatible
//!   HTTP client ([`LiteLlmClient`]).
//! - [`oracle`]: the [`ContentOracle`], which agents call to get structured
//!   JSON back, with per-call timeouts and tolerant response parsing.
//!
//! ```ignore
//! use examforge::llm::{AskParams, ContentOracle, LiteLlmClient};
//! use std::sync::Arc;
//!
//! let client = LiteLlmClient::from_env()?;
//! let oracle = Arc::new(ContentOracle::new(Arc::new(client), ""));
//! let plan = oracle.ask("Topic: fractions", "Return JSON", &AskParams::new(0.3)).await?;
//! ```

pub mod litellm;
pub mod oracle;

#[cfg(test)]
pub(crate) mod mock;

pub use litellm::{
    CompletionChoice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message,
    Usage, DEFAULT_API_BASE, DEFAULT_MODEL,
};
pub use oracle::{AskParams, ContentOracle, SharedOracle, DEFAULT_CALL_TIMEOUT};
