//! Scripted provider shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::litellm::{GenerationRequest, GenerationResponse, LlmProvider};
use crate::error::LlmError;

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Text(String),
    RateLimited,
    Status(u16),
    MissingKey,
}

impl Reply {
    pub(crate) fn json(value: serde_json::Value) -> Self {
        Reply::Text(value.to_string())
    }
}

/// Replays a queue of replies and records every request it sees.
/// Once the queue is drained every call fails with a transport error.
pub(crate) struct MockLlmProvider {
    script: Mutex<VecDeque<Reply>>,
    pub(crate) requests: Mutex<Vec<GenerationRequest>>,
}

impl MockLlmProvider {
    pub(crate) fn new(script: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().expect("lock not poisoned").len()
    }

    pub(crate) fn request(&self, index: usize) -> GenerationRequest {
        self.requests.lock().expect("lock not poisoned")[index].clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        self.requests
            .lock()
            .expect("lock not poisoned")
            .push(request);
        let next = self.script.lock().expect("lock not poisoned").pop_front();
        match next {
            Some(Reply::Text(text)) => Ok(GenerationResponse::from_text("mock-model", text)),
            Some(Reply::RateLimited) => Err(LlmError::RateLimited("quota exceeded".to_string())),
            Some(Reply::Status(code)) => Err(LlmError::ApiError {
                code,
                message: "scripted failure".to_string(),
            }),
            Some(Reply::MissingKey) => Err(LlmError::MissingApiKey),
            None => Err(LlmError::RequestFailed("script exhausted".to_string())),
        }
    }
}
