//! Bounded retry against the content oracle.
//!
//! A [`RetryPolicy`] is a short schedule of sampling parameters plus a
//! rate-limit allowance. Each scheduled attempt that yields nothing usable
//! moves on to the next, more diverse, sampling step. A rate-limit signal
//! instead sleeps with exponential backoff and repeats the same step; those
//! calls are counted separately and capped by `max_backoffs`. Any other
//! oracle failure ends the run immediately.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Disposition, OracleError};
use crate::llm::{AskParams, ContentOracle};

/// Default delay before the first rate-limit retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Sampling parameters for one scheduled attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingStep {
    pub temperature: f64,
    pub top_p: Option<f64>,
}

impl SamplingStep {
    pub const fn new(temperature: f64) -> Self {
        Self {
            temperature,
            top_p: None,
        }
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Result of running a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// First accepted value, if any attempt produced one.
    pub value: Option<T>,
    /// Oracle calls issued, backoff retries included.
    pub calls: u32,
    /// Rate-limit backoffs taken.
    pub backoffs: u32,
    /// Most recent oracle failure, if any.
    pub last_error: Option<OracleError>,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    schedule: Vec<SamplingStep>,
    max_backoffs: u32,
    backoff_base: Duration,
    max_tokens: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::generation()
    }
}

impl RetryPolicy {
    /// Two diversity attempts (temperature 0.4, then 0.7 with top-p 0.95)
    /// and one rate-limit backoff.
    pub fn generation() -> Self {
        Self {
            schedule: vec![
                SamplingStep::new(0.4),
                SamplingStep::new(0.7).with_top_p(0.95),
            ],
            max_backoffs: 1,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_tokens: 2048,
        }
    }

    /// One attempt at `temperature` and one rate-limit backoff.
    pub fn single(temperature: f64) -> Self {
        Self {
            schedule: vec![SamplingStep::new(temperature)],
            ..Self::generation()
        }
    }

    /// Replace the sampling schedule. An empty schedule falls back to one
    /// attempt at the default temperature.
    pub fn with_schedule(mut self, schedule: Vec<SamplingStep>) -> Self {
        self.schedule = if schedule.is_empty() {
            vec![SamplingStep::new(AskParams::default().temperature)]
        } else {
            schedule
        };
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn schedule(&self) -> &[SamplingStep] {
        &self.schedule
    }

    /// Upper bound on oracle calls issued by one [`RetryPolicy::run`].
    pub fn max_calls(&self) -> u32 {
        self.schedule.len() as u32 + self.max_backoffs
    }

    /// Sleep before backoff number `n` (zero-based): `base * 2^n`.
    pub fn backoff_delay(&self, n: u32) -> Duration {
        self.backoff_base
            .saturating_mul(1u32.checked_shl(n).unwrap_or(u32::MAX))
    }

    fn params(&self, oracle: &ContentOracle, step: SamplingStep) -> AskParams {
        let params = oracle
            .params(step.temperature)
            .with_max_tokens(self.max_tokens);
        match step.top_p {
            Some(top_p) => params.with_top_p(top_p),
            None => params,
        }
    }

    /// Ask the oracle until `accept` returns a value or the policy is spent.
    pub async fn run<T, F>(
        &self,
        oracle: &ContentOracle,
        prompt: &str,
        system: &str,
        mut accept: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(&Value) -> Option<T>,
    {
        let mut outcome = RetryOutcome {
            value: None,
            calls: 0,
            backoffs: 0,
            last_error: None,
        };
        let mut attempt = 0usize;

        while let Some(step) = self.schedule.get(attempt).copied() {
            outcome.calls += 1;
            let result = oracle.ask(prompt, system, &self.params(oracle, step)).await;

            match result {
                Ok(value) => {
                    if let Some(accepted) = accept(&value) {
                        outcome.value = Some(accepted);
                        return outcome;
                    }
                    debug!(
                        attempt = attempt + 1,
                        temperature = step.temperature,
                        "Oracle answer had nothing usable"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    match err.disposition() {
                        Disposition::Backoff if outcome.backoffs < self.max_backoffs => {
                            let delay = self.backoff_delay(outcome.backoffs);
                            outcome.backoffs += 1;
                            warn!(
                                attempt = attempt + 1,
                                delay_ms = delay.as_millis() as u64,
                                "Content oracle rate limited, backing off"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        Disposition::Unusable => {
                            debug!(attempt = attempt + 1, error = %err, "Unusable oracle answer");
                            attempt += 1;
                        }
                        Disposition::Backoff | Disposition::Abort => {
                            warn!(
                                attempt = attempt + 1,
                                error = %err,
                                "Giving up on content oracle"
                            );
                            outcome.last_error = Some(err);
                            return outcome;
                        }
                    }
                    outcome.last_error = Some(err);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockLlmProvider, Reply};
    use serde_json::json;
    use std::sync::Arc;

    fn oracle(provider: &Arc<MockLlmProvider>) -> ContentOracle {
        ContentOracle::new(provider.clone(), "")
    }

    fn non_empty_items(value: &Value) -> Option<usize> {
        value["items"].as_array().map(Vec::len).filter(|n| *n > 0)
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::generation().with_backoff_base(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let provider = Arc::new(MockLlmProvider::new([Reply::json(json!({"items": [1]}))]));
        let outcome = fast()
            .run(&oracle(&provider), "p", "s", non_empty_items)
            .await;
        assert_eq!(outcome.value, Some(1));
        assert_eq!(outcome.calls, 1);
        assert_eq!(provider.request(0).temperature, Some(0.4));
        assert_eq!(provider.request(0).top_p, None);
    }

    #[tokio::test]
    async fn test_diversity_retry_widens_sampling() {
        let provider = Arc::new(MockLlmProvider::new([
            Reply::json(json!({"items": []})),
            Reply::Text("no json here".to_string()),
        ]));
        let outcome = fast()
            .run(&oracle(&provider), "p", "s", non_empty_items)
            .await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.calls, 2);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.request(1).temperature, Some(0.7));
        assert_eq!(provider.request(1).top_p, Some(0.95));
        assert!(matches!(outcome.last_error, Some(OracleError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_repeats_same_step_once() {
        let provider = Arc::new(MockLlmProvider::new([
            Reply::RateLimited,
            Reply::json(json!({"items": []})),
            Reply::json(json!({"items": []})),
            Reply::json(json!({"items": [1]})),
        ]));
        let outcome = fast()
            .run(&oracle(&provider), "p", "s", non_empty_items)
            .await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.calls, 3);
        assert_eq!(outcome.backoffs, 1);
        assert_eq!(outcome.calls, fast().max_calls());
        assert_eq!(provider.request(1).temperature, Some(0.4));
        assert_eq!(provider.request(2).temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_second_rate_limit_gives_up() {
        let provider = Arc::new(MockLlmProvider::new([
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::json(json!({"items": [1]})),
        ]));
        let outcome = fast()
            .run(&oracle(&provider), "p", "s", non_empty_items)
            .await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.calls, 2);
        assert!(matches!(outcome.last_error, Some(OracleError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let provider = Arc::new(MockLlmProvider::new([
            Reply::Status(503),
            Reply::json(json!({"items": [1]})),
        ]));
        let outcome = fast()
            .run(&oracle(&provider), "p", "s", non_empty_items)
            .await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.calls, 1);
        assert_eq!(outcome.last_error.and_then(|e| e.status()), Some(503));

        let provider = Arc::new(MockLlmProvider::new([Reply::MissingKey]));
        let outcome = fast()
            .run(&oracle(&provider), "p", "s", non_empty_items)
            .await;
        assert_eq!(outcome.calls, 1);
        assert_eq!(outcome.last_error, Some(OracleError::MissingCredential));
    }

    #[test]
    fn test_backoff_is_exponential() {
        let policy = RetryPolicy::single(0.0).with_backoff_base(Duration::from_millis(250));
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(250));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(1));
        assert_eq!(policy.max_calls(), 2);
        assert_eq!(policy.schedule(), &[SamplingStep::new(0.0)]);
    }

    #[test]
    fn test_empty_schedule_keeps_one_attempt() {
        let policy = RetryPolicy::generation().with_schedule(Vec::new());
        assert_eq!(policy.schedule().len(), 1);
    }
}
