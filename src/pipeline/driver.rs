//! Pipeline driver: starts one run and decides when it is done.
//!
//! A run gets its own [`EventBus`]. The driver registers the requested
//! subject agents and the validator, subscribes a collector for this run's
//! `items.validated` events, publishes `topic.received`, and then waits
//! according to its [`StopPolicy`]. Whatever happens, the dispatch loop is
//! stopped before the outcome is returned; handlers still in flight are
//! abandoned.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{ConfigError, PipelineConfig};
use crate::agents::{SubjectAgent, Validator};
use crate::bus::{DispatchStats, Event, EventBus, TopicReceived, ValidatedItems, ITEMS_VALIDATED};
use crate::error::BusError;
use crate::exam::{seed_topic, BatchStatus, Item, JobContext, Subject, ValidationReport};
use crate::llm::SharedOracle;

/// Topic used when several subjects share one run and no topic was given.
pub const MIXED_SEED_TOPIC: &str = "Year 6 selective practice";

/// Errors that stop a run from starting or finishing cleanly.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run requested no subjects")]
    NoSubjects,

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Dispatch loop task failed: {0}")]
    DispatchLoop(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// When a run counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// After this many terminal events. Waits indefinitely otherwise.
    Count(usize),
    /// After this much wall-clock time, regardless of progress.
    Timeout(Duration),
    /// Whichever of the two comes first.
    CountOrTimeout { count: usize, timeout: Duration },
}

impl StopPolicy {
    pub fn count(&self) -> Option<usize> {
        match self {
            StopPolicy::Count(count) | StopPolicy::CountOrTimeout { count, .. } => Some(*count),
            StopPolicy::Timeout(_) => None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            StopPolicy::Timeout(timeout) | StopPolicy::CountOrTimeout { timeout, .. } => {
                Some(*timeout)
            }
            StopPolicy::Count(_) => None,
        }
    }
}

/// What to run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub ctx: JobContext,
    pub subjects: Vec<Subject>,
    pub topic: Option<String>,
    /// `None` means one terminal event per subject, bounded by the
    /// configured run timeout.
    pub stop: Option<StopPolicy>,
}

impl RunRequest {
    /// A request with a fresh job context. Duplicate subjects are dropped.
    pub fn new(subjects: impl IntoIterator<Item = Subject>) -> Self {
        let mut unique = Vec::new();
        for subject in subjects {
            if !unique.contains(&subject) {
                unique.push(subject);
            }
        }
        Self {
            ctx: JobContext::new(),
            subjects: unique,
            topic: None,
            stop: None,
        }
    }

    pub fn single(subject: Subject) -> Self {
        Self::new([subject])
    }

    pub fn all() -> Self {
        Self::new(Subject::ALL)
    }

    pub fn with_ctx(mut self, ctx: JobContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_stop(mut self, stop: StopPolicy) -> Self {
        self.stop = Some(stop);
        self
    }

    /// The explicit topic, else a random pair for a single subject, else
    /// [`MIXED_SEED_TOPIC`].
    pub fn resolved_topic(&self) -> String {
        match (&self.topic, self.subjects.as_slice()) {
            (Some(topic), _) if !topic.trim().is_empty() => topic.trim().to_string(),
            (_, [subject]) => seed_topic(*subject),
            _ => MIXED_SEED_TOPIC.to_string(),
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub ctx: JobContext,
    pub topic: String,
    /// Items that passed validation, across all terminal events.
    pub items: Vec<Item>,
    /// Failure reports, across all terminal events.
    pub failed: Vec<ValidationReport>,
    /// Per terminal event, in arrival order.
    pub batches: Vec<(Subject, BatchStatus)>,
    pub terminal_events: usize,
    /// True when the run stopped because its time bound elapsed.
    pub timed_out: bool,
    pub dispatch: DispatchStats,
}

impl RunOutcome {
    fn absorb(&mut self, batch: ValidatedItems) {
        self.terminal_events += 1;
        self.batches.push((batch.subject, batch.status));
        self.items.extend(batch.items);
        self.failed.extend(batch.failed);
    }
}

/// The pipeline driver.
pub struct PipelineDriver {
    config: PipelineConfig,
    oracle: SharedOracle,
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("config", &self.config)
            .field("oracle", &self.oracle)
            .finish()
    }
}

impl PipelineDriver {
    /// Creates a driver around an existing oracle.
    pub fn new(config: PipelineConfig, oracle: SharedOracle) -> Self {
        Self { config, oracle }
    }

    /// Validates `config` and builds the production oracle from it.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let oracle = config.build_oracle()?;
        Ok(Self::new(config, oracle))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stop policy applied when a request does not carry one.
    pub fn default_stop(&self, subjects: usize) -> StopPolicy {
        StopPolicy::CountOrTimeout {
            count: subjects,
            timeout: self.config.run_timeout,
        }
    }

    fn build_bus(&self, subjects: &[Subject]) -> EventBus {
        let bus = EventBus::new();
        let agent_config = self.config.agent_config();
        for subject in subjects {
            Arc::new(SubjectAgent::with_config(
                *subject,
                Arc::clone(&self.oracle),
                agent_config.clone(),
            ))
            .register(&bus);
        }
        Arc::new(Validator::with_config(
            Arc::clone(&self.oracle),
            self.config.validator_config(),
        ))
        .register(&bus);
        bus
    }

    /// Run one job to completion according to its stop policy.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, PipelineError> {
        if request.subjects.is_empty() {
            return Err(PipelineError::NoSubjects);
        }

        let topic = request.resolved_topic();
        let stop = request
            .stop
            .unwrap_or_else(|| self.default_stop(request.subjects.len()));
        let ctx = request.ctx;
        let bus = Arc::new(self.build_bus(&request.subjects));

        let (tx, mut rx) = mpsc::unbounded_channel::<ValidatedItems>();
        let job_id = ctx.job_id.clone();
        bus.subscribe(ITEMS_VALIDATED, move |event| {
            let tx = tx.clone();
            let job_id = job_id.clone();
            async move {
                match event {
                    Event::Validated(batch) if batch.ctx.job_id == job_id => tx
                        .send(batch)
                        .map_err(|_| anyhow::anyhow!("collector for job {} is closed", job_id)),
                    other => {
                        debug!(job_id = %other.job_id(), "Ignoring terminal event of another job");
                        Ok(())
                    }
                }
            }
        });

        let dispatch_loop = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.run().await })
        };

        info!(
            job_id = %ctx.job_id,
            subjects = ?request.subjects,
            %topic,
            ?stop,
            "Starting pipeline run"
        );

        let mut outcome = RunOutcome {
            ctx: ctx.clone(),
            topic: topic.clone(),
            items: Vec::new(),
            failed: Vec::new(),
            batches: Vec::new(),
            terminal_events: 0,
            timed_out: false,
            dispatch: DispatchStats::default(),
        };

        let published = bus.publish(TopicReceived {
            ctx: ctx.clone(),
            topic,
        });

        if published.is_ok() {
            let deadline = stop.timeout().map(|t| Instant::now() + t);
            loop {
                if stop.count().is_some_and(|n| outcome.terminal_events >= n) {
                    break;
                }
                let next = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                        Ok(next) => next,
                        Err(_) => {
                            outcome.timed_out = true;
                            break;
                        }
                    },
                    None => rx.recv().await,
                };
                match next {
                    Some(batch) => {
                        debug!(
                            job_id = %ctx.job_id,
                            subject = %batch.subject,
                            status = %batch.status,
                            "Terminal event received"
                        );
                        outcome.absorb(batch);
                    }
                    None => break,
                }
            }
        }

        bus.stop();
        outcome.dispatch = dispatch_loop
            .await
            .map_err(|e| PipelineError::DispatchLoop(e.to_string()))??;
        published?;

        if outcome.timed_out {
            warn!(
                job_id = %ctx.job_id,
                terminal_events = outcome.terminal_events,
                "Run timed out, returning partial results"
            );
        }
        info!(
            job_id = %ctx.job_id,
            items = outcome.items.len(),
            failed = outcome.failed.len(),
            terminal_events = outcome.terminal_events,
            abandoned = outcome.dispatch.handlers_abandoned,
            "Pipeline run finished"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::Difficulty;
    use crate::llm::mock::{MockLlmProvider, Reply};
    use crate::llm::ContentOracle;
    use serde_json::json;

    fn driver(provider: &Arc<MockLlmProvider>, semantic: bool) -> PipelineDriver {
        let config = PipelineConfig::default()
            .with_backoff_base(Duration::from_millis(1))
            .with_run_timeout(Duration::from_secs(5))
            .with_semantic_validation(semantic);
        let oracle = Arc::new(ContentOracle::new(provider.clone(), ""));
        PipelineDriver::new(config, oracle)
    }

    #[test]
    fn test_stop_policy_accessors() {
        let both = StopPolicy::CountOrTimeout {
            count: 3,
            timeout: Duration::from_secs(30),
        };
        assert_eq!(both.count(), Some(3));
        assert_eq!(both.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(StopPolicy::Count(1).timeout(), None);
        assert_eq!(StopPolicy::Timeout(Duration::from_secs(1)).count(), None);
    }

    #[test]
    fn test_run_request_topics() {
        let request = RunRequest::new([Subject::Math, Subject::Math, Subject::English]);
        assert_eq!(request.subjects, vec![Subject::Math, Subject::English]);
        assert_eq!(request.resolved_topic(), MIXED_SEED_TOPIC);

        let single = RunRequest::single(Subject::Thinking);
        assert!(single.resolved_topic().contains(" and "));

        let explicit = RunRequest::all().with_topic("  fractions ");
        assert_eq!(explicit.resolved_topic(), "fractions");
    }

    #[tokio::test]
    async fn test_single_subject_run_with_scripted_oracle() {
        let provider = Arc::new(MockLlmProvider::new([
            Reply::json(json!({"skill_plan": [{"focus": "fractions of amounts"}]})),
            Reply::json(json!({"items": [{
                "prompt": "What is 3/4 of 20?",
                "choices": ["15", "12", "10", "5", "8"],
                "answer": "A",
                "solution": "20 x 3/4 = 15"
            }]})),
            Reply::json(json!({"reports": []})),
        ]));
        let driver = driver(&provider, true);
        let ctx = JobContext::new().with_difficulty(Difficulty::Hard);

        let request = RunRequest::single(Subject::Math)
            .with_ctx(ctx.clone())
            .with_topic("fractions");
        let outcome = driver.run(request).await.unwrap();

        assert_eq!(outcome.ctx, ctx);
        assert_eq!(outcome.terminal_events, 1);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].difficulty, Some(Difficulty::Hard));
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.batches, vec![(Subject::Math, BatchStatus::Pass)]);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_oracle_outage_still_yields_canned_items() {
        let provider = Arc::new(MockLlmProvider::new(Vec::<Reply>::new()));
        let driver = driver(&provider, true);

        let outcome = driver.run(RunRequest::all()).await.unwrap();
        assert_eq!(outcome.terminal_events, 3);
        assert_eq!(outcome.items.len(), 3);
        let mut subjects: Vec<Subject> = outcome.items.iter().map(|i| i.subject).collect();
        subjects.sort();
        assert_eq!(subjects, Subject::ALL.to_vec());
        let medium = Some(Difficulty::Medium);
        assert!(outcome.items.iter().all(|i| i.difficulty == medium));
    }

    #[tokio::test]
    async fn test_timeout_policy_returns_accumulated_results() {
        let provider = Arc::new(MockLlmProvider::new(Vec::<Reply>::new()));
        let driver = driver(&provider, false);

        let stop = StopPolicy::Timeout(Duration::from_millis(300));
        let outcome = driver
            .run(RunRequest::single(Subject::English).with_stop(stop))
            .await
            .unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.terminal_events, 1);
        assert_eq!(outcome.items.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let provider = Arc::new(MockLlmProvider::new(Vec::<Reply>::new()));
        let err = driver(&provider, false)
            .run(RunRequest::new(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoSubjects));
    }
}
