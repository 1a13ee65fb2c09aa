//! Generation agent shared by all subjects.
//!
//! One [`SubjectAgent`] per subject subscribes to two events:
//!
//! - `topic.received`: the planning stage. Asks the oracle for a short
//!   skill plan, falls back to the profile's canned plan, and publishes
//!   `skill.plan.<subject>`.
//! - `skill.plan.<subject>`: the generation stage. Builds the item prompt,
//!   runs it through the [`RetryPolicy`], coerces the answer, falls back to
//!   the canned item, and publishes `items.<subject>`.
//!
//! Both stages always publish. Oracle failures only ever change what gets
//! published, never whether something is.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::coerce::{apply_job_settings, coerce_items};
use super::error::{AgentError, AgentResult};
use super::profile::SubjectProfile;
use super::retry::RetryPolicy;
use crate::bus::{
    skill_plan_event, DraftItems, Event, EventBus, Publisher, SkillPlanReady, TopicReceived,
    TOPIC_RECEIVED,
};
use crate::exam::{pick_topic_pair, Item, JobContext, SkillPlan, Subject, CHOICE_COUNT};
use crate::llm::SharedOracle;

/// Default number of items requested per run.
pub const DEFAULT_ITEMS_PER_RUN: usize = 1;

/// Temperature of the planning call.
pub const PLAN_TEMPERATURE: f64 = 0.3;

/// Configuration for a subject agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Items requested from the oracle and kept after coercion (1 to 5).
    pub items_per_run: usize,
    /// Retry policy for the planning call.
    pub plan_retry: RetryPolicy,
    /// Retry policy for the item-writing call.
    pub generation_retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            items_per_run: DEFAULT_ITEMS_PER_RUN,
            plan_retry: RetryPolicy::single(PLAN_TEMPERATURE),
            generation_retry: RetryPolicy::generation(),
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to 1..=5.
    pub fn with_items_per_run(mut self, count: usize) -> Self {
        self.items_per_run = count.clamp(1, CHOICE_COUNT);
        self
    }

    pub fn with_plan_retry(mut self, policy: RetryPolicy) -> Self {
        self.plan_retry = policy;
        self
    }

    pub fn with_generation_retry(mut self, policy: RetryPolicy) -> Self {
        self.generation_retry = policy;
        self
    }
}

/// Items produced by one generation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub items: Vec<Item>,
    /// Oracle calls issued, rate-limit retries included.
    pub calls: u32,
    /// True when the canned item stands in for oracle output.
    pub fallback: bool,
}

/// Generation agent for one subject.
pub struct SubjectAgent {
    profile: &'static SubjectProfile,
    oracle: SharedOracle,
    config: AgentConfig,
}

impl std::fmt::Debug for SubjectAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectAgent")
            .field("subject", &self.profile.subject)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SubjectAgent {
    pub fn new(subject: Subject, oracle: SharedOracle) -> Self {
        Self::with_config(subject, oracle, AgentConfig::default())
    }

    pub fn with_config(subject: Subject, oracle: SharedOracle, config: AgentConfig) -> Self {
        Self {
            profile: SubjectProfile::for_subject(subject),
            oracle,
            config,
        }
    }

    pub fn subject(&self) -> Subject {
        self.profile.subject
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> String {
        format!("{}-agent", self.profile.subject)
    }

    /// Planning stage. Never fails; falls back to the canned plan.
    pub async fn plan(&self, ctx: &JobContext, topic: &str) -> SkillPlan {
        let prompt = self.profile.plan_prompt(ctx, topic);
        let outcome = self
            .config
            .plan_retry
            .run(
                &self.oracle,
                &prompt,
                self.profile.plan_system,
                SkillPlan::from_oracle,
            )
            .await;

        match outcome.value {
            Some(plan) => {
                debug!(
                    job_id = %ctx.job_id,
                    subject = %self.subject(),
                    hints = plan.len(),
                    "Skill plan ready"
                );
                plan
            }
            None => {
                warn!(
                    job_id = %ctx.job_id,
                    subject = %self.subject(),
                    calls = outcome.calls,
                    error = ?outcome.last_error,
                    "No usable skill plan, using canned plan"
                );
                self.profile.canned_plan()
            }
        }
    }

    /// Generation stage. Never fails; falls back to the canned item.
    pub async fn generate(&self, ctx: &JobContext, topic: &str, plan: &SkillPlan) -> Generation {
        let started = Instant::now();
        let subject = self.subject();
        let count = self.config.items_per_run;
        let topics = pick_topic_pair(subject);
        let prompt = self.profile.items_prompt(ctx, topic, &topics, plan, count);
        let system = self.profile.items_system_prompt();

        let outcome = self
            .config
            .generation_retry
            .run(&self.oracle, &prompt, &system, |value| {
                let items = coerce_items(value, subject, count);
                (!items.is_empty()).then_some(items)
            })
            .await;

        let (mut items, fallback) = match outcome.value {
            Some(items) => (items, false),
            None => {
                warn!(
                    job_id = %ctx.job_id,
                    subject = %subject,
                    calls = outcome.calls,
                    error = ?outcome.last_error,
                    "No usable items from content oracle, using canned item"
                );
                (vec![self.profile.canned_item()], true)
            }
        };
        apply_job_settings(&mut items, ctx);

        info!(
            job_id = %ctx.job_id,
            subject = %subject,
            items = items.len(),
            calls = outcome.calls,
            fallback,
            duration_ms = started.elapsed().as_millis() as u64,
            "Draft items generated"
        );

        Generation {
            items,
            calls: outcome.calls,
            fallback,
        }
    }

    /// Handle `topic.received`: plan, then publish `skill.plan.<subject>`.
    pub async fn handle_topic(
        &self,
        event: TopicReceived,
        publisher: &Publisher,
    ) -> AgentResult<()> {
        let skill_plan = self.plan(&event.ctx, &event.topic).await;
        publisher.publish(SkillPlanReady {
            ctx: event.ctx,
            subject: self.subject(),
            topic: event.topic,
            skill_plan,
        })?;
        Ok(())
    }

    /// Handle `skill.plan.<subject>`: generate, then publish `items.<subject>`.
    pub async fn handle_plan(
        &self,
        event: SkillPlanReady,
        publisher: &Publisher,
    ) -> AgentResult<()> {
        let generation = self
            .generate(&event.ctx, &event.topic, &event.skill_plan)
            .await;
        publisher.publish(DraftItems {
            ctx: event.ctx,
            subject: self.subject(),
            items: generation.items,
        })?;
        Ok(())
    }

    async fn handle(&self, event: Event, publisher: &Publisher) -> AgentResult<()> {
        match event {
            Event::TopicReceived(payload) => self.handle_topic(payload, publisher).await,
            Event::SkillPlan(payload) if payload.subject == self.subject() => {
                self.handle_plan(payload, publisher).await
            }
            other => Err(AgentError::UnexpectedEvent {
                agent: self.name(),
                event: other.name(),
            }),
        }
    }

    /// Subscribe both stages of this agent on `bus`.
    pub fn register(self: &Arc<Self>, bus: &EventBus) {
        let publisher = bus.publisher();
        for name in [TOPIC_RECEIVED.to_string(), skill_plan_event(self.subject())] {
            let agent = Arc::clone(self);
            let publisher = publisher.clone();
            bus.subscribe(name, move |event| {
                let agent = Arc::clone(&agent);
                let publisher = publisher.clone();
                async move {
                    agent
                        .handle(event, &publisher)
                        .await
                        .map_err(anyhow::Error::from)
                }
            });
        }
        debug!(agent = %self.name(), "Registered subject agent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::{Difficulty, ImagePayload};
    use crate::llm::mock::{MockLlmProvider, Reply};
    use crate::llm::ContentOracle;
    use serde_json::json;
    use std::time::Duration;

    fn agent(subject: Subject, provider: &Arc<MockLlmProvider>) -> SubjectAgent {
        let oracle = Arc::new(ContentOracle::new(provider.clone(), ""));
        let fast = Duration::from_millis(1);
        let config = AgentConfig::new()
            .with_plan_retry(RetryPolicy::single(PLAN_TEMPERATURE).with_backoff_base(fast))
            .with_generation_retry(RetryPolicy::generation().with_backoff_base(fast));
        SubjectAgent::with_config(subject, oracle, config)
    }

    fn math_item(prompt: &str) -> serde_json::Value {
        json!({
            "prompt": prompt,
            "choices": ["15", "12", "10", "5", "8"],
            "answer": "A",
            "solution": "20 x 3/4 = 15"
        })
    }

    #[tokio::test]
    async fn test_plan_from_oracle() {
        let provider = Arc::new(MockLlmProvider::new([Reply::json(json!({
            "skill_plan": [{"skill": "fractions of amounts", "steps": ["divide", "multiply"]}]
        }))]));
        let agent = agent(Subject::Math, &provider);

        let plan = agent.plan(&JobContext::new(), "fractions").await;
        assert_eq!(
            plan.hints()[0].focus.as_deref(),
            Some("fractions of amounts")
        );
        assert_eq!(provider.request(0).temperature, Some(PLAN_TEMPERATURE));
        let request = provider.request(0);
        assert!(request.user_prompt().unwrap().contains("Topic: fractions"));
    }

    #[tokio::test]
    async fn test_malformed_plan_falls_back_to_canned() {
        let provider = Arc::new(MockLlmProvider::new([Reply::Text("not a plan".to_string())]));
        let agent = agent(Subject::English, &provider);

        let plan = agent.plan(&JobContext::new(), "inference").await;
        assert_eq!(
            plan,
            SubjectProfile::for_subject(Subject::English).canned_plan()
        );
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_stamps_difficulty() {
        let provider = Arc::new(MockLlmProvider::new([Reply::json(json!({
            "items": [math_item("What is 3/4 of 20?"), math_item("extra")]
        }))]));
        let agent = agent(Subject::Math, &provider);
        let ctx = JobContext::new().with_difficulty(Difficulty::Hard);

        let generation = agent
            .generate(&ctx, "fractions", &SkillPlan::default())
            .await;
        assert!(!generation.fallback);
        assert_eq!(generation.calls, 1);
        assert_eq!(generation.items.len(), 1);
        assert_eq!(generation.items[0].difficulty, Some(Difficulty::Hard));
        assert_eq!(generation.items[0].subject, Subject::Math);
    }

    #[tokio::test]
    async fn test_generate_retries_then_falls_back() {
        let provider = Arc::new(MockLlmProvider::new([
            Reply::json(json!({"items": []})),
            Reply::RateLimited,
            Reply::Text("still nothing".to_string()),
        ]));
        let agent = agent(Subject::Thinking, &provider);

        let generation = agent
            .generate(&JobContext::new(), "analogies", &SkillPlan::default())
            .await;
        assert!(generation.fallback);
        assert_eq!(generation.calls, 3);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(generation.items.len(), 1);
        let canned = SubjectProfile::for_subject(Subject::Thinking).canned_item();
        assert_eq!(generation.items[0].prompt, canned.prompt);
        assert_eq!(generation.items[0].difficulty, Some(Difficulty::Medium));
    }

    #[tokio::test]
    async fn test_credential_failure_uses_canned_item_without_retry() {
        let provider = Arc::new(MockLlmProvider::new([Reply::MissingKey]));
        let agent = agent(Subject::English, &provider);

        let generation = agent
            .generate(&JobContext::new(), "main idea", &SkillPlan::default())
            .await;
        assert!(generation.fallback);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(generation.items[0].answer, "B");
    }

    #[tokio::test]
    async fn test_image_grounding() {
        let provider = Arc::new(MockLlmProvider::new([Reply::json(json!({
            "items": [math_item("Using the bar graph, how many more apples than pears?")]
        }))]));
        let agent = agent(Subject::Math, &provider);
        let ctx = JobContext::new()
            .with_image(ImagePayload::new("Bar graph of fruit sales").with_type("bar graph"));

        let generation = agent.generate(&ctx, "", &SkillPlan::default()).await;
        let item = &generation.items[0];
        assert!(item.uses_image);
        assert_eq!(
            item.image_description.as_deref(),
            Some("Bar graph of fruit sales")
        );
        assert_eq!(item.image_type.as_deref(), Some("bar graph"));
        assert!(provider
            .request(0)
            .user_prompt()
            .unwrap()
            .starts_with("Image description: Bar graph of fruit sales"));
    }

    #[tokio::test]
    async fn test_registered_agent_runs_both_stages() {
        let provider = Arc::new(MockLlmProvider::new([
            Reply::json(json!({"skill_plan": [{"focus": "fractions"}]})),
            Reply::json(json!({"items": [math_item("What is 3/4 of 20?")]})),
        ]));
        let agent = Arc::new(agent(Subject::Math, &provider));
        let bus = Arc::new(EventBus::new());
        agent.register(&bus);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe("items.math", move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event)?;
                anyhow::Ok(())
            }
        });

        let runner = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.run().await })
        };
        let ctx = JobContext::new();
        bus.publish(TopicReceived {
            ctx: ctx.clone(),
            topic: "fractions".to_string(),
        })
        .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("draft items published")
            .unwrap();
        bus.stop();
        runner.await.unwrap().unwrap();

        match event {
            Event::DraftItems(draft) => {
                assert_eq!(draft.ctx, ctx);
                assert_eq!(draft.subject, Subject::Math);
                assert_eq!(draft.items.len(), 1);
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_foreign_plan_event_is_rejected() {
        let provider = Arc::new(MockLlmProvider::new(Vec::<Reply>::new()));
        let agent = agent(Subject::Math, &provider);
        let bus = EventBus::new();
        let event = Event::SkillPlan(SkillPlanReady {
            ctx: JobContext::new(),
            subject: Subject::English,
            topic: String::new(),
            skill_plan: SkillPlan::default(),
        });

        let err = agent.handle(event, &bus.publisher()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnexpectedEvent { .. }));
        assert_eq!(provider.call_count(), 0);
    }
}
