//! Event names and payload records carried by the bus.
//!
//! Every payload carries its own copy of the [`JobContext`]; the `job_id`
//! inside it is the only thing tying a `topic.received` event to the
//! `items.validated` events it eventually produces.

use serde::{Deserialize, Serialize};

use crate::exam::{BatchStatus, Item, JobContext, SkillPlan, Subject, ValidationReport};

/// Published once per run by the driver.
pub const TOPIC_RECEIVED: &str = "topic.received";

/// Published by the validator once per draft batch.
pub const ITEMS_VALIDATED: &str = "items.validated";

/// Name of the skill-plan event for `subject`.
pub fn skill_plan_event(subject: Subject) -> String {
    format!("skill.plan.{}", subject)
}

/// Name of the draft-items event for `subject`.
pub fn draft_items_event(subject: Subject) -> String {
    format!("items.{}", subject)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicReceived {
    pub ctx: JobContext,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillPlanReady {
    pub ctx: JobContext,
    pub subject: Subject,
    pub topic: String,
    pub skill_plan: SkillPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItems {
    pub ctx: JobContext,
    pub subject: Subject,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedItems {
    pub ctx: JobContext,
    pub subject: Subject,
    pub items: Vec<Item>,
    pub status: BatchStatus,
    pub failed: Vec<ValidationReport>,
}

/// Any event the pipeline knows how to carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Event {
    TopicReceived(TopicReceived),
    SkillPlan(SkillPlanReady),
    DraftItems(DraftItems),
    Validated(ValidatedItems),
}

impl Event {
    /// Wire name handlers subscribe to.
    pub fn name(&self) -> String {
        match self {
            Event::TopicReceived(_) => TOPIC_RECEIVED.to_string(),
            Event::SkillPlan(p) => skill_plan_event(p.subject),
            Event::DraftItems(d) => draft_items_event(d.subject),
            Event::Validated(_) => ITEMS_VALIDATED.to_string(),
        }
    }

    pub fn ctx(&self) -> &JobContext {
        match self {
            Event::TopicReceived(p) => &p.ctx,
            Event::SkillPlan(p) => &p.ctx,
            Event::DraftItems(p) => &p.ctx,
            Event::Validated(p) => &p.ctx,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.ctx().job_id
    }
}

impl From<TopicReceived> for Event {
    fn from(payload: TopicReceived) -> Self {
        Event::TopicReceived(payload)
    }
}

impl From<SkillPlanReady> for Event {
    fn from(payload: SkillPlanReady) -> Self {
        Event::SkillPlan(payload)
    }
}

impl From<DraftItems> for Event {
    fn from(payload: DraftItems) -> Self {
        Event::DraftItems(payload)
    }
}

impl From<ValidatedItems> for Event {
    fn from(payload: ValidatedItems) -> Self {
        Event::Validated(payload)
    }
}
