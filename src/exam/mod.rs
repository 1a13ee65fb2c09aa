//! Exam domain model: job context, items, reports, plans and topic vocabulary.

pub mod context;
pub mod item;
pub mod plan;
pub mod topics;

pub use context::{Budget, Constraints, Difficulty, Grade, ImagePayload, JobContext};
pub use item::{
    labelled_choices, BatchStatus, Choice, Item, ReportStatus, Subject, ValidationReport,
    CHOICE_COUNT, CHOICE_LABELS,
};
pub use plan::{PlanHint, SkillPlan};
pub use topics::{pick_topic_pair, seed_topic, topics_for};
