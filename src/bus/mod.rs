//! Event bus connecting the pipeline stages.

pub mod dispatch;
pub mod event;

pub use dispatch::{DispatchStats, EventBus, Handler, HandlerFuture, Publisher};
pub use event::{
    draft_items_event, skill_plan_event, DraftItems, Event, SkillPlanReady, TopicReceived,
    ValidatedItems, ITEMS_VALIDATED, TOPIC_RECEIVED,
};
