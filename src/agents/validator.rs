//! Two-phase item validator.
//!
//! Phase 1 is structural and local: shape, labels, answer, non-empty text
//! and (for image jobs) an explicit reference to the image. Items that fail
//! here never reach the oracle.
//!
//! Phase 2 sends every structurally valid item of a batch to the oracle in a
//! single call and asks for per-item verdicts. Only an explicit `"fail"`
//! verdict fails an item. Missing verdicts, malformed verdicts and oracle
//! errors all let the item through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::error::{AgentError, AgentResult};
use super::retry::RetryPolicy;
use crate::bus::{draft_items_event, DraftItems, Event, EventBus, Publisher, ValidatedItems};
use crate::exam::{
    BatchStatus, Item, JobContext, Subject, ValidationReport, CHOICE_COUNT, CHOICE_LABELS,
};
use crate::llm::SharedOracle;

pub const AGENT_NAME: &str = "validator";

/// Words that count as a reference to the job's image.
pub const IMAGE_KEYWORDS: [&str; 6] = ["image", "graph", "diagram", "picture", "figure", "chart"];

/// Temperature of the semantic call.
pub const SEMANTIC_TEMPERATURE: f64 = 0.0;

pub const REASON_CHOICE_COUNT: &str = "must have exactly 5 choices";
pub const REASON_LABEL_ORDER: &str = "choice labels must be A,B,C,D,E in order";
pub const REASON_ANSWER_LABEL: &str = "answer must be one of A,B,C,D,E";
pub const REASON_EMPTY_PROMPT: &str = "prompt must not be empty";
pub const REASON_IMAGE_REFERENCE: &str = "prompt must reference the image";

/// Reason used when the oracle fails an item without saying why.
const REASON_SEMANTIC_DEFAULT: &str = "semantic check failed";

const SEMANTIC_SYSTEM: &str = "You are a meticulous Year 6 exam reviewer. \
    For each multiple-choice item, check that exactly one choice is correct, that the keyed \
    answer is that choice, and that the content is factually correct and age appropriate. \
    Respond ONLY with JSON: {\"reports\": [{\"item_id\", \"status\": \"pass\"|\"fail\", \
    \"reasons\": [..], \"corrected_answer\"}]}. Include corrected_answer only when the key is wrong.";

/// Structural defects of `item`, in a fixed order. Empty means the item passes.
pub fn structural_check(item: &Item, require_image: bool) -> Vec<String> {
    let mut reasons = Vec::new();

    if item.choices.len() != CHOICE_COUNT {
        reasons.push(REASON_CHOICE_COUNT.to_string());
    } else if !item
        .choices
        .iter()
        .zip(CHOICE_LABELS)
        .all(|(choice, label)| choice.id == label)
    {
        reasons.push(REASON_LABEL_ORDER.to_string());
    }

    if !CHOICE_LABELS.contains(&item.answer.as_str()) {
        reasons.push(REASON_ANSWER_LABEL.to_string());
    }

    if item.prompt.trim().is_empty() {
        reasons.push(REASON_EMPTY_PROMPT.to_string());
    }

    for choice in &item.choices {
        if choice.text.trim().is_empty() {
            reasons.push(format!("choice {} text must not be empty", choice.id));
        }
    }

    if require_image && !references_image(&item.prompt) {
        reasons.push(REASON_IMAGE_REFERENCE.to_string());
    }

    reasons
}

fn references_image(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    IMAGE_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// Run the oracle-assisted phase. When false only structural checks apply.
    pub semantic: bool,
    pub retry: RetryPolicy,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            semantic: true,
            retry: RetryPolicy::single(SEMANTIC_TEMPERATURE),
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_semantic(mut self, semantic: bool) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// The validator.
pub struct Validator {
    oracle: SharedOracle,
    config: ValidatorConfig,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(oracle: SharedOracle) -> Self {
        Self::with_config(oracle, ValidatorConfig::default())
    }

    pub fn with_config(oracle: SharedOracle, config: ValidatorConfig) -> Self {
        Self { oracle, config }
    }

    /// Explicit semantic failures for `items`.
    ///
    /// Returns an empty list when the oracle errors or answers with
    /// anything other than explicit `"fail"` verdicts.
    pub async fn semantic_check(&self, ctx: &JobContext, items: &[Item]) -> Vec<ValidationReport> {
        if items.is_empty() {
            return Vec::new();
        }

        let prompt = semantic_prompt(items);
        let outcome = self
            .config
            .retry
            .run(
                &self.oracle,
                &prompt,
                SEMANTIC_SYSTEM,
                |value| Some(value.clone()),
            )
            .await;

        let Some(answer) = outcome.value else {
            warn!(
                job_id = %ctx.job_id,
                items = items.len(),
                error = ?outcome.last_error,
                "Semantic validation unavailable, passing batch"
            );
            return Vec::new();
        };

        let failures = parse_semantic_failures(&answer, items);
        if failures.is_empty() && report_list(&answer).is_none() {
            debug!(
                job_id = %ctx.job_id,
                "Semantic answer carried no reports, passing batch"
            );
        }
        failures
    }

    /// Validate one draft batch.
    pub async fn validate(
        &self,
        ctx: &JobContext,
        subject: Subject,
        items: Vec<Item>,
    ) -> ValidatedItems {
        let started = Instant::now();
        let require_image = ctx.requires_image();

        let mut failed = Vec::new();
        let mut candidates = Vec::with_capacity(items.len());
        for item in items {
            let reasons = structural_check(&item, require_image);
            if reasons.is_empty() {
                candidates.push(item);
            } else {
                debug!(
                    job_id = %ctx.job_id,
                    item_id = %item.id,
                    ?reasons,
                    "Structural check failed"
                );
                failed.push(ValidationReport::fail(&item, reasons));
            }
        }

        let structural_failures = failed.len();
        if self.config.semantic {
            let semantic = self.semantic_check(ctx, &candidates).await;
            if !semantic.is_empty() {
                candidates.retain(|item| !semantic.iter().any(|r| r.item_id == item.id));
                failed.extend(semantic);
            }
        }

        let status = BatchStatus::from_counts(candidates.len(), failed.len());
        info!(
            job_id = %ctx.job_id,
            subject = %subject,
            passed = candidates.len(),
            structural_failures,
            semantic_failures = failed.len() - structural_failures,
            %status,
            duration_ms = started.elapsed().as_millis() as u64,
            "Batch validated"
        );

        ValidatedItems {
            ctx: ctx.clone(),
            subject,
            items: candidates,
            status,
            failed,
        }
    }

    /// Handle `items.<subject>`: validate, then publish `items.validated`.
    pub async fn handle_draft(&self, event: DraftItems, publisher: &Publisher) -> AgentResult<()> {
        let validated = self.validate(&event.ctx, event.subject, event.items).await;
        publisher.publish(validated)?;
        Ok(())
    }

    async fn handle(&self, event: Event, publisher: &Publisher) -> AgentResult<()> {
        match event {
            Event::DraftItems(draft) => self.handle_draft(draft, publisher).await,
            other => Err(AgentError::UnexpectedEvent {
                agent: AGENT_NAME.to_string(),
                event: other.name(),
            }),
        }
    }

    /// Subscribe to the draft-items event of every subject.
    pub fn register(self: &Arc<Self>, bus: &EventBus) {
        let publisher = bus.publisher();
        for subject in Subject::ALL {
            let validator = Arc::clone(self);
            let publisher = publisher.clone();
            bus.subscribe(draft_items_event(subject), move |event| {
                let validator = Arc::clone(&validator);
                let publisher = publisher.clone();
                async move {
                    validator
                        .handle(event, &publisher)
                        .await
                        .map_err(anyhow::Error::from)
                }
            });
        }
        debug!(agent = AGENT_NAME, "Registered validator");
    }
}

fn semantic_prompt(items: &[Item]) -> String {
    let batch: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "item_id": item.id,
                "subject": item.subject,
                "prompt": item.prompt,
                "choices": item.choices,
                "answer": item.answer,
                "solution": item.solution,
            })
        })
        .collect();

    format!(
        "Review these {} item(s). Return one report per item_id.\n{}",
        items.len(),
        Value::Array(batch)
    )
}

fn report_list(answer: &Value) -> Option<&Vec<Value>> {
    match answer {
        Value::Array(list) => Some(list),
        Value::Object(map) => map.get("reports").and_then(Value::as_array),
        _ => None,
    }
}

/// Turn the oracle's reports into failure reports for known items.
///
/// Reports for unknown ids, reports without a readable status, and
/// anything not saying `"fail"` are ignored. The first failure for an item
/// wins.
fn parse_semantic_failures(answer: &Value, items: &[Item]) -> Vec<ValidationReport> {
    let Some(reports) = report_list(answer) else {
        return Vec::new();
    };

    let by_id: HashMap<&str, &Item> = items.iter().map(|i| (i.id.as_str(), i)).collect();
    let mut failures: Vec<ValidationReport> = Vec::new();

    for report in reports {
        let Some(item_id) = report.get("item_id").and_then(Value::as_str) else {
            continue;
        };
        let Some(item) = by_id.get(item_id) else {
            continue;
        };
        let explicit_fail = report
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("fail"));
        if !explicit_fail || failures.iter().any(|f| f.item_id == item.id) {
            continue;
        }

        let mut reasons: Vec<String> = match report.get("reasons") {
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        };
        if reasons.is_empty() {
            reasons.push(REASON_SEMANTIC_DEFAULT.to_string());
        }

        let mut failure = ValidationReport::fail(item, reasons);
        if let Some(corrected) = report
            .get("corrected_answer")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            failure = failure.with_corrected_answer(corrected);
        }
        failures.push(failure);
    }

    failures
}
