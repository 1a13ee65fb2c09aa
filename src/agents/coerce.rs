//! Normalization of raw oracle output into well-formed [`Item`]s.
//!
//! This is the trust boundary for generated content: whatever JSON the
//! oracle hands back is either turned into typed items here or dropped.

use serde_json::{Map, Value};

use crate::exam::{Choice, Item, JobContext, Subject, CHOICE_COUNT, CHOICE_LABELS};

/// Longest image description copied onto prompts and items, in characters.
pub const MAX_IMAGE_DESCRIPTION_CHARS: usize = 500;

/// Answer used when the oracle does not give one.
const DEFAULT_ANSWER: &str = "A";

/// Coerce up to `limit` items out of an oracle answer.
///
/// Accepts `{"items": [...]}`, a bare list, or a single item object.
/// Entries that are not objects are skipped. Choices are padded with
/// `Option X` placeholders or truncated to five and relabelled `A..E`.
pub fn coerce_items(value: &Value, subject: Subject, limit: usize) -> Vec<Item> {
    raw_items(value)
        .into_iter()
        .filter_map(Value::as_object)
        .take(limit)
        .map(|raw| coerce_item(raw, subject))
        .collect()
}

fn raw_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(list) => list.iter().collect(),
        Value::Object(map) => match map.get("items") {
            Some(Value::Array(list)) => list.iter().collect(),
            Some(single @ Value::Object(_)) => vec![single],
            Some(_) => Vec::new(),
            None if map.contains_key("prompt") || map.contains_key("question") => vec![value],
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn coerce_item(raw: &Map<String, Value>, subject: Subject) -> Item {
    let prompt = ["prompt", "question"]
        .iter()
        .find_map(|k| {
            raw.get(*k)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or_default()
        .trim()
        .to_string();

    let raw_choices: Vec<&Value> = match raw.get("choices").or_else(|| raw.get("options")) {
        Some(Value::Array(list)) => list.iter().take(CHOICE_COUNT).collect(),
        _ => Vec::new(),
    };

    let original_ids: Vec<Option<String>> = raw_choices
        .iter()
        .map(|c| c.get("id").or_else(|| c.get("label")).and_then(scalar_text))
        .collect();

    let mut choices: Vec<Choice> = raw_choices
        .iter()
        .zip(CHOICE_LABELS)
        .map(|(c, label)| Choice::new(label, choice_text(c)))
        .collect();
    for label in &CHOICE_LABELS[choices.len()..] {
        choices.push(Choice::new(*label, format!("Option {}", label)));
    }

    let answer = match raw.get("answer").and_then(scalar_text) {
        Some(raw_answer) => normalize_answer(&raw_answer, &original_ids, &choices),
        None => DEFAULT_ANSWER.to_string(),
    };

    let solution = raw
        .get("solution")
        .or_else(|| raw.get("explanation"))
        .and_then(scalar_text)
        .unwrap_or_default();

    let tags: Vec<String> = match raw.get("tags") {
        Some(Value::Array(list)) => list.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    };
    let tags = if tags.is_empty() {
        default_tags(subject)
    } else {
        tags
    };

    Item::new(subject, prompt, choices, answer, solution).with_tags(tags)
}

/// Tags stamped on items the oracle did not tag.
pub fn default_tags(subject: Subject) -> Vec<String> {
    vec!["Year6".to_string(), subject.to_string()]
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn choice_text(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .get("text")
            .or_else(|| map.get("value"))
            .and_then(scalar_text)
            .unwrap_or_default(),
        other => scalar_text(other).unwrap_or_default(),
    }
}

/// Map the oracle's answer onto one of the forced labels.
///
/// The original choice ids win when the oracle supplied them, since the
/// labels were reassigned by position. After that come bare letters in
/// either case with optional punctuation (`b`, `B)`, `(B)`, `B.`) and the
/// text of a choice. Anything else is kept verbatim for the validator to
/// reject.
fn normalize_answer(raw: &str, original_ids: &[Option<String>], choices: &[Choice]) -> String {
    let core = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '(' | ')' | '.' | ':' | '[' | ']'))
        .trim();

    let by_original_id = original_ids
        .iter()
        .position(|id| id.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(core)));
    if let Some(index) = by_original_id {
        return CHOICE_LABELS[index].to_string();
    }

    let upper = core.to_uppercase();
    if let Some(label) = CHOICE_LABELS.iter().find(|l| **l == upper) {
        return (*label).to_string();
    }

    if let Some(choice) = choices
        .iter()
        .find(|c| c.text.eq_ignore_ascii_case(raw.trim()))
    {
        return choice.id.clone();
    }

    raw.trim().to_string()
}

/// Image description truncated to [`MAX_IMAGE_DESCRIPTION_CHARS`].
pub fn truncate_description(description: &str) -> String {
    description
        .trim()
        .chars()
        .take(MAX_IMAGE_DESCRIPTION_CHARS)
        .collect()
}

/// Stamp job-level settings onto freshly generated items: the target
/// difficulty always, image metadata when the job carries an image.
pub fn apply_job_settings(items: &mut [Item], ctx: &JobContext) {
    let difficulty = ctx.target_difficulty();
    let image = ctx.image();
    for item in items.iter_mut() {
        item.difficulty = Some(difficulty);
        if let Some(image) = image {
            item.uses_image = true;
            item.image_description = Some(truncate_description(&image.description));
            item.image_type = image.image_type.clone();
        }
    }
}
