//! Skill plans: advisory hints produced by the planning stage.
//!
//! Plans come straight from the content oracle, so parsing is deliberately
//! forgiving. Whatever shape arrives is either coerced into [`PlanHint`]s or
//! discarded; nothing untyped travels further down the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One loosely-structured planning hint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

impl PlanHint {
    pub fn new(focus: impl Into<String>) -> Self {
        Self {
            focus: Some(focus.into()),
            ..Self::default()
        }
    }

    pub fn with_passage_type(mut self, passage_type: impl Into<String>) -> Self {
        self.passage_type = Some(passage_type.into());
        self
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.focus.is_none()
            && self.passage_type.is_none()
            && self.steps.is_empty()
            && self.difficulty.is_none()
    }

    fn from_value(value: &Value) -> Option<Self> {
        let hint = match value {
            Value::String(s) => Self {
                focus: non_blank(s),
                ..Self::default()
            },
            Value::Object(map) => Self {
                focus: ["focus", "skill", "skills"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(text_of)),
                passage_type: map.get("passage_type").and_then(text_of),
                steps: map.get("steps").map(list_of).unwrap_or_default(),
                difficulty: map.get("difficulty").and_then(text_of),
            },
            _ => return None,
        };
        (!hint.is_empty()).then_some(hint)
    }
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .filter_map(text_of)
                .collect::<Vec<_>>()
                .join(", ");
            non_blank(&joined)
        }
        _ => None,
    }
}

fn list_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(parts) => parts.iter().filter_map(text_of).collect(),
        other => text_of(other).into_iter().collect(),
    }
}

/// An ordered list of planning hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillPlan(pub Vec<PlanHint>);

impl SkillPlan {
    pub fn new(hints: Vec<PlanHint>) -> Self {
        Self(hints)
    }

    pub fn hints(&self) -> &[PlanHint] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Coerces an oracle response into a plan.
    ///
    /// Accepts a bare list, an object with a `skill_plan` list, or a single
    /// hint object. Returns `None` when nothing usable survives.
    pub fn from_oracle(value: &Value) -> Option<Self> {
        let entries: Vec<&Value> = match value {
            Value::Array(list) => list.iter().collect(),
            Value::Object(map) => match map.get("skill_plan") {
                Some(Value::Array(list)) => list.iter().collect(),
                Some(single @ Value::Object(_)) => vec![single],
                Some(_) => Vec::new(),
                None => vec![value],
            },
            _ => Vec::new(),
        };

        let hints: Vec<PlanHint> = entries
            .into_iter()
            .filter_map(PlanHint::from_value)
            .collect();
        (!hints.is_empty()).then_some(Self(hints))
    }

    /// One-line rendering of the leading hint for use inside a prompt.
    pub fn prompt_hint(&self) -> Option<String> {
        let first = self.0.first()?;
        let mut parts = Vec::new();
        if let Some(passage_type) = &first.passage_type {
            parts.push(format!("Passage type: {}.", passage_type));
        }
        if let Some(focus) = &first.focus {
            parts.push(format!("Focus: {}.", focus));
        }
        if !first.steps.is_empty() {
            parts.push(format!("Reasoning steps: {}.", first.steps.join(" -> ")));
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skill_plan_object() {
        let plan = SkillPlan::from_oracle(&json!({
            "skill_plan": [
                {
                    "skill": "multi-step reasoning",
                    "steps": ["identify", "compute"],
                    "difficulty": 3
                },
                {"focus": "  "}
            ]
        }))
        .unwrap();

        assert_eq!(plan.len(), 1);
        let hint = &plan.hints()[0];
        assert_eq!(hint.focus.as_deref(), Some("multi-step reasoning"));
        assert_eq!(hint.steps, vec!["identify", "compute"]);
        assert_eq!(hint.difficulty.as_deref(), Some("3"));
    }

    #[test]
    fn test_bare_list_and_single_object() {
        let plan = SkillPlan::from_oracle(&json!(["main idea", {"focus": "inference"}])).unwrap();
        assert_eq!(plan.len(), 2);

        let plan = SkillPlan::from_oracle(&json!({
            "passage_type": "narrative",
            "focus": "tone",
            "steps": "read then infer"
        }))
        .unwrap();
        assert_eq!(plan.hints()[0].steps, vec!["read then infer"]);
        assert_eq!(
            plan.prompt_hint().unwrap(),
            "Passage type: narrative. Focus: tone. Reasoning steps: read then infer."
        );
    }

    #[test]
    fn test_unusable_shapes() {
        assert!(SkillPlan::from_oracle(&json!({"skill_plan": "do maths"})).is_none());
        assert!(SkillPlan::from_oracle(&json!({"skill_plan": []})).is_none());
        assert!(SkillPlan::from_oracle(&json!(42)).is_none());
        assert!(SkillPlan::from_oracle(&json!({"unrelated": true})).is_none());
    }

    #[test]
    fn test_serializes_as_list() {
        let plan = SkillPlan::new(vec![PlanHint::new("ratios")]);
        assert_eq!(
            serde_json::to_value(&plan).unwrap(),
            json!([{"focus": "ratios"}])
        );
        assert!(SkillPlan::default().prompt_hint().is_none());
    }
}
