//! Exam items, choices, and validation reports.

use serde::{Deserialize, Serialize};

use super::context::Difficulty;

/// Choice labels every well-formed item uses, in order.
pub const CHOICE_LABELS: [&str; 5] = ["A", "B", "C", "D", "E"];

/// Number of choices on a well-formed item.
pub const CHOICE_COUNT: usize = CHOICE_LABELS.len();

/// Subject an item belongs to.
///
/// `English` is the reading-comprehension (language) subject and `Thinking`
/// the thinking-skills (reasoning) subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Math,
    English,
    Thinking,
}

impl Subject {
    pub const ALL: [Subject; 3] = [Subject::Math, Subject::English, Subject::Thinking];

    /// Wire name used in event names and storage paths.
    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::English => "english",
            Subject::Thinking => "thinking",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "math" | "maths" | "mathematics" => Ok(Subject::Math),
            "english" | "reading" | "language" => Ok(Subject::English),
            "thinking" | "reasoning" => Ok(Subject::Thinking),
            other => Err(format!("unknown subject '{}'", other)),
        }
    }
}

/// One answer option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A multiple-choice exam item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub subject: Subject,
    pub prompt: String,
    pub choices: Vec<Choice>,
    pub answer: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub uses_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
}

impl Item {
    /// Creates an item with a fresh id and no image grounding.
    pub fn new(
        subject: Subject,
        prompt: impl Into<String>,
        choices: Vec<Choice>,
        answer: impl Into<String>,
        solution: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject,
            prompt: prompt.into(),
            choices,
            answer: answer.into(),
            solution: solution.into(),
            tags: Vec::new(),
            difficulty: None,
            uses_image: false,
            image_description: None,
            image_type: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    /// Text of the choice the answer label points at.
    pub fn answer_text(&self) -> Option<&str> {
        self.choices
            .iter()
            .find(|c| c.id == self.answer)
            .map(|c| c.text.as_str())
    }
}

/// Builds five labelled choices from five texts.
pub fn labelled_choices(texts: [&str; CHOICE_COUNT]) -> Vec<Choice> {
    CHOICE_LABELS
        .iter()
        .zip(texts)
        .map(|(label, text)| Choice::new(*label, text))
        .collect()
}

/// Verdict on a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pass,
    Fail,
}

/// Why an item did (or did not) survive validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub item_id: String,
    pub subject: Subject,
    pub status: ReportStatus,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_answer: Option<String>,
}

impl ValidationReport {
    pub fn fail(item: &Item, reasons: Vec<String>) -> Self {
        Self {
            item_id: item.id.clone(),
            subject: item.subject,
            status: ReportStatus::Fail,
            reasons,
            corrected_answer: None,
        }
    }

    pub fn with_corrected_answer(mut self, answer: impl Into<String>) -> Self {
        self.corrected_answer = Some(answer.into());
        self
    }
}

/// Summary verdict of one validated batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Nothing failed.
    Pass,
    /// Some items passed, some failed.
    Partial,
    /// Items failed and none passed.
    Fail,
}

impl BatchStatus {
    pub fn from_counts(passed: usize, failed: usize) -> Self {
        match (passed, failed) {
            (_, 0) => BatchStatus::Pass,
            (0, _) => BatchStatus::Fail,
            _ => BatchStatus::Partial,
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Pass => write!(f, "pass"),
            BatchStatus::Partial => write!(f, "partial"),
            BatchStatus::Fail => write!(f, "fail"),
        }
    }
}
