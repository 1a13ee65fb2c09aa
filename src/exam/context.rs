//! Job context: the per-run record threaded through every event.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Grade level targeted by generated items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[default]
    #[serde(rename = "Year 6")]
    Year6,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grade::Year6 => write!(f, "Year 6"),
        }
    }
}

/// Target difficulty, carried on the wire as the integer 1, 2 or 3.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Difficulty {
    Easy = 1,
    #[default]
    Medium = 2,
    Hard = 3,
}

impl Difficulty {
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Word used for this level inside prompts.
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Difficulty::Easy),
            2 => Ok(Difficulty::Medium),
            3 => Ok(Difficulty::Hard),
            other => Err(format!("difficulty must be 1, 2 or 3, got {}", other)),
        }
    }
}

impl From<Difficulty> for u8 {
    fn from(value: Difficulty) -> Self {
        value.level()
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.level(), self.label())
    }
}

/// Image-grounding payload supplied by whoever starts the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Textual description of the image the items must refer to.
    pub description: String,
    /// Kind of image (e.g. "bar graph", "diagram").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
}

impl ImagePayload {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            image_type: None,
        }
    }

    pub fn with_type(mut self, image_type: impl Into<String>) -> Self {
        self.image_type = Some(image_type.into());
        self
    }
}

/// Constraints attached to a job.
///
/// Known keys are typed; anything else is preserved verbatim in `extra` so
/// that downstream hops can pass it along unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Budget attached to a job. Carried but not consulted by any stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Budget(pub BTreeMap<String, Value>);

/// Identity and read-only settings of one pipeline run.
///
/// Created once by the driver; every stage receives its own copy inside the
/// event payload and hands an identical copy to the next stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: String,
    #[serde(default)]
    pub grade: Grade,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub budget: Budget,
}

impl JobContext {
    /// Creates a context with a fresh v4 job id and no constraints.
    pub fn new() -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            grade: Grade::default(),
            constraints: Constraints::default(),
            budget: Budget::default(),
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.constraints.difficulty = Some(difficulty);
        self
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.constraints.image = Some(image);
        self
    }

    /// Difficulty stages should aim for; medium when the job does not say.
    pub fn target_difficulty(&self) -> Difficulty {
        self.constraints.difficulty.unwrap_or_default()
    }

    /// The image payload, if present with a non-blank description.
    pub fn image(&self) -> Option<&ImagePayload> {
        self.constraints
            .image
            .as_ref()
            .filter(|img| !img.description.trim().is_empty())
    }

    pub fn requires_image(&self) -> bool {
        self.image().is_some()
    }
}

impl Default for JobContext {
    fn default() -> Self {
        Self::new()
    }
}
