//! Per-subject prompt material and canned fallbacks.
//!
//! Everything subject-specific lives here as data. The generation protocol
//! itself is shared by all subjects in [`super::subject::SubjectAgent`].

use crate::exam::{labelled_choices, Item, JobContext, PlanHint, SkillPlan, Subject};

use super::coerce::truncate_description;

/// Static prompt material for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectProfile {
    pub subject: Subject,
    /// System prompt for the planning call.
    pub plan_system: &'static str,
    /// Planning instruction appended after the topic and grade lines.
    pub plan_instruction: &'static str,
    /// System prompt for the item-writing call.
    pub items_system: &'static str,
    /// Item-writing instruction; `{count}` is replaced with the item count.
    pub items_instruction: &'static str,
}

const ITEMS_JSON_SHAPE: &str =
    r#"Respond ONLY with JSON: {"items": [{"prompt", "choices": [{"id", "text"}], "answer", "solution", "tags"}]}."#;

pub const MATH: SubjectProfile = SubjectProfile {
    subject: Subject::Math,
    plan_system: "You design Year 6 Mathematical Reasoning item plans. \
        Return JSON with key skill_plan as a list of objects: {focus, steps, difficulty}.",
    plan_instruction: "Create a short skill_plan (1-2 entries) for multi-step numeric reasoning.",
    items_system: "You are a Year 6 Mathematical Reasoning item writer. \
        Produce multiple-choice questions (5 options: A-E) with a single correct answer and a short solution.",
    items_instruction: "Generate {count} Year 6 math MCQ(s) that require 1-3 steps. \
        Constraints: exact numeric answers, plausible distractors, 5 options per item.",
};

pub const ENGLISH: SubjectProfile = SubjectProfile {
    subject: Subject::English,
    plan_system: "You design Year 6 Reading Comprehension item plans. \
        Return JSON key skill_plan as a list of objects: {passage_type, focus, steps, difficulty}.",
    plan_instruction: "Create a plan for MCQs on main idea and inference. Keep reading level Lexile 800-1000.",
    items_system: "You are a Year 6 Reading Comprehension item writer. \
        Create MCQs with 5 options (A-E) and a single correct answer.",
    items_instruction: "Write a short 3-4 sentence passage (Year 6) inside each prompt. \
        Then create {count} MCQ(s) on main idea or inference. Keep language simple. 5 options per item.",
};

pub const THINKING: SubjectProfile = SubjectProfile {
    subject: Subject::Thinking,
    plan_system: "You design Year 6 selective exam reasoning plans. \
        Return compact JSON with key skill_plan as a list of objects with keys: skill, steps.",
    plan_instruction: "Create a minimal skill_plan (1-2 entries) focusing on multi-step reasoning.",
    items_system: "You are a Year 6 Thinking Skills item writer for selective tests. \
        Create multiple-choice questions with 5 options (A-E), exactly one correct. \
        Keep language simple; require reasoning, not background knowledge.",
    items_instruction: "Generate {count} Year 6 Thinking Skills MCQ(s) covering different types \
        from: analogies, pattern completion, ordering/ranking, logical deduction. Provide 5 options per item.",
};

impl SubjectProfile {
    pub fn for_subject(subject: Subject) -> &'static SubjectProfile {
        match subject {
            Subject::Math => &MATH,
            Subject::English => &ENGLISH,
            Subject::Thinking => &THINKING,
        }
    }

    /// User prompt for the planning call.
    pub fn plan_prompt(&self, ctx: &JobContext, topic: &str) -> String {
        format!(
            "Topic: {}\nGrade: {}\nTarget difficulty: {}\n{}",
            topic,
            ctx.grade,
            ctx.target_difficulty(),
            self.plan_instruction
        )
    }

    /// System prompt for the item-writing call, including the JSON contract.
    pub fn items_system_prompt(&self) -> String {
        format!("{} {}", self.items_system, ITEMS_JSON_SHAPE)
    }

    /// User prompt for the item-writing call.
    ///
    /// An image description, when the job carries one, goes first so the
    /// model reads it before anything else.
    pub fn items_prompt(
        &self,
        ctx: &JobContext,
        topic: &str,
        topics: &[&str],
        plan: &SkillPlan,
        count: usize,
    ) -> String {
        let mut lines = Vec::new();

        if let Some(image) = ctx.image() {
            let mut line = format!(
                "Image description: {}",
                truncate_description(&image.description)
            );
            if let Some(kind) = &image.image_type {
                line.push_str(&format!(" (image type: {})", kind));
            }
            lines.push(line);
            lines.push(
                "Every question must be answerable from the image and must refer to it \
                 explicitly as the image, graph or diagram."
                    .to_string(),
            );
        }

        let count_text = count.to_string();
        lines.push(self.items_instruction.replace("{count}", &count_text));
        if !topic.trim().is_empty() {
            lines.push(format!("Requested topic: {}.", topic.trim()));
        }
        if !topics.is_empty() {
            lines.push(format!("Topics: {}.", topics.join(", ")));
        }
        let difficulty = ctx.target_difficulty();
        lines.push(format!(
            "Grade: {}. Target difficulty: {} on a 1-3 scale ({}).",
            ctx.grade,
            difficulty.level(),
            difficulty.label()
        ));
        if let Some(hint) = plan.prompt_hint() {
            lines.push(hint);
        }
        lines.push(format!("Return exactly {} item(s).", count));

        lines.join("\n")
    }

    /// Deterministic plan used when the oracle gives nothing usable.
    pub fn canned_plan(&self) -> SkillPlan {
        let hint = match self.subject {
            Subject::Math => PlanHint::new("multi-step numeric reasoning")
                .with_steps(["identify quantities", "compute", "check"])
                .with_difficulty("medium"),
            Subject::English => PlanHint::new("main idea + inference")
                .with_passage_type("informational")
                .with_steps(["read", "summarise", "infer from clues"])
                .with_difficulty("medium"),
            Subject::Thinking => PlanHint::new("multi-step reasoning")
                .with_steps(["identify", "compute", "check"]),
        };
        SkillPlan::new(vec![hint])
    }

    /// Hard-coded item used when every generation attempt came back empty.
    pub fn canned_item(&self) -> Item {
        match self.subject {
            Subject::Math => Item::new(
                Subject::Math,
                "What is 3/4 of 20?",
                labelled_choices(["15", "12", "10", "5", "8"]),
                "A",
                "20 x 3/4 = 15",
            )
            .with_tags(["fractions", "Year6"]),
            Subject::English => Item::new(
                Subject::English,
                "What is the main idea of the short passage?",
                labelled_choices([
                    "Detail unrelated to main point",
                    "Correct main idea",
                    "Minor detail",
                    "Author background",
                    "Opinion not stated",
                ]),
                "B",
                "The passage primarily argues for the main point stated in option B.",
            )
            .with_tags(["main-idea", "Year6"]),
            Subject::Thinking => Item::new(
                Subject::Thinking,
                "Which figure comes next in the pattern? (use text description)",
                labelled_choices([
                    "Pattern continues by adding one dot",
                    "Pattern removes one dot",
                    "Pattern mirrors horizontally",
                    "Pattern rotates 90 degrees",
                    "Pattern repeats from start",
                ]),
                "A",
                "Each step adds one dot; next has one more dot than previous.",
            )
            .with_tags(["pattern", "Year6"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::{Difficulty, ImagePayload};

    #[test]
    fn test_profiles_cover_every_subject() {
        for subject in Subject::ALL {
            let profile = SubjectProfile::for_subject(subject);
            assert_eq!(profile.subject, subject);
            assert!(!profile.canned_plan().is_empty());

            let item = profile.canned_item();
            assert_eq!(item.subject, subject);
            assert_eq!(item.choices.len(), 5);
            assert!(item.answer_text().is_some());
        }
    }

    #[test]
    fn test_items_prompt_contents() {
        let ctx = JobContext::new().with_difficulty(Difficulty::Hard);
        let plan = MATH.canned_plan();
        let prompt = MATH.items_prompt(&ctx, "fractions", &["ratios", "angles"], &plan, 1);

        assert!(prompt.starts_with("Generate 1 Year 6 math MCQ(s)"));
        assert!(prompt.contains("Requested topic: fractions."));
        assert!(prompt.contains("Topics: ratios, angles."));
        assert!(prompt.contains("Target difficulty: 3 on a 1-3 scale (hard)."));
        assert!(prompt.contains("Focus: multi-step numeric reasoning."));
        assert!(prompt.ends_with("Return exactly 1 item(s)."));
        assert!(!prompt.contains("Image description"));
    }

    #[test]
    fn test_image_description_is_prepended_and_truncated() {
        let description = format!("A bar graph of rainfall. {}", "y".repeat(600));
        let ctx =
            JobContext::new().with_image(ImagePayload::new(description).with_type("bar graph"));
        let prompt = ENGLISH.items_prompt(&ctx, "", &[], &SkillPlan::default(), 2);

        let first_line = prompt.lines().next().unwrap();
        assert!(first_line.starts_with("Image description: A bar graph of rainfall."));
        assert!(first_line.ends_with("(image type: bar graph)"));
        assert!(first_line.chars().count() < 560);
        assert!(!prompt.contains("Requested topic"));
    }

    #[test]
    fn test_plan_prompt_and_system() {
        let ctx = JobContext::new();
        let prompt = THINKING.plan_prompt(&ctx, "analogies and syllogisms");
        assert!(prompt.starts_with("Topic: analogies and syllogisms\nGrade: Year 6"));
        let system = THINKING.items_system_prompt();
        assert!(system.contains("Respond ONLY with JSON"));
    }
}
