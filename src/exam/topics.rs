//! Year 6 selective-style topic vocabulary per subject.

use rand::seq::IndexedRandom;

use super::item::Subject;

pub const MATH_TOPICS: &[&str] = &[
    "fractions",
    "decimals",
    "percentages",
    "ratios",
    "rates",
    "factors and multiples",
    "LCM and GCD",
    "patterns and sequences",
    "time and elapsed time",
    "measurement (length, area, volume, mass)",
    "angles",
    "triangles and polygons",
    "nets and 3D shapes",
    "coordinates",
    "probability (simple)",
    "data and graphs",
];

pub const THINKING_TOPICS: &[&str] = &[
    "analogies",
    "pattern completion",
    "ordering and ranking",
    "logical deduction",
    "syllogisms",
    "spatial reasoning (transformations)",
    "cause and effect",
    "inference from clues",
];

pub const ENGLISH_TOPICS: &[&str] = &[
    "main idea",
    "detail retrieval",
    "inference",
    "vocabulary in context",
    "author purpose",
    "tone and attitude",
    "text structure",
    "reference resolution",
];

/// Vocabulary for `subject`.
pub fn topics_for(subject: Subject) -> &'static [&'static str] {
    match subject {
        Subject::Math => MATH_TOPICS,
        Subject::English => ENGLISH_TOPICS,
        Subject::Thinking => THINKING_TOPICS,
    }
}

/// Up to two distinct topics drawn at random from the subject vocabulary.
pub fn pick_topic_pair(subject: Subject) -> Vec<&'static str> {
    let mut rng = rand::rng();
    let pool = topics_for(subject);
    let mut picked = Vec::with_capacity(2);
    if let Some(first) = pool.choose(&mut rng) {
        picked.push(*first);
        let rest: Vec<&'static str> = pool.iter().copied().filter(|t| t != first).collect();
        if let Some(second) = rest.choose(&mut rng) {
            picked.push(*second);
        }
    }
    picked
}

/// A seed topic for a fresh run: two random topics joined with " and ".
pub fn seed_topic(subject: Subject) -> String {
    pick_topic_pair(subject).join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_pair_is_distinct_and_from_vocabulary() {
        for subject in Subject::ALL {
            for _ in 0..20 {
                let pair = pick_topic_pair(subject);
                assert_eq!(pair.len(), 2);
                assert_ne!(pair[0], pair[1]);
                assert!(pair.iter().all(|t| topics_for(subject).contains(t)));
            }
        }
    }

    #[test]
    fn test_seed_topic_joins_pair() {
        let topic = seed_topic(Subject::English);
        assert!(topic.contains(" and "));
    }
}
