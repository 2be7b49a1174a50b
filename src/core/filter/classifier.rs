//! Content classification port and keyword baseline

use super::Category;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Classifier port
///
/// Produces a score in `[0, 1]` per category for a piece of text. The
/// baseline is keyword-driven; deployments can substitute a model-backed
/// classifier without touching the filter.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Score the text against every category
    async fn classify(&self, text: &str) -> Result<HashMap<Category, f64>>;
}

/// Keyword-group scoring baseline
///
/// For each category, the score is the number of distinct keyword matches
/// times 0.2, clamped to 1.0.
#[derive(Debug, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    /// Create the baseline classifier
    pub fn new() -> Self {
        Self
    }

    fn keywords(category: Category) -> &'static [&'static str] {
        match category {
            Category::Hate => &["hate", "bigot", "slur", "racist", "supremacist"],
            Category::Harassment => &["harass", "bully", "stalk", "threaten", "intimidate"],
            Category::SelfHarm => &["suicide", "self-harm", "self harm", "cutting", "overdose"],
            Category::Sexual => &["sexual", "explicit", "porn", "nsfw", "erotic"],
            Category::Violence => &["kill", "murder", "attack", "weapon", "assault"],
        }
    }
}

#[async_trait]
impl ContentClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<HashMap<Category, f64>> {
        let lowered = text.to_lowercase();
        let mut scores = HashMap::new();
        for category in Category::ALL {
            let matches = Self::keywords(category)
                .iter()
                .filter(|keyword| lowered.contains(*keyword))
                .count();
            let score = (matches as f64 * 0.2).min(1.0);
            scores.insert(category, score);
        }
        Ok(scores)
    }
}
