//! Length estimation with a pluggable estimator.
//!
//! Everything downstream measures text through [`LengthEstimator`] only, so
//! the pipeline stays provider-agnostic: swap the estimator to match a
//! provider's tokenizer more closely.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Approximates how many model-context units a text span consumes.
///
/// Implementations must be pure and monotonic: appending text never
/// decreases the estimate. The splitter's binary search relies on it.
pub trait LengthEstimator: Send + Sync {
    /// Estimate the number of length units in the given text.
    fn estimate(&self, text: &str) -> usize;

    /// Estimator name for logging.
    fn name(&self) -> &str;
}

/// Character-count based estimator (bytes / divisor).
///
/// Uses the approximation that ~4 characters per token for English text.
#[derive(Debug, Clone)]
pub struct CharCountEstimator {
    /// Characters per length unit.
    pub chars_per_unit: f64,
}

impl Default for CharCountEstimator {
    fn default() -> Self {
        Self {
            chars_per_unit: 4.0,
        }
    }
}

impl LengthEstimator for CharCountEstimator {
    fn estimate(&self, text: &str) -> usize {
        (text.len() as f64 / self.chars_per_unit).ceil() as usize
    }

    fn name(&self) -> &str {
        "char_count"
    }
}

/// Simple word-count based estimator (words × factor).
///
/// Uses the approximation that ~1.3 tokens per word for English text.
#[derive(Debug, Clone)]
pub struct WordCountEstimator {
    /// Units per word multiplier.
    pub factor: f64,
}

impl Default for WordCountEstimator {
    fn default() -> Self {
        Self { factor: 1.3 }
    }
}

impl LengthEstimator for WordCountEstimator {
    fn estimate(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.factor).ceil() as usize
    }

    fn name(&self) -> &str {
        "word_count"
    }
}

/// Estimator selection for configuration files and CLI flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Chars,
    Words,
}

impl EstimatorKind {
    pub fn build(self) -> Arc<dyn LengthEstimator> {
        match self {
            Self::Chars => Arc::new(CharCountEstimator::default()),
            Self::Words => Arc::new(WordCountEstimator::default()),
        }
    }
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chars => write!(f, "chars"),
            Self::Words => write!(f, "words"),
        }
    }
}

impl std::str::FromStr for EstimatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chars" | "char_count" => Ok(Self::Chars),
            "words" | "word_count" => Ok(Self::Words),
            other => Err(format!("unknown estimator '{other}' (expected chars or words)")),
        }
    }
}
