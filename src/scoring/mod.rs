//! Sentiment scoring: one answer string in, one score in [0,1] out.
//!
//! Scorers are pure and total. Anything that cannot be scored maps to
//! [`NEUTRAL_SCORE`]; downstream code relies only on the output range.

pub mod lexicon;
pub mod ollama;

use std::sync::Mutex;

use thiserror::Error;

pub use lexicon::LexiconScorer;
pub use ollama::{LlmClient, MockLlmClient, OllamaClient, OllamaScorer};

/// Score returned for empty or unscorable text.
pub const NEUTRAL_SCORE: f64 = 0.5;

pub trait SentimentScorer: Send + Sync {
    /// Score `text` in [0,1]. Never fails.
    fn score(&self, text: &str) -> f64;

    fn name(&self) -> &'static str;
}

/// Clamp into [0,1], mapping NaN to neutral.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        NEUTRAL_SCORE
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Errors from a model-backed scorer's transport. Never escape `score()`.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Cannot reach Ollama at {0}")]
    OllamaConnection(String),

    #[error("Ollama returned HTTP {status}: {body}")]
    OllamaError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Unparseable model output: {0}")]
    ResponseParsing(String),
}

/// Returns scripted values in order, then neutral. For tests and demos.
pub struct ScriptedScorer {
    values: Mutex<std::collections::VecDeque<f64>>,
}

impl ScriptedScorer {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
        }
    }
}

impl SentimentScorer for ScriptedScorer {
    fn score(&self, _text: &str) -> f64 {
        match self.values.lock() {
            Ok(mut queue) => queue.pop_front().map(clamp_unit).unwrap_or(NEUTRAL_SCORE),
            Err(_) => NEUTRAL_SCORE,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
