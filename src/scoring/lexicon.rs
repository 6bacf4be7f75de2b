use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{SentimentScorer, NEUTRAL_SCORE};

/// Word tokens, keeping inner apostrophes ("don't", "can't").
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+(?:'[a-z]+)?").expect("static regex"));

static POSITIVE: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "good", "great", "fine", "well", "better", "best", "happy", "calm", "relaxed",
        "hopeful", "grateful", "rested", "energetic", "okay", "ok", "positive", "excellent",
        "amazing", "wonderful", "peaceful", "content", "cheerful", "motivated", "love",
        "enjoy", "enjoyed", "improving", "improved", "yes", "fantastic", "glad", "safe",
        "strong", "confident", "proud", "comfortable",
    ]
    .into_iter()
    .collect()
});

static NEGATIVE: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "bad", "sad", "awful", "terrible", "horrible", "worse", "worst", "anxious",
        "worried", "depressed", "down", "tired", "exhausted", "lonely", "hopeless",
        "angry", "upset", "stressed", "scared", "afraid", "empty", "numb", "hurt",
        "pain", "miserable", "crying", "cried", "overwhelmed", "panic", "hate", "suicide",
        "suicidal", "worthless", "low", "sick", "struggling", "forgot", "missed",
    ]
    .into_iter()
    .collect()
});

static NEGATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "not", "no", "never", "don't", "didn't", "isn't", "wasn't", "can't", "cannot",
        "won't", "haven't", "hardly", "barely", "nothing", "without",
    ]
    .into_iter()
    .collect()
});

static INTENSIFIERS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "very", "really", "so", "extremely", "incredibly", "totally", "super", "quite",
        "deeply", "completely",
    ]
    .into_iter()
    .collect()
});

/// How many tokens back a negation still applies.
const NEGATION_SCOPE: usize = 3;
const INTENSIFIER_WEIGHT: f64 = 1.5;

/// Word-list scorer with negation and intensifier handling.
///
/// Each matched term contributes a weight to the positive or negative pile.
/// A negation within the previous three tokens flips the pile; an intensifier
/// immediately before the term multiplies its weight. The score is
/// `0.5 + 0.5 * (pos - neg) / (pos + neg)`, or neutral with no matched term.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase().replace('\u{2019}', "'");
        let tokens: Vec<&str> = TOKEN.find_iter(&lowered).map(|m| m.as_str()).collect();

        let mut positive = 0.0;
        let mut negative = 0.0;

        for (i, token) in tokens.iter().enumerate() {
            let polarity = if POSITIVE.contains(token) {
                1
            } else if NEGATIVE.contains(token) {
                -1
            } else {
                continue;
            };

            let window = &tokens[i.saturating_sub(NEGATION_SCOPE)..i];
            let negated = window.iter().any(|t| NEGATIONS.contains(t));
            let weight = if i > 0 && INTENSIFIERS.contains(tokens[i - 1]) {
                INTENSIFIER_WEIGHT
            } else {
                1.0
            };

            match (polarity, negated) {
                (1, false) | (-1, true) => positive += weight,
                _ => negative += weight,
            }
        }

        let total = positive + negative;
        if total == 0.0 {
            return NEUTRAL_SCORE;
        }
        NEUTRAL_SCORE + 0.5 * (positive - negative) / total
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}
